// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command lists recording compute dispatches.

use super::{
    Command, CommandList, CommandListCore, CommandListType, CommandQueue, ProgramBindingsTarget,
};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use std::sync::Arc;

/// A command list recording dispatches of compute programs.
#[derive(Debug)]
pub struct ComputeCommandList<B: Backend> {
    core: Arc<CommandListCore<B>>,
}

impl<B: Backend> Clone for ComputeCommandList<B> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<B: Backend> ComputeCommandList<B> {
    /// Creates a `Pending` compute list on a compute or render queue.
    pub fn new(queue: &Arc<CommandQueue<B>>, name: impl Into<String>) -> RhiResult<Self> {
        Ok(Self {
            core: CommandListCore::new(queue, CommandListType::Compute, name.into())?,
        })
    }

    /// Dispatches the bound program over `thread_groups`.
    ///
    /// # Errors
    ///
    /// Fails with [`ValidationError::NoProgramBindings`] if no program
    /// bindings were applied since the last reset.
    pub fn dispatch(&self, thread_groups: [u32; 3]) -> RhiResult<()> {
        let list = self.core.name().to_string();
        self.core.record("dispatch", |recording| {
            if recording.bound_program.is_none() {
                return Err(ValidationError::NoProgramBindings { list }.into());
            }
            if thread_groups.contains(&0) {
                log::trace!("Skipping empty dispatch {thread_groups:?}.");
                return Ok(());
            }
            recording.commands.push(Command::Dispatch { thread_groups });
            Ok(())
        })
    }
}

impl<B: Backend> CommandList<B> for ComputeCommandList<B> {
    fn core(&self) -> &Arc<CommandListCore<B>> {
        &self.core
    }
}

impl<B: Backend> ProgramBindingsTarget<B> for ComputeCommandList<B> {}
