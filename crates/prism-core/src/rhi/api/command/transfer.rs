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

//! Command lists recording copies only.

use super::{CommandList, CommandListCore, CommandListType, CommandQueue};
use crate::rhi::error::RhiResult;
use crate::rhi::traits::Backend;
use std::sync::Arc;

/// A command list recording barriers and copies. Runs on any queue.
#[derive(Debug)]
pub struct TransferCommandList<B: Backend> {
    core: Arc<CommandListCore<B>>,
}

impl<B: Backend> Clone for TransferCommandList<B> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<B: Backend> TransferCommandList<B> {
    /// Creates a `Pending` transfer list on `queue`.
    pub fn new(queue: &Arc<CommandQueue<B>>, name: impl Into<String>) -> RhiResult<Self> {
        Ok(Self {
            core: CommandListCore::new(queue, CommandListType::Transfer, name.into())?,
        })
    }
}

impl<B: Backend> CommandList<B> for TransferCommandList<B> {
    fn core(&self) -> &Arc<CommandListCore<B>> {
        &self.core
    }
}
