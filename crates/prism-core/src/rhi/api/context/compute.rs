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

//! Compute contexts: a context without a surface.

use super::{Context, ContextType};
use crate::rhi::api::{
    CommandKit, CommandListType, ContextSettings, ParallelExecutor, TimestampQueryPool,
};
use crate::rhi::error::RhiResult;
use crate::rhi::traits::Backend;
use std::ops::Deref;
use std::sync::Arc;

/// A context running compute and transfer work only.
#[derive(Debug)]
pub struct ComputeContext<B: Backend> {
    context: Context<B>,
}

impl<B: Backend> ComputeContext<B> {
    pub(crate) fn new(
        name: String,
        adapter: B::Adapter,
        settings: ContextSettings,
        executor: Arc<ParallelExecutor>,
    ) -> RhiResult<Self> {
        Ok(Self {
            context: Context::new(name, ContextType::Compute, adapter, settings, executor)?,
        })
    }

    /// The kit over the default compute queue.
    pub fn compute_kit(&self) -> RhiResult<Arc<CommandKit<B>>> {
        self.default_command_kit(CommandListType::Compute)
    }

    /// A timestamp pool on the default compute queue.
    pub fn create_compute_timestamp_pool(&self, max_per_frame: u32) -> RhiResult<Arc<TimestampQueryPool<B>>> {
        let queue = self.default_command_queue(CommandListType::Compute)?;
        self.create_timestamp_query_pool(&queue, max_per_frame)
    }
}

impl<B: Backend> Deref for ComputeContext<B> {
    type Target = Context<B>;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}
