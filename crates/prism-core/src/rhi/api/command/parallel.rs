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

//! Render command lists whose draws are recorded by several threads.

use super::render::PassScope;
use super::{
    CommandList, CommandListCore, CommandListState, CommandListType, CommandQueue,
    RenderCommandList,
};
use crate::rhi::api::{ParallelExecutor, RenderPass};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use std::sync::Arc;

/// A render pass split over `N` sub-lists.
///
/// The pass is opened by an internal begin list and closed by an internal end
/// list. A command list set built from the parallel list executes
/// `begin, sub-list 0, .., sub-list N-1, end` regardless of the order in which
/// workers finished recording.
#[derive(Debug)]
pub struct ParallelRenderCommandList<B: Backend> {
    name: String,
    begin: RenderCommandList<B>,
    sub_lists: Vec<RenderCommandList<B>>,
    end: RenderCommandList<B>,
}

impl<B: Backend> Clone for ParallelRenderCommandList<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            begin: self.begin.clone(),
            sub_lists: self.sub_lists.clone(),
            end: self.end.clone(),
        }
    }
}

impl<B: Backend> ParallelRenderCommandList<B> {
    /// Creates the begin and end lists and `count` sub-lists, all `Pending`.
    pub fn new(
        queue: &Arc<CommandQueue<B>>,
        render_pass: Arc<RenderPass<B>>,
        count: usize,
        name: impl Into<String>,
    ) -> RhiResult<Self> {
        let name = name.into();
        let pass = Some(render_pass);
        let begin = RenderCommandList::create(queue, pass.clone(), format!("{name} [begin]"), PassScope::Opening)?;
        let sub_lists = (0..count)
            .map(|index| {
                RenderCommandList::create(queue, pass.clone(), format!("{name} [{index}]"), PassScope::Inside)
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let end = RenderCommandList::create(queue, pass, format!("{name} [end]"), PassScope::Closing)?;
        log::debug!("Created parallel render command list '{name}' with {count} sub-lists.");
        Ok(Self {
            name,
            begin,
            sub_lists,
            end,
        })
    }

    /// The sub-lists in execution order.
    pub fn sub_lists(&self) -> &[RenderCommandList<B>] {
        &self.sub_lists
    }

    /// Number of sub-lists.
    pub fn count(&self) -> usize {
        self.sub_lists.len()
    }

    fn members(&self) -> impl Iterator<Item = &RenderCommandList<B>> {
        std::iter::once(&self.begin)
            .chain(self.sub_lists.iter())
            .chain(std::iter::once(&self.end))
    }

    /// Records every sub-list on the workers of `executor`, calling
    /// `record(index, sub_list)` once per sub-list.
    ///
    /// # Errors
    ///
    /// Returns the error of the lowest failing sub-list index, or
    /// [`BackendError::WorkerPanicked`](crate::rhi::error::BackendError::WorkerPanicked)
    /// if a worker panicked.
    pub fn record_parallel<F>(&self, executor: &ParallelExecutor, record: F) -> RhiResult<()>
    where
        F: Fn(usize, &RenderCommandList<B>) -> RhiResult<()> + Send + Sync + 'static,
    {
        let results = executor.map_indexed(self.sub_lists.clone(), move |index, list| record(index, &list))?;
        results.into_iter().collect()
    }
}

fn state_rank(state: CommandListState) -> u8 {
    match state {
        CommandListState::Pending => 0,
        CommandListState::Committed => 1,
        CommandListState::Executing => 2,
        CommandListState::Completed => 3,
        CommandListState::Invalid => 4,
    }
}

impl<B: Backend> CommandList<B> for ParallelRenderCommandList<B> {
    fn core(&self) -> &Arc<CommandListCore<B>> {
        self.begin.core()
    }

    fn set_members(&self) -> Vec<Arc<CommandListCore<B>>> {
        self.members().map(|list| Arc::clone(list.core())).collect()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn list_type(&self) -> CommandListType {
        CommandListType::ParallelRender
    }

    /// `Invalid` if any member is, otherwise the least advanced member state.
    fn state(&self) -> CommandListState {
        let states: Vec<_> = self.members().map(|list| list.state()).collect();
        if states.contains(&CommandListState::Invalid) {
            return CommandListState::Invalid;
        }
        states
            .into_iter()
            .min_by_key(|state| state_rank(*state))
            .unwrap_or(CommandListState::Pending)
    }

    /// Resets every member. Nothing is reset unless all of them can be.
    fn reset(&self) -> RhiResult<()> {
        if let Some(blocked) = self.members().find(|list| !list.core().can_reset()) {
            return Err(ValidationError::InvalidCommandListState {
                list: blocked.name().to_string(),
                operation: "reset",
                state: blocked.state(),
            }
            .into());
        }
        self.members().try_for_each(|list| list.reset())
    }

    /// Commits the sub-lists still recording, then the begin and end lists.
    fn commit(&self) -> RhiResult<()> {
        for list in &self.sub_lists {
            if list.state() == CommandListState::Pending {
                list.commit()?;
            }
        }
        self.begin.commit()?;
        self.end.commit()
    }

    fn wait_until_completed(&self) -> RhiResult<()> {
        self.members().try_for_each(|list| list.wait_until_completed())
    }
}
