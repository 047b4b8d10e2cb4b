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

//! Command kits: a queue with reusable command lists and the sets wrapping them.

use super::{
    CommandList, CommandListSet, CommandListState, CommandListType, CommandQueue,
    ComputeCommandList, RenderCommandList, TransferCommandList,
};
use crate::rhi::api::{FenceTicket, RenderPass};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Id of the list used when callers do not need more than one.
pub const DEFAULT_LIST_ID: u32 = 0;

#[derive(Debug)]
enum KitList<B: Backend> {
    Transfer(TransferCommandList<B>),
    Compute(ComputeCommandList<B>),
    Render(RenderCommandList<B>),
}

impl<B: Backend> Clone for KitList<B> {
    fn clone(&self) -> Self {
        match self {
            KitList::Transfer(list) => KitList::Transfer(list.clone()),
            KitList::Compute(list) => KitList::Compute(list.clone()),
            KitList::Render(list) => KitList::Render(list.clone()),
        }
    }
}

impl<B: Backend> KitList<B> {
    fn as_list(&self) -> &dyn CommandList<B> {
        match self {
            KitList::Transfer(list) => list,
            KitList::Compute(list) => list,
            KitList::Render(list) => list,
        }
    }
}

type ListKey = (u32, Option<u32>);

/// A queue plus lazily created command lists keyed by list id and frame.
///
/// Lists handed out by the kit are ready for encoding: completed and invalid
/// lists are reset, lists still executing are waited for first.
#[derive(Debug)]
pub struct CommandKit<B: Backend> {
    name: String,
    queue: Arc<CommandQueue<B>>,
    lists: Mutex<HashMap<ListKey, KitList<B>>>,
    sets: Mutex<HashMap<(Vec<u32>, Option<u32>), Arc<CommandListSet<B>>>>,
}

impl<B: Backend> CommandKit<B> {
    /// Creates a kit over `queue`.
    pub fn new(queue: &Arc<CommandQueue<B>>, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        log::debug!("Created command kit '{name}' on queue '{}'.", queue.name());
        Arc::new(Self {
            name,
            queue: Arc::clone(queue),
            lists: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
        })
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue.
    pub fn queue(&self) -> &Arc<CommandQueue<B>> {
        &self.queue
    }

    /// The type of work the queue executes.
    pub fn list_type(&self) -> CommandListType {
        self.queue.list_type()
    }

    /// Returns `true` if the kit created a list for `id` and `frame`.
    pub fn has_list(&self, id: u32, frame: Option<u32>) -> bool {
        self.lists.lock().contains_key(&(id, frame))
    }

    fn list_name(&self, id: u32, frame: Option<u32>) -> String {
        match frame {
            Some(frame) => format!("{} list {id} frame {frame}", self.name),
            None => format!("{} list {id}", self.name),
        }
    }

    fn get_or_create(
        &self,
        id: u32,
        frame: Option<u32>,
        create: impl FnOnce(String) -> RhiResult<KitList<B>>,
    ) -> RhiResult<KitList<B>> {
        let list = {
            let mut lists = self.lists.lock();
            match lists.get(&(id, frame)) {
                Some(list) => list.clone(),
                None => {
                    let list = create(self.list_name(id, frame))?;
                    lists.insert((id, frame), list.clone());
                    return Ok(list);
                }
            }
        };
        Self::prepare_for_encoding(list.as_list())?;
        Ok(list)
    }

    fn prepare_for_encoding(list: &dyn CommandList<B>) -> RhiResult<()> {
        match list.state() {
            CommandListState::Pending => Ok(()),
            CommandListState::Executing => {
                list.wait_until_completed()?;
                list.reset()
            }
            CommandListState::Completed | CommandListState::Invalid => list.reset(),
            state @ CommandListState::Committed => Err(ValidationError::InvalidCommandListState {
                list: list.name().to_string(),
                operation: "encode",
                state,
            }
            .into()),
        }
    }

    fn mismatch(&self, id: u32, frame: Option<u32>, expected: CommandListType) -> ValidationError {
        let actual = self
            .lists
            .lock()
            .get(&(id, frame))
            .map_or(expected, |list| list.as_list().list_type());
        ValidationError::CommandListTypeMismatch {
            list: self.list_name(id, frame),
            expected,
            actual,
        }
    }

    /// The render list `id` of `frame`, created with `render_pass` on first use.
    /// A later call with another pass switches the list to it.
    pub fn render_list(
        &self,
        id: u32,
        frame: Option<u32>,
        render_pass: Option<&Arc<RenderPass<B>>>,
    ) -> RhiResult<RenderCommandList<B>> {
        let list = self.get_or_create(id, frame, |name| {
            RenderCommandList::new(&self.queue, render_pass.cloned(), name).map(KitList::Render)
        })?;
        match list {
            KitList::Render(list) => {
                if let Some(render_pass) = render_pass {
                    list.set_render_pass(render_pass)?;
                }
                Ok(list)
            }
            _ => Err(self.mismatch(id, frame, CommandListType::Render).into()),
        }
    }

    /// The compute list `id` of `frame`.
    pub fn compute_list(&self, id: u32, frame: Option<u32>) -> RhiResult<ComputeCommandList<B>> {
        let list = self.get_or_create(id, frame, |name| {
            ComputeCommandList::new(&self.queue, name).map(KitList::Compute)
        })?;
        match list {
            KitList::Compute(list) => Ok(list),
            _ => Err(self.mismatch(id, frame, CommandListType::Compute).into()),
        }
    }

    /// The transfer list `id` of `frame`.
    pub fn transfer_list(&self, id: u32, frame: Option<u32>) -> RhiResult<TransferCommandList<B>> {
        let list = self.get_or_create(id, frame, |name| {
            TransferCommandList::new(&self.queue, name).map(KitList::Transfer)
        })?;
        match list {
            KitList::Transfer(list) => Ok(list),
            _ => Err(self.mismatch(id, frame, CommandListType::Transfer).into()),
        }
    }

    /// The set executing lists `ids` of `frame` in order. Sets are cached.
    ///
    /// # Errors
    ///
    /// [`ValidationError::CommandListNotFound`] if a list was never created.
    pub fn list_set(&self, ids: &[u32], frame: Option<u32>) -> RhiResult<Arc<CommandListSet<B>>> {
        let key = (ids.to_vec(), frame);
        if let Some(set) = self.sets.lock().get(&key) {
            return Ok(Arc::clone(set));
        }
        let lists: Vec<KitList<B>> = {
            let lists = self.lists.lock();
            ids.iter()
                .map(|&id| {
                    lists.get(&(id, frame)).cloned().ok_or_else(|| {
                        ValidationError::CommandListNotFound {
                            kit: self.name.clone(),
                            id,
                            frame,
                        }
                    })
                })
                .collect::<Result<_, _>>()?
        };
        let refs: Vec<&dyn CommandList<B>> = lists.iter().map(KitList::as_list).collect();
        let set = CommandListSet::new(&refs, frame)?;
        self.sets.lock().insert(key, Arc::clone(&set));
        Ok(set)
    }

    /// Commits lists still recording and executes the set of `ids` for `frame`.
    pub fn execute(&self, ids: &[u32], frame: Option<u32>) -> RhiResult<FenceTicket<B>> {
        let set = self.list_set(ids, frame)?;
        let lists: Vec<KitList<B>> = {
            let lists = self.lists.lock();
            ids.iter().filter_map(|&id| lists.get(&(id, frame)).cloned()).collect()
        };
        for list in &lists {
            let list = list.as_list();
            if list.state() == CommandListState::Pending {
                list.commit()?;
            }
        }
        self.queue.execute(&set)
    }

    /// Executes the set of `ids` for `frame` and blocks until it completed.
    pub fn execute_and_wait(&self, ids: &[u32], frame: Option<u32>) -> RhiResult<()> {
        let set = self.list_set(ids, frame)?;
        self.execute(ids, frame)?;
        set.wait_until_completed()
    }
}
