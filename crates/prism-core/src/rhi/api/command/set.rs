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

//! Command list sets: the unit of execution on a queue.

use super::{CommandList, CommandListCore, CommandListType, CommandQueue};
use crate::rhi::api::FenceTicket;
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An ordered group of command lists of one type, executed and waited on together.
///
/// A set can be executed again once its lists were reset and re-committed.
/// Waiting is tied to the latest execution.
#[derive(Debug)]
pub struct CommandListSet<B: Backend> {
    members: Vec<Arc<CommandListCore<B>>>,
    list_type: CommandListType,
    frame_index: Option<u32>,
    queue: Arc<CommandQueue<B>>,
    submission: Mutex<Option<FenceTicket<B>>>,
    /// Highest submitted value observed complete.
    completed_value: AtomicU64,
}

impl<B: Backend> CommandListSet<B> {
    /// Creates a set from lists of the same type on the same queue. Parallel
    /// render lists contribute all of their members, in order.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyCommandListSet`] without lists.
    /// * [`ValidationError::CommandListTypeMismatch`] for mixed list types.
    /// * [`ValidationError::QueueMismatch`] for lists of different queues.
    pub fn new(lists: &[&dyn CommandList<B>], frame_index: Option<u32>) -> RhiResult<Arc<Self>> {
        let first = lists.first().ok_or(ValidationError::EmptyCommandListSet)?;
        let list_type = first.list_type();
        let queue = Arc::clone(first.queue());
        let mut members = Vec::with_capacity(lists.len());
        for list in lists {
            if list.list_type() != list_type {
                return Err(ValidationError::CommandListTypeMismatch {
                    list: list.name().to_string(),
                    expected: list_type,
                    actual: list.list_type(),
                }
                .into());
            }
            if !Arc::ptr_eq(list.queue(), &queue) {
                return Err(ValidationError::QueueMismatch {
                    list: list.name().to_string(),
                    queue: queue.name().to_string(),
                }
                .into());
            }
            members.extend(list.set_members());
        }
        Ok(Arc::new(Self {
            members,
            list_type,
            frame_index,
            queue,
            submission: Mutex::new(None),
            completed_value: AtomicU64::new(0),
        }))
    }

    /// The lists executed by the set, in execution order.
    pub fn members(&self) -> &[Arc<CommandListCore<B>>] {
        &self.members
    }

    /// Number of native lists executed.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`: empty sets cannot be built.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The type of every list in the set.
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// The frame the set records, if any.
    pub fn frame_index(&self) -> Option<u32> {
        self.frame_index
    }

    /// The queue the lists belong to.
    pub fn queue(&self) -> &Arc<CommandQueue<B>> {
        &self.queue
    }

    /// The fence value of the latest execution.
    pub fn ticket(&self) -> Option<FenceTicket<B>> {
        self.submission.lock().clone()
    }

    pub(crate) fn mark_submitted(&self, ticket: FenceTicket<B>) {
        *self.submission.lock() = Some(ticket);
    }

    fn observed_complete(&self, ticket: &FenceTicket<B>) -> bool {
        self.completed_value.load(Ordering::Acquire) >= ticket.value
    }

    /// Returns `true` once the GPU finished the latest execution.
    pub fn is_completed(&self) -> bool {
        let Some(ticket) = self.ticket() else {
            return false;
        };
        if self.observed_complete(&ticket) {
            return true;
        }
        let done = ticket.is_completed();
        if done {
            self.completed_value.fetch_max(ticket.value, Ordering::AcqRel);
        }
        done
    }

    /// Blocks until the GPU finished the latest execution of the set.
    ///
    /// May be called any number of times from any number of threads. Every
    /// call returns only once the queue fence reached the submitted value;
    /// calls made after completion return right away.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::CommandListSetNotExecuted`] if the set never executed.
    /// * [`BackendError::DeviceLost`](crate::rhi::error::BackendError::DeviceLost)
    ///   if the device is lost while waiting.
    pub fn wait_until_completed(&self) -> RhiResult<()> {
        let ticket = self.ticket().ok_or(ValidationError::CommandListSetNotExecuted)?;
        if self.observed_complete(&ticket) {
            return Ok(());
        }
        ticket.wait()?;
        self.completed_value.fetch_max(ticket.value, Ordering::AcqRel);
        for member in &self.members {
            member.state();
        }
        Ok(())
    }
}
