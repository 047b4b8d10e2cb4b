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

//! Command queues: submission of command list sets and pending uploads.

use super::{
    Command, CommandListCore, CommandListId, CommandListSet, CommandListState, CommandListType,
};
use crate::rhi::api::{DescriptorManager, Fence, FenceTicket, Resource, ResourceId, ResourceState};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::{Backend, FenceValue, NativeDevice, NativeQueue, Submission};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Uploads recorded since the last flush.
#[derive(Debug)]
struct UploadList<B: Backend> {
    list: Arc<CommandListCore<B>>,
    /// Resources handed back in their auto-transition state after the copies.
    restore: HashMap<ResourceId, (Arc<Resource<B>>, ResourceState)>,
}

/// Lists submitted with one fence value.
#[derive(Debug)]
struct InFlight<B: Backend> {
    value: u64,
    lists: Vec<Arc<CommandListCore<B>>>,
}

/// A GPU queue executing one type of work, with its own timeline fence.
///
/// Executions are serialized by a submission lock. Before every execution
/// the queue flushes the uploads recorded by `Resource::set_data`, so that
/// data written before recording is visible to the executed lists.
#[derive(Debug)]
pub struct CommandQueue<B: Backend> {
    self_ref: Weak<CommandQueue<B>>,
    name: String,
    list_type: CommandListType,
    native: B::Queue,
    device: Arc<B::Device>,
    fence: Arc<Fence<B>>,
    submit_lock: Mutex<()>,
    pending_waits: Mutex<Vec<FenceValue<B>>>,
    uploads: Mutex<Option<UploadList<B>>>,
    in_flight: Mutex<VecDeque<InFlight<B>>>,
    next_list_id: AtomicU64,
    executions: AtomicU64,
}

impl<B: Backend> CommandQueue<B> {
    pub(crate) fn new(
        device: &Arc<B::Device>,
        list_type: CommandListType,
        name: impl Into<String>,
        descriptor_manager: &DescriptorManager<B>,
    ) -> RhiResult<Arc<Self>> {
        let name = name.into();
        let native = device.create_queue(list_type, &name)?;
        let native_fence = device.create_fence(&format!("{name} fence"))?;
        let queue = Arc::new_cyclic(|self_ref: &Weak<Self>| Self {
            self_ref: Weak::clone(self_ref),
            fence: Arc::new(Fence::new(format!("{name} fence"), native_fence, Weak::clone(self_ref))),
            name,
            list_type,
            native,
            device: Arc::clone(device),
            submit_lock: Mutex::new(()),
            pending_waits: Mutex::new(Vec::new()),
            uploads: Mutex::new(None),
            in_flight: Mutex::new(VecDeque::new()),
            next_list_id: AtomicU64::new(1),
            executions: AtomicU64::new(0),
        });
        descriptor_manager.register_fence(&queue.fence);
        log::info!("Created {list_type:?} command queue '{}'.", queue.name);
        Ok(queue)
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type of work the queue executes.
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// The timeline fence signaled after every execution.
    pub fn fence(&self) -> &Arc<Fence<B>> {
        &self.fence
    }

    /// The native queue.
    pub fn native(&self) -> &B::Queue {
        &self.native
    }

    pub(crate) fn device(&self) -> &Arc<B::Device> {
        &self.device
    }

    /// Number of submissions whose lists have not been seen completed.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of successful submissions, uploads and signals included.
    pub fn executions_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Number of uploads waiting for the next flush.
    pub fn pending_upload_count(&self) -> usize {
        self.uploads
            .lock()
            .as_ref()
            .map_or(0, |uploads| uploads.list.command_count())
    }

    pub(crate) fn next_list_id(&self) -> CommandListId {
        CommandListId(self.next_list_id.fetch_add(1, Ordering::Relaxed))
    }

    fn arc(&self) -> RhiResult<Arc<Self>> {
        self.self_ref.upgrade().ok_or_else(|| {
            ValidationError::ContextReleased {
                context: self.name.clone(),
            }
            .into()
        })
    }

    /// Records a copy of `data` into a sub-resource on the upload list.
    pub(crate) fn record_upload(
        &self,
        resource: &Arc<Resource<B>>,
        sub_resource: u32,
        offset: u64,
        data: Arc<[u8]>,
    ) -> RhiResult<()> {
        let mut uploads = self.uploads.lock();
        let uploads = match &mut *uploads {
            Some(uploads) => uploads,
            slot => {
                let list = CommandListCore::new(
                    &self.arc()?,
                    CommandListType::Transfer,
                    format!("{} uploads", self.name),
                )?;
                slot.insert(UploadList {
                    list,
                    restore: HashMap::new(),
                })
            }
        };
        {
            // A rejected transition leaves the recording as it was, so the
            // uploads queued before stay valid.
            let mut recording = uploads.list.lock();
            recording.transition(resource, ResourceState::CopyDest, Some(sub_resource))?;
            recording.commands.push(Command::Upload {
                destination: Arc::clone(resource),
                sub_resource,
                offset,
                data,
            });
        }
        if let Some(state) = resource.auto_transition_source_state() {
            uploads
                .restore
                .insert(resource.id(), (Arc::clone(resource), state));
        }
        Ok(())
    }

    /// Submits every recorded upload.
    ///
    /// # Returns
    ///
    /// The fence value the uploads complete at, or `None` if there was nothing to upload.
    pub fn flush_uploads(&self) -> RhiResult<Option<u64>> {
        let _submit = self.submit_lock.lock();
        self.flush_uploads_locked()
    }

    fn flush_uploads_locked(&self) -> RhiResult<Option<u64>> {
        let Some(uploads) = self.uploads.lock().take() else {
            return Ok(None);
        };
        uploads.list.commit_with(|recording| {
            for (resource, state) in uploads.restore.values() {
                if let Err(error) = recording.transition(resource, *state, None) {
                    log::warn!(
                        "'{}' stays in its upload state after the flush: {error}",
                        resource.name()
                    );
                }
            }
            Ok(())
        })?;
        log::debug!(
            "Flushing {} upload commands on queue '{}'.",
            uploads.list.command_count(),
            self.name
        );
        let ticket = self.submit_locked("uploads", &[uploads.list])?;
        Ok(Some(ticket.value))
    }

    /// Executes a set of committed lists.
    ///
    /// Pending uploads are submitted first. The lists move to `Executing` and
    /// complete once the returned ticket is reached.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::QueueMismatch`] if the set belongs to another queue.
    /// * [`ValidationError::InvalidCommandListState`] if a list is not committed.
    ///   No list of the set is submitted in that case.
    /// * [`BackendError::DeviceLost`](crate::rhi::error::BackendError::DeviceLost)
    ///   if the device is gone.
    pub fn execute(&self, set: &CommandListSet<B>) -> RhiResult<FenceTicket<B>> {
        self.device.check_status()?;
        if !std::ptr::eq(Arc::as_ptr(set.queue()), self) {
            return Err(ValidationError::QueueMismatch {
                list: set.members().first().map(|list| list.name().to_string()).unwrap_or_default(),
                queue: self.name.clone(),
            }
            .into());
        }
        let _submit = self.submit_lock.lock();
        for list in set.members() {
            let state = list.state();
            if state != CommandListState::Committed {
                return Err(ValidationError::InvalidCommandListState {
                    list: list.name().to_string(),
                    operation: "execute",
                    state,
                }
                .into());
            }
        }
        self.flush_uploads_locked()?;
        let label = match set.frame_index() {
            Some(frame) => format!("{} frame {frame}", self.name),
            None => self.name.clone(),
        };
        let ticket = self.submit_locked(&label, set.members())?;
        set.mark_submitted(ticket.clone());
        Ok(ticket)
    }

    /// Submits committed lists. The submission lock must be held.
    fn submit_locked(&self, label: &str, lists: &[Arc<CommandListCore<B>>]) -> RhiResult<FenceTicket<B>> {
        let streams = lists
            .iter()
            .map(|list| {
                let recording = list.lock();
                recording.stream.clone().ok_or_else(|| {
                    ValidationError::InvalidCommandListState {
                        list: list.name().to_string(),
                        operation: "execute",
                        state: recording.state,
                    }
                    .into()
                })
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let value = self.fence.next_value();
        let waits = std::mem::take(&mut *self.pending_waits.lock());
        let submission = Submission {
            label: label.to_string(),
            streams,
            waits: waits.clone(),
            signal: self.fence.native_value(value),
        };
        if let Err(error) = self.native.submit(submission) {
            self.fence.cancel_value(value);
            self.restore_waits(waits);
            log::error!("Submission '{label}' on queue '{}' failed: {error}", self.name);
            return Err(error);
        }
        self.executions.fetch_add(1, Ordering::Relaxed);

        let ticket = FenceTicket {
            fence: Arc::clone(&self.fence),
            value,
        };
        for list in lists {
            let mut recording = list.lock();
            recording.state = CommandListState::Executing;
            recording.ticket = Some(ticket.clone());
        }
        self.in_flight.lock().push_back(InFlight {
            value,
            lists: lists.to_vec(),
        });
        log::trace!("Submitted '{label}' with {} lists, fence value {value}.", lists.len());
        self.release_completed();
        Ok(ticket)
    }

    /// Moves lists whose fence value was reached to `Completed`, releasing
    /// the resources they retained.
    pub fn release_completed(&self) -> usize {
        let completed = self.fence.completed_value();
        let done: Vec<InFlight<B>> = {
            let mut in_flight = self.in_flight.lock();
            let count = in_flight.iter().take_while(|entry| entry.value <= completed).count();
            in_flight.drain(..count).collect()
        };
        for entry in &done {
            for list in &entry.lists {
                list.state();
            }
        }
        done.len()
    }

    /// Enqueues a signal of the next fence value after all submitted work.
    pub(crate) fn signal_fence(&self) -> RhiResult<u64> {
        let _submit = self.submit_lock.lock();
        let value = self.fence.next_value();
        let waits = std::mem::take(&mut *self.pending_waits.lock());
        let submission = Submission {
            label: format!("{} signal", self.name),
            streams: Vec::new(),
            waits: waits.clone(),
            signal: self.fence.native_value(value),
        };
        if let Err(error) = self.native.submit(submission) {
            self.fence.cancel_value(value);
            self.restore_waits(waits);
            return Err(error);
        }
        self.executions.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Makes the next submission wait on the GPU for a fence value.
    pub(crate) fn add_gpu_wait(&self, value: FenceValue<B>) {
        self.pending_waits.lock().push(value);
    }

    /// Puts the waits of a failed submission back in front of the ones added since.
    fn restore_waits(&self, waits: Vec<FenceValue<B>>) {
        let mut pending = self.pending_waits.lock();
        let added = std::mem::replace(&mut *pending, waits);
        pending.extend(added);
    }

    /// Number of GPU waits the next submission starts with.
    pub fn pending_wait_count(&self) -> usize {
        self.pending_waits.lock().len()
    }

    /// Flushes uploads and blocks until the queue executed everything submitted.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.flush_uploads()?;
        self.fence.wait_on_cpu()?;
        self.release_completed();
        Ok(())
    }
}

impl<B: Backend> Drop for CommandQueue<B> {
    fn drop(&mut self) {
        log::debug!("Released command queue '{}'.", self.name);
    }
}
