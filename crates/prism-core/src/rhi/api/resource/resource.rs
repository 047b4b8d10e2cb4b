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

//! GPU resources: buffers, textures and samplers with their tracked state.

use super::{
    MemoryState, ResourceDescriptor, ResourceId, ResourceKind, ResourceState, ResourceUsage,
    StateTracker, StateTransition, StateTransitions, StorageMode, SubResourceCount, SubResourceData,
    SubResourceIndex,
};
use crate::rhi::api::{CommandQueue, ContextCore};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::{Backend, NativeDevice};
use bytemuck::Pod;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// A buffer, texture or sampler created by a context.
///
/// Resources are shared through `Arc`. Command lists keep every resource they
/// reference alive until the GPU has finished with them, so dropping the last
/// application handle while a frame is in flight is safe.
///
/// The state recorded for a resource is the target of the last barrier
/// recorded for it on any command list, or `Undefined` if it was never
/// transitioned.
#[derive(Debug)]
pub struct Resource<B: Backend> {
    id: ResourceId,
    name: String,
    descriptor: ResourceDescriptor,
    sub_resource_count: SubResourceCount,
    native: B::Resource,
    device: Arc<B::Device>,
    device_generation: u64,
    context: Weak<ContextCore<B>>,
    state: Mutex<StateTracker>,
    auto_transition_source_state: Mutex<Option<ResourceState>>,
    initialized_sizes: Mutex<Vec<u64>>,
}

impl<B: Backend> Resource<B> {
    pub(crate) fn new(
        id: ResourceId,
        name: String,
        descriptor: ResourceDescriptor,
        native: B::Resource,
        device: Arc<B::Device>,
        device_generation: u64,
        context: Weak<ContextCore<B>>,
    ) -> Self {
        let sub_resource_count = descriptor.sub_resource_count();
        let raw_count = sub_resource_count.raw_count();
        log::debug!(
            "Created {:?} '{name}' ({} bytes reserved).",
            descriptor.kind(),
            descriptor.reserved_size()
        );
        Self {
            id,
            name,
            descriptor,
            sub_resource_count,
            native,
            device,
            device_generation,
            context,
            state: Mutex::new(StateTracker::new(raw_count)),
            auto_transition_source_state: Mutex::new(None),
            initialized_sizes: Mutex::new(vec![0; raw_count as usize]),
        }
    }

    /// Identity of the resource in its context.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer, texture or sampler.
    pub fn kind(&self) -> ResourceKind {
        self.descriptor.kind()
    }

    /// The settings the resource was created with.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Allowed usages.
    pub fn usage(&self) -> ResourceUsage {
        self.descriptor.usage()
    }

    /// Where the memory lives.
    pub fn storage(&self) -> StorageMode {
        self.descriptor.storage()
    }

    /// Sub-resource layout.
    pub fn sub_resource_count(&self) -> SubResourceCount {
        self.sub_resource_count
    }

    /// The native object.
    pub fn native(&self) -> &B::Resource {
        &self.native
    }

    /// The native device the resource was created on.
    pub fn native_device(&self) -> &Arc<B::Device> {
        &self.device
    }

    /// Generation of the device the resource was created on.
    pub fn device_generation(&self) -> u64 {
        self.device_generation
    }

    /// State shared by every sub-resource, or `None` while they differ.
    pub fn state(&self) -> Option<ResourceState> {
        self.state.lock().state()
    }

    /// State of one sub-resource.
    pub fn sub_resource_state(&self, index: SubResourceIndex) -> RhiResult<ResourceState> {
        let raw = self.raw_sub_resource(index)?;
        let state = self.state.lock().sub_resource_state(raw);
        state.ok_or_else(|| self.sub_resource_error(raw).into())
    }

    /// The state the core hands the resource back in after work it initiates
    /// itself: uploads through the queue and presentation of frame buffers.
    pub fn auto_transition_source_state(&self) -> Option<ResourceState> {
        *self.auto_transition_source_state.lock()
    }

    /// Sets the state the core hands the resource back in.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::IncompatibleUsage`] if the usage does not allow `state`.
    /// * [`ValidationError::InvalidStateTransition`] for `Undefined`, which
    ///   uploads and render passes cannot hand a resource back in.
    pub fn set_auto_transition_source_state(
        &self,
        state: Option<ResourceState>,
    ) -> Result<(), ValidationError> {
        if let Some(state) = state {
            self.require_usage(state.required_usage())?;
            if !ResourceState::CopyDest.can_transition_to(state) {
                return Err(ValidationError::InvalidStateTransition {
                    resource: self.name.clone(),
                    from: ResourceState::CopyDest,
                    to: state,
                });
            }
        }
        *self.auto_transition_source_state.lock() = state;
        Ok(())
    }

    /// Size of the allocation or of the data written so far. Samplers report zero.
    pub fn data_size(&self, memory_state: MemoryState) -> u64 {
        match memory_state {
            MemoryState::Reserved => self.descriptor.reserved_size(),
            MemoryState::Initialized => self.initialized_sizes.lock().iter().sum(),
        }
    }

    /// Flattens a sub-resource index, checking that it lies inside the resource.
    pub fn raw_sub_resource(&self, index: SubResourceIndex) -> Result<u32, ValidationError> {
        index
            .raw_index(&self.sub_resource_count)
            .ok_or_else(|| ValidationError::InvalidSubResource {
                resource: self.name.clone(),
                index: index
                    .array_index
                    .saturating_mul(self.sub_resource_count.mip_count)
                    .saturating_add(index.mip_level),
                count: self.sub_resource_count.raw_count(),
            })
    }

    fn sub_resource_error(&self, raw: u32) -> ValidationError {
        ValidationError::InvalidSubResource {
            resource: self.name.clone(),
            index: raw,
            count: self.sub_resource_count.raw_count(),
        }
    }

    fn require_usage(&self, required: ResourceUsage) -> Result<(), ValidationError> {
        if !self.usage().contains(required) {
            return Err(ValidationError::IncompatibleUsage {
                resource: self.name.clone(),
                required,
                actual: self.usage(),
            });
        }
        Ok(())
    }

    /// Fails if the context was reset since this resource was created.
    pub(crate) fn check_device_generation(&self) -> Result<(), ValidationError> {
        if let Some(context) = self.context.upgrade() {
            let current = context.device_generation();
            if current != self.device_generation {
                return Err(ValidationError::StaleResource {
                    resource: self.name.clone(),
                    generation: self.device_generation,
                    current,
                });
            }
        }
        Ok(())
    }

    /// Moves the whole resource (`None`) or one sub-resource into `target`
    /// and returns the barriers that need recording.
    ///
    /// Nothing changes if the usage does not allow `target` or the canonical
    /// transition table forbids the move.
    pub(crate) fn transition(
        &self,
        target: ResourceState,
        sub_resource: Option<u32>,
    ) -> Result<StateTransitions, ValidationError> {
        if let Some(raw) = sub_resource {
            if raw >= self.sub_resource_count.raw_count() {
                return Err(self.sub_resource_error(raw));
            }
        }
        self.require_usage(target.required_usage())?;

        let mut state = self.state.lock();
        let transitions =
            state
                .plan(target, sub_resource)
                .map_err(|from| ValidationError::InvalidStateTransition {
                    resource: self.name.clone(),
                    from,
                    to: target,
                })?;
        state.commit(target, sub_resource);
        Ok(transitions)
    }

    /// Undoes a transition that was never committed, unless the resource was
    /// moved again since.
    pub(crate) fn revert_transition(&self, transition: &StateTransition) {
        let mut state = self.state.lock();
        let current = match transition.sub_resource {
            Some(raw) => state.sub_resource_state(raw),
            None => state.state(),
        };
        if current == Some(transition.after) {
            state.commit(transition.before, transition.sub_resource);
            log::trace!(
                "Reverted '{}' from {:?} to {:?}.",
                self.name,
                transition.after,
                transition.before
            );
        }
    }

    fn check_writes(&self, sub_resources: &[SubResourceData<'_>]) -> Result<Vec<u32>, ValidationError> {
        sub_resources
            .iter()
            .map(|sub_resource| {
                let raw = self.raw_sub_resource(sub_resource.index)?;
                let capacity = self.descriptor.sub_resource_size(raw);
                let size = sub_resource.data.len() as u64;
                if sub_resource.offset.checked_add(size).is_none_or(|end| end > capacity) {
                    return Err(ValidationError::DataSizeOverflow {
                        resource: self.name.clone(),
                        sub_resource: raw,
                        offset: sub_resource.offset,
                        size,
                        capacity,
                    });
                }
                Ok(raw)
            })
            .collect()
    }

    fn record_initialized(&self, raw: u32, end: u64) {
        if let Some(size) = self.initialized_sizes.lock().get_mut(raw as usize) {
            *size = (*size).max(end);
        }
    }

    /// Writes data into sub-resources.
    ///
    /// Host storage resources need `HOST_WRITE` and are written immediately.
    /// An `Undefined` host resource is in `Common` afterwards.
    /// Private storage resources need `COPY_DST`: the data is recorded on the
    /// upload list of `queue`, which is flushed before the queue's next
    /// execution or by `Context::upload_resources`.
    ///
    /// Every entry is validated before anything is written.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::NoMemoryFootprint`] for samplers.
    /// * [`ValidationError::IncompatibleUsage`] without write access.
    /// * [`ValidationError::InvalidSubResource`] / [`ValidationError::DataSizeOverflow`]
    ///   for entries outside the resource.
    pub fn set_data(
        self: &Arc<Self>,
        sub_resources: &[SubResourceData<'_>],
        queue: &CommandQueue<B>,
    ) -> RhiResult<()> {
        if self.kind() == ResourceKind::Sampler {
            return Err(ValidationError::NoMemoryFootprint {
                resource: self.name.clone(),
            }
            .into());
        }
        self.check_device_generation()?;
        match self.storage() {
            StorageMode::Host => self.require_usage(ResourceUsage::HOST_WRITE)?,
            StorageMode::Private => self.require_usage(ResourceUsage::COPY_DST)?,
        }
        let raw_indices = self.check_writes(sub_resources)?;

        for (sub_resource, raw) in sub_resources.iter().zip(raw_indices) {
            match self.storage() {
                StorageMode::Host => self.device.write_host_memory(
                    &self.native,
                    raw,
                    sub_resource.offset,
                    sub_resource.data,
                )?,
                StorageMode::Private => queue.record_upload(
                    self,
                    raw,
                    sub_resource.offset,
                    Arc::from(sub_resource.data),
                )?,
            }
            self.record_initialized(raw, sub_resource.offset + sub_resource.data.len() as u64);
        }
        if self.storage() == StorageMode::Host {
            let mut state = self.state.lock();
            if state.state() == Some(ResourceState::Undefined) {
                state.commit(ResourceState::Common, None);
            }
        }
        log::trace!("Set {} sub-resources of '{}'.", sub_resources.len(), self.name);
        Ok(())
    }

    /// Writes a slice of plain values into the first sub-resource.
    pub fn set_pod_data<T: Pod>(self: &Arc<Self>, data: &[T], queue: &CommandQueue<B>) -> RhiResult<()> {
        self.set_data(&[SubResourceData::new(bytemuck::cast_slice(data))], queue)
    }

    /// Reads back a sub-resource of a host storage resource.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::NoMemoryFootprint`] for samplers.
    /// * [`ValidationError::IncompatibleUsage`] without `HOST_READ` usage.
    pub fn get_data(&self, index: SubResourceIndex) -> RhiResult<Vec<u8>> {
        if self.kind() == ResourceKind::Sampler {
            return Err(ValidationError::NoMemoryFootprint {
                resource: self.name.clone(),
            }
            .into());
        }
        self.require_usage(ResourceUsage::HOST_READ)?;
        let raw = self.raw_sub_resource(index)?;
        self.device.read_host_memory(&self.native, raw)
    }

    /// Reads back the first sub-resource as plain values.
    pub fn get_pod_data<T: Pod>(&self) -> RhiResult<Vec<T>> {
        let bytes = self.get_data(SubResourceIndex::default())?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

impl<B: Backend> Drop for Resource<B> {
    fn drop(&mut self) {
        log::trace!("Released {:?} '{}'.", self.kind(), self.name);
    }
}
