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

//! The null device: resources as byte buffers in host memory.

use super::fence::{FenceShared, NullFence};
use super::queue::NullQueue;
use super::surface::NullSurface;
use super::{NullBackend, NullDeviceSettings};
use parking_lot::{Condvar, Mutex, RwLock};
use prism_core::{
    AllocationError, BackendError, CommandListType, DescriptorHeapKind, NativeDevice, NativeView,
    ResourceDescriptor, ResourceId, ResourceKind, RhiError, RhiResult, SurfaceSettings,
    ViewSettings,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Counters of the work a null device executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullDeviceStats {
    /// Batches executed by queues, signals included.
    pub submissions: u64,
    /// Barriers executed.
    pub barriers: u64,
    /// Render passes executed.
    pub render_passes: u64,
    /// Draws, indexed or not.
    pub draws: u64,
    /// Compute dispatches.
    pub dispatches: u64,
    /// Buffer to buffer copies.
    pub copies: u64,
    /// Uploads of CPU data.
    pub uploads: u64,
    /// Descriptors written into tables.
    pub descriptor_writes: u64,
    /// Argument table bindings pointing at unwritten or out of range slots.
    pub descriptor_faults: u64,
}

#[derive(Debug)]
pub(super) struct DeviceInner {
    pub(super) settings: NullDeviceSettings,
    pub(super) created_at: Instant,
    lost: RwLock<Option<String>>,
    suspended: Mutex<bool>,
    resumed: Condvar,
    fences: Mutex<Vec<Weak<FenceShared>>>,
    pub(super) stats: Mutex<NullDeviceStats>,
    allocated_bytes: AtomicU64,
    peak_bytes: AtomicU64,
}

impl DeviceInner {
    pub(super) fn check_lost(&self) -> RhiResult<()> {
        match &*self.lost.read() {
            Some(reason) => Err(BackendError::DeviceLost {
                reason: reason.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    pub(super) fn is_lost(&self) -> bool {
        self.lost.read().is_some()
    }

    /// Blocks the calling queue worker while execution is suspended.
    pub(super) fn wait_while_suspended(&self) {
        let mut suspended = self.suspended.lock();
        while *suspended && !self.is_lost() {
            self.resumed.wait(&mut suspended);
        }
    }

    /// Nanoseconds since the device was opened.
    pub(super) fn timestamp(&self) -> u64 {
        self.created_at.elapsed().as_nanos() as u64
    }

    fn release_memory(&self, size: u64) {
        self.allocated_bytes.fetch_sub(size, Ordering::AcqRel);
    }
}

/// The null device. Clones share the same device.
#[derive(Debug, Clone)]
pub struct NullDevice {
    pub(super) inner: Arc<DeviceInner>,
}

impl NullDevice {
    pub(super) fn new(settings: NullDeviceSettings) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                settings,
                created_at: Instant::now(),
                lost: RwLock::new(None),
                suspended: Mutex::new(false),
                resumed: Condvar::new(),
                fences: Mutex::new(Vec::new()),
                stats: Mutex::new(NullDeviceStats::default()),
                allocated_bytes: AtomicU64::new(0),
                peak_bytes: AtomicU64::new(0),
            }),
        }
    }

    /// The settings the device was opened with.
    pub fn settings(&self) -> &NullDeviceSettings {
        &self.inner.settings
    }

    /// Counters of the work executed so far.
    pub fn stats(&self) -> NullDeviceStats {
        *self.inner.stats.lock()
    }

    /// Bytes currently reserved by live resources.
    pub fn allocated_bytes(&self) -> u64 {
        self.inner.allocated_bytes.load(Ordering::Acquire)
    }

    /// Highest value [`allocated_bytes`](Self::allocated_bytes) ever reached.
    pub fn peak_bytes(&self) -> u64 {
        self.inner.peak_bytes.load(Ordering::Acquire)
    }

    /// Holds every queue before its next submission until
    /// [`resume_execution`](Self::resume_execution). Submissions keep being accepted.
    pub fn suspend_execution(&self) {
        *self.inner.suspended.lock() = true;
        log::debug!("Null device execution suspended.");
    }

    /// Lets suspended queues run again.
    pub fn resume_execution(&self) {
        *self.inner.suspended.lock() = false;
        self.inner.resumed.notify_all();
        log::debug!("Null device execution resumed.");
    }

    /// Marks the device as lost. Pending submissions are dropped without
    /// signaling, waiters wake up with a device lost error and every later
    /// call fails with one.
    pub fn simulate_device_loss(&self, reason: &str) {
        *self.inner.lost.write() = Some(reason.to_string());
        log::warn!("Null device lost: {reason}");
        {
            let _suspended = self.inner.suspended.lock();
            self.inner.resumed.notify_all();
        }
        let fences: Vec<_> = self.inner.fences.lock().iter().filter_map(Weak::upgrade).collect();
        for fence in fences {
            fence.wake_all();
        }
    }

    /// Returns `true` once the device was lost.
    pub fn is_lost(&self) -> bool {
        self.inner.is_lost()
    }
}

#[derive(Debug)]
struct Descriptor {
    resource_id: ResourceId,
    settings: ViewSettings,
}

/// A shader-visible table of descriptor slots.
#[derive(Debug)]
pub struct NullDescriptorTable {
    kind: DescriptorHeapKind,
    slots: Mutex<Vec<Option<Descriptor>>>,
}

impl NullDescriptorTable {
    /// The heap kind the table backs.
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// Number of slots.
    pub fn capacity(&self) -> u32 {
        self.slots.lock().len() as u32
    }

    /// The resource written into a slot.
    pub fn resource_at(&self, slot: u32) -> Option<ResourceId> {
        self.slots
            .lock()
            .get(slot as usize)
            .and_then(|descriptor| descriptor.as_ref().map(|descriptor| descriptor.resource_id))
    }

    /// The view settings written into a slot.
    pub fn view_at(&self, slot: u32) -> Option<ViewSettings> {
        self.slots
            .lock()
            .get(slot as usize)
            .and_then(|descriptor| descriptor.as_ref().map(|descriptor| descriptor.settings))
    }

    /// Returns `true` if every slot of `slots` holds a descriptor.
    pub(super) fn is_written(&self, mut slots: Range<u32>) -> bool {
        let table = self.slots.lock();
        slots.all(|slot| matches!(table.get(slot as usize), Some(Some(_))))
    }
}

/// A heap of timestamp queries.
#[derive(Debug)]
pub struct NullQueryHeap {
    values: Mutex<Vec<Option<u64>>>,
}

impl NullQueryHeap {
    pub(super) fn write(&self, index: u32, ticks: u64) {
        if let Some(value) = self.values.lock().get_mut(index as usize) {
            *value = Some(ticks);
        }
    }
}

/// A buffer, texture or sampler backed by host memory.
#[derive(Debug)]
pub struct NullResource {
    id: ResourceId,
    name: String,
    kind: ResourceKind,
    reserved: u64,
    memory: Mutex<Vec<Vec<u8>>>,
    device: Weak<DeviceInner>,
}

impl NullResource {
    /// Identity assigned by the context.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer, texture or sampler.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Copy of the bytes of a sub-resource, whatever its storage mode.
    pub fn contents(&self, sub_resource: u32) -> Option<Vec<u8>> {
        self.memory.lock().get(sub_resource as usize).cloned()
    }

    pub(super) fn read(&self, sub_resource: u32, offset: u64, size: u64) -> RhiResult<Vec<u8>> {
        let memory = self.memory.lock();
        let bytes = memory
            .get(sub_resource as usize)
            .and_then(|bytes| bytes.get(byte_range(offset, size)?))
            .ok_or_else(|| self.out_of_bounds(sub_resource, offset, size))?;
        Ok(bytes.to_vec())
    }

    pub(super) fn write(&self, sub_resource: u32, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut memory = self.memory.lock();
        let size = data.len() as u64;
        let bytes = memory
            .get_mut(sub_resource as usize)
            .and_then(|bytes| bytes.get_mut(byte_range(offset, size)?))
            .ok_or_else(|| self.out_of_bounds(sub_resource, offset, size))?;
        bytes.copy_from_slice(data);
        Ok(())
    }

    fn out_of_bounds(&self, sub_resource: u32, offset: u64, size: u64) -> RhiError {
        BackendError::Native(format!(
            "access of {size} bytes at {offset} is outside sub-resource {sub_resource} of '{}'",
            self.name
        ))
        .into()
    }
}

impl Drop for NullResource {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.release_memory(self.reserved);
        }
    }
}

impl NativeDevice<NullBackend> for NullDevice {
    fn create_resource(
        &self,
        id: ResourceId,
        descriptor: &ResourceDescriptor,
        name: &str,
    ) -> RhiResult<NullResource> {
        self.inner.check_lost()?;
        let reserved = descriptor.reserved_size();
        let allocated = self.inner.allocated_bytes.fetch_add(reserved, Ordering::AcqRel) + reserved;
        if let Some(budget) = self.inner.settings.memory_budget {
            if allocated > budget {
                self.inner.release_memory(reserved);
                return Err(AllocationError::OutOfMemory {
                    resource: name.to_string(),
                    size: reserved,
                }
                .into());
            }
        }
        self.inner.peak_bytes.fetch_max(allocated, Ordering::AcqRel);

        let memory = match descriptor.kind() {
            ResourceKind::Sampler => Vec::new(),
            _ => (0..descriptor.sub_resource_count().raw_count())
                .map(|raw| vec![0u8; descriptor.sub_resource_size(raw) as usize])
                .collect(),
        };
        Ok(NullResource {
            id,
            name: name.to_string(),
            kind: descriptor.kind(),
            reserved,
            memory: Mutex::new(memory),
            device: Arc::downgrade(&self.inner),
        })
    }

    fn write_host_memory(
        &self,
        resource: &NullResource,
        sub_resource: u32,
        offset: u64,
        data: &[u8],
    ) -> RhiResult<()> {
        self.inner.check_lost()?;
        resource.write(sub_resource, offset, data)
    }

    fn read_host_memory(&self, resource: &NullResource, sub_resource: u32) -> RhiResult<Vec<u8>> {
        self.inner.check_lost()?;
        resource.contents(sub_resource).ok_or_else(|| resource.out_of_bounds(sub_resource, 0, 0))
    }

    fn create_descriptor_table(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> RhiResult<NullDescriptorTable> {
        self.inner.check_lost()?;
        log::debug!("Created {kind:?} descriptor table with {capacity} slots.");
        Ok(NullDescriptorTable {
            kind,
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
        })
    }

    fn write_descriptors(
        &self,
        table: &NullDescriptorTable,
        first_slot: u32,
        views: &[NativeView<'_, NullBackend>],
    ) -> RhiResult<()> {
        self.inner.check_lost()?;
        let mut slots = table.slots.lock();
        let end = first_slot as usize + views.len();
        if end > slots.len() {
            return Err(BackendError::Native(format!(
                "descriptor write of slots {first_slot}..{end} overflows a table of {}",
                slots.len()
            ))
            .into());
        }
        for (slot, view) in slots[first_slot as usize..end].iter_mut().zip(views) {
            if DescriptorHeapKind::for_resource(view.kind) != table.kind {
                return Err(BackendError::Native(format!(
                    "{:?} view of '{}' written into a {:?} table",
                    view.kind,
                    view.resource.name(),
                    table.kind
                ))
                .into());
            }
            *slot = Some(Descriptor {
                resource_id: view.resource_id,
                settings: view.settings,
            });
        }
        self.inner.stats.lock().descriptor_writes += views.len() as u64;
        Ok(())
    }

    fn create_queue(&self, list_type: CommandListType, name: &str) -> RhiResult<NullQueue> {
        self.inner.check_lost()?;
        NullQueue::spawn(Arc::clone(&self.inner), list_type, name)
    }

    fn create_fence(&self, name: &str) -> RhiResult<NullFence> {
        self.inner.check_lost()?;
        let fence = NullFence::new(name, Arc::clone(&self.inner));
        self.inner.fences.lock().push(fence.downgrade());
        Ok(fence)
    }

    fn create_query_heap(&self, count: u32, name: &str) -> RhiResult<NullQueryHeap> {
        self.inner.check_lost()?;
        if !self.inner.settings.timestamp_queries {
            return Err(RhiError::NotImplemented {
                feature: "timestamp queries".to_string(),
            });
        }
        log::debug!("Created query heap '{name}' with {count} queries.");
        Ok(NullQueryHeap {
            values: Mutex::new(vec![None; count as usize]),
        })
    }

    fn read_timestamps(&self, heap: &NullQueryHeap, range: Range<u32>) -> RhiResult<Vec<Option<u64>>> {
        self.inner.check_lost()?;
        let values = heap.values.lock();
        values
            .get(range.start as usize..range.end as usize)
            .map(<[Option<u64>]>::to_vec)
            .ok_or_else(|| {
                BackendError::Native(format!(
                    "queries {range:?} are outside a heap of {}",
                    values.len()
                ))
                .into()
            })
    }

    fn create_surface(
        &self,
        window: RawWindowHandle,
        _display: RawDisplayHandle,
        settings: &SurfaceSettings,
    ) -> RhiResult<NullSurface> {
        self.inner.check_lost()?;
        NullSurface::new(window, settings, Arc::clone(&self.inner))
    }

    fn check_status(&self) -> RhiResult<()> {
        self.inner.check_lost()
    }
}

fn byte_range(offset: u64, size: u64) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = usize::try_from(offset.checked_add(size)?).ok()?;
    Some(start..end)
}
