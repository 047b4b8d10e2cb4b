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

//! The descriptor manager: every shader-visible heap of a context and the
//! weak registry of program bindings that allocate from them.

use super::{DescriptorHeap, DescriptorHeapKind, DescriptorRange};
use crate::rhi::api::{DescriptorHeapSettings, Fence, ProgramBindings};
use crate::rhi::error::{AllocationError, BackendError, RhiResult, ValidationError};
use crate::rhi::traits::{Backend, NativeDevice, NativeView};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Owns the descriptor heaps of a context.
///
/// Program bindings register themselves on creation through
/// [`add_program_bindings`](Self::add_program_bindings). The registry only
/// holds weak references and is swept by
/// [`complete_initialization`](Self::complete_initialization), which sizes the
/// heaps for every live binding set and writes their descriptors.
///
/// Ranges of dropped binding sets are not reused right away: they are retired
/// against the current value of every queue fence and handed out again once
/// the GPU passed all of them.
#[derive(Debug)]
pub struct DescriptorManager<B: Backend> {
    device: Arc<B::Device>,
    settings: DescriptorHeapSettings,
    heaps: Mutex<[DescriptorHeap<B>; 2]>,
    registry: Mutex<Vec<Weak<ProgramBindings<B>>>>,
    fences: Mutex<Vec<Weak<Fence<B>>>>,
    released: AtomicBool,
    initialized: AtomicBool,
    next_bindings_id: AtomicU64,
}

impl<B: Backend> DescriptorManager<B> {
    /// Creates the heaps. With deferred allocation no native table exists
    /// until the first allocation or `complete_initialization`.
    pub(crate) fn new(device: Arc<B::Device>, settings: DescriptorHeapSettings) -> RhiResult<Self> {
        let mut heaps = [
            DescriptorHeap::new(DescriptorHeapKind::ShaderResources),
            DescriptorHeap::new(DescriptorHeapKind::Samplers),
        ];
        if !settings.deferred_allocation {
            for heap in heaps.iter_mut() {
                let capacity = Self::initial_capacity(&settings, heap.kind);
                let table = device.create_descriptor_table(heap.kind, capacity)?;
                heap.install_table(table, capacity);
            }
        }
        Ok(Self {
            device,
            settings,
            heaps: Mutex::new(heaps),
            registry: Mutex::new(Vec::new()),
            fences: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            next_bindings_id: AtomicU64::new(1),
        })
    }

    fn initial_capacity(settings: &DescriptorHeapSettings, kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::ShaderResources => settings.shader_resources,
            DescriptorHeapKind::Samplers => settings.samplers,
        }
    }

    fn check_released(&self) -> Result<(), ValidationError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ValidationError::DescriptorHeapReleased);
        }
        Ok(())
    }

    /// Registers a binding set. Expired entries are only swept by
    /// [`complete_initialization`](Self::complete_initialization).
    pub fn add_program_bindings(&self, bindings: &Arc<ProgramBindings<B>>) {
        self.registry.lock().push(Arc::downgrade(bindings));
    }

    /// Number of registry entries, including expired ones not yet swept.
    pub fn registered_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Number of registered binding sets that are still alive.
    pub fn live_bindings_count(&self) -> usize {
        self.registry
            .lock()
            .iter()
            .filter(|bindings| bindings.strong_count() > 0)
            .count()
    }

    /// Sweeps the registry, sizes the heaps for every live binding set and
    /// writes all their descriptors into the native tables.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::DescriptorHeapReleased`] after [`release`](Self::release).
    /// * [`AllocationError::DescriptorHeapExhausted`] if a heap must grow but
    ///   growth is disabled.
    pub fn complete_initialization(&self) -> RhiResult<()> {
        self.check_released()?;
        let live: Vec<Arc<ProgramBindings<B>>> = {
            let mut registry = self.registry.lock();
            registry.retain(|bindings| bindings.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        self.reclaim_retired();

        let mut pending = [0u32; 2];
        for bindings in &live {
            for kind in DescriptorHeapKind::ALL {
                pending[kind.index()] += bindings.pending_descriptor_count(kind);
            }
        }

        {
            let mut heaps = self.heaps.lock();
            for heap in heaps.iter_mut() {
                let pending = pending[heap.kind.index()];
                let fits = heap.table.is_some() && heap.allocator.largest_free_range() >= pending;
                if fits {
                    continue;
                }
                if heap.table.is_some() && !self.settings.growable {
                    return Err(AllocationError::DescriptorHeapExhausted {
                        heap: heap.kind,
                        requested: pending,
                        capacity: heap.allocator.capacity(),
                    }
                    .into());
                }
                let required = heap.allocator.capacity() + pending;
                self.grow_heap(heap, required)?;
            }
        }

        for bindings in &live {
            bindings.ensure_descriptors()?;
        }
        self.initialized.store(true, Ordering::Release);
        log::info!(
            "Descriptor manager initialized for {} program bindings.",
            live.len()
        );
        Ok(())
    }

    /// Invalidates every heap. Any later allocation, descriptor write or
    /// apply fails with [`ValidationError::DescriptorHeapReleased`].
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        for heap in self.heaps.lock().iter_mut() {
            heap.clear();
        }
        self.registry.lock().clear();
        self.fences.lock().clear();
        log::info!("Descriptor heaps released.");
    }

    /// Returns `true` after [`release`](Self::release).
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns `true` once [`complete_initialization`](Self::complete_initialization) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Number of slots of a heap.
    pub fn capacity(&self, kind: DescriptorHeapKind) -> u32 {
        self.heaps.lock()[kind.index()].allocator.capacity()
    }

    /// Number of allocated slots of a heap, retired ranges included.
    pub fn used_count(&self, kind: DescriptorHeapKind) -> u32 {
        self.heaps.lock()[kind.index()].allocator.used_count()
    }

    /// Generation of a heap, bumped each time its native table is replaced.
    pub fn generation(&self, kind: DescriptorHeapKind) -> u64 {
        self.heaps.lock()[kind.index()].generation
    }

    /// Number of ranges waiting for the GPU before they can be reused.
    pub fn retired_count(&self, kind: DescriptorHeapKind) -> usize {
        self.heaps.lock()[kind.index()].retired_count()
    }

    /// Frees every retired range the GPU is done with, returning the number of slots freed.
    pub fn reclaim_retired(&self) -> u32 {
        let mut heaps = self.heaps.lock();
        heaps.iter_mut().map(|heap| heap.reclaim()).sum()
    }

    pub(crate) fn register_fence(&self, fence: &Arc<Fence<B>>) {
        let mut fences = self.fences.lock();
        fences.retain(|fence| fence.strong_count() > 0);
        fences.push(Arc::downgrade(fence));
    }

    pub(crate) fn next_bindings_id(&self) -> u64 {
        self.next_bindings_id.fetch_add(1, Ordering::Relaxed)
    }

    fn grow_heap(&self, heap: &mut DescriptorHeap<B>, required: u32) -> RhiResult<()> {
        let capacity = if heap.table.is_none() && self.settings.deferred_allocation {
            required
        } else {
            required
                .max(heap.allocator.capacity().saturating_mul(2))
                .max(Self::initial_capacity(&self.settings, heap.kind))
        };
        let table = self.device.create_descriptor_table(heap.kind, capacity)?;
        heap.install_table(table, capacity);
        Ok(())
    }

    /// Allocates a contiguous range, reclaiming retired ranges and growing the
    /// heap if needed.
    pub(crate) fn allocate(&self, kind: DescriptorHeapKind, count: u32) -> RhiResult<DescriptorRange> {
        self.check_released()?;
        if count == 0 {
            return Ok(DescriptorRange::default());
        }
        let mut heaps = self.heaps.lock();
        let heap = &mut heaps[kind.index()];
        if heap.table.is_none() {
            let required = heap.allocator.capacity() + count;
            self.grow_heap(heap, required)?;
        }
        if let Some(range) = heap.allocator.allocate(count) {
            return Ok(range);
        }
        if heap.reclaim() > 0 {
            if let Some(range) = heap.allocator.allocate(count) {
                return Ok(range);
            }
        }
        let exhausted = AllocationError::DescriptorHeapExhausted {
            heap: kind,
            requested: count,
            capacity: heap.allocator.capacity(),
        };
        if !self.settings.growable {
            return Err(exhausted.into());
        }
        let required = heap.allocator.capacity() + count;
        self.grow_heap(heap, required)?;
        heap.allocator.allocate(count).ok_or_else(|| exhausted.into())
    }

    /// Writes views into a range of the current table of a heap.
    ///
    /// Returns the table written to and its generation, so callers can tell
    /// when a later resize requires writing again.
    pub(crate) fn write(
        &self,
        kind: DescriptorHeapKind,
        range: DescriptorRange,
        views: &[NativeView<'_, B>],
    ) -> RhiResult<(Arc<B::DescriptorTable>, u64)> {
        self.check_released()?;
        let heaps = self.heaps.lock();
        let heap = &heaps[kind.index()];
        let table = heap.table.clone().ok_or_else(|| {
            BackendError::Native(format!("{kind:?} descriptor heap has no native table"))
        })?;
        if !views.is_empty() {
            self.device.write_descriptors(&table, range.offset, views)?;
        }
        Ok((table, heap.generation))
    }

    /// Retires a range against the current value of every queue fence.
    pub(crate) fn retire(&self, kind: DescriptorHeapKind, range: DescriptorRange) {
        if self.is_released() || range.is_empty() {
            return;
        }
        let fence_values: Vec<_> = {
            let fences = self.fences.lock();
            fences
                .iter()
                .filter_map(|weak| weak.upgrade().map(|fence| (Weak::clone(weak), fence.value())))
                .collect()
        };
        self.heaps.lock()[kind.index()].retire(range, fence_values);
        log::trace!("Retired {kind:?} descriptor range {range:?}.");
    }
}
