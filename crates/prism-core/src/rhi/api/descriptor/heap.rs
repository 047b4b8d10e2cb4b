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

//! A single shader-visible descriptor heap.

use super::{DescriptorRange, RangeAllocator};
use crate::rhi::api::{Fence, ResourceKind};
use crate::rhi::traits::Backend;
use std::sync::{Arc, Weak};

/// The kinds of shader-visible descriptor heaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorHeapKind {
    /// Buffer and texture views.
    ShaderResources,
    /// Samplers.
    Samplers,
}

impl DescriptorHeapKind {
    /// Every heap kind.
    pub const ALL: [DescriptorHeapKind; 2] =
        [DescriptorHeapKind::ShaderResources, DescriptorHeapKind::Samplers];

    /// The heap holding descriptors of a resource kind.
    pub fn for_resource(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Sampler => DescriptorHeapKind::Samplers,
            ResourceKind::Buffer | ResourceKind::Texture => DescriptorHeapKind::ShaderResources,
        }
    }

    /// Position of the kind in per-heap arrays.
    pub fn index(self) -> usize {
        match self {
            DescriptorHeapKind::ShaderResources => 0,
            DescriptorHeapKind::Samplers => 1,
        }
    }
}

/// A range waiting for the GPU to stop using it.
#[derive(Debug)]
struct RetiredRange<B: Backend> {
    range: DescriptorRange,
    fence_values: Vec<(Weak<Fence<B>>, u64)>,
}

impl<B: Backend> RetiredRange<B> {
    fn is_reclaimable(&self) -> bool {
        self.fence_values.iter().all(|(fence, value)| {
            fence
                .upgrade()
                .is_none_or(|fence| fence.completed_value() >= *value)
        })
    }
}

/// Allocator, native table and retirement list of one heap kind.
#[derive(Debug)]
pub(crate) struct DescriptorHeap<B: Backend> {
    pub(crate) kind: DescriptorHeapKind,
    pub(crate) allocator: RangeAllocator,
    pub(crate) table: Option<Arc<B::DescriptorTable>>,
    pub(crate) generation: u64,
    retired: Vec<RetiredRange<B>>,
}

impl<B: Backend> DescriptorHeap<B> {
    pub(crate) fn new(kind: DescriptorHeapKind) -> Self {
        Self {
            kind,
            allocator: RangeAllocator::new(0),
            table: None,
            generation: 0,
            retired: Vec::new(),
        }
    }

    /// Installs a table of `capacity` slots, bumping the generation.
    pub(crate) fn install_table(&mut self, table: B::DescriptorTable, capacity: u32) {
        self.allocator.grow(capacity);
        self.table = Some(Arc::new(table));
        self.generation += 1;
        log::debug!(
            "{:?} descriptor heap resized to {} slots (generation {}).",
            self.kind,
            self.allocator.capacity(),
            self.generation
        );
    }

    pub(crate) fn retire(&mut self, range: DescriptorRange, fence_values: Vec<(Weak<Fence<B>>, u64)>) {
        if !range.is_empty() {
            self.retired.push(RetiredRange {
                range,
                fence_values,
            });
        }
    }

    /// Frees retired ranges whose fence values completed, returning how many slots came back.
    pub(crate) fn reclaim(&mut self) -> u32 {
        let mut reclaimed = 0;
        let allocator = &mut self.allocator;
        self.retired.retain(|retired| {
            if retired.is_reclaimable() {
                allocator.free(retired.range);
                reclaimed += retired.range.count;
                false
            } else {
                true
            }
        });
        reclaimed
    }

    pub(crate) fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub(crate) fn clear(&mut self) {
        self.table = None;
        self.retired.clear();
        self.allocator = RangeAllocator::new(0);
    }
}
