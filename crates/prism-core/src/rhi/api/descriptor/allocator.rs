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

//! First-fit allocation of contiguous descriptor ranges.

/// A contiguous run of descriptor slots inside one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DescriptorRange {
    /// First slot of the range.
    pub offset: u32,
    /// Number of slots.
    pub count: u32,
}

impl DescriptorRange {
    /// Creates a range.
    pub const fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// One past the last slot.
    pub fn end(&self) -> u32 {
        self.offset + self.count
    }

    /// Returns `true` if the range has no slots.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` if both ranges share at least one slot.
    pub fn overlaps(&self, other: &DescriptorRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Hands out non-overlapping ranges of a fixed capacity.
///
/// Free space is kept as a list of ranges sorted by offset. Allocation takes
/// the first free range large enough; freeing merges the range with its free
/// neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeAllocator {
    capacity: u32,
    free: Vec<DescriptorRange>,
}

impl RangeAllocator {
    /// Creates an allocator whose whole capacity is free.
    pub fn new(capacity: u32) -> Self {
        let free = if capacity > 0 {
            vec![DescriptorRange::new(0, capacity)]
        } else {
            Vec::new()
        };
        Self { capacity, free }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of free slots.
    pub fn free_count(&self) -> u32 {
        self.free.iter().map(|range| range.count).sum()
    }

    /// Number of allocated slots.
    pub fn used_count(&self) -> u32 {
        self.capacity - self.free_count()
    }

    /// Size of the largest range that can currently be allocated.
    pub fn largest_free_range(&self) -> u32 {
        self.free.iter().map(|range| range.count).max().unwrap_or(0)
    }

    /// Allocates `count` contiguous slots, or returns `None` if no free range fits.
    pub fn allocate(&mut self, count: u32) -> Option<DescriptorRange> {
        if count == 0 {
            return Some(DescriptorRange::default());
        }
        let position = self.free.iter().position(|range| range.count >= count)?;
        let free = &mut self.free[position];
        let allocated = DescriptorRange::new(free.offset, count);
        if free.count == count {
            self.free.remove(position);
        } else {
            free.offset += count;
            free.count -= count;
        }
        Some(allocated)
    }

    /// Returns a range to the free list.
    ///
    /// The range must have been returned by [`allocate`](Self::allocate) and
    /// not freed since.
    pub fn free(&mut self, range: DescriptorRange) {
        if range.is_empty() {
            return;
        }
        debug_assert!(range.end() <= self.capacity);
        debug_assert!(self.free.iter().all(|free| !free.overlaps(&range)));

        let position = self.free.partition_point(|free| free.offset < range.offset);
        self.free.insert(position, range);

        if position + 1 < self.free.len() && self.free[position].end() == self.free[position + 1].offset {
            self.free[position].count += self.free[position + 1].count;
            self.free.remove(position + 1);
        }
        if position > 0 && self.free[position - 1].end() == self.free[position].offset {
            self.free[position - 1].count += self.free[position].count;
            self.free.remove(position);
        }
    }

    /// Extends the capacity, keeping every allocated range where it is.
    pub fn grow(&mut self, capacity: u32) {
        if capacity <= self.capacity {
            return;
        }
        let added = DescriptorRange::new(self.capacity, capacity - self.capacity);
        self.capacity = capacity;
        self.free(added);
    }

    /// Frees everything.
    pub fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_fit_and_coalescing() {
        let mut allocator = RangeAllocator::new(10);
        let a = allocator.allocate(3).unwrap();
        let b = allocator.allocate(3).unwrap();
        let c = allocator.allocate(3).unwrap();
        assert_eq!((a.offset, b.offset, c.offset), (0, 3, 6));
        assert!(allocator.allocate(2).is_none());

        allocator.free(a);
        allocator.free(c);
        assert_eq!(allocator.largest_free_range(), 4);

        allocator.free(b);
        assert_eq!(allocator.largest_free_range(), 10);
        assert_eq!(allocator.used_count(), 0);
    }

    #[test]
    fn test_first_fit_reuses_earliest_hole() {
        let mut allocator = RangeAllocator::new(8);
        let a = allocator.allocate(2).unwrap();
        let _b = allocator.allocate(2).unwrap();
        allocator.free(a);
        assert_eq!(allocator.allocate(1), Some(DescriptorRange::new(0, 1)));
    }

    #[test]
    fn test_grow_keeps_ranges_and_merges_tail() {
        let mut allocator = RangeAllocator::new(4);
        let a = allocator.allocate(3).unwrap();
        allocator.grow(8);
        assert_eq!(allocator.capacity(), 8);
        assert_eq!(allocator.largest_free_range(), 5);
        assert_eq!(allocator.allocate(5), Some(DescriptorRange::new(3, 5)));
        allocator.free(a);
        assert_eq!(allocator.free_count(), 3);
    }

    #[test]
    fn test_zero_capacity_allocates_nothing() {
        let mut allocator = RangeAllocator::new(0);
        assert!(allocator.allocate(1).is_none());
        assert_eq!(allocator.allocate(0), Some(DescriptorRange::default()));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate(u32),
        Free(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..16).prop_map(Op::Allocate),
            (0usize..64).prop_map(Op::Free),
        ]
    }

    proptest! {
        #[test]
        fn prop_live_ranges_never_overlap(ops in proptest::collection::vec(op(), 1..200)) {
            let mut allocator = RangeAllocator::new(128);
            let mut live: Vec<DescriptorRange> = Vec::new();
            for op in ops {
                match op {
                    Op::Allocate(count) => {
                        if let Some(range) = allocator.allocate(count) {
                            prop_assert!(range.end() <= allocator.capacity());
                            for other in &live {
                                prop_assert!(!range.overlaps(other), "{range:?} overlaps {other:?}");
                            }
                            live.push(range);
                        } else {
                            prop_assert!(allocator.largest_free_range() < count);
                        }
                    }
                    Op::Free(index) => {
                        if !live.is_empty() {
                            let range = live.swap_remove(index % live.len());
                            allocator.free(range);
                        }
                    }
                }
                let used: u32 = live.iter().map(|range| range.count).sum();
                prop_assert_eq!(allocator.used_count(), used);
            }
        }
    }
}
