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

//! GPU timestamp queries.

use super::{Command, CommandList, CommandListCore, CommandListState, CommandQueue};
use crate::rhi::error::{AllocationError, RhiResult, ValidationError};
use crate::rhi::traits::{Backend, NativeDevice};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A pair of GPU timestamps read back from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTimeRange {
    /// Ticks at the beginning.
    pub begin: u64,
    /// Ticks at the end.
    pub end: u64,
    /// Ticks per second.
    pub frequency: u64,
}

impl GpuTimeRange {
    /// Time elapsed between the two timestamps.
    pub fn duration(&self) -> Duration {
        if self.frequency == 0 {
            return Duration::ZERO;
        }
        let ticks = u128::from(self.end.saturating_sub(self.begin));
        let nanos = ticks * 1_000_000_000 / u128::from(self.frequency);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Debug)]
struct FrameSlots {
    frame_index: u32,
    next: u32,
}

/// Timestamp slots for up to `max_per_frame` queries in each frame in flight.
///
/// Every query uses two consecutive slots of the native heap. Slots of a
/// frame are handed out again after [`begin_frame`](Self::begin_frame).
#[derive(Debug)]
pub struct TimestampQueryPool<B: Backend> {
    name: String,
    queue: Arc<CommandQueue<B>>,
    heap: Arc<B::QueryHeap>,
    frames_count: u32,
    max_per_frame: u32,
    frequency: u64,
    slots: Mutex<FrameSlots>,
}

impl<B: Backend> TimestampQueryPool<B> {
    pub(crate) fn new(
        queue: &Arc<CommandQueue<B>>,
        frames_count: u32,
        max_per_frame: u32,
        frequency: u64,
        name: impl Into<String>,
    ) -> RhiResult<Arc<Self>> {
        let name = name.into();
        let frames_count = frames_count.max(1);
        let heap = queue
            .device()
            .create_query_heap(frames_count * max_per_frame * 2, &name)?;
        log::debug!("Created timestamp query pool '{name}' ({max_per_frame} queries per frame).");
        Ok(Arc::new(Self {
            name,
            queue: Arc::clone(queue),
            heap: Arc::new(heap),
            frames_count,
            max_per_frame,
            frequency,
            slots: Mutex::new(FrameSlots {
                frame_index: 0,
                next: 0,
            }),
        }))
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue whose lists record the queries.
    pub fn queue(&self) -> &Arc<CommandQueue<B>> {
        &self.queue
    }

    /// Queries available per frame.
    pub fn max_per_frame(&self) -> u32 {
        self.max_per_frame
    }

    /// GPU ticks per second.
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Starts handing out the slots of `frame_index`.
    pub fn begin_frame(&self, frame_index: u32) -> RhiResult<()> {
        if frame_index >= self.frames_count {
            return Err(ValidationError::FrameIndexOutOfRange {
                index: frame_index,
                frames_count: self.frames_count,
            }
            .into());
        }
        *self.slots.lock() = FrameSlots { frame_index, next: 0 };
        Ok(())
    }

    /// Takes the next free query of the current frame.
    ///
    /// # Errors
    ///
    /// [`AllocationError::QueryPoolExhausted`] once `max_per_frame` queries
    /// were created since the last [`begin_frame`](Self::begin_frame).
    pub fn create_query(self: &Arc<Self>) -> RhiResult<TimestampQuery<B>> {
        let mut slots = self.slots.lock();
        if slots.next >= self.max_per_frame {
            return Err(AllocationError::QueryPoolExhausted {
                pool: self.name.clone(),
                capacity: self.max_per_frame,
            }
            .into());
        }
        let index = (slots.frame_index * self.max_per_frame + slots.next) * 2;
        slots.next += 1;
        Ok(TimestampQuery {
            pool: Arc::clone(self),
            index,
            recorded_by: Mutex::new(None),
        })
    }
}

/// A pair of timestamps written by command lists around some work.
#[derive(Debug)]
pub struct TimestampQuery<B: Backend> {
    pool: Arc<TimestampQueryPool<B>>,
    index: u32,
    recorded_by: Mutex<Option<Arc<CommandListCore<B>>>>,
}

impl<B: Backend> TimestampQuery<B> {
    /// Index of the first heap slot of the query.
    pub fn index(&self) -> u32 {
        self.index
    }

    fn write(&self, list: &dyn CommandList<B>, slot: u32) -> RhiResult<()> {
        let heap = Arc::clone(&self.pool.heap);
        list.core().record("write a timestamp", |recording| {
            recording.commands.push(Command::WriteTimestamp { heap, index: slot });
            Ok(())
        })
    }

    /// Records the first timestamp on `list`.
    pub fn begin(&self, list: &dyn CommandList<B>) -> RhiResult<()> {
        self.write(list, self.index)
    }

    /// Records the second timestamp on `list`. The query resolves once that
    /// list completed.
    pub fn end(&self, list: &dyn CommandList<B>) -> RhiResult<()> {
        self.write(list, self.index + 1)?;
        *self.recorded_by.lock() = Some(Arc::clone(list.core()));
        Ok(())
    }

    /// Reads both timestamps back.
    ///
    /// # Errors
    ///
    /// [`ValidationError::QueryNotResolved`] until the list that recorded
    /// [`end`](Self::end) completed on the GPU.
    pub fn resolve(&self) -> RhiResult<GpuTimeRange> {
        let not_resolved = || ValidationError::QueryNotResolved {
            pool: self.pool.name.clone(),
            index: self.index,
        };
        let completed = self
            .recorded_by
            .lock()
            .as_ref()
            .is_some_and(|list| list.state() == CommandListState::Completed);
        if !completed {
            return Err(not_resolved().into());
        }
        let ticks = self
            .pool
            .queue
            .device()
            .read_timestamps(&self.pool.heap, self.index..self.index + 2)?;
        match ticks.as_slice() {
            [Some(begin), Some(end)] => Ok(GpuTimeRange {
                begin: *begin,
                end: *end,
                frequency: self.pool.frequency,
            }),
            _ => Err(not_resolved().into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_duration() {
        let range = GpuTimeRange {
            begin: 1_000,
            end: 3_000,
            frequency: 1_000_000,
        };
        assert_eq!(range.duration(), Duration::from_millis(2));
    }

    #[test]
    fn test_time_range_without_frequency_is_zero() {
        let range = GpuTimeRange {
            begin: 5,
            end: 10,
            frequency: 0,
        };
        assert_eq!(range.duration(), Duration::ZERO);
    }
}
