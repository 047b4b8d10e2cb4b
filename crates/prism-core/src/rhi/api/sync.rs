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

//! Timeline fences synchronizing the CPU with queues and queues with each other.

use crate::rhi::api::CommandQueue;
use crate::rhi::error::{BackendError, RhiResult, ValidationError};
use crate::rhi::traits::{Backend, FenceValue, NativeFence};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A monotonically increasing counter signaled by a queue.
///
/// Every execution on the owning queue enqueues the next value. Waits succeed
/// as soon as the value observed on the GPU is at least the awaited one, so
/// waiting on an old value returns immediately.
#[derive(Debug)]
pub struct Fence<B: Backend> {
    name: String,
    native: Arc<B::Fence>,
    value: AtomicU64,
    queue: Weak<CommandQueue<B>>,
}

impl<B: Backend> Fence<B> {
    pub(crate) fn new(name: String, native: B::Fence, queue: Weak<CommandQueue<B>>) -> Self {
        Self {
            name,
            native: Arc::new(native),
            value: AtomicU64::new(0),
            queue,
        }
    }

    /// Debug name of the fence.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The native fence.
    pub fn native(&self) -> &Arc<B::Fence> {
        &self.native
    }

    /// The last value enqueued for signaling.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// The last value the GPU signaled.
    pub fn completed_value(&self) -> u64 {
        self.native.completed_value()
    }

    /// Returns `true` once the GPU signaled `value` or a later one.
    pub fn is_completed(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Enqueues a signal of the next value on the owning queue, after all
    /// work submitted so far.
    ///
    /// # Returns
    ///
    /// The value that will be signaled.
    pub fn signal(&self) -> RhiResult<u64> {
        let queue = self
            .queue
            .upgrade()
            .ok_or_else(|| ValidationError::ContextReleased {
                context: self.name.clone(),
            })?;
        queue.signal_fence()
    }

    /// Blocks until everything enqueued so far has been signaled.
    pub fn wait_on_cpu(&self) -> RhiResult<()> {
        self.wait_for_value(self.value())
    }

    /// Like [`wait_on_cpu`](Self::wait_on_cpu) but gives up after `timeout`.
    ///
    /// # Returns
    ///
    /// `false` if the timeout elapsed first.
    pub fn wait_on_cpu_timeout(&self, timeout: Duration) -> RhiResult<bool> {
        self.wait_for_value_timeout(self.value(), timeout)
    }

    /// Blocks until the GPU signaled `value`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::DeviceLost`] if the device is lost while waiting.
    pub fn wait_for_value(&self, value: u64) -> RhiResult<()> {
        if self.is_completed(value) {
            return Ok(());
        }
        log::trace!("Waiting on CPU for fence '{}' value {value}.", self.name);
        if self.native.wait(value, None)? {
            Ok(())
        } else {
            Err(BackendError::Timeout {
                what: format!("fence '{}' value {value}", self.name),
            }
            .into())
        }
    }

    /// Blocks until the GPU signaled `value` or `timeout` elapsed.
    pub fn wait_for_value_timeout(&self, value: u64, timeout: Duration) -> RhiResult<bool> {
        if self.is_completed(value) {
            return Ok(true);
        }
        self.native.wait(value, Some(timeout))
    }

    /// Makes the next submission of `queue` wait on the GPU for everything
    /// enqueued on this fence so far. The CPU does not block.
    pub fn wait_on_gpu(&self, queue: &CommandQueue<B>) {
        queue.add_gpu_wait(self.native_value(self.value()));
    }

    pub(crate) fn native_value(&self, value: u64) -> FenceValue<B> {
        FenceValue {
            fence: Arc::clone(&self.native),
            value,
        }
    }

    /// Reserves the next value. Only called with the queue's submission lock held.
    pub(crate) fn next_value(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Gives back a value whose submission failed.
    pub(crate) fn cancel_value(&self, value: u64) {
        let _ = self
            .value
            .compare_exchange(value, value - 1, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// A fence value some piece of work completes at.
#[derive(Debug)]
pub struct FenceTicket<B: Backend> {
    /// The fence.
    pub fence: Arc<Fence<B>>,
    /// The value.
    pub value: u64,
}

impl<B: Backend> FenceTicket<B> {
    /// Returns `true` once the GPU reached the ticket.
    pub fn is_completed(&self) -> bool {
        self.fence.is_completed(self.value)
    }

    /// Blocks until the GPU reached the ticket.
    pub fn wait(&self) -> RhiResult<()> {
        self.fence.wait_for_value(self.value)
    }
}

impl<B: Backend> Clone for FenceTicket<B> {
    fn clone(&self) -> Self {
        Self {
            fence: Arc::clone(&self.fence),
            value: self.value,
        }
    }
}
