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

//! Timeline fences signaled by null queue workers.

use super::device::DeviceInner;
use parking_lot::{Condvar, Mutex};
use prism_core::{NativeFence, RhiResult};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(super) struct FenceShared {
    name: String,
    value: Mutex<u64>,
    signaled: Condvar,
    device: Arc<DeviceInner>,
}

impl FenceShared {
    /// Wakes every waiter so it can observe a device loss.
    pub(super) fn wake_all(&self) {
        let _value = self.value.lock();
        self.signaled.notify_all();
    }
}

/// A timeline fence.
#[derive(Debug)]
pub struct NullFence {
    shared: Arc<FenceShared>,
}

impl NullFence {
    pub(super) fn new(name: &str, device: Arc<DeviceInner>) -> Self {
        Self {
            shared: Arc::new(FenceShared {
                name: name.to_string(),
                value: Mutex::new(0),
                signaled: Condvar::new(),
                device,
            }),
        }
    }

    pub(super) fn downgrade(&self) -> Weak<FenceShared> {
        Arc::downgrade(&self.shared)
    }

    /// Raises the completed value. Values never go backwards.
    pub(super) fn signal(&self, value: u64) {
        let mut current = self.shared.value.lock();
        if value > *current {
            *current = value;
            log::trace!("Fence '{}' signaled {value}.", self.shared.name);
        }
        self.shared.signaled.notify_all();
    }
}

impl NativeFence for NullFence {
    fn completed_value(&self) -> u64 {
        *self.shared.value.lock()
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<bool> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut current = self.shared.value.lock();
        loop {
            if *current >= value {
                return Ok(true);
            }
            self.shared.device.check_lost()?;
            match deadline {
                None => self.shared.signaled.wait(&mut current),
                Some(deadline) => {
                    if self.shared.signaled.wait_until(&mut current, deadline).timed_out() {
                        return Ok(*current >= value);
                    }
                }
            }
        }
    }
}
