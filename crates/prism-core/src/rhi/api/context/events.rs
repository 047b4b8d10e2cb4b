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

//! Context lifecycle notifications.

use crate::rhi::api::FrameSize;
use parking_lot::Mutex;

/// Lifecycle milestones published by a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// `complete_initialization` succeeded.
    Initialized,
    /// The device was lost.
    DeviceLost {
        /// Reason reported by the backend.
        reason: String,
    },
    /// A new device was opened after a loss. Resources created before are stale.
    DeviceRecovered {
        /// Generation of the new device.
        generation: u64,
    },
    /// The frame buffers were resized.
    Resized(FrameSize),
    /// A frame was handed to the surface.
    FramePresented {
        /// Index of the presented frame buffer.
        frame_index: u32,
    },
    /// The context released its device.
    Released,
}

/// What [`Context::wait_for_gpu`](super::Context::wait_for_gpu) waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitFor {
    /// Every upload recorded so far.
    ResourcesUploaded,
    /// Everything submitted to the render queue.
    RenderComplete,
    /// Everything submitted to the compute queue.
    ComputeComplete,
    /// The previous presentation of the current frame buffer.
    FramePresented,
}

/// Fans context events out to every subscriber.
#[derive(Debug, Default)]
pub(crate) struct ContextEvents {
    subscribers: Mutex<Vec<flume::Sender<ContextEvent>>>,
}

impl ContextEvents {
    pub(crate) fn subscribe(&self) -> flume::Receiver<ContextEvent> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Sends `event` to every subscriber, forgetting the disconnected ones.
    pub(crate) fn publish(&self, event: ContextEvent) {
        log::trace!("Publishing context event {event:?}.");
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
