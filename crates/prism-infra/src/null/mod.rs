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

//! The `null` backend: a software device executing command streams on CPU
//! worker threads.

mod device;
mod fence;
mod queue;
mod surface;

pub use self::device::{NullDescriptorTable, NullDevice, NullDeviceStats, NullQueryHeap, NullResource};
pub use self::fence::NullFence;
pub use self::queue::NullQueue;
pub use self::surface::{HeadlessWindow, NullSurface};

use parking_lot::Mutex;
use prism_core::{
    AdapterInfo, Backend, DeviceType, NativeAdapter, NativeApi, RhiError, RhiResult,
    SystemSettings, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ticks per second of the null timestamp counter (nanoseconds).
pub const NULL_TIMESTAMP_FREQUENCY: u64 = 1_000_000_000;

/// Behavior of the devices a [`NullAdapter`] opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullDeviceSettings {
    /// Name reported by the adapter.
    pub adapter_name: String,
    /// Time every submission takes to execute, in microseconds.
    pub execution_latency_us: u64,
    /// Bytes of memory resources may reserve. `None` is unlimited.
    pub memory_budget: Option<u64>,
    /// Number of swap chain images. `None` uses the count requested by the context.
    pub surface_image_count: Option<u32>,
    /// Whether the device supports timestamp queries.
    pub timestamp_queries: bool,
}

impl Default for NullDeviceSettings {
    fn default() -> Self {
        Self {
            adapter_name: "Null Adapter".to_string(),
            execution_latency_us: 0,
            memory_budget: None,
            surface_image_count: None,
            timestamp_queries: true,
        }
    }
}

impl NullDeviceSettings {
    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> RhiResult<Self> {
        serde_json::from_str(json).map_err(|error| -> RhiError {
            ValidationError::InvalidSettings(error.to_string()).into()
        })
    }

    pub(crate) fn execution_latency(&self) -> Duration {
        Duration::from_micros(self.execution_latency_us)
    }
}

/// The software backend.
#[derive(Debug)]
pub struct NullBackend;

impl Backend for NullBackend {
    const NATIVE_API: NativeApi = NativeApi::Null;

    type Adapter = NullAdapter;
    type Device = NullDevice;
    type Queue = NullQueue;
    type Fence = NullFence;
    type Resource = NullResource;
    type DescriptorTable = NullDescriptorTable;
    type QueryHeap = NullQueryHeap;
    type Surface = NullSurface;

    fn enumerate_adapters(_settings: &SystemSettings) -> RhiResult<Vec<NullAdapter>> {
        Ok(vec![NullAdapter::new(NullDeviceSettings::default())])
    }
}

#[derive(Debug)]
struct AdapterShared {
    settings: Mutex<NullDeviceSettings>,
    last_device: Mutex<Option<NullDevice>>,
    opened_devices: AtomicU32,
}

/// The single adapter of the null backend.
///
/// Clones share their settings, so configuring the adapter of a
/// [`Device`](prism_core::Device) affects every device opened on it afterwards,
/// including the devices opened by a recovery.
#[derive(Debug, Clone)]
pub struct NullAdapter {
    shared: Arc<AdapterShared>,
}

impl NullAdapter {
    /// Creates an adapter opening devices with `settings`.
    pub fn new(settings: NullDeviceSettings) -> Self {
        Self {
            shared: Arc::new(AdapterShared {
                settings: Mutex::new(settings),
                last_device: Mutex::new(None),
                opened_devices: AtomicU32::new(0),
            }),
        }
    }

    /// Replaces the settings of devices opened from now on.
    pub fn configure(&self, settings: NullDeviceSettings) {
        *self.shared.settings.lock() = settings;
    }

    /// The settings of devices opened from now on.
    pub fn settings(&self) -> NullDeviceSettings {
        self.shared.settings.lock().clone()
    }

    /// The most recently opened device.
    pub fn last_device(&self) -> Option<NullDevice> {
        self.shared.last_device.lock().clone()
    }

    /// Number of devices opened so far.
    pub fn opened_devices(&self) -> u32 {
        self.shared.opened_devices.load(Ordering::Relaxed)
    }
}

impl NativeAdapter<NullBackend> for NullAdapter {
    fn info(&self) -> AdapterInfo {
        let settings = self.shared.settings.lock();
        AdapterInfo {
            name: settings.adapter_name.clone(),
            native_api: NativeApi::Null,
            device_type: DeviceType::Cpu,
            dedicated_memory: settings.memory_budget.unwrap_or(0),
            timestamp_frequency: NULL_TIMESTAMP_FREQUENCY,
        }
    }

    fn open_device(&self) -> RhiResult<NullDevice> {
        let device = NullDevice::new(self.settings());
        *self.shared.last_device.lock() = Some(device.clone());
        let opened = self.shared.opened_devices.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!("Opened null device #{opened}.");
        Ok(device)
    }
}
