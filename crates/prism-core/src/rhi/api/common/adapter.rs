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

//! Adapter and native API information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The native graphics API a backend dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NativeApi {
    /// Microsoft's DirectX 12 API.
    DirectX12,
    /// Apple's Metal API.
    Metal,
    /// Vulkan API.
    Vulkan,
    /// The CPU-executed software backend.
    Null,
    /// An unknown or unsupported backend.
    #[default]
    Unknown,
}

impl fmt::Display for NativeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeApi::DirectX12 => "DirectX 12",
            NativeApi::Metal => "Metal",
            NativeApi::Vulkan => "Vulkan",
            NativeApi::Null => "Null",
            NativeApi::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// The physical type of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceType {
    /// A GPU integrated into the CPU.
    IntegratedGpu,
    /// A discrete, dedicated GPU.
    DiscreteGpu,
    /// A virtualized or software-based GPU.
    VirtualGpu,
    /// A CPU emulating a GPU.
    Cpu,
    /// An unknown device type.
    #[default]
    Unknown,
}

/// Provides standardized, backend-agnostic information about a graphics adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdapterInfo {
    /// The name of the adapter.
    pub name: String,
    /// The graphics API backend this adapter is associated with.
    pub native_api: NativeApi,
    /// The physical type of the adapter.
    pub device_type: DeviceType,
    /// Bytes of device memory the adapter reports.
    pub dedicated_memory: u64,
    /// Ticks per second of the GPU timestamp counter.
    pub timestamp_frequency: u64,
}

impl AdapterInfo {
    /// Returns `true` for adapters implemented in software.
    pub fn is_software(&self) -> bool {
        matches!(self.device_type, DeviceType::Cpu | DeviceType::VirtualGpu)
    }
}
