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

//! Adapter discovery and the device factory.

use super::{ComputeContext, RenderContext};
use crate::rhi::api::{
    AdapterInfo, ContextSettings, DeviceType, NativeApi, ParallelExecutor, RenderContextSettings,
    SystemSettings,
};
use crate::rhi::error::RhiResult;
use crate::rhi::traits::{Backend, NativeAdapter};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Entry point of the interface: enumerates the adapters of the backend.
#[derive(Debug)]
pub struct System<B: Backend> {
    settings: SystemSettings,
    devices: Vec<Arc<Device<B>>>,
}

impl<B: Backend> System<B> {
    /// Creates the system and enumerates its devices.
    pub fn new(settings: SystemSettings) -> RhiResult<Self> {
        let mut system = Self {
            settings,
            devices: Vec::new(),
        };
        system.update_devices()?;
        Ok(system)
    }

    /// The native API the backend was compiled for.
    pub fn native_api() -> NativeApi {
        B::NATIVE_API
    }

    /// The settings the system was created with.
    pub fn settings(&self) -> &SystemSettings {
        &self.settings
    }

    /// Enumerates the adapters again, applying the selection preferences.
    pub fn update_devices(&mut self) -> RhiResult<()> {
        let mut devices: Vec<_> = B::enumerate_adapters(&self.settings)?
            .into_iter()
            .map(Device::new)
            .filter(|device| self.settings.allow_software_adapters || !device.info.is_software())
            .collect();
        if self.settings.prefer_discrete_gpu {
            devices.sort_by_key(|device| device.info.device_type != DeviceType::DiscreteGpu);
        }
        for device in &devices {
            log::info!(
                "Found {:?} adapter '{}' ({}).",
                device.info.device_type,
                device.info.name,
                device.info.native_api
            );
        }
        self.devices = devices.into_iter().map(Arc::new).collect();
        Ok(())
    }

    /// Devices in order of preference.
    pub fn devices(&self) -> &[Arc<Device<B>>] {
        &self.devices
    }

    /// The preferred device.
    pub fn default_device(&self) -> Option<&Arc<Device<B>>> {
        self.devices.first()
    }
}

/// An adapter contexts can be opened on.
#[derive(Debug)]
pub struct Device<B: Backend> {
    adapter: B::Adapter,
    info: AdapterInfo,
}

impl<B: Backend> Device<B> {
    fn new(adapter: B::Adapter) -> Self {
        let info = adapter.info();
        Self { adapter, info }
    }

    /// Describes the adapter.
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }

    /// The native adapter.
    pub fn adapter(&self) -> &B::Adapter {
        &self.adapter
    }

    /// Opens a render context presenting into `window`.
    ///
    /// # Errors
    ///
    /// * [`BackendError::SurfaceCreation`](crate::rhi::error::BackendError::SurfaceCreation)
    ///   if the platform rejects the window.
    /// * [`ValidationError::InvalidSettings`](crate::rhi::error::ValidationError::InvalidSettings)
    ///   for out of range settings.
    pub fn create_render_context(
        &self,
        name: &str,
        window: &(impl HasWindowHandle + HasDisplayHandle),
        settings: RenderContextSettings,
        executor: Arc<ParallelExecutor>,
    ) -> RhiResult<RenderContext<B>> {
        RenderContext::new(name.to_string(), self.adapter.clone(), window, settings, executor)
    }

    /// Opens a compute context.
    pub fn create_compute_context(
        &self,
        name: &str,
        executor: Arc<ParallelExecutor>,
        settings: ContextSettings,
    ) -> RhiResult<ComputeContext<B>> {
        ComputeContext::new(name.to_string(), self.adapter.clone(), settings, executor)
    }
}
