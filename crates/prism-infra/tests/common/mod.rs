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


//! Helpers shared by the integration tests: logging and contexts opened on
//! the null backend.

#![allow(dead_code)]

use prism_core::{
    ComputeContext, ContextSettings, Device, ParallelExecutor, RenderContext,
    RenderContextSettings, System, SystemSettings,
};
use prism_infra::null::{HeadlessWindow, NullAdapter, NullBackend, NullDeviceSettings};
use std::sync::Arc;

pub type Backend = NullBackend;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn executor() -> Arc<ParallelExecutor> {
    Arc::new(ParallelExecutor::new("test", 2).expect("executor"))
}

/// The default device of a fresh system, with its adapter configured.
pub fn device(settings: NullDeviceSettings) -> Arc<Device<Backend>> {
    init_logging();
    let system = System::<Backend>::new(SystemSettings::default()).expect("system");
    let device = Arc::clone(system.default_device().expect("null adapter"));
    let adapter: &NullAdapter = device.adapter();
    adapter.configure(settings);
    device
}

pub fn compute_context_with(
    settings: ContextSettings,
    device_settings: NullDeviceSettings,
) -> ComputeContext<Backend> {
    device(device_settings)
        .create_compute_context("compute", executor(), settings)
        .expect("compute context")
}

pub fn compute_context() -> ComputeContext<Backend> {
    compute_context_with(ContextSettings::default(), NullDeviceSettings::default())
}

pub fn render_context_with(
    settings: RenderContextSettings,
    device_settings: NullDeviceSettings,
) -> RenderContext<Backend> {
    let window = HeadlessWindow::new(1);
    device(device_settings)
        .create_render_context("render", &window, settings, executor())
        .expect("render context")
}

pub fn render_context() -> RenderContext<Backend> {
    render_context_with(RenderContextSettings::default(), NullDeviceSettings::default())
}
