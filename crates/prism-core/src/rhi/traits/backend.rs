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

//! The capability set a native graphics API has to provide.
//!
//! A backend is a zero-sized type implementing [`Backend`]; its associated
//! types name the native objects it creates. Every core object is generic over
//! the backend, so dispatch is resolved at compile time.

use crate::rhi::api::{
    AdapterInfo, CommandListType, CommandStream, DescriptorHeapKind, FrameSize, NativeApi,
    PixelFormat, ResourceDescriptor, ResourceId, ResourceKind, SystemSettings, ViewSettings,
};
use crate::rhi::error::RhiResult;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// A native graphics API.
pub trait Backend: Debug + Send + Sync + Sized + 'static {
    /// The API this backend dispatches to.
    const NATIVE_API: NativeApi;

    /// A physical adapter that can open devices.
    type Adapter: NativeAdapter<Self>;
    /// An opened logical device.
    type Device: NativeDevice<Self>;
    /// A submission queue.
    type Queue: NativeQueue<Self>;
    /// A timeline fence.
    type Fence: NativeFence;
    /// A buffer, texture or sampler object.
    type Resource: Debug + Send + Sync + 'static;
    /// A shader-visible descriptor table backing one descriptor heap.
    type DescriptorTable: Debug + Send + Sync + 'static;
    /// A heap of timestamp queries.
    type QueryHeap: Debug + Send + Sync + 'static;
    /// A presentable surface with its swap chain.
    type Surface: NativeSurface;

    /// Lists the adapters available on this machine.
    ///
    /// ## Errors
    /// * `BackendError` - If the native API cannot be initialized.
    fn enumerate_adapters(settings: &SystemSettings) -> RhiResult<Vec<Self::Adapter>>;
}

/// A physical adapter.
pub trait NativeAdapter<B: Backend>: Debug + Clone + Send + Sync + 'static {
    /// Describes the adapter.
    fn info(&self) -> AdapterInfo;

    /// Opens a logical device on the adapter.
    ///
    /// Opening the same adapter again after a device loss yields a fresh device.
    /// ## Errors
    /// * `BackendError` - If the device cannot be created.
    fn open_device(&self) -> RhiResult<B::Device>;
}

/// A view of a resource written into a descriptor slot.
#[derive(Debug)]
pub struct NativeView<'a, B: Backend> {
    /// The native object.
    pub resource: &'a B::Resource,
    /// Identity of the resource in its context.
    pub resource_id: ResourceId,
    /// The kind of the resource.
    pub kind: ResourceKind,
    /// The part of the resource the view covers.
    pub settings: ViewSettings,
}

/// Creation settings of a native surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSettings {
    /// Size of the swap chain images.
    pub frame_size: FrameSize,
    /// Number of swap chain images.
    pub image_count: u32,
    /// Pixel format of the swap chain images.
    pub format: PixelFormat,
    /// Synchronize presentation with the display refresh.
    pub vsync_enabled: bool,
}

/// An opened logical device.
pub trait NativeDevice<B: Backend>: Debug + Send + Sync + 'static {
    /// Creates a buffer, texture or sampler.
    /// ## Arguments
    /// * `id` - Identity assigned by the context.
    /// * `descriptor` - What to create.
    /// * `name` - Debug name.
    /// ## Errors
    /// * `AllocationError::OutOfMemory` - If the memory cannot be allocated.
    fn create_resource(
        &self,
        id: ResourceId,
        descriptor: &ResourceDescriptor,
        name: &str,
    ) -> RhiResult<B::Resource>;

    /// Writes bytes into host-visible memory of a sub-resource.
    fn write_host_memory(
        &self,
        resource: &B::Resource,
        sub_resource: u32,
        offset: u64,
        data: &[u8],
    ) -> RhiResult<()>;

    /// Reads back the whole content of a host-visible sub-resource.
    fn read_host_memory(&self, resource: &B::Resource, sub_resource: u32) -> RhiResult<Vec<u8>>;

    /// Creates a shader-visible descriptor table with `capacity` slots.
    fn create_descriptor_table(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> RhiResult<B::DescriptorTable>;

    /// Writes consecutive descriptors starting at `first_slot`.
    fn write_descriptors(
        &self,
        table: &B::DescriptorTable,
        first_slot: u32,
        views: &[NativeView<'_, B>],
    ) -> RhiResult<()>;

    /// Creates a submission queue for lists of `list_type`.
    fn create_queue(&self, list_type: CommandListType, name: &str) -> RhiResult<B::Queue>;

    /// Creates a timeline fence starting at zero.
    fn create_fence(&self, name: &str) -> RhiResult<B::Fence>;

    /// Creates a heap of `count` timestamp queries.
    fn create_query_heap(&self, count: u32, name: &str) -> RhiResult<B::QueryHeap>;

    /// Reads resolved GPU ticks of a range of timestamp queries. Unwritten
    /// queries read as `None`.
    fn read_timestamps(&self, heap: &B::QueryHeap, range: Range<u32>) -> RhiResult<Vec<Option<u64>>>;

    /// Creates a presentable surface for a platform window.
    /// ## Errors
    /// * `BackendError::SurfaceCreation` - If the platform rejects the window.
    fn create_surface(
        &self,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        settings: &SurfaceSettings,
    ) -> RhiResult<B::Surface>;

    /// Reports whether the device is still usable.
    /// ## Errors
    /// * `BackendError::DeviceLost` - Once the device has been removed or reset.
    fn check_status(&self) -> RhiResult<()>;
}

/// A fence value a submission waits for or signals.
#[derive(Debug)]
pub struct FenceValue<B: Backend> {
    /// The native fence.
    pub fence: Arc<B::Fence>,
    /// The value.
    pub value: u64,
}

impl<B: Backend> Clone for FenceValue<B> {
    fn clone(&self) -> Self {
        Self {
            fence: Arc::clone(&self.fence),
            value: self.value,
        }
    }
}

/// One batch of work handed to a native queue.
#[derive(Debug)]
pub struct Submission<B: Backend> {
    /// Debug label of the batch.
    pub label: String,
    /// Committed command streams, executed in order.
    pub streams: Vec<Arc<CommandStream<B>>>,
    /// Fence values the GPU waits for before executing the streams.
    pub waits: Vec<FenceValue<B>>,
    /// Fence value signaled once every stream has executed.
    pub signal: FenceValue<B>,
}

/// A submission queue.
pub trait NativeQueue<B: Backend>: Debug + Send + Sync + 'static {
    /// Hands a batch to the GPU. Batches execute in submission order.
    /// ## Errors
    /// * `BackendError::DeviceLost` - If the device is gone.
    fn submit(&self, submission: Submission<B>) -> RhiResult<()>;
}

/// A timeline fence.
pub trait NativeFence: Debug + Send + Sync + 'static {
    /// The last value the GPU signaled.
    fn completed_value(&self) -> u64;

    /// Blocks until the completed value reaches `value` or `timeout` elapses.
    ///
    /// ## Returns
    /// `true` once the value was reached, `false` on timeout.
    /// ## Errors
    /// * `BackendError::DeviceLost` - If the device is lost while waiting.
    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<bool>;
}

/// A presentable surface with its swap chain.
pub trait NativeSurface: Debug + Send + Sync + 'static {
    /// Number of swap chain images.
    fn image_count(&self) -> u32;

    /// Acquires the next image to render into.
    /// ## Errors
    /// * `BackendError::SurfaceOutOfDate` - If the swap chain must be recreated first.
    fn acquire_next_image(&self) -> RhiResult<u32>;

    /// Queues an image for presentation.
    fn present(&self, image_index: u32) -> RhiResult<()>;

    /// Recreates the swap chain for a new frame size.
    fn resize(&self, frame_size: FrameSize) -> RhiResult<()>;
}
