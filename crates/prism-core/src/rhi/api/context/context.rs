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

//! The backend-agnostic context: the factory of resources, programs, queues
//! and command kits of one device.

use super::{ContextCore, ContextEvent, ContextType, DeviceState, WaitFor};
use crate::rhi::api::{
    AdapterInfo, BufferSettings, CommandKit, CommandListType, CommandQueue, ContextSettings,
    DescriptorManager, ObjectRegistry, ParallelExecutor, Program, ProgramId, ProgramSettings,
    RenderPass, RenderPassSettings, RenderPattern, RenderPatternSettings, Resource,
    ResourceDescriptor, ResourceId, SamplerSettings, TextureSettings, TimestampQueryPool,
};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::{Backend, NativeAdapter, NativeDevice};
use std::sync::Arc;

/// A device opened for rendering or compute work.
///
/// Contexts are created through [`Device`](super::Device). Every object they
/// create refers to the device generation it was created on; after
/// [`recover_device`](Self::recover_device) those objects are stale and have
/// to be created again.
#[derive(Debug)]
pub struct Context<B: Backend> {
    core: Arc<ContextCore<B>>,
}

impl<B: Backend> Context<B> {
    pub(crate) fn new(
        name: String,
        context_type: ContextType,
        adapter: B::Adapter,
        settings: ContextSettings,
        executor: Arc<ParallelExecutor>,
    ) -> RhiResult<Self> {
        Ok(Self {
            core: ContextCore::new(name, context_type, adapter, settings, executor)?,
        })
    }

    pub(crate) fn core(&self) -> &Arc<ContextCore<B>> {
        &self.core
    }

    pub(crate) fn state(&self) -> RhiResult<Arc<DeviceState<B>>> {
        self.core.state()
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Render or compute.
    pub fn context_type(&self) -> ContextType {
        self.core.context_type
    }

    /// The settings the context was created with.
    pub fn settings(&self) -> &ContextSettings {
        &self.core.settings
    }

    /// Number of frames in flight.
    pub fn frames_count(&self) -> u32 {
        self.core.settings.frames_count
    }

    /// The adapter the device was opened on.
    pub fn adapter_info(&self) -> AdapterInfo {
        self.core.adapter.info()
    }

    /// Generation of the current device.
    pub fn device_generation(&self) -> u64 {
        self.core.device_generation()
    }

    /// The native device.
    pub fn native_device(&self) -> RhiResult<Arc<B::Device>> {
        Ok(Arc::clone(&self.state()?.native))
    }

    /// The descriptor manager of the current device.
    pub fn descriptor_manager(&self) -> RhiResult<Arc<DescriptorManager<B>>> {
        Ok(Arc::clone(&self.state()?.descriptor_manager))
    }

    /// Named objects shared through the context.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.core.registry
    }

    /// The worker pool used for parallel recording.
    pub fn executor(&self) -> &Arc<ParallelExecutor> {
        &self.core.executor
    }

    /// Returns `true` until [`release`](Self::release).
    pub fn is_alive(&self) -> bool {
        self.core.device.read().is_some()
    }

    /// Receives every [`ContextEvent`] published from now on.
    pub fn subscribe(&self) -> flume::Receiver<ContextEvent> {
        self.core.events.subscribe()
    }

    pub(crate) fn publish(&self, event: ContextEvent) {
        self.core.events.publish(event);
    }

    fn create_resource(&self, name: &str, descriptor: ResourceDescriptor) -> RhiResult<Arc<Resource<B>>> {
        descriptor.validate().map_err(|reason| {
            ValidationError::InvalidSettings(format!("resource '{name}': {reason}"))
        })?;
        let state = self.state()?;
        let id = ResourceId(self.core.next_resource_id());
        let native = self
            .core
            .observe(state.native.create_resource(id, &descriptor, name))?;
        Ok(Arc::new(Resource::new(
            id,
            name.to_string(),
            descriptor,
            native,
            Arc::clone(&state.native),
            state.generation,
            Arc::downgrade(&self.core),
        )))
    }

    /// Creates a buffer.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::InvalidSettings`] for empty buffers.
    /// * [`AllocationError::OutOfMemory`](crate::rhi::error::AllocationError::OutOfMemory)
    ///   if the device cannot hold it.
    pub fn create_buffer(&self, name: &str, settings: BufferSettings) -> RhiResult<Arc<Resource<B>>> {
        self.create_resource(name, ResourceDescriptor::Buffer(settings))
    }

    /// Creates a texture.
    pub fn create_texture(&self, name: &str, settings: TextureSettings) -> RhiResult<Arc<Resource<B>>> {
        self.create_resource(name, ResourceDescriptor::Texture(settings))
    }

    /// Creates a sampler.
    pub fn create_sampler(&self, name: &str, settings: SamplerSettings) -> RhiResult<Arc<Resource<B>>> {
        self.create_resource(name, ResourceDescriptor::Sampler(settings))
    }

    /// Creates a program whose bindings allocate from this context's descriptor heaps.
    pub fn create_program(&self, name: &str, settings: ProgramSettings) -> RhiResult<Arc<Program<B>>> {
        let state = self.state()?;
        Program::new(
            ProgramId(self.core.next_program_id()),
            name.to_string(),
            settings,
            self.frames_count(),
            Arc::clone(&state.descriptor_manager),
        )
    }

    /// Creates a new queue. Queues created this way are not default queues.
    pub fn create_command_queue(&self, list_type: CommandListType, name: &str) -> RhiResult<Arc<CommandQueue<B>>> {
        let state = self.state()?;
        let queue = CommandQueue::new(&state.native, list_type, name, &state.descriptor_manager);
        self.core.observe(queue)
    }

    /// The default queue of a list type, created on first use. Parallel
    /// render lists share the render queue.
    pub fn default_command_queue(&self, list_type: CommandListType) -> RhiResult<Arc<CommandQueue<B>>> {
        let list_type = list_type.queue_type();
        let state = self.state()?;
        let mut queues = state.queues.lock();
        if let Some(queue) = queues.get(&list_type) {
            return Ok(Arc::clone(queue));
        }
        let name = format!("{} {list_type:?} queue", self.core.name);
        let queue = self.core.observe(CommandQueue::new(
            &state.native,
            list_type,
            name,
            &state.descriptor_manager,
        ))?;
        queues.insert(list_type, Arc::clone(&queue));
        Ok(queue)
    }

    /// Creates a command kit over `queue`.
    pub fn create_command_kit(&self, queue: &Arc<CommandQueue<B>>) -> Arc<CommandKit<B>> {
        CommandKit::new(queue, format!("{} kit", queue.name()))
    }

    /// Creates a command kit over a new queue of `list_type`.
    pub fn create_command_kit_for_type(&self, list_type: CommandListType) -> RhiResult<Arc<CommandKit<B>>> {
        let queue = self.create_command_queue(list_type, &format!("{} {list_type:?} queue", self.core.name))?;
        Ok(self.create_command_kit(&queue))
    }

    /// The kit over the default queue of a list type.
    pub fn default_command_kit(&self, list_type: CommandListType) -> RhiResult<Arc<CommandKit<B>>> {
        let list_type = list_type.queue_type();
        let queue = self.default_command_queue(list_type)?;
        let state = self.state()?;
        let mut kits = state.kits.lock();
        let kit = kits
            .entry(list_type)
            .or_insert_with(|| CommandKit::new(&queue, format!("{} {list_type:?} kit", self.core.name)));
        Ok(Arc::clone(kit))
    }

    /// Creates a render pattern.
    pub fn create_render_pattern(&self, name: &str, settings: RenderPatternSettings) -> RhiResult<Arc<RenderPattern>> {
        Ok(RenderPattern::new(name, settings)?)
    }

    /// Creates a render pass of `pattern` drawing into the given attachments.
    pub fn create_render_pass(
        &self,
        name: &str,
        pattern: &Arc<RenderPattern>,
        settings: RenderPassSettings<B>,
    ) -> RhiResult<Arc<RenderPass<B>>> {
        for view in settings.color_attachments.iter().chain(&settings.depth_attachment) {
            view.resource().check_device_generation()?;
        }
        Ok(RenderPass::new(name, pattern, settings)?)
    }

    /// Creates a pool of `max_per_frame` timestamp queries per frame in flight.
    pub fn create_timestamp_query_pool(
        &self,
        queue: &Arc<CommandQueue<B>>,
        max_per_frame: u32,
    ) -> RhiResult<Arc<TimestampQueryPool<B>>> {
        TimestampQueryPool::new(
            queue,
            self.frames_count(),
            max_per_frame,
            self.adapter_info().timestamp_frequency,
            format!("{} timestamps", queue.name()),
        )
    }

    /// Submits the uploads recorded on every queue.
    pub fn upload_resources(&self) -> RhiResult<()> {
        let state = self.state()?;
        for queue in state.queues() {
            self.core.observe(queue.flush_uploads())?;
        }
        Ok(())
    }

    /// Uploads pending resource data and writes the descriptors of every
    /// registered binding set. Waits for the uploads when the settings ask for it.
    pub fn complete_initialization(&self) -> RhiResult<()> {
        self.upload_resources()?;
        self.descriptor_manager()?.complete_initialization()?;
        if self.core.settings.wait_for_uploads_on_initialization {
            self.wait_for_gpu(WaitFor::ResourcesUploaded)?;
        }
        log::info!("Context '{}' completed initialization.", self.core.name);
        self.publish(ContextEvent::Initialized);
        Ok(())
    }

    /// Blocks until the GPU reached the given point.
    pub fn wait_for_gpu(&self, wait_for: WaitFor) -> RhiResult<()> {
        let state = self.state()?;
        let result = match wait_for {
            WaitFor::ResourcesUploaded => state.queues().iter().try_for_each(|queue| {
                if let Some(value) = queue.flush_uploads()? {
                    queue.fence().wait_for_value(value)?;
                }
                Ok(())
            }),
            WaitFor::RenderComplete => Self::wait_queues(&state, CommandListType::Render),
            WaitFor::ComputeComplete => Self::wait_queues(&state, CommandListType::Compute),
            WaitFor::FramePresented => Self::wait_queues(&state, CommandListType::Render),
        };
        self.core.observe(result)
    }

    fn wait_queues(state: &DeviceState<B>, list_type: CommandListType) -> RhiResult<()> {
        state
            .queues()
            .iter()
            .filter(|queue| queue.list_type() == list_type)
            .try_for_each(|queue| queue.wait_idle())
    }

    /// Waits for every queue, then releases the descriptor heaps, queues and
    /// kits. Later calls fail with [`ValidationError::ContextReleased`].
    pub fn release(&self) -> RhiResult<()> {
        let Some(state) = self.core.device.read().clone() else {
            return Ok(());
        };
        for queue in state.queues() {
            if let Err(error) = queue.wait_idle() {
                log::warn!("Queue '{}' did not drain before release: {error}", queue.name());
            }
        }
        self.core.release_device();
        self.core.registry.clear();
        log::info!("Context '{}' released.", self.core.name);
        self.publish(ContextEvent::Released);
        Ok(())
    }

    /// Replaces a lost device with a newly opened one.
    ///
    /// The descriptor manager is released and the queues are dropped without
    /// waiting on the GPU, then the adapter is opened again and the device
    /// generation bumped. Every resource, program and list created before is
    /// stale afterwards.
    pub fn recover_device(&self) -> RhiResult<u64> {
        log::warn!("Recovering device of context '{}'.", self.core.name);
        let generation = self.core.reopen_device()?;
        self.publish(ContextEvent::DeviceRecovered { generation });
        Ok(generation)
    }

    /// Returns the device status, publishing a loss when it is gone.
    pub fn check_device(&self) -> RhiResult<()> {
        let state = self.state()?;
        self.core.observe(state.native.check_status())
    }
}

impl<B: Backend> Drop for Context<B> {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(error) = self.release() {
                log::error!("Failed to release context '{}': {error}", self.core.name);
            }
        }
    }
}
