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

//! Render contexts: a context presenting into a platform surface.

use super::{Context, ContextEvent, ContextType, WaitFor};
use crate::rhi::api::{
    CommandListType, FenceTicket, FrameSize, ParallelExecutor, RenderContextSettings,
    RenderPassSettings, Resource, ResourceState, ResourceView, TextureSettings,
};
use crate::rhi::error::{BackendError, RhiError, RhiResult, ValidationError};
use crate::rhi::traits::{Backend, NativeDevice, NativeSurface, SurfaceSettings};
use parking_lot::{Mutex, RwLock};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ops::Deref;
use std::sync::Arc;

#[derive(Debug)]
struct FrameState<B: Backend> {
    frame_size: FrameSize,
    frame_buffers: Vec<Arc<Resource<B>>>,
    depth_buffer: Option<Arc<Resource<B>>>,
    frame_tickets: Vec<Option<FenceTicket<B>>>,
    frame_index: u32,
    image_index: Option<u32>,
}

/// A context that renders into a swap chain.
///
/// Each frame goes through [`begin_frame`](Self::begin_frame), recording and
/// execution of render lists targeting [`frame_buffer`](Self::frame_buffer),
/// then [`present`](Self::present). The CPU runs at most `frames_count` frames
/// ahead: beginning a frame waits for the frame that last used the same slot.
#[derive(Debug)]
pub struct RenderContext<B: Backend> {
    settings: RenderContextSettings,
    surface: RwLock<Arc<B::Surface>>,
    frame: Mutex<FrameState<B>>,
    context: Context<B>,
}

fn surface_settings(settings: &RenderContextSettings, frame_size: FrameSize) -> SurfaceSettings {
    SurfaceSettings {
        frame_size,
        image_count: settings.context.frames_count,
        format: settings.color_format,
        vsync_enabled: settings.vsync_enabled,
    }
}

fn create_surface<B: Backend>(
    context: &Context<B>,
    window: &(impl HasWindowHandle + HasDisplayHandle),
    settings: &SurfaceSettings,
) -> RhiResult<B::Surface> {
    let window_handle = window
        .window_handle()
        .map_err(|error| BackendError::SurfaceCreation(error.to_string()))?;
    let display_handle = window
        .display_handle()
        .map_err(|error| BackendError::SurfaceCreation(error.to_string()))?;
    context
        .native_device()?
        .create_surface(window_handle.as_raw(), display_handle.as_raw(), settings)
}

impl<B: Backend> RenderContext<B> {
    pub(crate) fn new(
        name: String,
        adapter: B::Adapter,
        window: &(impl HasWindowHandle + HasDisplayHandle),
        settings: RenderContextSettings,
        executor: Arc<ParallelExecutor>,
    ) -> RhiResult<Self> {
        settings.validate()?;
        let context = Context::new(name, ContextType::Render, adapter, settings.context.clone(), executor)?;
        let surface = create_surface(&context, window, &surface_settings(&settings, settings.frame_size))?;
        let surface = Arc::new(surface);
        let (frame_buffers, depth_buffer) =
            Self::create_frame_buffers(&context, &settings, &surface, settings.frame_size)?;
        let frames_count = settings.context.frames_count as usize;
        let frame = FrameState {
            frame_size: settings.frame_size,
            frame_buffers,
            depth_buffer,
            frame_tickets: vec![None; frames_count],
            frame_index: 0,
            image_index: None,
        };
        Ok(Self {
            settings,
            surface: RwLock::new(surface),
            frame: Mutex::new(frame),
            context,
        })
    }

    fn create_frame_buffers(
        context: &Context<B>,
        settings: &RenderContextSettings,
        surface: &B::Surface,
        frame_size: FrameSize,
    ) -> RhiResult<(Vec<Arc<Resource<B>>>, Option<Arc<Resource<B>>>)> {
        let FrameSize { width, height } = frame_size;
        let frame_buffers = (0..surface.image_count())
            .map(|image| {
                let buffer = context.create_texture(
                    &format!("{} frame buffer {image}", context.name()),
                    TextureSettings::render_target(width, height, settings.color_format),
                )?;
                buffer.set_auto_transition_source_state(Some(ResourceState::Present))?;
                Ok(buffer)
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let depth_buffer = settings
            .depth_format
            .map(|format| {
                context.create_texture(
                    &format!("{} depth buffer", context.name()),
                    TextureSettings::depth_stencil(width, height, format),
                )
            })
            .transpose()?;
        log::debug!(
            "Created {} frame buffers of {width}x{height} for '{}'.",
            frame_buffers.len(),
            context.name()
        );
        Ok((frame_buffers, depth_buffer))
    }

    /// The native surface.
    pub fn surface(&self) -> Arc<B::Surface> {
        Arc::clone(&self.surface.read())
    }

    /// The settings the context was created with.
    pub fn render_settings(&self) -> &RenderContextSettings {
        &self.settings
    }

    /// Current size of the frame buffers.
    pub fn frame_size(&self) -> FrameSize {
        self.frame.lock().frame_size
    }

    /// Slot of the current frame in `0..frames_count`.
    pub fn frame_index(&self) -> u32 {
        self.frame.lock().frame_index
    }

    /// Every frame buffer, one per swap chain image.
    pub fn frame_buffers(&self) -> Vec<Arc<Resource<B>>> {
        self.frame.lock().frame_buffers.clone()
    }

    /// The depth buffer, if the settings asked for one.
    pub fn depth_buffer(&self) -> Option<Arc<Resource<B>>> {
        self.frame.lock().depth_buffer.clone()
    }

    /// The frame buffer of the image acquired by [`begin_frame`](Self::begin_frame).
    pub fn frame_buffer(&self) -> RhiResult<Arc<Resource<B>>> {
        let frame = self.frame.lock();
        frame
            .image_index
            .and_then(|image| frame.frame_buffers.get(image as usize).cloned())
            .ok_or_else(|| self.frame_not_begun())
    }

    /// Attachments for a render pass drawing into the current frame buffer and
    /// the depth buffer.
    pub fn frame_pass_settings(&self) -> RhiResult<RenderPassSettings<B>> {
        let frame_buffer = self.frame_buffer()?;
        let frame = self.frame.lock();
        Ok(RenderPassSettings {
            frame_size: frame.frame_size,
            color_attachments: vec![ResourceView::new(&frame_buffer)],
            depth_attachment: frame.depth_buffer.as_ref().map(ResourceView::new),
        })
    }

    fn frame_not_begun(&self) -> RhiError {
        ValidationError::FrameNotBegun {
            context: self.name().to_string(),
        }
        .into()
    }

    fn observe<T>(&self, result: RhiResult<T>) -> RhiResult<T> {
        self.context.core().observe(result)
    }

    /// Acquires the next swap chain image and waits until the GPU finished the
    /// frame that last used the current frame slot.
    ///
    /// An out of date swap chain is recreated at the current frame size and
    /// acquisition retried once.
    ///
    /// # Returns
    ///
    /// The frame slot.
    pub fn begin_frame(&self) -> RhiResult<u32> {
        let image = match self.surface().acquire_next_image() {
            Err(RhiError::Backend(BackendError::SurfaceOutOfDate)) => {
                log::warn!("Swap chain of '{}' is out of date, recreating it.", self.name());
                self.resize(self.frame_size())?;
                self.observe(self.surface().acquire_next_image())?
            }
            result => self.observe(result)?,
        };
        let (frame_index, ticket) = {
            let mut frame = self.frame.lock();
            let frame_index = frame.frame_index;
            (frame_index, frame.frame_tickets[frame_index as usize].take())
        };
        if let Some(ticket) = ticket {
            self.observe(ticket.wait())?;
        }
        self.frame.lock().image_index = Some(image);
        log::trace!("'{}' began frame {frame_index} on image {image}.", self.name());
        Ok(frame_index)
    }

    /// Submits pending uploads, signals the render queue and presents the
    /// current image, then moves to the next frame slot.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::FrameNotBegun`] without a prior [`begin_frame`](Self::begin_frame).
    pub fn present(&self) -> RhiResult<()> {
        let (image, frame_index) = {
            let mut frame = self.frame.lock();
            let image = frame.image_index.take().ok_or_else(|| self.frame_not_begun())?;
            (image, frame.frame_index)
        };
        self.upload_resources()?;
        let queue = self.default_command_queue(CommandListType::Render)?;
        let value = self.observe(queue.signal_fence())?;
        let ticket = FenceTicket {
            fence: Arc::clone(queue.fence()),
            value,
        };
        match self.surface().present(image) {
            Err(RhiError::Backend(BackendError::SurfaceOutOfDate)) => {
                log::warn!("Swap chain of '{}' went out of date on present.", self.name());
                self.resize(self.frame_size())?;
            }
            result => self.observe(result)?,
        }
        {
            let mut frame = self.frame.lock();
            frame.frame_tickets[frame_index as usize] = Some(ticket);
            frame.frame_index = (frame_index + 1) % self.frames_count();
        }
        self.publish(ContextEvent::FramePresented { frame_index });
        Ok(())
    }

    /// Waits for the GPU, then recreates the swap chain and the frame buffers.
    ///
    /// Render passes created on the old frame buffers must be created again.
    pub fn resize(&self, frame_size: FrameSize) -> RhiResult<()> {
        if frame_size.is_empty() {
            return Err(ValidationError::InvalidSettings(format!(
                "cannot resize '{}' to an empty frame {frame_size:?}",
                self.name()
            ))
            .into());
        }
        self.wait_for_gpu(WaitFor::RenderComplete)?;
        let surface = self.surface();
        self.observe(surface.resize(frame_size))?;
        let (frame_buffers, depth_buffer) =
            Self::create_frame_buffers(&self.context, &self.settings, &surface, frame_size)?;
        {
            let mut frame = self.frame.lock();
            frame.frame_size = frame_size;
            frame.frame_buffers = frame_buffers;
            frame.depth_buffer = depth_buffer;
            frame.image_index = None;
        }
        log::info!(
            "Resized '{}' to {}x{}.",
            self.name(),
            frame_size.width,
            frame_size.height
        );
        self.publish(ContextEvent::Resized(frame_size));
        Ok(())
    }

    /// Blocks until the GPU reached the given point. `FramePresented` waits
    /// for every presented frame still in flight.
    pub fn wait_for_gpu(&self, wait_for: WaitFor) -> RhiResult<()> {
        match wait_for {
            WaitFor::FramePresented => {
                let tickets: Vec<_> = self.frame.lock().frame_tickets.iter().flatten().cloned().collect();
                tickets
                    .iter()
                    .try_for_each(|ticket| self.observe(ticket.wait()))
            }
            other => self.context.wait_for_gpu(other),
        }
    }

    /// Replaces a lost device, then recreates the surface for `window` and the
    /// frame buffers on the new device.
    pub fn recover_device(&self, window: &(impl HasWindowHandle + HasDisplayHandle)) -> RhiResult<u64> {
        let generation = self.context.recover_device()?;
        let frame_size = self.frame_size();
        let surface = Arc::new(create_surface(
            &self.context,
            window,
            &surface_settings(&self.settings, frame_size),
        )?);
        let (frame_buffers, depth_buffer) =
            Self::create_frame_buffers(&self.context, &self.settings, &surface, frame_size)?;
        *self.surface.write() = surface;
        let mut frame = self.frame.lock();
        frame.frame_buffers = frame_buffers;
        frame.depth_buffer = depth_buffer;
        frame.frame_tickets.iter_mut().for_each(|ticket| *ticket = None);
        frame.frame_index = 0;
        frame.image_index = None;
        Ok(generation)
    }
}

impl<B: Backend> Deref for RenderContext<B> {
    type Target = Context<B>;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl<B: Backend> Drop for RenderContext<B> {
    fn drop(&mut self) {
        if let Err(error) = self.context.release() {
            log::error!("Failed to release render context '{}': {error}", self.name());
        }
    }
}
