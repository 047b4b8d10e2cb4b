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

//! Command lists recording draws inside a render pass.

use super::{
    Command, CommandList, CommandListCore, CommandListState, CommandListType, CommandQueue,
    IndexFormat, Primitive, ProgramBindingsTarget, Recording,
};
use crate::rhi::api::{RenderPass, Resource, ResourceKind, ResourceState, ResourceUsage};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use smallvec::SmallVec;
use std::sync::Arc;

/// Moves the attachments into their writable states and begins the pass.
pub(crate) fn begin_render_pass<B: Backend>(recording: &mut Recording<B>) -> RhiResult<()> {
    let Some(pass) = recording.render_pass.clone() else {
        return Ok(());
    };
    for view in pass.color_attachments() {
        recording.transition_view(view, ResourceState::RenderTarget)?;
    }
    if let Some(view) = pass.depth_attachment() {
        recording.transition_view(view, ResourceState::DepthWrite)?;
    }
    recording.commands.push(Command::BeginRenderPass { pass });
    recording.pass_active = true;
    Ok(())
}

/// Ends the active pass. Attachments of a final pass are handed back in
/// their auto-transition state, `Present` unless set otherwise.
pub(crate) fn end_render_pass<B: Backend>(recording: &mut Recording<B>) -> RhiResult<()> {
    if !recording.pass_active {
        return Ok(());
    }
    recording.commands.push(Command::EndRenderPass);
    recording.pass_active = false;
    let Some(pass) = recording.render_pass.clone() else {
        return Ok(());
    };
    if pass.pattern().is_final_pass() {
        for view in pass.color_attachments() {
            let target = view
                .resource()
                .auto_transition_source_state()
                .unwrap_or(ResourceState::Present);
            recording.transition_view(view, target)?;
        }
    }
    Ok(())
}

fn require_buffer<B: Backend>(buffer: &Resource<B>, usage: ResourceUsage) -> Result<(), ValidationError> {
    if buffer.kind() != ResourceKind::Buffer || !buffer.usage().contains(usage) {
        return Err(ValidationError::IncompatibleUsage {
            resource: buffer.name().to_string(),
            required: usage,
            actual: buffer.usage(),
        });
    }
    Ok(())
}

/// The part of a render pass a list records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassScope {
    /// Begins the pass on reset and ends it on commit.
    Whole,
    /// Begins the pass and leaves it open for the lists executed after it.
    Opening,
    /// Draws inside a pass opened by an earlier list.
    Inside,
    /// Draws inside an open pass and ends it on commit.
    Closing,
}

/// A command list recording draws.
///
/// A list created with a render pass begins it on every reset (creation
/// included) and ends it on commit, so draws can be recorded right away.
#[derive(Debug)]
pub struct RenderCommandList<B: Backend> {
    core: Arc<CommandListCore<B>>,
    scope: PassScope,
}

impl<B: Backend> Clone for RenderCommandList<B> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            scope: self.scope,
        }
    }
}

impl<B: Backend> RenderCommandList<B> {
    /// Creates a `Pending` render list on a render queue.
    pub fn new(
        queue: &Arc<CommandQueue<B>>,
        render_pass: Option<Arc<RenderPass<B>>>,
        name: impl Into<String>,
    ) -> RhiResult<Self> {
        Self::create(queue, render_pass, name.into(), PassScope::Whole)
    }

    pub(crate) fn create(
        queue: &Arc<CommandQueue<B>>,
        render_pass: Option<Arc<RenderPass<B>>>,
        name: String,
        scope: PassScope,
    ) -> RhiResult<Self> {
        let core = CommandListCore::new(queue, CommandListType::Render, name)?;
        core.lock().render_pass = render_pass;
        let list = Self { core, scope };
        list.reset()?;
        Ok(list)
    }

    /// The render pass the list draws into.
    pub fn render_pass(&self) -> Option<Arc<RenderPass<B>>> {
        self.core.lock().render_pass.clone()
    }

    /// Makes the list draw into `render_pass` from its next reset on. A fresh
    /// `Pending` list is reset right away.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCommandListState`] if the list already
    /// recorded or committed work for another pass.
    pub fn set_render_pass(&self, render_pass: &Arc<RenderPass<B>>) -> RhiResult<()> {
        let state = self.core.state();
        let reset_now = {
            let mut recording = self.core.lock();
            if recording
                .render_pass
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, render_pass))
            {
                return Ok(());
            }
            let reset_now = match state {
                CommandListState::Pending if recording.fresh => true,
                CommandListState::Pending | CommandListState::Committed => {
                    return Err(ValidationError::InvalidCommandListState {
                        list: self.core.name().to_string(),
                        operation: "change the render pass",
                        state,
                    }
                    .into());
                }
                _ => false,
            };
            recording.render_pass = Some(Arc::clone(render_pass));
            reset_now
        };
        log::debug!(
            "Command list '{}' now draws into pass '{}'.",
            self.core.name(),
            render_pass.name()
        );
        if reset_now {
            self.reset()?;
        }
        Ok(())
    }

    /// Binds vertex buffers to consecutive slots, transitioning them to `VertexBuffer`.
    pub fn set_vertex_buffers(&self, buffers: &[Arc<Resource<B>>]) -> RhiResult<()> {
        self.core.record("set vertex buffers", |recording| {
            for buffer in buffers {
                require_buffer(buffer, ResourceUsage::VERTEX)?;
                recording.transition(buffer, ResourceState::VertexBuffer, None)?;
            }
            recording.commands.push(Command::SetVertexBuffers {
                buffers: buffers.iter().cloned().collect::<SmallVec<_>>(),
            });
            Ok(())
        })
    }

    /// Binds the index buffer, transitioning it to `IndexBuffer`.
    pub fn set_index_buffer(&self, buffer: &Arc<Resource<B>>, format: IndexFormat) -> RhiResult<()> {
        self.core.record("set the index buffer", |recording| {
            require_buffer(buffer, ResourceUsage::INDEX)?;
            recording.transition(buffer, ResourceState::IndexBuffer, None)?;
            recording.index_buffer = Some((Arc::clone(buffer), format));
            recording.commands.push(Command::SetIndexBuffer {
                buffer: Arc::clone(buffer),
                format,
            });
            Ok(())
        })
    }

    fn check_draw(&self, recording: &Recording<B>) -> Result<(), ValidationError> {
        if !recording.pass_active {
            return Err(ValidationError::RenderPassNotActive {
                list: self.core.name().to_string(),
            });
        }
        if recording.bound_program.is_none() {
            return Err(ValidationError::NoProgramBindings {
                list: self.core.name().to_string(),
            });
        }
        Ok(())
    }

    /// Records a non-indexed draw.
    pub fn draw(
        &self,
        primitive: Primitive,
        vertex_count: u32,
        start_vertex: u32,
        instance_count: u32,
        start_instance: u32,
    ) -> RhiResult<()> {
        self.core.record("draw", |recording| {
            self.check_draw(recording)?;
            recording.commands.push(Command::Draw {
                primitive,
                vertex_count,
                start_vertex,
                instance_count,
                start_instance,
            });
            Ok(())
        })
    }

    /// Records an indexed draw.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::MissingIndexBuffer`] without an index buffer.
    /// * [`ValidationError::DataSizeOverflow`] if the indices run past its end.
    pub fn draw_indexed(
        &self,
        primitive: Primitive,
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
        instance_count: u32,
        start_instance: u32,
    ) -> RhiResult<()> {
        self.core.record("draw indexed", |recording| {
            self.check_draw(recording)?;
            let Some((buffer, format)) = &recording.index_buffer else {
                return Err(ValidationError::MissingIndexBuffer {
                    list: self.core.name().to_string(),
                }
                .into());
            };
            let capacity = buffer.descriptor().sub_resource_size(0);
            let offset = u64::from(start_index) * format.size();
            let size = u64::from(index_count) * format.size();
            if offset.checked_add(size).is_none_or(|end| end > capacity) {
                return Err(ValidationError::DataSizeOverflow {
                    resource: buffer.name().to_string(),
                    sub_resource: 0,
                    offset,
                    size,
                    capacity,
                }
                .into());
            }
            recording.commands.push(Command::DrawIndexed {
                primitive,
                index_count,
                start_index,
                base_vertex,
                instance_count,
                start_instance,
            });
            Ok(())
        })
    }
}

impl<B: Backend> CommandList<B> for RenderCommandList<B> {
    fn core(&self) -> &Arc<CommandListCore<B>> {
        &self.core
    }

    fn reset(&self) -> RhiResult<()> {
        match self.scope {
            PassScope::Whole | PassScope::Opening => self.core.reset_with(begin_render_pass),
            PassScope::Inside | PassScope::Closing => self.core.reset_with(|recording| {
                recording.pass_active = recording.render_pass.is_some();
                Ok(())
            }),
        }
    }

    fn commit(&self) -> RhiResult<()> {
        match self.scope {
            PassScope::Whole | PassScope::Closing => self.core.commit_with(end_render_pass),
            PassScope::Opening | PassScope::Inside => self.core.commit_with(|recording| {
                recording.pass_active = false;
                Ok(())
            }),
        }
    }
}

impl<B: Backend> ProgramBindingsTarget<B> for RenderCommandList<B> {}
