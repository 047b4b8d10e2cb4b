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

//! Render patterns (attachment formats and actions) and render passes
//! (the concrete attachment views a pattern is drawn into).

use crate::rhi::api::{FrameSize, PixelFormat, ResourceDescriptor, ResourceUsage, ResourceView};
use crate::rhi::error::ValidationError;
use crate::rhi::traits::Backend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum number of color attachments of a pattern.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// What happens to an attachment when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoadAction {
    /// The previous content is undefined.
    DontCare,
    /// The previous content is kept.
    Load,
    /// The attachment is cleared.
    #[default]
    Clear,
}

/// What happens to an attachment when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoreAction {
    /// The content may be discarded.
    DontCare,
    /// The content is written back.
    #[default]
    Store,
}

/// Format and actions of one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorAttachmentSettings {
    /// Texel format of the attached texture.
    pub format: PixelFormat,
    /// Action on begin.
    pub load_action: LoadAction,
    /// Action on end.
    pub store_action: StoreAction,
    /// Value used by [`LoadAction::Clear`].
    pub clear_color: [f32; 4],
}

impl ColorAttachmentSettings {
    /// A cleared and stored attachment.
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            load_action: LoadAction::Clear,
            store_action: StoreAction::Store,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Format and actions of the depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthAttachmentSettings {
    /// Depth format of the attached texture.
    pub format: PixelFormat,
    /// Action on begin.
    pub load_action: LoadAction,
    /// Action on end.
    pub store_action: StoreAction,
    /// Value used by [`LoadAction::Clear`].
    pub clear_depth: f32,
}

impl DepthAttachmentSettings {
    /// A cleared attachment whose content is discarded after the pass.
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            load_action: LoadAction::Clear,
            store_action: StoreAction::DontCare,
            clear_depth: 1.0,
        }
    }
}

/// Settings of a [`RenderPattern`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPatternSettings {
    /// Color attachments in binding order.
    pub color_attachments: Vec<ColorAttachmentSettings>,
    /// Optional depth attachment.
    pub depth_attachment: Option<DepthAttachmentSettings>,
    /// The pass renders into presented frame buffers. Its color attachments
    /// are handed back for presentation when a render list commits.
    pub is_final_pass: bool,
}

/// The attachment layout render passes are created from.
#[derive(Debug)]
pub struct RenderPattern {
    name: String,
    settings: RenderPatternSettings,
}

impl RenderPattern {
    /// Validates the attachment formats.
    pub fn new(name: impl Into<String>, settings: RenderPatternSettings) -> Result<Arc<Self>, ValidationError> {
        let name = name.into();
        let mismatch = |reason: String| ValidationError::AttachmentMismatch {
            pass: name.clone(),
            reason,
        };
        if settings.color_attachments.is_empty() && settings.depth_attachment.is_none() {
            return Err(mismatch("a pattern needs at least one attachment".into()));
        }
        if settings.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(mismatch(format!(
                "{} color attachments exceed the limit of {MAX_COLOR_ATTACHMENTS}",
                settings.color_attachments.len()
            )));
        }
        if let Some(color) = settings.color_attachments.iter().find(|c| c.format.is_depth()) {
            return Err(mismatch(format!("{:?} is not a color format", color.format)));
        }
        if let Some(depth) = settings.depth_attachment.filter(|d| !d.format.is_depth()) {
            return Err(mismatch(format!("{:?} is not a depth format", depth.format)));
        }
        Ok(Arc::new(Self { name, settings }))
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The settings.
    pub fn settings(&self) -> &RenderPatternSettings {
        &self.settings
    }

    /// See [`RenderPatternSettings::is_final_pass`].
    pub fn is_final_pass(&self) -> bool {
        self.settings.is_final_pass
    }
}

/// The attachments a [`RenderPass`] renders into.
#[derive(Debug)]
pub struct RenderPassSettings<B: Backend> {
    /// Size of every attachment.
    pub frame_size: FrameSize,
    /// One view per color attachment of the pattern.
    pub color_attachments: Vec<ResourceView<B>>,
    /// View of the depth attachment, if the pattern has one.
    pub depth_attachment: Option<ResourceView<B>>,
}

impl<B: Backend> Clone for RenderPassSettings<B> {
    fn clone(&self) -> Self {
        Self {
            frame_size: self.frame_size,
            color_attachments: self.color_attachments.clone(),
            depth_attachment: self.depth_attachment.clone(),
        }
    }
}

/// A pattern bound to concrete attachment views.
#[derive(Debug)]
pub struct RenderPass<B: Backend> {
    name: String,
    pattern: Arc<RenderPattern>,
    settings: RenderPassSettings<B>,
}

impl<B: Backend> RenderPass<B> {
    /// Checks every view against the pattern and the frame size.
    ///
    /// # Errors
    ///
    /// [`ValidationError::AttachmentMismatch`] if attachment counts, formats,
    /// usages or sizes disagree with the pattern.
    pub fn new(
        name: impl Into<String>,
        pattern: &Arc<RenderPattern>,
        settings: RenderPassSettings<B>,
    ) -> Result<Arc<Self>, ValidationError> {
        let name = name.into();
        let mismatch = |reason: String| ValidationError::AttachmentMismatch {
            pass: name.clone(),
            reason,
        };
        let expected = &pattern.settings;
        if settings.color_attachments.len() != expected.color_attachments.len() {
            return Err(mismatch(format!(
                "pattern '{}' has {} color attachments, {} views given",
                pattern.name,
                expected.color_attachments.len(),
                settings.color_attachments.len()
            )));
        }
        for (view, color) in settings.color_attachments.iter().zip(&expected.color_attachments) {
            Self::check_attachment(view, color.format, ResourceUsage::RENDER_TARGET, settings.frame_size)
                .map_err(&mismatch)?;
        }
        match (&settings.depth_attachment, &expected.depth_attachment) {
            (Some(view), Some(depth)) => {
                Self::check_attachment(view, depth.format, ResourceUsage::DEPTH_STENCIL, settings.frame_size)
                    .map_err(&mismatch)?
            }
            (None, None) => {}
            (Some(_), None) => return Err(mismatch("the pattern has no depth attachment".into())),
            (None, Some(_)) => return Err(mismatch("missing depth attachment view".into())),
        }
        log::debug!("Created render pass '{name}' from pattern '{}'.", pattern.name);
        Ok(Arc::new(Self {
            name,
            pattern: Arc::clone(pattern),
            settings,
        }))
    }

    fn check_attachment(
        view: &ResourceView<B>,
        format: PixelFormat,
        usage: ResourceUsage,
        frame_size: FrameSize,
    ) -> Result<(), String> {
        let resource = view.resource();
        let ResourceDescriptor::Texture(texture) = resource.descriptor() else {
            return Err(format!("'{}' is not a texture", resource.name()));
        };
        if texture.format != format {
            return Err(format!(
                "'{}' has format {:?}, the pattern expects {format:?}",
                resource.name(),
                texture.format
            ));
        }
        if !resource.usage().contains(usage) {
            return Err(format!("'{}' lacks {usage:?} usage", resource.name()));
        }
        if texture.width != frame_size.width || texture.height != frame_size.height {
            return Err(format!(
                "'{}' is {}x{}, the frame is {}x{}",
                resource.name(),
                texture.width,
                texture.height,
                frame_size.width,
                frame_size.height
            ));
        }
        Ok(())
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern the pass was created from.
    pub fn pattern(&self) -> &Arc<RenderPattern> {
        &self.pattern
    }

    /// The attachments.
    pub fn settings(&self) -> &RenderPassSettings<B> {
        &self.settings
    }

    /// Color attachment views.
    pub fn color_attachments(&self) -> &[ResourceView<B>] {
        &self.settings.color_attachments
    }

    /// Depth attachment view.
    pub fn depth_attachment(&self) -> Option<&ResourceView<B>> {
        self.settings.depth_attachment.as_ref()
    }

    /// Size of the attachments.
    pub fn frame_size(&self) -> FrameSize {
        self.settings.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_rejects_depth_color_attachment() {
        let settings = RenderPatternSettings {
            color_attachments: vec![ColorAttachmentSettings::new(PixelFormat::Depth32Float)],
            ..Default::default()
        };
        assert!(matches!(
            RenderPattern::new("bad", settings),
            Err(ValidationError::AttachmentMismatch { .. })
        ));
    }

    #[test]
    fn test_pattern_requires_an_attachment() {
        assert!(RenderPattern::new("empty", RenderPatternSettings::default()).is_err());
    }

    #[test]
    fn test_pattern_accepts_color_and_depth() {
        let settings = RenderPatternSettings {
            color_attachments: vec![ColorAttachmentSettings::new(PixelFormat::Bgra8Unorm)],
            depth_attachment: Some(DepthAttachmentSettings::new(PixelFormat::Depth32Float)),
            is_final_pass: true,
        };
        let pattern = RenderPattern::new("final", settings).unwrap();
        assert!(pattern.is_final_pass());
        assert_eq!(pattern.name(), "final");
    }
}
