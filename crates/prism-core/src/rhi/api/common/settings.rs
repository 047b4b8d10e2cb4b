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

//! Settings for systems, contexts and render contexts.
//!
//! Every settings struct implements [`Default`] and deserializes with
//! `#[serde(default)]`, so a JSON document only has to name the fields it
//! changes.

use super::{DEFAULT_FRAMES_COUNT, MAX_FRAMES_IN_FLIGHT};
use crate::rhi::api::resource::PixelFormat;
use crate::rhi::error::{RhiResult, ValidationError};
use serde::{Deserialize, Serialize};

/// Adapter selection preferences used by [`System`](crate::rhi::api::System).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    /// Sort discrete GPUs before integrated and software adapters.
    pub prefer_discrete_gpu: bool,
    /// Keep software adapters in the device list.
    pub allow_software_adapters: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            prefer_discrete_gpu: true,
            allow_software_adapters: true,
        }
    }
}

/// Initial sizes and growth policy of the descriptor heaps of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorHeapSettings {
    /// Initial descriptor count of the shader resource heap.
    pub shader_resources: u32,
    /// Initial descriptor count of the sampler heap.
    pub samplers: u32,
    /// Delay creating native heaps until `complete_initialization` knows the
    /// exact number of descriptors the registered bindings need.
    pub deferred_allocation: bool,
    /// Allow heaps to grow when a range does not fit. When `false` the
    /// allocation fails with an allocation error instead.
    pub growable: bool,
}

impl Default for DescriptorHeapSettings {
    fn default() -> Self {
        Self {
            shader_resources: 256,
            samplers: 32,
            deferred_allocation: false,
            growable: true,
        }
    }
}

/// Settings shared by render and compute contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_count: u32,
    /// Descriptor heap configuration.
    pub descriptor_heaps: DescriptorHeapSettings,
    /// Wait for uploads to finish when completing initialization.
    pub wait_for_uploads_on_initialization: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            frames_count: DEFAULT_FRAMES_COUNT,
            descriptor_heaps: DescriptorHeapSettings::default(),
            wait_for_uploads_on_initialization: true,
        }
    }
}

impl ContextSettings {
    /// Parses and validates context settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSettings`] if the document is malformed
    /// or holds out-of-range values.
    pub fn from_json_str(json: &str) -> RhiResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| ValidationError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every value is within its supported range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_count) {
            return Err(ValidationError::InvalidSettings(format!(
                "frames_count must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_count
            )));
        }
        Ok(())
    }
}

/// Size of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Creates a new frame size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Settings of a render context and its swap chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderContextSettings {
    /// Settings shared with compute contexts.
    pub context: ContextSettings,
    /// Initial size of the frame buffers.
    pub frame_size: FrameSize,
    /// Pixel format of the frame buffers.
    pub color_format: PixelFormat,
    /// Pixel format of the depth buffer, if one is wanted.
    pub depth_format: Option<PixelFormat>,
    /// Synchronize presentation with the display refresh.
    pub vsync_enabled: bool,
    /// Color the frame buffers are cleared to at the start of a frame.
    pub clear_color: Option<[f32; 4]>,
}

impl Default for RenderContextSettings {
    fn default() -> Self {
        Self {
            context: ContextSettings::default(),
            frame_size: FrameSize::default(),
            color_format: PixelFormat::Bgra8Unorm,
            depth_format: Some(PixelFormat::Depth32Float),
            vsync_enabled: true,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
        }
    }
}

impl RenderContextSettings {
    /// Parses and validates render context settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSettings`] if the document is malformed
    /// or holds out-of-range values.
    pub fn from_json_str(json: &str) -> RhiResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| ValidationError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every value is within its supported range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.context.validate()?;
        if self.frame_size.is_empty() {
            return Err(ValidationError::InvalidSettings(
                "frame_size must not be empty".to_string(),
            ));
        }
        if self.color_format.is_depth() {
            return Err(ValidationError::InvalidSettings(format!(
                "color_format {:?} is a depth format",
                self.color_format
            )));
        }
        if let Some(depth) = self.depth_format {
            if !depth.is_depth() {
                return Err(ValidationError::InvalidSettings(format!(
                    "depth_format {depth:?} is not a depth format"
                )));
            }
        }
        Ok(())
    }
}
