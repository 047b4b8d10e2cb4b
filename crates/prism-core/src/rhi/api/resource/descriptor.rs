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

//! Descriptors of GPU resources: kinds, usage flags, storage modes, pixel
//! formats, per-kind creation settings and sub-resource addressing.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// An opaque identifier of a resource, unique within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// The kind of a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A linear block of memory.
    Buffer,
    /// An image with dimensions, format, mip levels and array layers.
    Texture,
    /// A sampling state object. Samplers have no memory.
    Sampler,
}

bitflags! {
    /// A set of flags describing the allowed usages of a resource.
    ///
    /// The usage decides which states a resource may enter and how the CPU
    /// may access its memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ResourceUsage: u32 {
        /// Read by shaders (sampled textures, read-only buffers).
        const SHADER_READ = 1 << 0;
        /// Written by shaders (storage textures and buffers).
        const SHADER_WRITE = 1 << 1;
        /// Used as a color attachment.
        const RENDER_TARGET = 1 << 2;
        /// Used as a depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 3;
        /// Bound as a vertex buffer.
        const VERTEX = 1 << 4;
        /// Bound as an index buffer.
        const INDEX = 1 << 5;
        /// Bound as a constant buffer.
        const CONSTANT = 1 << 6;
        /// Read as indirect arguments.
        const INDIRECT = 1 << 7;
        /// Source of copy operations.
        const COPY_SRC = 1 << 8;
        /// Destination of copy operations and uploads.
        const COPY_DST = 1 << 9;
        /// Readable from the CPU. Only valid with host storage.
        const HOST_READ = 1 << 10;
        /// Writable from the CPU. Only valid with host storage.
        const HOST_WRITE = 1 << 11;
    }
}

/// Where the memory of a resource lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageMode {
    /// GPU-only memory. Filled through uploads recorded on a queue.
    #[default]
    Private,
    /// CPU-visible memory written and read directly.
    Host,
}

/// Which size [`data_size`](crate::rhi::api::Resource::data_size) reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryState {
    /// Size of the GPU allocation, including alignment padding.
    Reserved,
    /// Bytes written through `set_data` so far.
    Initialized,
}

/// The memory layout of a single texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// One 8-bit unsigned normalized component.
    R8Unorm,
    /// Two 8-bit unsigned normalized components.
    Rg8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA).
    #[default]
    Rgba8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA) in the sRGB color space.
    Rgba8UnormSrgb,
    /// Four 8-bit unsigned normalized components (BGRA). A common swap chain format.
    Bgra8Unorm,
    /// Four 8-bit unsigned normalized components (BGRA) in the sRGB color space.
    Bgra8UnormSrgb,
    /// One 16-bit float component.
    R16Float,
    /// Four 16-bit float components.
    Rgba16Float,
    /// One 32-bit float component.
    R32Float,
    /// One 32-bit unsigned integer component.
    R32Uint,
    /// Four 32-bit float components.
    Rgba32Float,
    /// A 16-bit unsigned normalized depth format.
    Depth16Unorm,
    /// A 32-bit float depth format.
    Depth32Float,
    /// A 24-bit depth format with an 8-bit stencil component.
    Depth24UnormStencil8,
}

impl PixelFormat {
    /// Returns the size in bytes of a single texel.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rg8Unorm | PixelFormat::R16Float | PixelFormat::Depth16Unorm => 2,
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8UnormSrgb
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Bgra8UnormSrgb
            | PixelFormat::R32Float
            | PixelFormat::R32Uint
            | PixelFormat::Depth32Float
            | PixelFormat::Depth24UnormStencil8 => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }

    /// Returns `true` for depth and depth/stencil formats.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::Depth16Unorm | PixelFormat::Depth32Float | PixelFormat::Depth24UnormStencil8
        )
    }
}

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// A one-dimensional texture.
    D1,
    /// A two-dimensional texture.
    #[default]
    D2,
    /// A cube map, six 2D faces per array layer.
    Cube,
    /// A three-dimensional (volumetric) texture.
    D3,
}

/// Creation settings of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSettings {
    /// Size of the buffer in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: ResourceUsage,
    /// Where the memory lives.
    pub storage: StorageMode,
    /// Size of one element, used by structured views and vertex/index buffers.
    pub item_stride: u32,
}

impl BufferSettings {
    /// A GPU-only buffer filled through uploads.
    pub fn private(size: u64, usage: ResourceUsage) -> Self {
        Self {
            size,
            usage: usage | ResourceUsage::COPY_DST,
            storage: StorageMode::Private,
            item_stride: 0,
        }
    }

    /// A CPU-visible buffer, readable and writable from the host.
    pub fn host(size: u64, usage: ResourceUsage) -> Self {
        Self {
            size,
            usage: usage | ResourceUsage::HOST_READ | ResourceUsage::HOST_WRITE,
            storage: StorageMode::Host,
            item_stride: 0,
        }
    }

    /// A constant buffer written from the host every frame.
    pub fn constant(size: u64) -> Self {
        Self::host(size, ResourceUsage::CONSTANT)
    }

    /// Sets the element stride.
    pub fn with_item_stride(mut self, item_stride: u32) -> Self {
        self.item_stride = item_stride;
        self
    }
}

/// Creation settings of a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSettings {
    /// Dimensionality of the texture.
    pub dimension: TextureDimension,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels, 1 unless the texture is volumetric.
    pub depth: u32,
    /// Number of array layers.
    pub array_length: u32,
    /// Number of mip levels.
    pub mip_count: u32,
    /// Texel format.
    pub format: PixelFormat,
    /// Allowed usages.
    pub usage: ResourceUsage,
}

impl TextureSettings {
    /// A sampled 2D image filled through uploads.
    pub fn image_2d(width: u32, height: u32, format: PixelFormat, mip_count: u32) -> Self {
        Self {
            dimension: TextureDimension::D2,
            width,
            height,
            depth: 1,
            array_length: 1,
            mip_count,
            format,
            usage: ResourceUsage::SHADER_READ | ResourceUsage::COPY_DST,
        }
    }

    /// A color attachment that can also be sampled.
    pub fn render_target(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            usage: ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_READ,
            ..Self::image_2d(width, height, format, 1)
        }
    }

    /// A depth attachment.
    pub fn depth_stencil(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            usage: ResourceUsage::DEPTH_STENCIL,
            ..Self::image_2d(width, height, format, 1)
        }
    }

    /// Sets the number of array layers.
    pub fn with_array_length(mut self, array_length: u32) -> Self {
        self.array_length = array_length;
        self
    }

    /// Sets the allowed usages.
    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Number of mip levels of a full chain for this size.
    pub fn full_mip_count(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth).max(1);
        32 - largest.leading_zeros()
    }

    fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::Cube => self.array_length * 6,
            _ => self.array_length,
        }
    }
}

/// Texel filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Weighted average of the nearest texels.
    #[default]
    Linear,
}

/// How texture coordinates outside `[0, 1]` are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Coordinates wrap around.
    #[default]
    Repeat,
    /// Coordinates are clamped to the edge.
    ClampToEdge,
    /// Coordinates wrap around, mirroring at each integer boundary.
    MirrorRepeat,
}

/// Creation settings of a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Filter between mip levels.
    pub mip_filter: FilterMode,
    /// Address mode on all axes.
    pub address_mode: AddressMode,
    /// Range of mip levels that can be sampled.
    pub lod_clamp: (f32, f32),
    /// Maximum anisotropy, 1 disables anisotropic filtering.
    pub max_anisotropy: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mip_filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
            lod_clamp: (0.0, f32::MAX),
            max_anisotropy: 1,
        }
    }
}

/// The number of sub-resources of a resource along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubResourceCount {
    /// Depth slices addressed separately. Volume textures keep each mip
    /// level in one sub-resource, so this is 1 for every current kind.
    pub depth: u32,
    /// Array layers (six per cube).
    pub array_size: u32,
    /// Mip levels.
    pub mip_count: u32,
}

impl SubResourceCount {
    /// A single sub-resource.
    pub const ONE: SubResourceCount = SubResourceCount {
        depth: 1,
        array_size: 1,
        mip_count: 1,
    };

    /// Total number of sub-resources.
    pub fn raw_count(&self) -> u32 {
        self.depth * self.array_size * self.mip_count
    }
}

/// The position of a sub-resource inside its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubResourceIndex {
    /// Depth slice.
    pub depth_slice: u32,
    /// Array layer.
    pub array_index: u32,
    /// Mip level.
    pub mip_level: u32,
}

impl SubResourceIndex {
    /// Addresses one mip level of one array layer.
    pub fn new(array_index: u32, mip_level: u32) -> Self {
        Self {
            depth_slice: 0,
            array_index,
            mip_level,
        }
    }

    /// Flattens the index for the given count, or `None` if it lies outside.
    pub fn raw_index(&self, count: &SubResourceCount) -> Option<u32> {
        if self.depth_slice >= count.depth
            || self.array_index >= count.array_size
            || self.mip_level >= count.mip_count
        {
            return None;
        }
        Some((self.depth_slice * count.array_size + self.array_index) * count.mip_count + self.mip_level)
    }
}

/// Bytes destined for one sub-resource.
#[derive(Debug, Clone, Copy)]
pub struct SubResourceData<'a> {
    /// Target sub-resource.
    pub index: SubResourceIndex,
    /// Byte offset inside the sub-resource.
    pub offset: u64,
    /// The bytes to write.
    pub data: &'a [u8],
}

impl<'a> SubResourceData<'a> {
    /// Data for the first sub-resource, written at its start.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            index: SubResourceIndex::default(),
            offset: 0,
            data,
        }
    }

    /// Targets another sub-resource.
    pub fn with_index(mut self, index: SubResourceIndex) -> Self {
        self.index = index;
        self
    }

    /// Writes at a byte offset.
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// Alignment of constant buffer allocations.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;
/// Alignment of every other buffer and texture sub-resource allocation.
pub const RESOURCE_ALIGNMENT: u64 = 16;

/// Everything needed to create a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDescriptor {
    /// A buffer.
    Buffer(BufferSettings),
    /// A texture.
    Texture(TextureSettings),
    /// A sampler.
    Sampler(SamplerSettings),
}

impl ResourceDescriptor {
    /// The kind of resource described.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDescriptor::Buffer(_) => ResourceKind::Buffer,
            ResourceDescriptor::Texture(_) => ResourceKind::Texture,
            ResourceDescriptor::Sampler(_) => ResourceKind::Sampler,
        }
    }

    /// Allowed usages. Samplers are always shader-readable.
    pub fn usage(&self) -> ResourceUsage {
        match self {
            ResourceDescriptor::Buffer(settings) => settings.usage,
            ResourceDescriptor::Texture(settings) => settings.usage,
            ResourceDescriptor::Sampler(_) => ResourceUsage::SHADER_READ,
        }
    }

    /// Storage mode. Textures and samplers are always private.
    pub fn storage(&self) -> StorageMode {
        match self {
            ResourceDescriptor::Buffer(settings) => settings.storage,
            _ => StorageMode::Private,
        }
    }

    /// Sub-resource layout.
    pub fn sub_resource_count(&self) -> SubResourceCount {
        match self {
            ResourceDescriptor::Texture(settings) => SubResourceCount {
                depth: 1,
                array_size: settings.layers().max(1),
                mip_count: settings.mip_count.max(1),
            },
            _ => SubResourceCount::ONE,
        }
    }

    /// Size in bytes of the sub-resource at `raw_index`.
    pub fn sub_resource_size(&self, raw_index: u32) -> u64 {
        match self {
            ResourceDescriptor::Buffer(settings) => settings.size,
            ResourceDescriptor::Texture(settings) => {
                let mip = raw_index % settings.mip_count.max(1);
                let extent = |size: u32| u64::from((size >> mip).max(1));
                let depth = match settings.dimension {
                    TextureDimension::D3 => extent(settings.depth),
                    _ => 1,
                };
                extent(settings.width)
                    * extent(settings.height)
                    * depth
                    * u64::from(settings.format.bytes_per_pixel())
            }
            ResourceDescriptor::Sampler(_) => 0,
        }
    }

    /// Size of the GPU allocation, aligned per sub-resource.
    pub fn reserved_size(&self) -> u64 {
        match self {
            ResourceDescriptor::Buffer(settings) => {
                let alignment = if settings.usage.contains(ResourceUsage::CONSTANT) {
                    CONSTANT_BUFFER_ALIGNMENT
                } else {
                    RESOURCE_ALIGNMENT
                };
                align_up(settings.size, alignment)
            }
            ResourceDescriptor::Texture(_) => (0..self.sub_resource_count().raw_count())
                .map(|index| align_up(self.sub_resource_size(index), RESOURCE_ALIGNMENT))
                .sum(),
            ResourceDescriptor::Sampler(_) => 0,
        }
    }

    /// Checks the descriptor for values no backend can create.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ResourceDescriptor::Buffer(settings) => {
                if settings.size == 0 {
                    return Err("buffer size must not be zero".to_string());
                }
                let host_access = ResourceUsage::HOST_READ | ResourceUsage::HOST_WRITE;
                if settings.storage == StorageMode::Private && settings.usage.intersects(host_access) {
                    return Err("host access needs host storage".to_string());
                }
            }
            ResourceDescriptor::Texture(settings) => {
                if settings.width == 0 || settings.height == 0 || settings.depth == 0 {
                    return Err("texture dimensions must not be zero".to_string());
                }
                if settings.array_length == 0 {
                    return Err("texture array length must not be zero".to_string());
                }
                if settings.mip_count == 0 || settings.mip_count > settings.full_mip_count() {
                    return Err(format!(
                        "texture mip count {} is outside 1..={}",
                        settings.mip_count,
                        settings.full_mip_count()
                    ));
                }
                if settings
                    .usage
                    .intersects(ResourceUsage::HOST_READ | ResourceUsage::HOST_WRITE)
                {
                    return Err("textures cannot use host storage".to_string());
                }
            }
            ResourceDescriptor::Sampler(settings) => {
                if settings.lod_clamp.0 > settings.lod_clamp.1 {
                    return Err("sampler lod clamp range is inverted".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
pub fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
