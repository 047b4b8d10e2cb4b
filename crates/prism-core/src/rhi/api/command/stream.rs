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

//! The backend-neutral command stream a committed list hands to a native queue.

use super::CommandListType;
use crate::rhi::api::{
    ArgumentId, BindingsId, DescriptorHeapKind, DescriptorRange, RenderPass, Resource,
    StateTransition,
};
use crate::rhi::traits::Backend;
use smallvec::SmallVec;
use std::sync::Arc;

/// Width of the indices of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    /// Separate points.
    Point,
    /// Separate lines.
    Line,
    /// Connected lines.
    LineStrip,
    /// Separate triangles.
    #[default]
    Triangle,
    /// Connected triangles.
    TriangleStrip,
}

/// A state change of one resource.
#[derive(Debug)]
pub struct ResourceBarrier<B: Backend> {
    /// The transitioned resource.
    pub resource: Arc<Resource<B>>,
    /// The state change.
    pub transition: StateTransition,
}

/// The descriptor slots of one program argument.
#[derive(Debug)]
pub struct ArgumentTableBinding<B: Backend> {
    /// The argument.
    pub argument: ArgumentId,
    /// Heap holding the slots.
    pub heap: DescriptorHeapKind,
    /// Native table the slots were written to.
    pub table: Arc<B::DescriptorTable>,
    /// The slots.
    pub range: DescriptorRange,
}

/// One recorded command.
#[derive(Debug)]
pub enum Command<B: Backend> {
    /// Resource state barriers.
    Barriers(SmallVec<[ResourceBarrier<B>; 4]>),
    /// Starts a render pass.
    BeginRenderPass {
        /// The pass.
        pass: Arc<RenderPass<B>>,
    },
    /// Ends the active render pass.
    EndRenderPass,
    /// Binds the descriptor slots of program arguments.
    SetArgumentTables {
        /// Binding set the arguments come from.
        bindings: BindingsId,
        /// Arguments (re)bound by this command.
        arguments: SmallVec<[ArgumentTableBinding<B>; 4]>,
    },
    /// Binds vertex buffers to consecutive slots.
    SetVertexBuffers {
        /// The buffers.
        buffers: SmallVec<[Arc<Resource<B>>; 4]>,
    },
    /// Binds the index buffer.
    SetIndexBuffer {
        /// The buffer.
        buffer: Arc<Resource<B>>,
        /// Width of its indices.
        format: IndexFormat,
    },
    /// Non-indexed draw.
    Draw {
        /// Primitive topology.
        primitive: Primitive,
        /// Vertices per instance.
        vertex_count: u32,
        /// First vertex.
        start_vertex: u32,
        /// Instances.
        instance_count: u32,
        /// First instance.
        start_instance: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Primitive topology.
        primitive: Primitive,
        /// Indices per instance.
        index_count: u32,
        /// First index.
        start_index: u32,
        /// Value added to every index.
        base_vertex: i32,
        /// Instances.
        instance_count: u32,
        /// First instance.
        start_instance: u32,
    },
    /// Compute dispatch.
    Dispatch {
        /// Thread groups along each axis.
        thread_groups: [u32; 3],
    },
    /// Buffer to buffer copy.
    CopyBuffer {
        /// Source buffer.
        source: Arc<Resource<B>>,
        /// Byte offset in the source.
        source_offset: u64,
        /// Destination buffer.
        destination: Arc<Resource<B>>,
        /// Byte offset in the destination.
        destination_offset: u64,
        /// Bytes to copy.
        size: u64,
    },
    /// Upload of CPU data into a sub-resource.
    Upload {
        /// Destination resource.
        destination: Arc<Resource<B>>,
        /// Raw destination sub-resource.
        sub_resource: u32,
        /// Byte offset inside the sub-resource.
        offset: u64,
        /// The bytes.
        data: Arc<[u8]>,
    },
    /// Writes the GPU timestamp into a query.
    WriteTimestamp {
        /// Query heap.
        heap: Arc<B::QueryHeap>,
        /// Query index.
        index: u32,
    },
    /// Opens a named debug group.
    PushDebugGroup(String),
    /// Closes the innermost debug group.
    PopDebugGroup,
}

/// The commands of one committed list.
#[derive(Debug)]
pub struct CommandStream<B: Backend> {
    /// Name of the list.
    pub list_name: String,
    /// Type of the list.
    pub list_type: CommandListType,
    /// The commands, in recording order.
    pub commands: Vec<Command<B>>,
}
