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

//! Program argument declarations and the layout resolving them.

use crate::rhi::api::{DescriptorHeapKind, ResourceKind, ResourceState, ResourceUsage};
use crate::rhi::error::ValidationError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

bitflags! {
    /// A set of shader stages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
        /// Every stage.
        const ALL = Self::VERTEX.bits() | Self::FRAGMENT.bits() | Self::COMPUTE.bits();
    }
}

/// One programmable stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
    /// Compute stage.
    Compute,
}

impl ShaderStage {
    /// The stage as a set.
    pub fn stages(self) -> ShaderStages {
        match self {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::Fragment => ShaderStages::FRAGMENT,
            ShaderStage::Compute => ShaderStages::COMPUTE,
        }
    }
}

/// Identifies a program argument: the stages that access it and its name in
/// the shader source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArgumentId {
    /// Stages reading the argument.
    pub stages: ShaderStages,
    /// Shader name of the argument.
    pub name: String,
}

impl ArgumentId {
    /// An argument of the given stages.
    pub fn new(stages: ShaderStages, name: impl Into<String>) -> Self {
        Self {
            stages,
            name: name.into(),
        }
    }

    /// An argument shared by every stage.
    pub fn all(name: impl Into<String>) -> Self {
        Self::new(ShaderStages::ALL, name)
    }
}

impl fmt::Display for ArgumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What kind of view an argument binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgumentKind {
    /// Uniform data.
    ConstantBuffer,
    /// Read-only structured buffer.
    Buffer,
    /// Read-write structured buffer.
    RwBuffer,
    /// Sampled texture.
    Texture,
    /// Read-write texture.
    RwTexture,
    /// Sampler.
    Sampler,
}

impl ArgumentKind {
    /// The kind of resource the bound views must point at.
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            ArgumentKind::ConstantBuffer | ArgumentKind::Buffer | ArgumentKind::RwBuffer => {
                ResourceKind::Buffer
            }
            ArgumentKind::Texture | ArgumentKind::RwTexture => ResourceKind::Texture,
            ArgumentKind::Sampler => ResourceKind::Sampler,
        }
    }

    /// The descriptor heap holding the argument's slots.
    pub fn heap(self) -> DescriptorHeapKind {
        DescriptorHeapKind::for_resource(self.resource_kind())
    }

    /// Usage the bound resources need.
    pub fn required_usage(self) -> ResourceUsage {
        match self {
            ArgumentKind::ConstantBuffer => ResourceUsage::CONSTANT,
            ArgumentKind::Buffer | ArgumentKind::Texture => ResourceUsage::SHADER_READ,
            ArgumentKind::RwBuffer | ArgumentKind::RwTexture => ResourceUsage::SHADER_WRITE,
            ArgumentKind::Sampler => ResourceUsage::empty(),
        }
    }

    /// State bound resources are moved into when barriers are applied.
    /// Samplers have no state.
    pub fn required_state(self) -> Option<ResourceState> {
        match self {
            ArgumentKind::ConstantBuffer => Some(ResourceState::ConstantBuffer),
            ArgumentKind::Buffer | ArgumentKind::Texture => Some(ResourceState::ShaderRead),
            ArgumentKind::RwBuffer | ArgumentKind::RwTexture => Some(ResourceState::ShaderWrite),
            ArgumentKind::Sampler => None,
        }
    }
}

/// How often the views of an argument change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArgumentAccess {
    /// Bound once for every frame. Cannot be replaced in copies.
    Constant,
    /// Bound once with one view list per frame in flight. Cannot be replaced in copies.
    FrameConstant,
    /// May be replaced in copies of the binding set.
    #[default]
    Mutable,
}

impl ArgumentAccess {
    /// Returns `true` for arguments that cannot change after creation.
    pub fn is_constant(self) -> bool {
        !matches!(self, ArgumentAccess::Mutable)
    }
}

/// Register and register space of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BindingPoint {
    /// Register.
    pub register: u32,
    /// Register space.
    pub space: u32,
}

impl BindingPoint {
    /// A register in space zero.
    pub fn new(register: u32) -> Self {
        Self { register, space: 0 }
    }
}

/// Declaration of one program argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDeclaration {
    /// Identity.
    pub id: ArgumentId,
    /// Kind of bound views.
    pub kind: ArgumentKind,
    /// Register binding.
    pub binding: BindingPoint,
    /// Number of views bound.
    pub array_size: u32,
    /// Update frequency.
    pub access: ArgumentAccess,
    /// Optional arguments may stay unbound.
    pub optional: bool,
}

impl ArgumentDeclaration {
    /// A required, mutable, single-view argument.
    pub fn new(id: ArgumentId, kind: ArgumentKind, binding: BindingPoint) -> Self {
        Self {
            id,
            kind,
            binding,
            array_size: 1,
            access: ArgumentAccess::Mutable,
            optional: false,
        }
    }

    /// Sets the number of views.
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    /// Sets the update frequency.
    pub fn with_access(mut self, access: ArgumentAccess) -> Self {
        self.access = access;
        self
    }

    /// Marks the argument optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Where an argument's views live inside a binding set's descriptor ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSlot {
    /// Heap of the slots.
    pub heap: DescriptorHeapKind,
    /// Offset inside the binding set's range of that heap.
    pub offset: u32,
    /// Number of slots.
    pub count: u32,
}

/// The validated argument declarations of a program with their slot layout.
#[derive(Debug, Clone)]
pub struct ProgramLayout {
    arguments: BTreeMap<ArgumentId, ArgumentDeclaration>,
    slots: BTreeMap<ArgumentId, ArgumentSlot>,
    descriptor_counts: [u32; 2],
}

impl ProgramLayout {
    /// Validates declarations and assigns descriptor slots in declaration order.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::DuplicateArgumentDeclaration`] if two arguments
    ///   share a name and a stage, or a register of the same heap and stage.
    /// * [`ValidationError::InvalidSettings`] for empty arrays.
    pub fn new(
        program: &str,
        declarations: Vec<ArgumentDeclaration>,
    ) -> Result<Self, ValidationError> {
        let mut arguments = BTreeMap::new();
        let mut slots = BTreeMap::new();
        let mut descriptor_counts = [0u32; 2];
        for (index, declaration) in declarations.iter().enumerate() {
            if declaration.array_size == 0 {
                return Err(ValidationError::InvalidSettings(format!(
                    "argument '{}' of program '{program}' has an empty array",
                    declaration.id
                )));
            }
            let conflict = declarations[..index].iter().any(|other| {
                let shared_stages = other.id.stages.intersects(declaration.id.stages);
                let same_name = other.id.name == declaration.id.name;
                let same_register = other.binding == declaration.binding
                    && other.kind.heap() == declaration.kind.heap();
                shared_stages && (same_name || same_register)
            });
            if conflict {
                return Err(ValidationError::DuplicateArgumentDeclaration {
                    program: program.to_string(),
                    argument: declaration.id.name.clone(),
                });
            }
            let heap = declaration.kind.heap();
            slots.insert(
                declaration.id.clone(),
                ArgumentSlot {
                    heap,
                    offset: descriptor_counts[heap.index()],
                    count: declaration.array_size,
                },
            );
            descriptor_counts[heap.index()] += declaration.array_size;
            arguments.insert(declaration.id.clone(), declaration.clone());
        }
        Ok(Self {
            arguments,
            slots,
            descriptor_counts,
        })
    }

    /// Finds the declaration an id refers to: the exact id, or else the only
    /// argument of that name whose stages include the requested ones.
    pub fn resolve(&self, id: &ArgumentId) -> Option<&ArgumentDeclaration> {
        if let Some(declaration) = self.arguments.get(id) {
            return Some(declaration);
        }
        let mut candidates = self.arguments.values().filter(|declaration| {
            declaration.id.name == id.name && declaration.id.stages.contains(id.stages)
        });
        match (candidates.next(), candidates.next()) {
            (Some(declaration), None) => Some(declaration),
            _ => None,
        }
    }

    /// Every declaration, ordered by id.
    pub fn arguments(&self) -> impl Iterator<Item = &ArgumentDeclaration> {
        self.arguments.values()
    }

    /// Number of declared arguments.
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    /// Returns `true` for programs without arguments.
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Descriptor slots of an argument.
    pub fn slot(&self, id: &ArgumentId) -> Option<ArgumentSlot> {
        self.slots.get(id).copied()
    }

    /// Descriptor slots one binding set needs in a heap.
    pub fn descriptor_count(&self, heap: DescriptorHeapKind) -> u32 {
        self.descriptor_counts[heap.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(name: &str, register: u32) -> ArgumentDeclaration {
        ArgumentDeclaration::new(
            ArgumentId::new(ShaderStages::FRAGMENT, name),
            ArgumentKind::Texture,
            BindingPoint::new(register),
        )
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = ProgramLayout::new("p", vec![texture("albedo", 0), texture("albedo", 1)]);
        assert!(matches!(
            result,
            Err(ValidationError::DuplicateArgumentDeclaration { argument, .. }) if argument == "albedo"
        ));
    }

    #[test]
    fn test_duplicate_registers_are_rejected() {
        let result = ProgramLayout::new("p", vec![texture("albedo", 0), texture("normals", 0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_same_register_in_other_heap_is_allowed() {
        let sampler = ArgumentDeclaration::new(
            ArgumentId::new(ShaderStages::FRAGMENT, "sampler"),
            ArgumentKind::Sampler,
            BindingPoint::new(0),
        );
        let layout = ProgramLayout::new("p", vec![texture("albedo", 0), sampler]).unwrap();
        assert_eq!(layout.descriptor_count(DescriptorHeapKind::ShaderResources), 1);
        assert_eq!(layout.descriptor_count(DescriptorHeapKind::Samplers), 1);
    }

    #[test]
    fn test_slots_follow_declaration_order() {
        let layout = ProgramLayout::new(
            "p",
            vec![texture("albedo", 0).with_array_size(3), texture("normals", 3)],
        )
        .unwrap();
        let normals = layout
            .slot(&ArgumentId::new(ShaderStages::FRAGMENT, "normals"))
            .unwrap();
        assert_eq!(normals.offset, 3);
        assert_eq!(normals.count, 1);
        assert_eq!(layout.descriptor_count(DescriptorHeapKind::ShaderResources), 4);
    }

    #[test]
    fn test_resolve_falls_back_to_wider_stages() {
        let shared = ArgumentDeclaration::new(
            ArgumentId::all("constants"),
            ArgumentKind::ConstantBuffer,
            BindingPoint::new(1),
        );
        let layout = ProgramLayout::new("p", vec![shared]).unwrap();
        let found = layout.resolve(&ArgumentId::new(ShaderStages::VERTEX, "constants"));
        assert_eq!(found.map(|d| d.kind), Some(ArgumentKind::ConstantBuffer));
        assert!(layout.resolve(&ArgumentId::all("missing")).is_none());
    }
}
