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

//! Resource states, the canonical transition table and per-sub-resource
//! state tracking.

use super::ResourceUsage;
use smallvec::{smallvec, SmallVec};

/// The way the GPU is about to access a resource.
///
/// Before a resource is used in a new way a barrier moves it into the matching
/// state. Which moves are legal is decided by
/// [`can_transition_to`](ResourceState::can_transition_to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Content is undefined. Every resource starts here.
    #[default]
    Undefined,
    /// Generic state usable by any queue.
    Common,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy or upload.
    CopyDest,
    /// Bound as a vertex buffer.
    VertexBuffer,
    /// Bound as an index buffer.
    IndexBuffer,
    /// Bound as a constant (uniform) buffer.
    ConstantBuffer,
    /// Read by shaders.
    ShaderRead,
    /// Written by shaders.
    ShaderWrite,
    /// Written as a color attachment.
    RenderTarget,
    /// Written as a depth attachment.
    DepthWrite,
    /// Read-only depth attachment.
    DepthRead,
    /// Read as indirect draw or dispatch arguments.
    IndirectArgument,
    /// Handed to the presentation engine.
    Present,
}

impl ResourceState {
    /// Every state, in declaration order.
    pub const ALL: [ResourceState; 14] = [
        ResourceState::Undefined,
        ResourceState::Common,
        ResourceState::CopySource,
        ResourceState::CopyDest,
        ResourceState::VertexBuffer,
        ResourceState::IndexBuffer,
        ResourceState::ConstantBuffer,
        ResourceState::ShaderRead,
        ResourceState::ShaderWrite,
        ResourceState::RenderTarget,
        ResourceState::DepthWrite,
        ResourceState::DepthRead,
        ResourceState::IndirectArgument,
        ResourceState::Present,
    ];

    /// States that give an undefined resource defined content.
    pub fn is_initializing(self) -> bool {
        matches!(
            self,
            ResourceState::Common
                | ResourceState::CopyDest
                | ResourceState::RenderTarget
                | ResourceState::DepthWrite
        )
    }

    /// Returns `true` if the canonical transition table allows moving from
    /// `self` to `target`.
    ///
    /// * Nothing transitions back to `Undefined`.
    /// * `Undefined` only transitions to an initializing state.
    /// * `Present` is entered from and left to `RenderTarget`, `CopyDest` or `Common` only.
    /// * Any other pair of states is allowed.
    pub fn can_transition_to(self, target: ResourceState) -> bool {
        use ResourceState::*;
        if target == Undefined {
            return false;
        }
        match (self, target) {
            (Undefined, target) => target.is_initializing(),
            (Present, Present) => true,
            (Present, other) | (other, Present) => matches!(other, RenderTarget | CopyDest | Common),
            _ => true,
        }
    }

    /// Returns `true` if moving from `self` to `target` needs no barrier.
    ///
    /// `ShaderWrite` to `ShaderWrite` still needs one to order consecutive writes.
    pub fn is_noop_transition(self, target: ResourceState) -> bool {
        self == target && target != ResourceState::ShaderWrite
    }

    /// Usage a resource must have been created with to enter this state.
    pub fn required_usage(self) -> ResourceUsage {
        match self {
            ResourceState::Undefined | ResourceState::Common | ResourceState::Present => {
                ResourceUsage::empty()
            }
            ResourceState::CopySource => ResourceUsage::COPY_SRC,
            ResourceState::CopyDest => ResourceUsage::COPY_DST,
            ResourceState::VertexBuffer => ResourceUsage::VERTEX,
            ResourceState::IndexBuffer => ResourceUsage::INDEX,
            ResourceState::ConstantBuffer => ResourceUsage::CONSTANT,
            ResourceState::ShaderRead => ResourceUsage::SHADER_READ,
            ResourceState::ShaderWrite => ResourceUsage::SHADER_WRITE,
            ResourceState::RenderTarget => ResourceUsage::RENDER_TARGET,
            ResourceState::DepthWrite | ResourceState::DepthRead => ResourceUsage::DEPTH_STENCIL,
            ResourceState::IndirectArgument => ResourceUsage::INDIRECT,
        }
    }
}

/// One state change of a resource or of one of its sub-resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// Raw sub-resource index, or `None` for the whole resource.
    pub sub_resource: Option<u32>,
    /// State before the barrier.
    pub before: ResourceState,
    /// State after the barrier.
    pub after: ResourceState,
}

/// Transitions produced by a single planned state change.
pub type StateTransitions = SmallVec<[StateTransition; 4]>;

/// Tracks the state of every sub-resource of a resource.
///
/// While all sub-resources share a state only that state is stored. Changing a
/// single sub-resource splits the tracker into one state per sub-resource, and
/// it merges back as soon as they agree again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTracker {
    count: u32,
    whole: ResourceState,
    per_sub_resource: Option<Vec<ResourceState>>,
}

impl StateTracker {
    /// Creates a tracker for `count` sub-resources, all `Undefined`.
    pub fn new(count: u32) -> Self {
        Self {
            count: count.max(1),
            whole: ResourceState::Undefined,
            per_sub_resource: None,
        }
    }

    /// Number of tracked sub-resources.
    pub fn sub_resource_count(&self) -> u32 {
        self.count
    }

    /// State shared by every sub-resource, or `None` if they differ.
    pub fn state(&self) -> Option<ResourceState> {
        match self.per_sub_resource {
            None => Some(self.whole),
            Some(_) => None,
        }
    }

    /// State of one sub-resource, or `None` if the index is out of range.
    pub fn sub_resource_state(&self, index: u32) -> Option<ResourceState> {
        if index >= self.count {
            return None;
        }
        match &self.per_sub_resource {
            None => Some(self.whole),
            Some(states) => states.get(index as usize).copied(),
        }
    }

    /// Computes the transitions needed to move the whole resource (`None`) or
    /// one sub-resource into `target`, without changing the tracker.
    ///
    /// Returns the offending current state if any transition is illegal. An
    /// empty result means no barrier is needed.
    pub fn plan(
        &self,
        target: ResourceState,
        sub_resource: Option<u32>,
    ) -> Result<StateTransitions, ResourceState> {
        let sub_resource = sub_resource.filter(|_| self.count > 1);
        match (sub_resource, &self.per_sub_resource) {
            (None, None) => Self::plan_one(None, self.whole, target),
            (None, Some(states)) => {
                let mut transitions = StateTransitions::new();
                for (index, &before) in states.iter().enumerate() {
                    transitions.extend(Self::plan_one(Some(index as u32), before, target)?);
                }
                Ok(transitions)
            }
            (Some(index), None) => Self::plan_one(Some(index), self.whole, target),
            (Some(index), Some(states)) => {
                let before = states.get(index as usize).copied().unwrap_or(self.whole);
                Self::plan_one(Some(index), before, target)
            }
        }
    }

    fn plan_one(
        sub_resource: Option<u32>,
        before: ResourceState,
        target: ResourceState,
    ) -> Result<StateTransitions, ResourceState> {
        if !before.can_transition_to(target) {
            return Err(before);
        }
        if before.is_noop_transition(target) {
            return Ok(StateTransitions::new());
        }
        Ok(smallvec![StateTransition {
            sub_resource,
            before,
            after: target,
        }])
    }

    /// Records that the whole resource (`None`) or one sub-resource is now in `target`.
    pub fn commit(&mut self, target: ResourceState, sub_resource: Option<u32>) {
        match sub_resource.filter(|_| self.count > 1) {
            None => {
                self.whole = target;
                self.per_sub_resource = None;
            }
            Some(index) => {
                let whole = self.whole;
                let count = self.count as usize;
                let states = self
                    .per_sub_resource
                    .get_or_insert_with(|| vec![whole; count]);
                if let Some(state) = states.get_mut(index as usize) {
                    *state = target;
                }
                if states.iter().all(|&state| state == target) {
                    self.whole = target;
                    self.per_sub_resource = None;
                }
            }
        }
    }
}
