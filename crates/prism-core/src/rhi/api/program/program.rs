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

//! Programs: a set of shaders and the layout of their arguments.

use super::{ArgumentDeclaration, BindingValues, ProgramBindings, ProgramLayout, ShaderStage, ShaderStages};
use crate::rhi::api::{Chunk, DescriptorManager, Provider};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use std::sync::Arc;

/// Identity of a program within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// A compiled shader of one stage.
#[derive(Debug, Clone)]
pub struct ShaderSettings {
    /// Stage the shader runs in.
    pub stage: ShaderStage,
    /// Entry point in the binary.
    pub entry_function: String,
    /// Compiled shader code. Its format is owned by the backend.
    pub binary: Chunk,
}

impl ShaderSettings {
    /// A shader from in-memory code.
    pub fn new(stage: ShaderStage, entry_function: impl Into<String>, binary: impl Into<Chunk>) -> Self {
        Self {
            stage,
            entry_function: entry_function.into(),
            binary: binary.into(),
        }
    }

    /// A shader whose code is read from `provider` at `path`.
    pub fn load(
        provider: &dyn Provider,
        path: &str,
        stage: ShaderStage,
        entry_function: impl Into<String>,
    ) -> RhiResult<Self> {
        let binary = provider.get_data(path)?;
        log::debug!("Loaded {stage:?} shader '{path}' ({} bytes).", binary.len());
        Ok(Self::new(stage, entry_function, binary))
    }
}

/// Settings of a [`Program`].
#[derive(Debug, Clone, Default)]
pub struct ProgramSettings {
    /// One shader per stage: vertex and fragment, or compute alone.
    pub shaders: Vec<ShaderSettings>,
    /// Declared arguments.
    pub arguments: Vec<ArgumentDeclaration>,
}

/// An immutable set of shaders with their argument layout.
///
/// Binding sets created from a program only hold a weak reference to it;
/// creating copies of a binding set requires the program to be alive.
#[derive(Debug)]
pub struct Program<B: Backend> {
    id: ProgramId,
    name: String,
    layout: Arc<ProgramLayout>,
    shaders: Vec<ShaderSettings>,
    stages: ShaderStages,
    frames_count: u32,
    descriptor_manager: Arc<DescriptorManager<B>>,
}

impl<B: Backend> Program<B> {
    pub(crate) fn new(
        id: ProgramId,
        name: String,
        settings: ProgramSettings,
        frames_count: u32,
        descriptor_manager: Arc<DescriptorManager<B>>,
    ) -> RhiResult<Arc<Self>> {
        let invalid = |reason: String| ValidationError::InvalidSettings(format!("program '{name}': {reason}"));
        if settings.shaders.is_empty() {
            return Err(invalid("no shaders".into()).into());
        }
        let mut stages = ShaderStages::empty();
        for shader in &settings.shaders {
            if stages.contains(shader.stage.stages()) {
                return Err(invalid(format!("more than one {:?} shader", shader.stage)).into());
            }
            stages |= shader.stage.stages();
        }
        if stages.contains(ShaderStages::COMPUTE) && stages != ShaderStages::COMPUTE {
            return Err(invalid("compute shaders cannot be mixed with graphics stages".into()).into());
        }
        if let Some(unused) = settings
            .arguments
            .iter()
            .find(|argument| !argument.id.stages.intersects(stages))
        {
            return Err(invalid(format!("argument '{}' is not used by any shader", unused.id)).into());
        }
        let layout = ProgramLayout::new(&name, settings.arguments)?;
        log::info!(
            "Created program '{name}' with {} shaders and {} arguments.",
            settings.shaders.len(),
            layout.len()
        );
        Ok(Arc::new(Self {
            id,
            name,
            layout: Arc::new(layout),
            shaders: settings.shaders,
            stages,
            frames_count,
            descriptor_manager,
        }))
    }

    /// Identity of the program.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The argument layout.
    pub fn layout(&self) -> &Arc<ProgramLayout> {
        &self.layout
    }

    /// The shaders.
    pub fn shaders(&self) -> &[ShaderSettings] {
        &self.shaders
    }

    /// The shader of a stage.
    pub fn shader(&self, stage: ShaderStage) -> Option<&ShaderSettings> {
        self.shaders.iter().find(|shader| shader.stage == stage)
    }

    /// Stages with a shader.
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    /// Returns `true` for compute programs.
    pub fn is_compute(&self) -> bool {
        self.stages == ShaderStages::COMPUTE
    }

    /// Number of frames in flight of the context.
    pub fn frames_count(&self) -> u32 {
        self.frames_count
    }

    pub(crate) fn descriptor_manager(&self) -> &Arc<DescriptorManager<B>> {
        &self.descriptor_manager
    }

    /// Binds resource views to the program's arguments.
    ///
    /// `frame_index` selects the views of frame-constant arguments and is
    /// required when the program has any.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::UnknownArgument`] for values of undeclared arguments.
    /// * [`ValidationError::MissingArgument`] if a required constant or
    ///   frame-constant argument has no value. Required mutable arguments may
    ///   be supplied later through [`ProgramBindings::create_copy`].
    /// * [`ValidationError::ArgumentTypeMismatch`] /
    ///   [`ValidationError::ArgumentArraySizeMismatch`] for incompatible views.
    pub fn create_bindings(
        self: &Arc<Self>,
        values: BindingValues<B>,
        frame_index: Option<u32>,
    ) -> RhiResult<Arc<ProgramBindings<B>>> {
        ProgramBindings::create(self, values, frame_index)
    }
}
