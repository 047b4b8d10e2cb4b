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

//! Program bindings: resource views bound to the arguments of a program.

use super::{
    ArgumentAccess, ArgumentDeclaration, ArgumentId, ArgumentSlot, Program, ProgramId, ProgramLayout,
};
use crate::rhi::api::{
    ArgumentTableBinding, Command, DescriptorHeapKind, DescriptorManager, DescriptorRange,
    ProgramBindingsTarget, ResourceId, ResourceView, ViewSettings,
};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use bitflags::bitflags;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Identity of a binding set within its descriptor manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingsId(pub u64);

/// The views bound to one argument.
#[derive(Debug)]
pub enum BindingValue<B: Backend> {
    /// The same views for every frame.
    Views(Vec<ResourceView<B>>),
    /// One view list per frame in flight, for frame-constant arguments.
    PerFrame(Vec<Vec<ResourceView<B>>>),
}

impl<B: Backend> BindingValue<B> {
    /// A single view.
    pub fn view(view: ResourceView<B>) -> Self {
        BindingValue::Views(vec![view])
    }

    /// The views used for `frame_index`.
    pub fn views(&self, frame_index: Option<u32>) -> &[ResourceView<B>] {
        match self {
            BindingValue::Views(views) => views,
            BindingValue::PerFrame(frames) => frame_index
                .and_then(|index| frames.get(index as usize))
                .map_or(&[][..], Vec::as_slice),
        }
    }

    fn view_lists(&self) -> Box<dyn Iterator<Item = &Vec<ResourceView<B>>> + '_> {
        match self {
            BindingValue::Views(views) => Box::new(std::iter::once(views)),
            BindingValue::PerFrame(frames) => Box::new(frames.iter()),
        }
    }
}

impl<B: Backend> Clone for BindingValue<B> {
    fn clone(&self) -> Self {
        match self {
            BindingValue::Views(views) => BindingValue::Views(views.clone()),
            BindingValue::PerFrame(frames) => BindingValue::PerFrame(frames.clone()),
        }
    }
}

/// Argument values given to [`Program::create_bindings`] and
/// [`ProgramBindings::create_copy`].
pub type BindingValues<B> = Vec<(ArgumentId, BindingValue<B>)>;

/// A validated value bound to a declared argument. Shared between a binding
/// set and the copies that did not replace it.
#[derive(Debug)]
pub struct ArgumentBinding<B: Backend> {
    declaration: ArgumentDeclaration,
    value: BindingValue<B>,
}

impl<B: Backend> ArgumentBinding<B> {
    fn new(
        program: &str,
        declaration: &ArgumentDeclaration,
        value: BindingValue<B>,
        frames_count: u32,
        frame_index: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let argument = || declaration.id.name.clone();
        let type_mismatch = |reason: String| ValidationError::ArgumentTypeMismatch {
            program: program.to_string(),
            argument: argument(),
            expected: declaration.kind,
            reason,
        };
        if let BindingValue::PerFrame(frames) = &value {
            if declaration.access != ArgumentAccess::FrameConstant {
                return Err(ValidationError::PerFrameViewsNotAllowed {
                    program: program.to_string(),
                    argument: argument(),
                });
            }
            if frames.len() != frames_count as usize {
                return Err(type_mismatch(format!(
                    "{} per-frame view lists for {frames_count} frames in flight",
                    frames.len()
                )));
            }
            if frame_index.is_none() {
                return Err(ValidationError::FrameIndexRequired {
                    program: program.to_string(),
                    argument: argument(),
                });
            }
        }
        for views in value.view_lists() {
            if views.len() != declaration.array_size as usize {
                return Err(ValidationError::ArgumentArraySizeMismatch {
                    program: program.to_string(),
                    argument: argument(),
                    expected: declaration.array_size,
                    actual: views.len() as u32,
                });
            }
            for view in views {
                let resource = view.resource();
                if resource.kind() != declaration.kind.resource_kind() {
                    return Err(type_mismatch(format!(
                        "'{}' is a {:?}",
                        resource.name(),
                        resource.kind()
                    )));
                }
                let required = declaration.kind.required_usage();
                if !resource.usage().contains(required) {
                    return Err(type_mismatch(format!(
                        "'{}' lacks {required:?} usage",
                        resource.name()
                    )));
                }
            }
        }
        Ok(Self {
            declaration: declaration.clone(),
            value,
        })
    }

    /// The declaration of the bound argument.
    pub fn declaration(&self) -> &ArgumentDeclaration {
        &self.declaration
    }

    /// The bound value.
    pub fn value(&self) -> &BindingValue<B> {
        &self.value
    }

    /// The views used for `frame_index`.
    pub fn views(&self, frame_index: Option<u32>) -> &[ResourceView<B>] {
        self.value.views(frame_index)
    }
}

bitflags! {
    /// Controls what [`ProgramBindings::apply`] records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ApplyBehavior: u32 {
        /// Constant and frame-constant arguments whose views are already
        /// bound on the list are not bound again.
        const CONSTANT_ONCE = 1 << 0;
        /// Mutable arguments whose views are already bound on the list are
        /// not bound again.
        const CHANGES_ONLY = 1 << 1;
        /// Bound resources are transitioned to the state their argument kind reads them in.
        const STATE_BARRIERS = 1 << 2;
    }
}

impl Default for ApplyBehavior {
    fn default() -> Self {
        ApplyBehavior::all()
    }
}

type TableRange<B> = (Arc<<B as Backend>::DescriptorTable>, DescriptorRange);

/// What a list last bound to an argument: the descriptor table and the views
/// written into it.
#[derive(Debug)]
pub(crate) struct AppliedArgument<B: Backend> {
    table: Arc<B::DescriptorTable>,
    views: SmallVec<[(ResourceId, ViewSettings); 1]>,
}

impl<B: Backend> AppliedArgument<B> {
    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table) && self.views == other.views
    }
}

/// Descriptor slots of a binding set in each heap.
#[derive(Debug)]
struct DescriptorState<B: Backend> {
    ranges: [Option<DescriptorRange>; 2],
    tables: [Option<(Arc<B::DescriptorTable>, u64)>; 2],
}

/// Views bound to the arguments of a program, for one frame slot.
///
/// Binding sets are immutable: [`create_copy`](Self::create_copy) builds a
/// new set sharing every argument binding it does not replace. Descriptor
/// slots are allocated on the first apply or by
/// `DescriptorManager::complete_initialization`, and are retired when the
/// set is dropped.
#[derive(Debug)]
pub struct ProgramBindings<B: Backend> {
    id: BindingsId,
    program: Weak<Program<B>>,
    program_id: ProgramId,
    program_name: String,
    layout: Arc<ProgramLayout>,
    frame_index: Option<u32>,
    frames_count: u32,
    arguments: BTreeMap<ArgumentId, Arc<ArgumentBinding<B>>>,
    descriptor_manager: Arc<DescriptorManager<B>>,
    descriptors: Mutex<DescriptorState<B>>,
}

impl<B: Backend> ProgramBindings<B> {
    fn check_frame_index(frame_index: Option<u32>, frames_count: u32) -> Result<(), ValidationError> {
        match frame_index {
            Some(index) if index >= frames_count => Err(ValidationError::FrameIndexOutOfRange {
                index,
                frames_count,
            }),
            _ => Ok(()),
        }
    }

    /// Validates `values` against the layout and adds them to `arguments`.
    fn bind_values(
        program: &Program<B>,
        arguments: &mut BTreeMap<ArgumentId, Arc<ArgumentBinding<B>>>,
        values: BindingValues<B>,
        frame_index: Option<u32>,
        replacing: bool,
    ) -> Result<(), ValidationError> {
        let mut bound: Vec<ArgumentId> = Vec::with_capacity(values.len());
        for (id, value) in values {
            let declaration = program
                .layout()
                .resolve(&id)
                .ok_or_else(|| ValidationError::UnknownArgument {
                    program: program.name().to_string(),
                    argument: id.name.clone(),
                })?;
            if bound.contains(&declaration.id) {
                return Err(ValidationError::DuplicateArgumentValue {
                    program: program.name().to_string(),
                    argument: id.name,
                });
            }
            if replacing && declaration.access.is_constant() {
                return Err(ValidationError::ConstantArgumentReplaced {
                    program: program.name().to_string(),
                    argument: id.name,
                });
            }
            let binding = ArgumentBinding::new(
                program.name(),
                declaration,
                value,
                program.frames_count(),
                frame_index,
            )?;
            bound.push(declaration.id.clone());
            arguments.insert(declaration.id.clone(), Arc::new(binding));
        }
        Ok(())
    }

    pub(crate) fn create(
        program: &Arc<Program<B>>,
        values: BindingValues<B>,
        frame_index: Option<u32>,
    ) -> RhiResult<Arc<Self>> {
        Self::check_frame_index(frame_index, program.frames_count())?;
        let mut arguments = BTreeMap::new();
        Self::bind_values(program, &mut arguments, values, frame_index, false)?;
        if let Some(missing) = program.layout().arguments().find(|declaration| {
            declaration.access.is_constant()
                && !declaration.optional
                && !arguments.contains_key(&declaration.id)
        }) {
            return Err(ValidationError::MissingArgument {
                program: program.name().to_string(),
                argument: missing.id.name.clone(),
            }
            .into());
        }
        Ok(Self::register(program, arguments, frame_index))
    }

    fn register(
        program: &Arc<Program<B>>,
        arguments: BTreeMap<ArgumentId, Arc<ArgumentBinding<B>>>,
        frame_index: Option<u32>,
    ) -> Arc<Self> {
        let descriptor_manager = Arc::clone(program.descriptor_manager());
        let bindings = Arc::new(Self {
            id: BindingsId(descriptor_manager.next_bindings_id()),
            program: Arc::downgrade(program),
            program_id: program.id(),
            program_name: program.name().to_string(),
            layout: Arc::clone(program.layout()),
            frame_index,
            frames_count: program.frames_count(),
            arguments,
            descriptor_manager,
            descriptors: Mutex::new(DescriptorState {
                ranges: [None, None],
                tables: [None, None],
            }),
        });
        bindings.descriptor_manager.add_program_bindings(&bindings);
        log::trace!(
            "Created bindings {:?} of program '{}' for frame {frame_index:?}.",
            bindings.id,
            bindings.program_name
        );
        bindings
    }

    /// Identity of the set.
    pub fn id(&self) -> BindingsId {
        self.id
    }

    /// The program the views are bound to, if it is still alive.
    pub fn program(&self) -> Option<Arc<Program<B>>> {
        self.program.upgrade()
    }

    /// Identity of the program.
    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    /// The frame slot of the set.
    pub fn frame_index(&self) -> Option<u32> {
        self.frame_index
    }

    /// The binding of an argument, if bound.
    pub fn argument(&self, id: &ArgumentId) -> Option<&Arc<ArgumentBinding<B>>> {
        self.layout
            .resolve(id)
            .and_then(|declaration| self.arguments.get(&declaration.id))
    }

    /// Slots allocated to the set in a heap, once allocated. `None` after the
    /// descriptor manager was released.
    pub fn descriptor_range(&self, heap: DescriptorHeapKind) -> Option<DescriptorRange> {
        if self.descriptor_manager.is_released() {
            return None;
        }
        self.descriptors.lock().ranges[heap.index()]
    }

    /// Every bound argument.
    pub fn arguments(&self) -> impl Iterator<Item = (&ArgumentId, &Arc<ArgumentBinding<B>>)> {
        self.arguments.iter()
    }

    /// Creates a set sharing every argument binding not named in
    /// `replacements`. `frame_index` overrides the frame slot of the copy.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::ProgramReleased`] if the program was dropped.
    /// * [`ValidationError::ConstantArgumentReplaced`] for constant and
    ///   frame-constant arguments.
    /// * The binding errors of [`Program::create_bindings`].
    pub fn create_copy(
        &self,
        replacements: BindingValues<B>,
        frame_index: Option<u32>,
    ) -> RhiResult<Arc<Self>> {
        let program = self.program.upgrade().ok_or_else(|| ValidationError::ProgramReleased {
            program: self.program_name.clone(),
        })?;
        let frame_index = frame_index.or(self.frame_index);
        Self::check_frame_index(frame_index, self.frames_count)?;
        let mut arguments = self.arguments.clone();
        Self::bind_values(&program, &mut arguments, replacements, frame_index, true)?;
        Ok(Self::register(&program, arguments, frame_index))
    }

    fn missing_argument(&self) -> Option<&ArgumentDeclaration> {
        self.layout.arguments().find(|declaration| {
            !declaration.optional && !self.arguments.contains_key(&declaration.id)
        })
    }

    /// Slots this set still needs in a heap.
    pub(crate) fn pending_descriptor_count(&self, heap: DescriptorHeapKind) -> u32 {
        if self.descriptors.lock().ranges[heap.index()].is_some() {
            0
        } else {
            self.layout.descriptor_count(heap)
        }
    }

    /// Allocates the slots of the set and writes its views into them. Views
    /// are written again whenever the heap's native table was replaced.
    pub(crate) fn ensure_descriptors(&self) -> RhiResult<[Option<TableRange<B>>; 2]> {
        let mut descriptors = self.descriptors.lock();
        let mut result = [None, None];
        for heap in DescriptorHeapKind::ALL {
            let count = self.layout.descriptor_count(heap);
            if count == 0 {
                continue;
            }
            let index = heap.index();
            let range = match descriptors.ranges[index] {
                Some(range) => range,
                None => {
                    let range = self.descriptor_manager.allocate(heap, count)?;
                    descriptors.ranges[index] = Some(range);
                    range
                }
            };
            let current = self.descriptor_manager.generation(heap);
            let table = match &descriptors.tables[index] {
                Some((table, generation)) if *generation == current => Arc::clone(table),
                _ => {
                    let written = self.write_descriptors(heap, range)?;
                    descriptors.tables[index] = Some((Arc::clone(&written.0), written.1));
                    written.0
                }
            };
            result[index] = Some((table, range));
        }
        Ok(result)
    }

    fn write_descriptors(
        &self,
        heap: DescriptorHeapKind,
        range: DescriptorRange,
    ) -> RhiResult<(Arc<B::DescriptorTable>, u64)> {
        let mut written = None;
        for (id, binding) in &self.arguments {
            let Some(slot) = self.layout.slot(id).filter(|slot| slot.heap == heap) else {
                continue;
            };
            let views: Vec<_> = binding
                .views(self.frame_index)
                .iter()
                .map(ResourceView::native_view)
                .collect();
            let slots = DescriptorRange::new(range.offset + slot.offset, slot.count);
            written = Some(self.descriptor_manager.write(heap, slots, &views)?);
        }
        match written {
            Some(written) => Ok(written),
            None => self.descriptor_manager.write(heap, range, &[]),
        }
    }

    /// Binds the views on `list` for its next draws or dispatches.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::MissingArgument`] if a required argument is unbound.
    /// * [`ValidationError::DescriptorHeapReleased`] after the descriptor
    ///   manager was released.
    /// * The transition errors of `STATE_BARRIERS`.
    ///
    /// Validation errors invalidate the list.
    pub fn apply(
        self: &Arc<Self>,
        list: &dyn ProgramBindingsTarget<B>,
        behavior: ApplyBehavior,
    ) -> RhiResult<()> {
        list.core().record("apply program bindings", |recording| {
            if self.descriptor_manager.is_released() {
                return Err(ValidationError::DescriptorHeapReleased.into());
            }
            if let Some(missing) = self.missing_argument() {
                return Err(ValidationError::MissingArgument {
                    program: self.program_name.clone(),
                    argument: missing.id.name.clone(),
                }
                .into());
            }
            let tables = self.ensure_descriptors()?;

            if recording.bound_program != Some(self.program_id) {
                recording.bound_program = Some(self.program_id);
                recording.bound_arguments.clear();
            }
            let mut bound: SmallVec<[ArgumentTableBinding<B>; 4]> = SmallVec::new();
            for (id, binding) in &self.arguments {
                let views = binding.views(self.frame_index);
                for view in views {
                    recording.retain(view.resource());
                }
                if behavior.contains(ApplyBehavior::STATE_BARRIERS) {
                    if let Some(state) = binding.declaration.kind.required_state() {
                        for view in views {
                            recording.transition_view(view, state)?;
                        }
                    }
                }
                let Some(ArgumentSlot { heap, offset, count }) = self.layout.slot(id) else {
                    continue;
                };
                let Some((table, range)) = &tables[heap.index()] else {
                    continue;
                };
                let applied = AppliedArgument {
                    table: Arc::clone(table),
                    views: views.iter().map(ResourceView::key).collect(),
                };
                let already_bound = recording
                    .bound_arguments
                    .get(id)
                    .is_some_and(|previous| previous.same_as(&applied));
                let skip = already_bound
                    && if binding.declaration.access.is_constant() {
                        behavior.contains(ApplyBehavior::CONSTANT_ONCE)
                    } else {
                        behavior.contains(ApplyBehavior::CHANGES_ONLY)
                    };
                if skip {
                    continue;
                }
                bound.push(ArgumentTableBinding {
                    argument: id.clone(),
                    heap,
                    table: Arc::clone(table),
                    range: DescriptorRange::new(range.offset + offset, count),
                });
                recording.bound_arguments.insert(id.clone(), applied);
            }
            recording.retain_bindings(self);
            log::trace!(
                "Applied bindings {:?} of '{}': {} arguments bound.",
                self.id,
                self.program_name,
                bound.len()
            );
            if !bound.is_empty() {
                recording.commands.push(Command::SetArgumentTables {
                    bindings: self.id,
                    arguments: bound,
                });
            }
            Ok(())
        })
    }
}

impl<B: Backend> Drop for ProgramBindings<B> {
    fn drop(&mut self) {
        let ranges = std::mem::take(&mut self.descriptors.get_mut().ranges);
        for heap in DescriptorHeapKind::ALL {
            if let Some(range) = ranges[heap.index()] {
                self.descriptor_manager.retire(heap, range);
            }
        }
    }
}
