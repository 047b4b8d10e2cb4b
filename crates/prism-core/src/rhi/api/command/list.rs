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

//! The state shared by every command list type and the [`CommandList`] trait.

use super::{
    Command, CommandListState, CommandListType, CommandQueue, CommandStream, IndexFormat,
    ResourceBarrier,
};
use crate::rhi::api::{
    AppliedArgument, ArgumentId, BindingsId, FenceTicket, ProgramBindings, ProgramId, RenderPass,
    Resource, ResourceId, ResourceKind, ResourceState, ResourceView, StateTransition,
    SubResourceIndex,
};
use crate::rhi::error::{RhiError, RhiResult, ValidationError};
use crate::rhi::traits::Backend;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// An identifier of a command list, unique within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListId(pub u64);

/// Everything a list accumulates between two resets.
#[derive(Debug)]
pub(crate) struct Recording<B: Backend> {
    pub(crate) state: CommandListState,
    /// Nothing but the reset preamble was recorded.
    pub(crate) fresh: bool,
    pub(crate) commands: Vec<Command<B>>,
    /// State changes made by barriers that were not committed yet, in recording order.
    uncommitted_transitions: Vec<(Arc<Resource<B>>, StateTransition)>,
    pub(crate) retained_resources: HashMap<ResourceId, Arc<Resource<B>>>,
    pub(crate) retained_bindings: HashMap<BindingsId, Arc<ProgramBindings<B>>>,
    pub(crate) stream: Option<Arc<CommandStream<B>>>,
    pub(crate) ticket: Option<FenceTicket<B>>,
    pub(crate) debug_groups: Vec<String>,
    pub(crate) bound_program: Option<ProgramId>,
    pub(crate) bound_arguments: HashMap<ArgumentId, AppliedArgument<B>>,
    pub(crate) render_pass: Option<Arc<RenderPass<B>>>,
    pub(crate) pass_active: bool,
    pub(crate) index_buffer: Option<(Arc<Resource<B>>, IndexFormat)>,
}

impl<B: Backend> Recording<B> {
    fn new() -> Self {
        Self {
            state: CommandListState::Pending,
            fresh: true,
            commands: Vec::new(),
            uncommitted_transitions: Vec::new(),
            retained_resources: HashMap::new(),
            retained_bindings: HashMap::new(),
            stream: None,
            ticket: None,
            debug_groups: Vec::new(),
            bound_program: None,
            bound_arguments: HashMap::new(),
            render_pass: None,
            pass_active: false,
            index_buffer: None,
        }
    }

    /// Drops everything recorded, keeping the render pass the list was created for.
    ///
    /// Resources moved by barriers that never got committed are put back in
    /// the state they had before.
    fn clear(&mut self) {
        for (resource, transition) in self.uncommitted_transitions.drain(..).rev() {
            resource.revert_transition(&transition);
        }
        self.commands.clear();
        self.release_retained();
        self.ticket = None;
        self.debug_groups.clear();
        self.bound_program = None;
        self.bound_arguments.clear();
        self.pass_active = false;
        self.index_buffer = None;
    }

    fn release_retained(&mut self) {
        self.retained_resources.clear();
        self.retained_bindings.clear();
        self.stream = None;
    }

    pub(crate) fn retain(&mut self, resource: &Arc<Resource<B>>) {
        self.retained_resources
            .entry(resource.id())
            .or_insert_with(|| Arc::clone(resource));
    }

    pub(crate) fn retain_bindings(&mut self, bindings: &Arc<ProgramBindings<B>>) {
        self.retained_bindings
            .entry(bindings.id())
            .or_insert_with(|| Arc::clone(bindings));
    }

    /// Records the barriers moving a resource into `target`. Consecutive
    /// barriers are merged into one command.
    pub(crate) fn transition(
        &mut self,
        resource: &Arc<Resource<B>>,
        target: ResourceState,
        sub_resource: Option<u32>,
    ) -> RhiResult<()> {
        resource.check_device_generation()?;
        let transitions = resource.transition(target, sub_resource)?;
        self.retain(resource);
        if transitions.is_empty() {
            return Ok(());
        }
        self.uncommitted_transitions.extend(
            transitions
                .iter()
                .map(|transition| (Arc::clone(resource), *transition)),
        );
        let barriers = transitions.into_iter().map(|transition| ResourceBarrier {
            resource: Arc::clone(resource),
            transition,
        });
        match self.commands.last_mut() {
            Some(Command::Barriers(existing)) => existing.extend(barriers),
            _ => self.commands.push(Command::Barriers(barriers.collect())),
        }
        Ok(())
    }

    /// Transitions the sub-resources a view covers.
    pub(crate) fn transition_view(
        &mut self,
        view: &ResourceView<B>,
        target: ResourceState,
    ) -> RhiResult<()> {
        match view.sub_resources() {
            None => self.transition(view.resource(), target, None),
            Some(range) => range
                .into_iter()
                .try_for_each(|raw| self.transition(view.resource(), target, Some(raw))),
        }
    }

    /// Completes the list once its fence value was reached.
    fn refresh(&mut self, name: &str) {
        if self.state != CommandListState::Executing {
            return;
        }
        if self.ticket.as_ref().is_some_and(FenceTicket::is_completed) {
            self.state = CommandListState::Completed;
            self.release_retained();
            log::trace!("Command list '{name}' completed.");
        }
    }

    fn is_gpu_idle(&self) -> bool {
        self.ticket.as_ref().is_none_or(FenceTicket::is_completed)
    }
}

/// The queue, identity and recording state shared by every list type.
#[derive(Debug)]
pub struct CommandListCore<B: Backend> {
    id: CommandListId,
    name: String,
    list_type: CommandListType,
    queue: Arc<CommandQueue<B>>,
    recording: Mutex<Recording<B>>,
}

impl<B: Backend> CommandListCore<B> {
    pub(crate) fn new(
        queue: &Arc<CommandQueue<B>>,
        list_type: CommandListType,
        name: String,
    ) -> RhiResult<Arc<Self>> {
        if !queue.list_type().accepts(list_type) {
            return Err(ValidationError::CommandListTypeMismatch {
                list: name,
                expected: queue.list_type(),
                actual: list_type,
            }
            .into());
        }
        let id = queue.next_list_id();
        log::debug!("Created {list_type:?} command list '{name}' on queue '{}'.", queue.name());
        Ok(Arc::new(Self {
            id,
            name,
            list_type,
            queue: Arc::clone(queue),
            recording: Mutex::new(Recording::new()),
        }))
    }

    /// Identity of the list.
    pub fn id(&self) -> CommandListId {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type of work the list records.
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// The queue the list executes on.
    pub fn queue(&self) -> &Arc<CommandQueue<B>> {
        &self.queue
    }

    /// Current state. A list whose fence value was reached is completed here.
    pub fn state(&self) -> CommandListState {
        let mut recording = self.recording.lock();
        recording.refresh(&self.name);
        recording.state
    }

    /// Fence value the last execution completes at.
    pub fn ticket(&self) -> Option<FenceTicket<B>> {
        self.recording.lock().ticket.clone()
    }

    /// Number of resources kept alive for the GPU.
    pub fn retained_resource_count(&self) -> usize {
        self.recording.lock().retained_resources.len()
    }

    /// Number of recorded or committed commands.
    pub fn command_count(&self) -> usize {
        let recording = self.recording.lock();
        match &recording.stream {
            Some(stream) => stream.commands.len(),
            None => recording.commands.len(),
        }
    }

    /// Number of open debug groups.
    pub fn debug_group_depth(&self) -> usize {
        self.recording.lock().debug_groups.len()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Recording<B>> {
        self.recording.lock()
    }

    fn state_error(&self, operation: &'static str, state: CommandListState) -> RhiError {
        ValidationError::InvalidCommandListState {
            list: self.name.clone(),
            operation,
            state,
        }
        .into()
    }

    /// Runs `record` on a `Pending` list.
    ///
    /// Other states are rejected without changing anything. A validation
    /// error raised by `record` moves the list to `Invalid`.
    pub(crate) fn record<R>(
        &self,
        operation: &'static str,
        record: impl FnOnce(&mut Recording<B>) -> RhiResult<R>,
    ) -> RhiResult<R> {
        let mut recording = self.recording.lock();
        recording.refresh(&self.name);
        if recording.state != CommandListState::Pending {
            return Err(self.state_error(operation, recording.state));
        }
        match record(&mut recording) {
            Ok(result) => {
                recording.fresh = false;
                Ok(result)
            }
            Err(error) => {
                self.invalidate_on(&mut recording, &error);
                Err(error)
            }
        }
    }

    fn invalidate_on(&self, recording: &mut Recording<B>, error: &RhiError) {
        if matches!(error, RhiError::Validation(_)) {
            recording.state = CommandListState::Invalid;
            log::warn!("Command list '{}' invalidated: {error}", self.name);
        }
    }

    /// Returns `true` if [`reset`](Self::reset) would succeed right now.
    pub fn can_reset(&self) -> bool {
        let mut recording = self.recording.lock();
        recording.refresh(&self.name);
        Self::reset_allowed(&recording)
    }

    fn reset_allowed(recording: &Recording<B>) -> bool {
        match recording.state {
            CommandListState::Pending => recording.fresh,
            CommandListState::Completed => true,
            CommandListState::Invalid => recording.is_gpu_idle(),
            CommandListState::Committed | CommandListState::Executing => false,
        }
    }

    /// Discards the recording and starts a new one.
    ///
    /// Legal on a fresh `Pending` list, on a `Completed` list and on an
    /// `Invalid` list without outstanding GPU work.
    pub fn reset(&self) -> RhiResult<()> {
        self.reset_with(|_| Ok(()))
    }

    /// Resets, then records `preamble` without making the list non-fresh.
    pub(crate) fn reset_with(
        &self,
        preamble: impl FnOnce(&mut Recording<B>) -> RhiResult<()>,
    ) -> RhiResult<()> {
        let mut recording = self.recording.lock();
        recording.refresh(&self.name);
        if !Self::reset_allowed(&recording) {
            return Err(self.state_error("reset", recording.state));
        }
        recording.clear();
        recording.state = CommandListState::Pending;
        recording.fresh = true;
        if let Err(error) = preamble(&mut recording) {
            self.invalidate_on(&mut recording, &error);
            return Err(error);
        }
        log::trace!("Command list '{}' reset.", self.name);
        Ok(())
    }

    /// Closes the recording so the list can be executed.
    pub fn commit(&self) -> RhiResult<()> {
        self.commit_with(|_| Ok(()))
    }

    /// Records `epilogue`, checks the recording is balanced and commits.
    pub(crate) fn commit_with(
        &self,
        epilogue: impl FnOnce(&mut Recording<B>) -> RhiResult<()>,
    ) -> RhiResult<()> {
        let mut recording = self.recording.lock();
        recording.refresh(&self.name);
        if recording.state != CommandListState::Pending {
            return Err(self.state_error("commit", recording.state));
        }
        let result = epilogue(&mut recording).and_then(|()| {
            if recording.debug_groups.is_empty() {
                Ok(())
            } else {
                Err(ValidationError::UnbalancedDebugGroups {
                    list: self.name.clone(),
                    open: recording.debug_groups.len(),
                }
                .into())
            }
        });
        if let Err(error) = result {
            self.invalidate_on(&mut recording, &error);
            return Err(error);
        }
        let commands = std::mem::take(&mut recording.commands);
        recording.uncommitted_transitions.clear();
        log::debug!("Committed command list '{}' with {} commands.", self.name, commands.len());
        recording.stream = Some(Arc::new(CommandStream {
            list_name: self.name.clone(),
            list_type: self.list_type,
            commands,
        }));
        recording.state = CommandListState::Committed;
        Ok(())
    }

    /// Blocks until the GPU finished the last execution of the list.
    pub fn wait_until_completed(&self) -> RhiResult<()> {
        let ticket = {
            let recording = self.recording.lock();
            match (&recording.ticket, recording.state) {
                (Some(ticket), CommandListState::Executing | CommandListState::Completed) => {
                    ticket.clone()
                }
                (_, state) => return Err(self.state_error("wait for completion", state)),
            }
        };
        ticket.wait()?;
        self.state();
        Ok(())
    }
}

/// Operations every command list type supports.
///
/// Types only implement [`core`](CommandList::core); render and parallel
/// render lists also override the lifecycle methods to open and close their
/// render pass.
pub trait CommandList<B: Backend>: Send + Sync {
    /// The shared list state.
    fn core(&self) -> &Arc<CommandListCore<B>>;

    /// The lists a command list set executes for this list, in order.
    fn set_members(&self) -> Vec<Arc<CommandListCore<B>>> {
        vec![Arc::clone(self.core())]
    }

    /// Debug name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// The type of work the list records.
    fn list_type(&self) -> CommandListType {
        self.core().list_type()
    }

    /// Current state.
    fn state(&self) -> CommandListState {
        self.core().state()
    }

    /// The queue the list executes on.
    fn queue(&self) -> &Arc<CommandQueue<B>> {
        self.core().queue()
    }

    /// Discards the recording and starts a new one.
    fn reset(&self) -> RhiResult<()> {
        self.core().reset()
    }

    /// Closes the recording so the list can be executed.
    fn commit(&self) -> RhiResult<()> {
        self.core().commit()
    }

    /// Records the barriers moving a whole resource into `state`.
    ///
    /// # Errors
    ///
    /// A forbidden transition or missing usage fails with a validation error,
    /// leaves the recorded resource state untouched and invalidates the list.
    fn transition(&self, resource: &Arc<Resource<B>>, state: ResourceState) -> RhiResult<()> {
        self.core()
            .record("record a barrier", |recording| recording.transition(resource, state, None))
    }

    /// Records the barrier moving one sub-resource into `state`.
    fn transition_sub_resource(
        &self,
        resource: &Arc<Resource<B>>,
        index: SubResourceIndex,
        state: ResourceState,
    ) -> RhiResult<()> {
        self.core().record("record a barrier", |recording| {
            let raw = resource.raw_sub_resource(index)?;
            recording.transition(resource, state, Some(raw))
        })
    }

    /// Opens a named debug group.
    fn push_debug_group(&self, name: &str) -> RhiResult<()> {
        self.core().record("push a debug group", |recording| {
            recording.debug_groups.push(name.to_string());
            recording.commands.push(Command::PushDebugGroup(name.to_string()));
            Ok(())
        })
    }

    /// Closes the innermost debug group.
    fn pop_debug_group(&self) -> RhiResult<()> {
        let list = self.name().to_string();
        self.core().record("pop a debug group", |recording| {
            if recording.debug_groups.pop().is_none() {
                return Err(ValidationError::UnbalancedDebugGroups { list, open: 0 }.into());
            }
            recording.commands.push(Command::PopDebugGroup);
            Ok(())
        })
    }

    /// Copies `size` bytes between two buffers, transitioning them to
    /// `CopySource` and `CopyDest`.
    fn copy_buffer(
        &self,
        source: &Arc<Resource<B>>,
        source_offset: u64,
        destination: &Arc<Resource<B>>,
        destination_offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        self.core().record("copy a buffer", |recording| {
            for (buffer, offset) in [(source, source_offset), (destination, destination_offset)] {
                let capacity = buffer.descriptor().sub_resource_size(0);
                let overflows = offset.checked_add(size).is_none_or(|end| end > capacity);
                if buffer.kind() != ResourceKind::Buffer || overflows {
                    return Err(ValidationError::DataSizeOverflow {
                        resource: buffer.name().to_string(),
                        sub_resource: 0,
                        offset,
                        size,
                        capacity,
                    }
                    .into());
                }
            }
            recording.transition(source, ResourceState::CopySource, None)?;
            recording.transition(destination, ResourceState::CopyDest, None)?;
            recording.commands.push(Command::CopyBuffer {
                source: Arc::clone(source),
                source_offset,
                destination: Arc::clone(destination),
                destination_offset,
                size,
            });
            Ok(())
        })
    }

    /// Blocks until the GPU finished the last execution of the list.
    fn wait_until_completed(&self) -> RhiResult<()> {
        self.core().wait_until_completed()
    }
}

/// Command lists program bindings can be applied to.
pub trait ProgramBindingsTarget<B: Backend>: CommandList<B> {}

