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

//! Defines the hierarchy of error types for the render hardware interface.
//!
//! Every fallible operation returns [`RhiResult`]. The top-level [`RhiError`]
//! splits failures into four categories so callers can tell apart misuse of the
//! API ([`ValidationError`]), exhaustion of a finite pool ([`AllocationError`]),
//! failures reported by the native API ([`BackendError`]) and operations a
//! backend does not provide.

use crate::rhi::api::{
    ArgumentKind, CommandListState, CommandListType, DescriptorHeapKind, ResourceState,
    ResourceUsage,
};
use thiserror::Error;

/// A convenience alias for results produced by the render hardware interface.
pub type RhiResult<T> = Result<T, RhiError>;

/// Misuse of the API detected on the CPU, before anything reaches the GPU.
///
/// Validation errors never leave the object they were raised on half-modified:
/// the recorded state of resources and bindings is only updated after every
/// check passed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The canonical transition table forbids moving between these two states.
    #[error("resource '{resource}' cannot transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Name of the resource.
        resource: String,
        /// State currently recorded for the resource.
        from: ResourceState,
        /// Requested target state.
        to: ResourceState,
    },
    /// The resource was not created with the usage an operation requires.
    #[error("resource '{resource}' requires usage {required:?} but was created with {actual:?}")]
    IncompatibleUsage {
        /// Name of the resource.
        resource: String,
        /// Usage bits the operation needs.
        required: ResourceUsage,
        /// Usage bits the resource was created with.
        actual: ResourceUsage,
    },
    /// A sub-resource index lies outside of the resource.
    #[error("sub-resource {index} is out of range for resource '{resource}' ({count} sub-resources)")]
    InvalidSubResource {
        /// Name of the resource.
        resource: String,
        /// Raw sub-resource index that was requested.
        index: u32,
        /// Number of sub-resources of the resource.
        count: u32,
    },
    /// The data written into a sub-resource does not fit into it.
    #[error("{size} bytes at offset {offset} overflow sub-resource {sub_resource} of '{resource}' ({capacity} bytes)")]
    DataSizeOverflow {
        /// Name of the resource.
        resource: String,
        /// Raw sub-resource index.
        sub_resource: u32,
        /// Byte offset of the write.
        offset: u64,
        /// Size of the data.
        size: u64,
        /// Size of the sub-resource.
        capacity: u64,
    },
    /// Samplers and other descriptor-only resources have no memory to read or write.
    #[error("resource '{resource}' has no memory footprint")]
    NoMemoryFootprint {
        /// Name of the resource.
        resource: String,
    },
    /// The resource belongs to a device that was reset since it was created.
    #[error("resource '{resource}' was created on device generation {generation}, current is {current}")]
    StaleResource {
        /// Name of the resource.
        resource: String,
        /// Device generation the resource was created on.
        generation: u64,
        /// Current device generation of the context.
        current: u64,
    },
    /// A program declares two arguments with the same id or the same binding point.
    #[error("program '{program}' declares '{argument}' more than once")]
    DuplicateArgumentDeclaration {
        /// Name of the program.
        program: String,
        /// The conflicting argument.
        argument: String,
    },
    /// The argument is not declared by the program.
    #[error("program '{program}' has no argument '{argument}'")]
    UnknownArgument {
        /// Name of the program.
        program: String,
        /// The argument that was looked up.
        argument: String,
    },
    /// The same argument was given more than one value.
    #[error("argument '{argument}' of program '{program}' was bound more than once")]
    DuplicateArgumentValue {
        /// Name of the program.
        program: String,
        /// The argument bound twice.
        argument: String,
    },
    /// A required argument has no bound resource views.
    #[error("required argument '{argument}' of program '{program}' is not bound")]
    MissingArgument {
        /// Name of the program.
        program: String,
        /// The unbound argument.
        argument: String,
    },
    /// A bound view does not match the kind of its argument.
    #[error("argument '{argument}' of program '{program}' expects {expected:?}: {reason}")]
    ArgumentTypeMismatch {
        /// Name of the program.
        program: String,
        /// The argument being bound.
        argument: String,
        /// Kind declared by the program.
        expected: ArgumentKind,
        /// What was wrong with the bound view.
        reason: String,
    },
    /// The number of bound views differs from the argument's array size.
    #[error("argument '{argument}' of program '{program}' expects {expected} views, got {actual}")]
    ArgumentArraySizeMismatch {
        /// Name of the program.
        program: String,
        /// The argument being bound.
        argument: String,
        /// Declared array size.
        expected: u32,
        /// Number of views supplied.
        actual: u32,
    },
    /// A constant argument cannot be replaced in a copy of its bindings.
    #[error("constant argument '{argument}' of program '{program}' cannot be replaced")]
    ConstantArgumentReplaced {
        /// Name of the program.
        program: String,
        /// The constant argument.
        argument: String,
    },
    /// Per-frame view lists are only accepted for frame-constant arguments.
    #[error("argument '{argument}' of program '{program}' does not accept per-frame views")]
    PerFrameViewsNotAllowed {
        /// Name of the program.
        program: String,
        /// The argument being bound.
        argument: String,
    },
    /// A frame-constant argument was bound while the bindings carry no frame index.
    #[error("frame-constant argument '{argument}' of program '{program}' needs bindings with a frame index")]
    FrameIndexRequired {
        /// Name of the program.
        program: String,
        /// The frame-constant argument.
        argument: String,
    },
    /// A frame index lies outside of the frames in flight.
    #[error("frame index {index} is out of range ({frames_count} frames in flight)")]
    FrameIndexOutOfRange {
        /// The requested frame index.
        index: u32,
        /// Number of frames in flight.
        frames_count: u32,
    },
    /// The program a binding set was created for has been dropped.
    #[error("program '{program}' was released")]
    ProgramReleased {
        /// Name of the released program.
        program: String,
    },
    /// An object is already registered under this name.
    #[error("an object named '{name}' is already registered")]
    NameConflict {
        /// The taken name.
        name: String,
    },
    /// The operation is not legal in the command list's current state.
    #[error("command list '{list}' cannot {operation} while {state:?}")]
    InvalidCommandListState {
        /// Name of the command list.
        list: String,
        /// The attempted operation.
        operation: &'static str,
        /// State the list was in.
        state: CommandListState,
    },
    /// A command list or set was used where another type was expected.
    #[error("command list '{list}' is a {actual:?} list, expected {expected:?}")]
    CommandListTypeMismatch {
        /// Name of the command list.
        list: String,
        /// Type that was expected.
        expected: CommandListType,
        /// Type of the list.
        actual: CommandListType,
    },
    /// A command list was executed on a queue it was not created for.
    #[error("command list '{list}' does not belong to queue '{queue}'")]
    QueueMismatch {
        /// Name of the command list.
        list: String,
        /// Name of the executing queue.
        queue: String,
    },
    /// Command list sets need at least one list.
    #[error("a command list set needs at least one command list")]
    EmptyCommandListSet,
    /// The command list set was waited on before it was ever executed.
    #[error("command list set was never executed")]
    CommandListSetNotExecuted,
    /// Debug groups were left open when committing.
    #[error("command list '{list}' has {open} unclosed debug groups")]
    UnbalancedDebugGroups {
        /// Name of the command list.
        list: String,
        /// Number of groups still open.
        open: usize,
    },
    /// Draw calls need an active render pass.
    #[error("command list '{list}' has no active render pass")]
    RenderPassNotActive {
        /// Name of the command list.
        list: String,
    },
    /// A command kit has no list with this id for the frame.
    #[error("command kit '{kit}' has no command list {id} for frame {frame:?}")]
    CommandListNotFound {
        /// Name of the kit.
        kit: String,
        /// Requested list id.
        id: u32,
        /// Requested frame.
        frame: Option<u32>,
    },
    /// Draws and dispatches need applied program bindings.
    #[error("command list '{list}' has no program bindings applied")]
    NoProgramBindings {
        /// Name of the command list.
        list: String,
    },
    /// Indexed draws need an index buffer.
    #[error("command list '{list}' has no index buffer set")]
    MissingIndexBuffer {
        /// Name of the command list.
        list: String,
    },
    /// Render pass attachments do not match their pattern.
    #[error("render pass '{pass}' attachments are invalid: {reason}")]
    AttachmentMismatch {
        /// Name of the render pass.
        pass: String,
        /// Description of the mismatch.
        reason: String,
    },
    /// The timestamp query has not been resolved by a completed command list.
    #[error("timestamp query {index} of pool '{pool}' is not resolved yet")]
    QueryNotResolved {
        /// Name of the query pool.
        pool: String,
        /// Index of the query.
        index: u32,
    },
    /// A frame was presented without being begun.
    #[error("render context '{context}' has no frame in progress")]
    FrameNotBegun {
        /// Name of the context.
        context: String,
    },
    /// The descriptor manager was released; its heaps can no longer be used.
    #[error("descriptor heaps were released")]
    DescriptorHeapReleased,
    /// The context was released or its device is gone.
    #[error("context '{context}' was released")]
    ContextReleased {
        /// Name of the context.
        context: String,
    },
    /// Settings failed to parse or hold out-of-range values.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// A provider has no data at the requested path.
    #[error("no data found at '{path}'")]
    DataNotFound {
        /// The requested path.
        path: String,
    },
}

/// A finite pool ran out of space.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// No contiguous descriptor range of the requested size is available.
    #[error("{heap:?} descriptor heap cannot fit {requested} descriptors (capacity {capacity})")]
    DescriptorHeapExhausted {
        /// The heap that ran out.
        heap: DescriptorHeapKind,
        /// Number of descriptors requested.
        requested: u32,
        /// Capacity of the heap.
        capacity: u32,
    },
    /// The device could not allocate memory for a resource.
    #[error("out of device memory while allocating {size} bytes for '{resource}'")]
    OutOfMemory {
        /// Name of the resource.
        resource: String,
        /// Requested allocation size.
        size: u64,
    },
    /// Every query slot of the current frame is in use.
    #[error("timestamp query pool '{pool}' is exhausted ({capacity} queries per frame)")]
    QueryPoolExhausted {
        /// Name of the pool.
        pool: String,
        /// Queries available per frame.
        capacity: u32,
    },
}

/// A failure reported by the native graphics API or the platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The device was removed, hung or reset. Only the context can recover from this.
    #[error("device lost: {reason}")]
    DeviceLost {
        /// Backend-provided reason.
        reason: String,
    },
    /// The platform could not create a presentable surface.
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),
    /// The swap chain no longer matches the window and must be recreated.
    #[error("surface is out of date")]
    SurfaceOutOfDate,
    /// A wait did not complete in time.
    #[error("timed out waiting for {what}")]
    Timeout {
        /// Description of what was awaited.
        what: String,
    },
    /// A background worker panicked while running a task.
    #[error("worker panicked while running task {task}")]
    WorkerPanicked {
        /// Index of the failed task.
        task: usize,
    },
    /// Any other native API failure.
    #[error("native API call failed: {0}")]
    Native(String),
    /// A platform service (file system, threads) failed.
    #[error("platform error: {0}")]
    Platform(String),
}

/// The top-level error type of the render hardware interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhiError {
    /// Misuse of the API.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A pool or heap ran out of space.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// The native API or platform failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The backend does not implement the requested feature.
    #[error("not implemented by this backend: {feature}")]
    NotImplemented {
        /// The missing feature.
        feature: String,
    },
}

impl RhiError {
    /// Returns `true` if this error reports the loss of the device.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::Backend(BackendError::DeviceLost { .. }))
    }

    /// Returns the validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            RhiError::Validation(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts_and_displays() {
        let error: RhiError = ValidationError::InvalidStateTransition {
            resource: "albedo".to_string(),
            from: ResourceState::Undefined,
            to: ResourceState::ShaderRead,
        }
        .into();
        assert!(error.as_validation().is_some());
        assert_eq!(
            error.to_string(),
            "resource 'albedo' cannot transition from Undefined to ShaderRead"
        );
    }

    #[test]
    fn test_device_lost_is_detected() {
        let error: RhiError = BackendError::DeviceLost {
            reason: "hung".to_string(),
        }
        .into();
        assert!(error.is_device_lost());
        assert!(error.as_validation().is_none());
    }
}
