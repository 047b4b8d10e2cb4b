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

//! Command list types and the command list state machine.

/// The kind of work a command list records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandListType {
    /// Copies and uploads.
    Transfer,
    /// Draws inside a render pass.
    Render,
    /// A render pass recorded by several threads at once.
    ParallelRender,
    /// Compute dispatches.
    Compute,
}

impl CommandListType {
    /// The type of queue lists of this type execute on.
    pub fn queue_type(self) -> CommandListType {
        match self {
            CommandListType::ParallelRender => CommandListType::Render,
            other => other,
        }
    }

    /// Returns `true` if a queue created for `self` can execute lists of `list_type`.
    ///
    /// Render queues execute everything, compute queues execute compute and
    /// transfer work, transfer queues only transfer work.
    pub fn accepts(self, list_type: CommandListType) -> bool {
        match self.queue_type() {
            CommandListType::Render => true,
            CommandListType::Compute => matches!(
                list_type,
                CommandListType::Compute | CommandListType::Transfer
            ),
            _ => list_type == CommandListType::Transfer,
        }
    }
}

/// The lifecycle state of a command list.
///
/// ```text
/// Pending --commit--> Committed --execute--> Executing --GPU done--> Completed
///    ^                                                                   |
///    +------------------------------reset--------------------------------+
/// ```
///
/// A validation failure while recording moves a `Pending` list to `Invalid`,
/// from which only `reset` leads back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// Recording.
    Pending,
    /// Closed and ready to execute.
    Committed,
    /// Submitted, the GPU has not finished it yet.
    Executing,
    /// The GPU finished it.
    Completed,
    /// A recording error made the list unusable until reset.
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_compatibility() {
        use CommandListType::*;
        assert!(Render.accepts(ParallelRender));
        assert!(Render.accepts(Compute));
        assert!(Compute.accepts(Transfer));
        assert!(!Compute.accepts(Render));
        assert!(!Transfer.accepts(Compute));
        assert_eq!(ParallelRender.queue_type(), Render);
    }
}
