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

//! Null queues: a worker thread executing submissions in order.

use super::device::DeviceInner;
use super::NullBackend;
use prism_core::{
    BackendError, Command, CommandListType, CommandStream, NativeFence, NativeQueue, RhiResult,
    Submission,
};
use std::sync::Arc;
use std::thread;

/// A queue whose submissions run on a dedicated worker thread.
///
/// The worker exits once the queue is dropped and every submission already
/// sent has been handled.
#[derive(Debug)]
pub struct NullQueue {
    name: String,
    list_type: CommandListType,
    device: Arc<DeviceInner>,
    sender: flume::Sender<Submission<NullBackend>>,
}

impl NullQueue {
    pub(super) fn spawn(device: Arc<DeviceInner>, list_type: CommandListType, name: &str) -> RhiResult<Self> {
        let (sender, receiver) = flume::unbounded::<Submission<NullBackend>>();
        let worker_device = Arc::clone(&device);
        thread::Builder::new()
            .name(format!("null-queue-{name}"))
            .spawn(move || {
                for submission in receiver.iter() {
                    execute_submission(&worker_device, submission);
                }
            })
            .map_err(|e| BackendError::Platform(format!("failed to spawn queue worker: {e}")))?;
        log::debug!("Started null {list_type:?} queue '{name}'.");
        Ok(Self {
            name: name.to_string(),
            list_type,
            device,
            sender,
        })
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type of work the queue accepts.
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }
}

impl NativeQueue<NullBackend> for NullQueue {
    fn submit(&self, submission: Submission<NullBackend>) -> RhiResult<()> {
        self.device.check_lost()?;
        log::trace!(
            "Queue '{}' received '{}' with {} streams.",
            self.name,
            submission.label,
            submission.streams.len()
        );
        self.sender
            .send(submission)
            .map_err(|_| BackendError::Native(format!("worker of queue '{}' stopped", self.name)).into())
    }
}

fn execute_submission(device: &DeviceInner, submission: Submission<NullBackend>) {
    device.wait_while_suspended();
    for wait in &submission.waits {
        match wait.fence.wait(wait.value, None) {
            Ok(true) => {}
            Ok(false) | Err(_) => break,
        }
    }
    if device.is_lost() {
        log::debug!("Dropped '{}' on a lost device.", submission.label);
        return;
    }
    for stream in &submission.streams {
        execute_stream(device, stream);
    }
    let latency = device.settings.execution_latency();
    if !latency.is_zero() {
        thread::sleep(latency);
    }
    device.stats.lock().submissions += 1;
    submission.signal.fence.signal(submission.signal.value);
}

fn execute_stream(device: &DeviceInner, stream: &CommandStream<NullBackend>) {
    log::trace!("Executing '{}' ({} commands).", stream.list_name, stream.commands.len());
    for command in &stream.commands {
        if let Err(error) = execute_command(device, command) {
            log::error!("Command of '{}' failed on the null device: {error}", stream.list_name);
        }
    }
}

fn execute_command(device: &DeviceInner, command: &Command<NullBackend>) -> RhiResult<()> {
    match command {
        Command::Barriers(barriers) => device.stats.lock().barriers += barriers.len() as u64,
        Command::BeginRenderPass { .. } => device.stats.lock().render_passes += 1,
        Command::EndRenderPass => {}
        Command::SetArgumentTables { bindings, arguments } => {
            for argument in arguments {
                let range = argument.range;
                if !argument.table.is_written(range.offset..range.offset + range.count) {
                    log::error!(
                        "Argument '{}' of bindings {bindings:?} points at unwritten descriptors {range:?}.",
                        argument.argument
                    );
                    device.stats.lock().descriptor_faults += 1;
                }
            }
        }
        Command::SetVertexBuffers { .. } | Command::SetIndexBuffer { .. } => {}
        Command::Draw { .. } | Command::DrawIndexed { .. } => device.stats.lock().draws += 1,
        Command::Dispatch { .. } => device.stats.lock().dispatches += 1,
        Command::CopyBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        } => {
            let bytes = source.native().read(0, *source_offset, *size)?;
            destination.native().write(0, *destination_offset, &bytes)?;
            device.stats.lock().copies += 1;
        }
        Command::Upload {
            destination,
            sub_resource,
            offset,
            data,
        } => {
            destination.native().write(*sub_resource, *offset, data)?;
            device.stats.lock().uploads += 1;
        }
        Command::WriteTimestamp { heap, index } => heap.write(*index, device.timestamp()),
        Command::PushDebugGroup(name) => log::trace!("Debug group '{name}'."),
        Command::PopDebugGroup => {}
    }
    Ok(())
}
