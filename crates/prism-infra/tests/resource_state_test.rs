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


mod common;

use prism_core::{
    AllocationError, BufferSettings, CommandList, CommandListState, CommandListType, MemoryState,
    PixelFormat, ResourceState, ResourceUsage, RhiError, SamplerSettings, SubResourceData,
    SubResourceIndex, TextureSettings, ValidationError,
};
use prism_infra::null::NullDeviceSettings;

#[test]
fn test_forbidden_transition_leaves_state_untouched() {
    let context = common::compute_context();
    let kit = context.default_command_kit(CommandListType::Compute).unwrap();
    let texture = context
        .create_texture("albedo", TextureSettings::image_2d(4, 4, PixelFormat::Rgba8Unorm, 1))
        .unwrap();

    let list = kit.compute_list(0, None).unwrap();
    let error = list.transition(&texture, ResourceState::ShaderRead).unwrap_err();

    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::InvalidStateTransition {
            from: ResourceState::Undefined,
            to: ResourceState::ShaderRead,
            ..
        })
    ));
    assert_eq!(texture.state(), Some(ResourceState::Undefined));
    assert_eq!(list.state(), CommandListState::Invalid);
    assert_eq!(list.core().command_count(), 0);
}

#[test]
fn test_initializing_transition_then_shader_read() {
    let context = common::compute_context();
    let kit = context.default_command_kit(CommandListType::Compute).unwrap();
    let texture = context
        .create_texture("albedo", TextureSettings::image_2d(4, 4, PixelFormat::Rgba8Unorm, 1))
        .unwrap();

    let list = kit.compute_list(0, None).unwrap();
    list.transition(&texture, ResourceState::CopyDest).unwrap();
    assert_eq!(texture.state(), Some(ResourceState::CopyDest));
    list.transition(&texture, ResourceState::ShaderRead).unwrap();
    assert_eq!(texture.state(), Some(ResourceState::ShaderRead));

    // Both barriers land in one merged command.
    assert_eq!(list.core().command_count(), 1);
    assert_eq!(list.core().retained_resource_count(), 1);

    kit.execute_and_wait(&[0], None).unwrap();
    let stats = context.native_device().unwrap().stats();
    assert_eq!(stats.barriers, 2);
    assert_eq!(list.state(), CommandListState::Completed);
    assert_eq!(list.core().retained_resource_count(), 0);
}

#[test]
fn test_transition_requires_usage() {
    let context = common::compute_context();
    let kit = context.default_command_kit(CommandListType::Compute).unwrap();
    let buffer = context
        .create_buffer("vertices", BufferSettings::host(64, ResourceUsage::VERTEX))
        .unwrap();

    let list = kit.compute_list(0, None).unwrap();
    let error = list.transition(&buffer, ResourceState::CopyDest).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::IncompatibleUsage { .. })
    ));
    assert_eq!(buffer.state(), Some(ResourceState::Undefined));
}

#[test]
fn test_sub_resource_states_diverge_and_merge() {
    let context = common::compute_context();
    let kit = context.default_command_kit(CommandListType::Compute).unwrap();
    let texture = context
        .create_texture("mips", TextureSettings::image_2d(8, 8, PixelFormat::Rgba8Unorm, 2))
        .unwrap();
    let top = SubResourceIndex::new(0, 0);
    let bottom = SubResourceIndex::new(0, 1);

    let list = kit.compute_list(0, None).unwrap();
    list.transition_sub_resource(&texture, bottom, ResourceState::CopyDest)
        .unwrap();
    assert_eq!(texture.state(), None);
    assert_eq!(texture.sub_resource_state(top).unwrap(), ResourceState::Undefined);
    assert_eq!(texture.sub_resource_state(bottom).unwrap(), ResourceState::CopyDest);

    list.transition_sub_resource(&texture, top, ResourceState::CopyDest)
        .unwrap();
    assert_eq!(texture.state(), Some(ResourceState::CopyDest));

    let error = list
        .transition_sub_resource(&texture, SubResourceIndex::new(0, 5), ResourceState::ShaderRead)
        .unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::InvalidSubResource { .. })
    ));
}

#[test]
fn test_host_buffer_round_trip() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let buffer = context
        .create_buffer("constants", BufferSettings::constant(16))
        .unwrap();
    assert_eq!(buffer.data_size(MemoryState::Initialized), 0);

    buffer.set_pod_data(&[1.0f32, 2.0, 3.0, 4.0], &queue).unwrap();

    assert_eq!(buffer.get_pod_data::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(buffer.data_size(MemoryState::Initialized), 16);
    assert_eq!(buffer.data_size(MemoryState::Reserved), 256);
    // Host writes define the content without a barrier.
    assert_eq!(buffer.state(), Some(ResourceState::Common));
    assert_eq!(queue.pending_upload_count(), 0);
}

#[test]
fn test_partial_write_at_offset() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let buffer = context
        .create_buffer("staging", BufferSettings::host(8, ResourceUsage::empty()))
        .unwrap();

    buffer
        .set_data(&[SubResourceData::new(&[7, 7]).at_offset(6)], &queue)
        .unwrap();
    assert_eq!(
        buffer.get_data(SubResourceIndex::default()).unwrap(),
        vec![0, 0, 0, 0, 0, 0, 7, 7]
    );

    let error = buffer
        .set_data(&[SubResourceData::new(&[1, 2, 3]).at_offset(6)], &queue)
        .unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::DataSizeOverflow { capacity: 8, .. })
    ));
}

#[test]
fn test_private_upload_then_copy_to_host() {
    let context = common::compute_context();
    let kit = context.default_command_kit(CommandListType::Compute).unwrap();
    let queue = kit.queue();
    let private = context
        .create_buffer("gpu", BufferSettings::private(16, ResourceUsage::COPY_SRC))
        .unwrap();
    let readback = context
        .create_buffer("readback", BufferSettings::host(16, ResourceUsage::COPY_DST))
        .unwrap();

    private.set_pod_data(&[10u32, 20, 30, 40], queue).unwrap();
    assert_eq!(queue.pending_upload_count(), 1);
    assert_eq!(private.state(), Some(ResourceState::CopyDest));
    // Private memory cannot be read from the host.
    assert!(private.get_data(SubResourceIndex::default()).is_err());

    let list = kit.transfer_list(0, None).unwrap();
    list.copy_buffer(&private, 0, &readback, 0, 16).unwrap();
    assert_eq!(private.state(), Some(ResourceState::CopySource));
    assert_eq!(readback.state(), Some(ResourceState::CopyDest));

    // Executing flushes the upload first.
    kit.execute_and_wait(&[0], None).unwrap();
    assert_eq!(queue.pending_upload_count(), 0);
    assert_eq!(readback.get_pod_data::<u32>().unwrap(), vec![10, 20, 30, 40]);
    assert_eq!(
        private.native().contents(0).unwrap(),
        bytemuck::cast_slice::<u32, u8>(&[10, 20, 30, 40]).to_vec()
    );

    let stats = context.native_device().unwrap().stats();
    assert_eq!(stats.uploads, 1);
    assert_eq!(stats.copies, 1);
}

#[test]
fn test_upload_restores_auto_transition_state() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let texture = context
        .create_texture("atlas", TextureSettings::image_2d(2, 2, PixelFormat::R8Unorm, 1))
        .unwrap();
    texture
        .set_auto_transition_source_state(Some(ResourceState::ShaderRead))
        .unwrap();

    texture.set_data(&[SubResourceData::new(&[1, 2, 3, 4])], &queue).unwrap();
    assert_eq!(texture.state(), Some(ResourceState::CopyDest));

    context.upload_resources().unwrap();
    assert_eq!(texture.state(), Some(ResourceState::ShaderRead));
    queue.wait_idle().unwrap();
    assert_eq!(texture.native().contents(0).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_samplers_have_no_memory() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let sampler = context
        .create_sampler("linear", SamplerSettings::default())
        .unwrap();

    assert_eq!(sampler.data_size(MemoryState::Reserved), 0);
    for error in [
        sampler.set_data(&[SubResourceData::new(&[0])], &queue).unwrap_err(),
        sampler.get_data(SubResourceIndex::default()).unwrap_err(),
    ] {
        assert!(matches!(
            error.as_validation(),
            Some(ValidationError::NoMemoryFootprint { .. })
        ));
    }
}

#[test]
fn test_memory_budget_is_enforced() {
    let context = common::compute_context_with(
        Default::default(),
        NullDeviceSettings {
            memory_budget: Some(1024),
            ..Default::default()
        },
    );

    let small = context
        .create_buffer("small", BufferSettings::host(512, ResourceUsage::empty()))
        .unwrap();
    let error = context
        .create_buffer("large", BufferSettings::host(4096, ResourceUsage::empty()))
        .unwrap_err();
    assert!(matches!(
        error,
        RhiError::Allocation(AllocationError::OutOfMemory { size: 4096, .. })
    ));

    let device = context.native_device().unwrap();
    assert_eq!(device.allocated_bytes(), 512);
    drop(small);
    assert_eq!(device.allocated_bytes(), 0);
    assert_eq!(device.peak_bytes(), 512);
}

#[test]
fn test_empty_buffer_is_rejected() {
    let context = common::compute_context();
    let error = context
        .create_buffer("empty", BufferSettings::host(0, ResourceUsage::empty()))
        .unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::InvalidSettings(_))
    ));
}

#[test]
fn test_auto_transition_state_is_validated() {
    let context = common::compute_context();
    let buffer = context
        .create_buffer("gpu", BufferSettings::private(16, ResourceUsage::COPY_SRC))
        .unwrap();

    let error = buffer
        .set_auto_transition_source_state(Some(ResourceState::ShaderRead))
        .unwrap_err();
    assert!(matches!(error, ValidationError::IncompatibleUsage { .. }));
    let error = buffer
        .set_auto_transition_source_state(Some(ResourceState::Undefined))
        .unwrap_err();
    assert!(matches!(
        error,
        ValidationError::InvalidStateTransition {
            to: ResourceState::Undefined,
            ..
        }
    ));
    assert_eq!(buffer.auto_transition_source_state(), None);

    buffer
        .set_auto_transition_source_state(Some(ResourceState::CopySource))
        .unwrap();
    assert_eq!(buffer.auto_transition_source_state(), Some(ResourceState::CopySource));
}

#[test]
fn test_rejected_writes_keep_queued_uploads() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let buffer = context
        .create_buffer("gpu", BufferSettings::private(8, ResourceUsage::empty()))
        .unwrap();
    let host = context
        .create_buffer("staging", BufferSettings::host(8, ResourceUsage::empty()))
        .unwrap();

    buffer.set_data(&[SubResourceData::new(&[5; 8])], &queue).unwrap();
    assert_eq!(queue.pending_upload_count(), 1);

    for resource in [&buffer, &host] {
        let error = resource
            .set_data(&[SubResourceData::new(&[1]).at_offset(u64::MAX)], &queue)
            .unwrap_err();
        assert!(matches!(
            error.as_validation(),
            Some(ValidationError::DataSizeOverflow { offset: u64::MAX, size: 1, capacity: 8, .. })
        ));
    }
    assert_eq!(queue.pending_upload_count(), 1);

    queue.flush_uploads().unwrap();
    queue.wait_idle().unwrap();
    assert_eq!(queue.pending_upload_count(), 0);
    assert_eq!(buffer.native().contents(0).unwrap(), vec![5; 8]);
    assert_eq!(context.native_device().unwrap().stats().uploads, 1);
}
