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

use common::Backend;
use prism_core::{
    AllocationError, ApplyBehavior, BufferSettings, ColorAttachmentSettings, CommandList,
    CommandListSet, CommandListState, CommandListType, ComputeContext, FrameSize,
    ParallelRenderCommandList, PixelFormat, Primitive, ProgramSettings, RenderCommandList,
    RenderPass, RenderPassSettings, RenderPatternSettings, Resource, ResourceState, ResourceUsage,
    ResourceView, ShaderSettings, ShaderStage, SubResourceData, TextureSettings, ValidationError,
};
use prism_infra::null::NullDeviceSettings;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn assert_state_error(error: prism_core::RhiError, expected: CommandListState) {
    match error.as_validation() {
        Some(ValidationError::InvalidCommandListState { state, .. }) => assert_eq!(*state, expected),
        other => panic!("expected a command list state error, got {other:?}"),
    }
}

fn color_pass(
    context: &ComputeContext<Backend>,
    name: &str,
) -> (Arc<Resource<Backend>>, Arc<RenderPass<Backend>>) {
    let color = context
        .create_texture(name, TextureSettings::render_target(64, 64, PixelFormat::Rgba8Unorm))
        .unwrap();
    let pattern = context
        .create_render_pattern(
            name,
            RenderPatternSettings {
                color_attachments: vec![ColorAttachmentSettings::new(PixelFormat::Rgba8Unorm)],
                depth_attachment: None,
                is_final_pass: false,
            },
        )
        .unwrap();
    let pass = context
        .create_render_pass(
            name,
            &pattern,
            RenderPassSettings {
                frame_size: FrameSize::new(64, 64),
                color_attachments: vec![ResourceView::new(&color)],
                depth_attachment: None,
            },
        )
        .unwrap();
    (color, pass)
}

#[test]
fn test_command_list_lifecycle() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let buffer = context
        .create_buffer("data", BufferSettings::host(64, ResourceUsage::COPY_SRC))
        .unwrap();
    buffer.set_pod_data(&[0u8; 64], &queue).unwrap();
    let kit = context.compute_kit().unwrap();

    let list = kit.compute_list(0, None).unwrap();
    assert_eq!(list.state(), CommandListState::Pending);
    assert!(list.core().can_reset());
    list.transition(&buffer, ResourceState::CopySource).unwrap();
    // A list with recorded commands must be committed first.
    assert!(!list.core().can_reset());
    list.commit().unwrap();
    assert_eq!(list.state(), CommandListState::Committed);

    assert_state_error(
        list.transition(&buffer, ResourceState::Common).unwrap_err(),
        CommandListState::Committed,
    );
    assert_state_error(list.commit().unwrap_err(), CommandListState::Committed);
    assert_state_error(list.reset().unwrap_err(), CommandListState::Committed);
    assert_eq!(list.state(), CommandListState::Committed);
    assert_eq!(buffer.state(), Some(ResourceState::CopySource));

    let set = CommandListSet::<Backend>::new(&[&list], None).unwrap();
    let ticket = queue.execute(&set).unwrap();
    set.wait_until_completed().unwrap();
    assert!(ticket.is_completed());
    assert!(set.is_completed());
    assert_eq!(list.state(), CommandListState::Completed);

    list.reset().unwrap();
    assert_eq!(list.state(), CommandListState::Pending);
    assert_eq!(list.core().command_count(), 0);
}

#[test]
fn test_execute_rejects_uncommitted_lists() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let kit = context.compute_kit().unwrap();
    let committed = kit.compute_list(0, None).unwrap();
    committed.commit().unwrap();
    let pending = kit.compute_list(1, None).unwrap();

    let set = CommandListSet::<Backend>::new(&[&committed, &pending], None).unwrap();
    let executions = queue.executions_count();
    assert_state_error(queue.execute(&set).unwrap_err(), CommandListState::Pending);

    assert_eq!(queue.executions_count(), executions);
    assert_eq!(committed.state(), CommandListState::Committed);
    assert_eq!(pending.state(), CommandListState::Pending);
}

#[test]
fn test_set_waits_until_both_lists_executed() {
    let context = common::compute_context();
    let device = context.native_device().unwrap();
    let kit = context.compute_kit().unwrap();
    let a = kit.compute_list(0, None).unwrap();
    let b = kit.compute_list(1, None).unwrap();
    let set = kit.list_set(&[0, 1], None).unwrap();
    assert_eq!(set.len(), 2);

    let error = set.wait_until_completed().unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::CommandListSetNotExecuted)
    ));

    device.suspend_execution();
    kit.execute(&[0, 1], None).unwrap();
    assert_eq!(a.state(), CommandListState::Executing);
    assert_eq!(b.state(), CommandListState::Executing);

    let (sender, receiver) = flume::bounded(1);
    let waiter = {
        let set = Arc::clone(&set);
        thread::spawn(move || {
            let result = set.wait_until_completed();
            let _ = sender.send(result.is_ok());
        })
    };
    assert!(receiver.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(!set.is_completed());

    device.resume_execution();
    assert!(matches!(receiver.recv_timeout(Duration::from_secs(5)), Ok(true)));
    waiter.join().unwrap();

    assert!(set.is_completed());
    assert_eq!(a.state(), CommandListState::Completed);
    assert_eq!(b.state(), CommandListState::Completed);
    // Later waits return right away.
    set.wait_until_completed().unwrap();
}

#[test]
fn test_concurrent_waits_on_one_set() {
    let context = common::compute_context();
    let device = context.native_device().unwrap();
    let kit = context.compute_kit().unwrap();
    kit.compute_list(0, None).unwrap();
    let set = kit.list_set(&[0], None).unwrap();

    device.suspend_execution();
    kit.execute(&[0], None).unwrap();
    thread::scope(|scope| {
        let waiters: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| set.wait_until_completed()))
            .collect();
        thread::sleep(Duration::from_millis(20));
        device.resume_execution();
        for waiter in waiters {
            waiter.join().unwrap().unwrap();
        }
    });
    assert!(set.is_completed());
}

#[test]
fn test_kit_reuses_lists() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();

    let first = kit.compute_list(3, Some(0)).unwrap();
    first.push_debug_group("work").unwrap();
    first.pop_debug_group().unwrap();
    kit.execute_and_wait(&[3], Some(0)).unwrap();
    assert_eq!(first.state(), CommandListState::Completed);

    let again = kit.compute_list(3, Some(0)).unwrap();
    assert_eq!(again.core().id(), first.core().id());
    assert_eq!(again.state(), CommandListState::Pending);
    assert!(kit.has_list(3, Some(0)));
    assert!(!kit.has_list(3, Some(1)));

    let error = kit.list_set(&[3, 4], Some(0)).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::CommandListNotFound { id: 4, .. })
    ));
    let error = kit.transfer_list(3, Some(0)).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::CommandListTypeMismatch { .. })
    ));
}

#[test]
fn test_lists_of_different_queues_cannot_share_a_set() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();
    let other = context.create_command_kit_for_type(CommandListType::Compute).unwrap();
    let a = kit.compute_list(0, None).unwrap();
    let b = other.compute_list(0, None).unwrap();

    let error = CommandListSet::<Backend>::new(&[&a, &b], None).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::QueueMismatch { .. })
    ));
    let error = CommandListSet::<Backend>::new(&[], None).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::EmptyCommandListSet)
    ));
}

#[test]
fn test_unbalanced_debug_groups() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();

    list.push_debug_group("outer").unwrap();
    assert_eq!(list.core().debug_group_depth(), 1);
    let error = list.commit().unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::UnbalancedDebugGroups { open: 1, .. })
    ));
    assert_eq!(list.state(), CommandListState::Invalid);

    // Nothing is in flight, so an invalid list can start over.
    list.reset().unwrap();
    let error = list.pop_debug_group().unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::UnbalancedDebugGroups { open: 0, .. })
    ));
}

#[test]
fn test_copy_buffer_checks_ranges() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();
    let source = context
        .create_buffer("source", BufferSettings::host(8, ResourceUsage::COPY_SRC))
        .unwrap();
    let destination = context
        .create_buffer("destination", BufferSettings::host(8, ResourceUsage::COPY_DST))
        .unwrap();
    source.set_data(&[prism_core::SubResourceData::new(&[1, 2, 3, 4, 5, 6, 7, 8])], kit.queue()).unwrap();

    let list = kit.transfer_list(0, None).unwrap();
    list.copy_buffer(&source, 4, &destination, 0, 4).unwrap();
    kit.execute_and_wait(&[0], None).unwrap();
    assert_eq!(destination.get_pod_data::<u8>().unwrap(), vec![5, 6, 7, 8, 0, 0, 0, 0]);

    let list = kit.transfer_list(0, None).unwrap();
    let error = list.copy_buffer(&source, 6, &destination, 0, 4).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::DataSizeOverflow { offset: 6, size: 4, capacity: 8, .. })
    ));
    assert_eq!(list.state(), CommandListState::Invalid);
}

#[test]
fn test_timestamp_queries_resolve_after_execution() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();
    let pool = context.create_compute_timestamp_pool(2).unwrap();
    pool.begin_frame(0).unwrap();

    let query = pool.create_query().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    query.begin(&list).unwrap();
    list.push_debug_group("measured").unwrap();
    list.pop_debug_group().unwrap();
    query.end(&list).unwrap();

    let error = query.resolve().unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::QueryNotResolved { .. })
    ));
    kit.execute_and_wait(&[0], None).unwrap();
    let range = query.resolve().unwrap();
    assert!(range.end >= range.begin);
    assert_eq!(range.frequency, pool.frequency());

    pool.create_query().unwrap();
    let error = pool.create_query().unwrap_err();
    assert!(matches!(
        error,
        prism_core::RhiError::Allocation(AllocationError::QueryPoolExhausted { capacity: 2, .. })
    ));
    pool.begin_frame(1).unwrap();
    pool.create_query().unwrap();
    assert!(pool.begin_frame(context.frames_count()).is_err());
}

#[test]
fn test_timestamp_pool_requires_query_support() {
    let context = common::compute_context_with(
        Default::default(),
        NullDeviceSettings {
            timestamp_queries: false,
            ..Default::default()
        },
    );
    let error = context.create_compute_timestamp_pool(2).unwrap_err();
    assert!(matches!(
        error,
        prism_core::RhiError::NotImplemented { ref feature } if feature == "timestamp queries"
    ));
}

#[test]
fn test_draw_requires_an_active_pass() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Render).unwrap();
    let list = RenderCommandList::new(&queue, None, "no pass").unwrap();

    let error = list.draw(Primitive::Triangle, 3, 0, 1, 0).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::RenderPassNotActive { .. })
    ));

    let compute = context.default_command_queue(CommandListType::Compute).unwrap();
    let error = RenderCommandList::new(&compute, None, "wrong queue").unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::CommandListTypeMismatch { .. })
    ));
}

#[test]
fn test_parallel_render_list_records_on_workers() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Render).unwrap();
    let (color, pass) = color_pass(&context, "scene");
    let program = context
        .create_program(
            "flat",
            ProgramSettings {
                shaders: vec![
                    ShaderSettings::new(ShaderStage::Vertex, "vs_main", vec![0u8; 4]),
                    ShaderSettings::new(ShaderStage::Fragment, "fs_main", vec![0u8; 4]),
                ],
                arguments: Vec::new(),
            },
        )
        .unwrap();
    let bindings = program.create_bindings(Vec::new(), None).unwrap();

    let parallel = ParallelRenderCommandList::new(&queue, pass, 4, "scene").unwrap();
    assert_eq!(color.state(), Some(ResourceState::RenderTarget));
    parallel
        .record_parallel(context.executor(), move |index, list| {
            list.push_debug_group(&format!("chunk {index}"))?;
            bindings.apply(list, ApplyBehavior::default())?;
            list.draw(Primitive::Triangle, 3, 0, 1, 0)?;
            list.pop_debug_group()
        })
        .unwrap();
    parallel.commit().unwrap();
    assert_eq!(parallel.state(), CommandListState::Committed);

    let set = CommandListSet::<Backend>::new(&[&parallel], None).unwrap();
    assert_eq!(set.len(), 6);
    queue.execute(&set).unwrap();
    set.wait_until_completed().unwrap();

    assert_eq!(parallel.state(), CommandListState::Completed);
    let stats = context.native_device().unwrap().stats();
    assert_eq!(stats.render_passes, 1);
    assert_eq!(stats.draws, 4);
    assert_eq!(color.state(), Some(ResourceState::RenderTarget));
}

#[test]
fn test_reset_rerecords_the_pass_barriers() {
    let context = common::compute_context();
    let queue = context.default_command_queue(CommandListType::Render).unwrap();
    let (color, pass) = color_pass(&context, "scene");

    let list = RenderCommandList::new(&queue, Some(pass), "scene").unwrap();
    assert_eq!(color.state(), Some(ResourceState::RenderTarget));
    let recorded = list.core().command_count();

    list.reset().unwrap();
    assert_eq!(color.state(), Some(ResourceState::RenderTarget));
    assert_eq!(list.core().command_count(), recorded);

    list.commit().unwrap();
    let set = CommandListSet::<Backend>::new(&[&list], None).unwrap();
    queue.execute(&set).unwrap();
    set.wait_until_completed().unwrap();

    let stats = context.native_device().unwrap().stats();
    assert_eq!(stats.barriers, 1);
    assert_eq!(stats.render_passes, 1);
    assert_eq!(color.state(), Some(ResourceState::RenderTarget));
}

#[test]
fn test_reset_of_an_invalid_list_restores_states() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();
    let texture = context
        .create_texture("albedo", TextureSettings::image_2d(4, 4, PixelFormat::Rgba8Unorm, 1))
        .unwrap();
    let other = context
        .create_texture("normals", TextureSettings::image_2d(4, 4, PixelFormat::Rgba8Unorm, 1))
        .unwrap();

    let list = kit.compute_list(0, None).unwrap();
    list.transition(&texture, ResourceState::CopyDest).unwrap();
    list.transition(&other, ResourceState::ShaderRead).unwrap_err();
    assert_eq!(list.state(), CommandListState::Invalid);
    assert_eq!(texture.state(), Some(ResourceState::CopyDest));

    list.reset().unwrap();
    assert_eq!(texture.state(), Some(ResourceState::Undefined));
    assert_eq!(other.state(), Some(ResourceState::Undefined));
    assert_eq!(list.core().command_count(), 0);
}

#[test]
fn test_kit_render_list_switches_pass() {
    let context = common::compute_context();
    let kit = context.default_command_kit(CommandListType::Render).unwrap();
    let (first_color, first) = color_pass(&context, "first");
    let (second_color, second) = color_pass(&context, "second");

    let list = kit.render_list(0, None, Some(&first)).unwrap();
    assert!(Arc::ptr_eq(&list.render_pass().unwrap(), &first));
    assert_eq!(first_color.state(), Some(ResourceState::RenderTarget));

    let list = kit.render_list(0, None, Some(&second)).unwrap();
    assert!(Arc::ptr_eq(&list.render_pass().unwrap(), &second));
    assert_eq!(first_color.state(), Some(ResourceState::Undefined));
    assert_eq!(second_color.state(), Some(ResourceState::RenderTarget));

    // Without a pass the list keeps the one it has.
    let list = kit.render_list(0, None, None).unwrap();
    assert!(Arc::ptr_eq(&list.render_pass().unwrap(), &second));
    let shared = list.clone();
    assert_eq!(shared.core().id(), list.core().id());

    let list = kit.render_list(1, None, Some(&first)).unwrap();
    list.push_debug_group("draws").unwrap();
    let error = kit.render_list(1, None, Some(&second)).unwrap_err();
    assert_state_error(error, CommandListState::Pending);
    assert!(Arc::ptr_eq(&list.render_pass().unwrap(), &first));
}

#[test]
fn test_copy_buffer_rejects_overflowing_ranges() {
    let context = common::compute_context();
    let kit = context.compute_kit().unwrap();
    let buffer = context
        .create_buffer(
            "scratch",
            BufferSettings::host(8, ResourceUsage::COPY_SRC | ResourceUsage::COPY_DST),
        )
        .unwrap();

    let list = kit.transfer_list(0, None).unwrap();
    let error = list.copy_buffer(&buffer, u64::MAX, &buffer, 0, 2).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::DataSizeOverflow { offset: u64::MAX, size: 2, capacity: 8, .. })
    ));
    assert_eq!(list.state(), CommandListState::Invalid);
}

#[test]
fn test_failed_submission_keeps_gpu_waits() {
    let context = common::compute_context();
    let producer = context.create_command_queue(CommandListType::Compute, "producer").unwrap();
    let consumer = context.create_command_queue(CommandListType::Compute, "consumer").unwrap();
    let buffer = context
        .create_buffer("gpu", BufferSettings::private(16, ResourceUsage::empty()))
        .unwrap();
    buffer
        .set_data(&[SubResourceData::new(&[1; 16])], &consumer)
        .unwrap();

    producer.fence().wait_on_gpu(&consumer);
    assert_eq!(consumer.pending_wait_count(), 1);

    context.native_device().unwrap().simulate_device_loss("driver reset");
    let error = consumer.flush_uploads().unwrap_err();
    assert!(error.is_device_lost());
    assert_eq!(consumer.pending_wait_count(), 1);
}
