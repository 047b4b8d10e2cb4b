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
    AllocationError, ApplyBehavior, ArgumentAccess, ArgumentDeclaration, ArgumentId,
    ArgumentKind, BindingPoint, BindingValue, BindingValues, BufferSettings, CommandList,
    CommandListState, CommandListType, ComputeContext, ContextSettings, DescriptorHeapKind,
    DescriptorHeapSettings, PixelFormat, Program, ProgramSettings, Resource, ResourceState,
    ResourceUsage, ResourceView, RhiError, ShaderSettings, ShaderStage, SubResourceData,
    TextureSettings, ValidationError,
};
use prism_infra::null::NullDeviceSettings;
use std::sync::Arc;

struct Fixture {
    context: ComputeContext<Backend>,
    program: Arc<Program<Backend>>,
    params: Arc<Resource<Backend>>,
    source: Arc<Resource<Backend>>,
    output: Arc<Resource<Backend>>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_settings(ContextSettings::default())
    }

    fn with_settings(settings: ContextSettings) -> Self {
        let context = common::compute_context_with(settings, NullDeviceSettings::default());
        let queue = context.default_command_queue(CommandListType::Compute).unwrap();
        let program = context
            .create_program(
                "blur",
                ProgramSettings {
                    shaders: vec![ShaderSettings::new(ShaderStage::Compute, "main", vec![0u8; 4])],
                    arguments: vec![
                        ArgumentDeclaration::new(
                            ArgumentId::all("params"),
                            ArgumentKind::ConstantBuffer,
                            BindingPoint::new(0),
                        )
                        .with_access(ArgumentAccess::Constant),
                        ArgumentDeclaration::new(
                            ArgumentId::all("source"),
                            ArgumentKind::Texture,
                            BindingPoint::new(1),
                        ),
                        ArgumentDeclaration::new(
                            ArgumentId::all("output"),
                            ArgumentKind::RwBuffer,
                            BindingPoint::new(2),
                        ),
                        ArgumentDeclaration::new(
                            ArgumentId::all("linear"),
                            ArgumentKind::Sampler,
                            BindingPoint::new(0),
                        )
                        .optional(),
                    ],
                },
            )
            .unwrap();

        let params = context.create_buffer("params", BufferSettings::constant(16)).unwrap();
        params.set_pod_data(&[0.5f32; 4], &queue).unwrap();
        let source = context
            .create_texture("source", TextureSettings::image_2d(2, 2, PixelFormat::R8Unorm, 1))
            .unwrap();
        source.set_data(&[SubResourceData::new(&[1, 2, 3, 4])], &queue).unwrap();
        let output = Self::output_buffer(&context, "output");

        Self {
            context,
            program,
            params,
            source,
            output,
        }
    }

    fn output_buffer(context: &ComputeContext<Backend>, name: &str) -> Arc<Resource<Backend>> {
        let queue = context.default_command_queue(CommandListType::Compute).unwrap();
        let output = context
            .create_buffer(name, BufferSettings::host(16, ResourceUsage::SHADER_WRITE))
            .unwrap();
        output.set_pod_data(&[0u32; 4], &queue).unwrap();
        output
    }

    fn value(resource: &Arc<Resource<Backend>>) -> BindingValue<Backend> {
        BindingValue::view(ResourceView::new(resource))
    }

    fn constant_values(&self) -> BindingValues<Backend> {
        vec![
            (ArgumentId::all("params"), Self::value(&self.params)),
            (ArgumentId::all("source"), Self::value(&self.source)),
        ]
    }

    fn all_values(&self) -> BindingValues<Backend> {
        let mut values = self.constant_values();
        values.push((ArgumentId::all("output"), Self::value(&self.output)));
        values
    }
}

#[test]
fn test_bindings_apply_and_dispatch() {
    let fixture = Fixture::new();
    let bindings = fixture.program.create_bindings(fixture.all_values(), None).unwrap();
    let output = bindings.argument(&ArgumentId::all("output")).unwrap();
    assert!(Arc::ptr_eq(output.views(None)[0].resource(), &fixture.output));
    assert!(bindings.argument(&ArgumentId::all("linear")).is_none());

    let kit = fixture.context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    bindings.apply(&list, ApplyBehavior::default()).unwrap();
    list.dispatch([4, 4, 1]).unwrap();

    assert_eq!(fixture.params.state(), Some(ResourceState::ConstantBuffer));
    assert_eq!(fixture.source.state(), Some(ResourceState::ShaderRead));
    assert_eq!(fixture.output.state(), Some(ResourceState::ShaderWrite));

    kit.execute_and_wait(&[0], None).unwrap();
    let stats = fixture.context.native_device().unwrap().stats();
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.descriptor_faults, 0);
    assert!(stats.descriptor_writes > 0);
}

#[test]
fn test_dispatch_without_bindings_invalidates_list() {
    let fixture = Fixture::new();
    let kit = fixture.context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();

    let error = list.dispatch([1, 1, 1]).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::NoProgramBindings { .. })
    ));
    assert_eq!(list.state(), CommandListState::Invalid);
}

#[test]
fn test_missing_mutable_argument_fails_at_apply() {
    let fixture = Fixture::new();
    let bindings = fixture
        .program
        .create_bindings(fixture.constant_values(), None)
        .unwrap();

    let kit = fixture.context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    let error = bindings.apply(&list, ApplyBehavior::default()).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::MissingArgument { argument, .. }) if argument == "output"
    ));
    assert_eq!(list.state(), CommandListState::Invalid);
}

#[test]
fn test_missing_constant_argument_fails_at_creation() {
    let fixture = Fixture::new();
    let values = vec![(ArgumentId::all("source"), Fixture::value(&fixture.source))];

    let error = fixture.program.create_bindings(values, None).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::MissingArgument { argument, .. }) if argument == "params"
    ));
}

#[test]
fn test_copy_shares_unreplaced_arguments() {
    let fixture = Fixture::new();
    let original = fixture
        .program
        .create_bindings(fixture.constant_values(), None)
        .unwrap();
    let first = Fixture::output_buffer(&fixture.context, "first");
    let second = Fixture::output_buffer(&fixture.context, "second");

    let a = original
        .create_copy(vec![(ArgumentId::all("output"), Fixture::value(&first))], None)
        .unwrap();
    let b = a
        .create_copy(vec![(ArgumentId::all("output"), Fixture::value(&second))], None)
        .unwrap();

    for id in [ArgumentId::all("params"), ArgumentId::all("source")] {
        let shared = original.argument(&id).unwrap();
        assert!(Arc::ptr_eq(shared, a.argument(&id).unwrap()));
        assert!(Arc::ptr_eq(shared, b.argument(&id).unwrap()));
    }
    let output = ArgumentId::all("output");
    assert!(original.argument(&output).is_none());
    assert!(!Arc::ptr_eq(a.argument(&output).unwrap(), b.argument(&output).unwrap()));
    assert_ne!(a.id(), b.id());
    assert_eq!(b.program_id(), fixture.program.id());

    let kit = fixture.context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    a.apply(&list, ApplyBehavior::default()).unwrap();
    b.apply(&list, ApplyBehavior::default()).unwrap();
    list.dispatch([1, 1, 1]).unwrap();
    kit.execute_and_wait(&[0], None).unwrap();
    assert_eq!(first.state(), Some(ResourceState::ShaderWrite));
    assert_eq!(second.state(), Some(ResourceState::ShaderWrite));
}

#[test]
fn test_constant_arguments_cannot_be_replaced() {
    let fixture = Fixture::new();
    let bindings = fixture.program.create_bindings(fixture.all_values(), None).unwrap();
    let other = fixture.context.create_buffer("other", BufferSettings::constant(16)).unwrap();

    let error = bindings
        .create_copy(vec![(ArgumentId::all("params"), Fixture::value(&other))], None)
        .unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::ConstantArgumentReplaced { argument, .. }) if argument == "params"
    ));
}

#[test]
fn test_binding_type_mismatch_is_rejected() {
    let fixture = Fixture::new();
    let values = vec![
        (ArgumentId::all("params"), Fixture::value(&fixture.source)),
        (ArgumentId::all("source"), Fixture::value(&fixture.source)),
    ];

    let error = fixture.program.create_bindings(values, None).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::ArgumentTypeMismatch {
            expected: ArgumentKind::ConstantBuffer,
            ..
        })
    ));

    let unknown = vec![(ArgumentId::all("missing"), Fixture::value(&fixture.params))];
    let error = fixture.program.create_bindings(unknown, None).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::UnknownArgument { .. })
    ));
}

#[test]
fn test_live_bindings_get_disjoint_descriptor_ranges() {
    let fixture = Fixture::new();
    let original = fixture
        .program
        .create_bindings(fixture.constant_values(), None)
        .unwrap();
    let copies: Vec<_> = (0..8)
        .map(|index| {
            let output = Fixture::output_buffer(&fixture.context, &format!("output {index}"));
            original
                .create_copy(vec![(ArgumentId::all("output"), Fixture::value(&output))], None)
                .unwrap()
        })
        .collect();

    let manager = fixture.context.descriptor_manager().unwrap();
    assert_eq!(manager.live_bindings_count(), 9);
    manager.complete_initialization().unwrap();
    assert!(manager.is_initialized());

    for heap in DescriptorHeapKind::ALL {
        let ranges: Vec<_> = std::iter::once(&original)
            .chain(copies.iter())
            .map(|bindings| bindings.descriptor_range(heap).unwrap())
            .collect();
        for (index, range) in ranges.iter().enumerate() {
            assert!(ranges[index + 1..].iter().all(|other| !range.overlaps(other)));
        }
    }
    assert_eq!(manager.used_count(DescriptorHeapKind::ShaderResources), 9 * 3);
    assert_eq!(manager.used_count(DescriptorHeapKind::Samplers), 9);
}

#[test]
fn test_retired_ranges_wait_for_the_gpu() {
    let fixture = Fixture::new();
    let manager = fixture.context.descriptor_manager().unwrap();
    let kit = fixture.context.compute_kit().unwrap();
    let bindings = fixture.program.create_bindings(fixture.all_values(), None).unwrap();

    let list = kit.compute_list(0, None).unwrap();
    bindings.apply(&list, ApplyBehavior::default()).unwrap();
    list.dispatch([1, 1, 1]).unwrap();
    kit.execute_and_wait(&[0], None).unwrap();
    assert_eq!(manager.used_count(DescriptorHeapKind::ShaderResources), 3);

    // Keep the queue busy while the set is dropped.
    let device = fixture.context.native_device().unwrap();
    device.suspend_execution();
    kit.compute_list(1, None).unwrap();
    let ticket = kit.execute(&[1], None).unwrap();

    drop(bindings);
    assert_eq!(manager.retired_count(DescriptorHeapKind::ShaderResources), 1);
    assert_eq!(manager.reclaim_retired(), 0);
    assert_eq!(manager.used_count(DescriptorHeapKind::ShaderResources), 3);

    device.resume_execution();
    ticket.wait().unwrap();
    assert_eq!(manager.reclaim_retired(), 4);
    assert_eq!(manager.retired_count(DescriptorHeapKind::ShaderResources), 0);
    assert_eq!(manager.used_count(DescriptorHeapKind::ShaderResources), 0);
    assert_eq!(manager.used_count(DescriptorHeapKind::Samplers), 0);
}

#[test]
fn test_released_heaps_reject_later_use() {
    let fixture = Fixture::new();
    let manager = fixture.context.descriptor_manager().unwrap();
    let bindings = fixture.program.create_bindings(fixture.all_values(), None).unwrap();
    manager.complete_initialization().unwrap();
    assert!(bindings.descriptor_range(DescriptorHeapKind::ShaderResources).is_some());

    manager.release();
    assert!(manager.is_released());
    assert_eq!(manager.registered_count(), 0);
    for heap in DescriptorHeapKind::ALL {
        assert!(bindings.descriptor_range(heap).is_none());
    }

    let kit = fixture.context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    for error in [
        bindings.apply(&list, ApplyBehavior::default()).unwrap_err(),
        manager.complete_initialization().unwrap_err(),
    ] {
        assert!(matches!(
            error.as_validation(),
            Some(ValidationError::DescriptorHeapReleased)
        ));
    }
    assert_eq!(list.state(), CommandListState::Invalid);
}

#[test]
fn test_deferred_heaps_are_sized_on_initialization() {
    let fixture = Fixture::with_settings(ContextSettings {
        descriptor_heaps: DescriptorHeapSettings {
            deferred_allocation: true,
            ..Default::default()
        },
        ..Default::default()
    });
    let manager = fixture.context.descriptor_manager().unwrap();
    assert_eq!(manager.capacity(DescriptorHeapKind::ShaderResources), 0);

    let bindings: Vec<_> = (0..3)
        .map(|_| fixture.program.create_bindings(fixture.all_values(), None).unwrap())
        .collect();
    assert!(bindings.iter().all(|set| set.descriptor_range(DescriptorHeapKind::Samplers).is_none()));

    fixture.context.complete_initialization().unwrap();
    assert_eq!(manager.capacity(DescriptorHeapKind::ShaderResources), 9);
    assert_eq!(manager.capacity(DescriptorHeapKind::Samplers), 3);
    assert_eq!(manager.used_count(DescriptorHeapKind::ShaderResources), 9);
    assert_eq!(manager.generation(DescriptorHeapKind::ShaderResources), 1);
}

#[test]
fn test_fixed_heap_exhaustion() {
    let fixture = Fixture::with_settings(ContextSettings {
        descriptor_heaps: DescriptorHeapSettings {
            shader_resources: 4,
            growable: false,
            ..Default::default()
        },
        ..Default::default()
    });
    let kit = fixture.context.compute_kit().unwrap();
    let first = fixture.program.create_bindings(fixture.all_values(), None).unwrap();
    let second = fixture.program.create_bindings(fixture.all_values(), None).unwrap();

    let list = kit.compute_list(0, None).unwrap();
    first.apply(&list, ApplyBehavior::default()).unwrap();
    let error = second.apply(&list, ApplyBehavior::default()).unwrap_err();
    assert!(matches!(
        error,
        RhiError::Allocation(AllocationError::DescriptorHeapExhausted {
            heap: DescriptorHeapKind::ShaderResources,
            requested: 3,
            capacity: 4,
        })
    ));
    // Allocation failures leave the list recording.
    assert_eq!(list.state(), CommandListState::Pending);
}

#[test]
fn test_frame_constant_arguments() {
    let context = common::compute_context();
    let program = context
        .create_program(
            "frame",
            ProgramSettings {
                shaders: vec![ShaderSettings::new(ShaderStage::Compute, "main", vec![0u8; 4])],
                arguments: vec![ArgumentDeclaration::new(
                    ArgumentId::all("frame"),
                    ArgumentKind::ConstantBuffer,
                    BindingPoint::new(0),
                )
                .with_access(ArgumentAccess::FrameConstant)],
            },
        )
        .unwrap();
    let buffers: Vec<_> = (0..context.frames_count())
        .map(|index| {
            context
                .create_buffer(&format!("frame {index}"), BufferSettings::constant(16))
                .unwrap()
        })
        .collect();
    let per_frame = || {
        vec![(
            ArgumentId::all("frame"),
            BindingValue::PerFrame(buffers.iter().map(|buffer| vec![ResourceView::new(buffer)]).collect()),
        )]
    };

    let bindings = program.create_bindings(per_frame(), Some(1)).unwrap();
    let binding = bindings.argument(&ArgumentId::all("frame")).unwrap();
    assert!(Arc::ptr_eq(binding.views(bindings.frame_index())[0].resource(), &buffers[1]));

    let next = bindings.create_copy(Vec::new(), Some(2)).unwrap();
    assert_eq!(next.frame_index(), Some(2));
    assert!(Arc::ptr_eq(next.argument(&ArgumentId::all("frame")).unwrap(), binding));

    let error = program.create_bindings(per_frame(), None).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::FrameIndexRequired { .. })
    ));
    let error = bindings.create_copy(Vec::new(), Some(context.frames_count())).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::FrameIndexOutOfRange { .. })
    ));
}

#[test]
fn test_unchanged_arguments_are_bound_once() {
    let fixture = Fixture::new();
    let bindings = fixture.program.create_bindings(fixture.all_values(), None).unwrap();
    let kit = fixture.context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    let skip = ApplyBehavior::CONSTANT_ONCE | ApplyBehavior::CHANGES_ONLY;

    bindings.apply(&list, ApplyBehavior::default()).unwrap();
    let recorded = list.core().command_count();
    bindings.apply(&list, skip).unwrap();
    assert_eq!(list.core().command_count(), recorded);

    // Only the mutable output is bound again.
    bindings.apply(&list, ApplyBehavior::CONSTANT_ONCE).unwrap();
    assert_eq!(list.core().command_count(), recorded + 1);
    bindings.apply(&list, ApplyBehavior::empty()).unwrap();
    assert_eq!(list.core().command_count(), recorded + 2);

    // A copy over the same views is skipped, a copy over other views is not.
    let same = bindings
        .create_copy(vec![(ArgumentId::all("output"), Fixture::value(&fixture.output))], None)
        .unwrap();
    same.apply(&list, skip).unwrap();
    assert_eq!(list.core().command_count(), recorded + 2);
    let other = Fixture::output_buffer(&fixture.context, "other");
    let changed = bindings
        .create_copy(vec![(ArgumentId::all("output"), Fixture::value(&other))], None)
        .unwrap();
    changed.apply(&list, skip).unwrap();
    assert_eq!(list.core().command_count(), recorded + 3);

    list.dispatch([1, 1, 1]).unwrap();
    kit.execute_and_wait(&[0], None).unwrap();
    assert_eq!(fixture.context.native_device().unwrap().stats().descriptor_faults, 0);
}

#[test]
fn test_frame_constant_copy_is_bound_for_its_frame() {
    let context = common::compute_context();
    let program = context
        .create_program(
            "frame",
            ProgramSettings {
                shaders: vec![ShaderSettings::new(ShaderStage::Compute, "main", vec![0u8; 4])],
                arguments: vec![ArgumentDeclaration::new(
                    ArgumentId::all("frame"),
                    ArgumentKind::ConstantBuffer,
                    BindingPoint::new(0),
                )
                .with_access(ArgumentAccess::FrameConstant)],
            },
        )
        .unwrap();
    let buffers: Vec<_> = (0..context.frames_count())
        .map(|index| {
            context
                .create_buffer(&format!("frame {index}"), BufferSettings::constant(16))
                .unwrap()
        })
        .collect();
    let values = vec![(
        ArgumentId::all("frame"),
        BindingValue::PerFrame(buffers.iter().map(|buffer| vec![ResourceView::new(buffer)]).collect()),
    )];
    let first = program.create_bindings(values, Some(0)).unwrap();
    let second = first.create_copy(Vec::new(), Some(1)).unwrap();
    assert!(Arc::ptr_eq(
        first.argument(&ArgumentId::all("frame")).unwrap(),
        second.argument(&ArgumentId::all("frame")).unwrap()
    ));

    let kit = context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    let behavior = ApplyBehavior::CONSTANT_ONCE | ApplyBehavior::CHANGES_ONLY;
    first.apply(&list, behavior).unwrap();
    let recorded = list.core().command_count();
    first.apply(&list, behavior).unwrap();
    assert_eq!(list.core().command_count(), recorded);

    second.apply(&list, behavior).unwrap();
    assert_eq!(list.core().command_count(), recorded + 1);
    second.apply(&list, behavior).unwrap();
    first.apply(&list, behavior).unwrap();
    assert_eq!(list.core().command_count(), recorded + 2);
    assert_eq!(list.core().retained_resource_count(), 2);
}
