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
    BufferSettings, ColorAttachmentSettings, CommandList, CommandListType, ContextEvent,
    ContextSettings, DepthAttachmentSettings, FrameSize, NativeApi, PixelFormat,
    ProgramSettings, RenderContextSettings, RenderPatternSettings, ResourceDescriptor,
    ResourceState, ResourceUsage, ShaderSettings, ShaderStage, System, SystemSettings,
    ValidationError, WaitFor,
};
use prism_infra::null::{HeadlessWindow, NullDeviceSettings};
use prism_infra::FileProvider;

fn final_pattern_settings() -> RenderPatternSettings {
    RenderPatternSettings {
        color_attachments: vec![ColorAttachmentSettings::new(PixelFormat::Bgra8Unorm)],
        depth_attachment: Some(DepthAttachmentSettings::new(PixelFormat::Depth32Float)),
        is_final_pass: true,
    }
}

#[test]
fn test_system_lists_the_null_adapter() {
    common::init_logging();
    assert_eq!(System::<Backend>::native_api(), NativeApi::Null);

    let system = System::<Backend>::new(SystemSettings::default()).unwrap();
    assert_eq!(system.devices().len(), 1);
    let info = system.default_device().unwrap().info();
    assert_eq!(info.native_api, NativeApi::Null);
    assert!(info.is_software());

    let hardware_only = System::<Backend>::new(SystemSettings {
        allow_software_adapters: false,
        ..Default::default()
    })
    .unwrap();
    assert!(hardware_only.default_device().is_none());
}

#[test]
fn test_frames_cycle_through_slots() {
    let context = common::render_context();
    let events = context.subscribe();
    let kit = context.default_command_kit(CommandListType::Render).unwrap();
    let pattern = context
        .create_render_pattern("final", final_pattern_settings())
        .unwrap();

    assert!(matches!(
        context.frame_buffer().unwrap_err().as_validation(),
        Some(ValidationError::FrameNotBegun { .. })
    ));
    assert!(matches!(
        context.present().unwrap_err().as_validation(),
        Some(ValidationError::FrameNotBegun { .. })
    ));

    let frames = context.frames_count();
    for frame in 0..frames + 1 {
        let frame_index = context.begin_frame().unwrap();
        assert_eq!(frame_index, frame % frames);

        let pass = context
            .create_render_pass("final", &pattern, context.frame_pass_settings().unwrap())
            .unwrap();
        kit.render_list(0, Some(frame_index), Some(&pass)).unwrap();
        let frame_buffer = context.frame_buffer().unwrap();
        assert_eq!(frame_buffer.state(), Some(ResourceState::RenderTarget));
        kit.execute(&[0], Some(frame_index)).unwrap();
        assert_eq!(frame_buffer.state(), Some(ResourceState::Present));

        context.present().unwrap();
    }

    assert_eq!(context.frame_index(), 1);
    assert_eq!(context.surface().presented_count(), u64::from(frames + 1));
    context.wait_for_gpu(WaitFor::FramePresented).unwrap();

    let presented: Vec<u32> = events
        .try_iter()
        .filter_map(|event| match event {
            ContextEvent::FramePresented { frame_index } => Some(frame_index),
            _ => None,
        })
        .collect();
    assert_eq!(presented, vec![0, 1, 2, 0]);
}

#[test]
fn test_resize_recreates_frame_buffers() {
    let context = common::render_context();
    let events = context.subscribe();

    context.resize(FrameSize::new(320, 200)).unwrap();
    assert_eq!(context.frame_size(), FrameSize::new(320, 200));
    for buffer in context.frame_buffers() {
        match buffer.descriptor() {
            ResourceDescriptor::Texture(settings) => {
                assert_eq!((settings.width, settings.height), (320, 200));
            }
            other => panic!("frame buffer is not a texture: {other:?}"),
        }
    }
    assert_eq!(context.surface().frame_size(), FrameSize::new(320, 200));
    assert_eq!(events.try_recv(), Ok(ContextEvent::Resized(FrameSize::new(320, 200))));

    let error = context.resize(FrameSize::new(0, 200)).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::InvalidSettings(_))
    ));
}

#[test]
fn test_out_of_date_surface_is_recreated() {
    let context = common::render_context();
    let events = context.subscribe();
    let before = context.frame_buffers();

    context.surface().invalidate();
    context.begin_frame().unwrap();

    assert_eq!(events.try_recv(), Ok(ContextEvent::Resized(context.frame_size())));
    let after = context.frame_buffers();
    assert_eq!(after.len(), before.len());
    assert!(after.iter().zip(&before).all(|(new, old)| new.id() != old.id()));
    context.present().unwrap();
}

#[test]
fn test_render_context_from_json_settings() {
    let settings = RenderContextSettings::from_json_str(
        r#"{ "frame_size": { "width": 640, "height": 480 }, "depth_format": null }"#,
    )
    .unwrap();
    let context = common::render_context_with(
        settings,
        NullDeviceSettings {
            surface_image_count: Some(2),
            ..Default::default()
        },
    );

    assert!(context.depth_buffer().is_none());
    assert_eq!(context.frame_buffers().len(), 2);
    assert_eq!(context.frame_size(), FrameSize::new(640, 480));

    let error = ContextSettings::from_json_str(r#"{ "frames_count": 0 }"#).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::InvalidSettings(_))
    ));
}

#[test]
fn test_device_loss_and_recovery() {
    let context = common::compute_context();
    let events = context.subscribe();
    let stale = context
        .create_buffer("stale", BufferSettings::host(16, ResourceUsage::empty()))
        .unwrap();
    let generation = context.device_generation();
    let lost = context.native_device().unwrap();

    lost.simulate_device_loss("hung");
    assert!(context.check_device().unwrap_err().is_device_lost());
    assert!(matches!(events.try_recv(), Ok(ContextEvent::DeviceLost { .. })));
    let error = context
        .create_buffer("late", BufferSettings::host(16, ResourceUsage::empty()))
        .unwrap_err();
    assert!(error.is_device_lost());

    let recovered = context.recover_device().unwrap();
    assert_eq!(recovered, generation + 1);
    assert_eq!(context.device_generation(), recovered);
    let recovered_event = events
        .try_iter()
        .find(|event| matches!(event, ContextEvent::DeviceRecovered { .. }));
    assert_eq!(recovered_event, Some(ContextEvent::DeviceRecovered { generation: recovered }));
    assert!(!context.native_device().unwrap().is_lost());
    context.check_device().unwrap();

    let kit = context.compute_kit().unwrap();
    let list = kit.compute_list(0, None).unwrap();
    let error = list.transition(&stale, ResourceState::Common).unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::StaleResource { .. })
    ));

    let fresh = context
        .create_buffer("fresh", BufferSettings::host(16, ResourceUsage::empty()))
        .unwrap();
    let list = kit.compute_list(1, None).unwrap();
    list.transition(&fresh, ResourceState::Common).unwrap();
    kit.execute_and_wait(&[1], None).unwrap();
}

#[test]
fn test_render_context_recovers_its_surface() {
    let context = common::render_context();
    let old_buffers = context.frame_buffers();
    context.native_device().unwrap().simulate_device_loss("removed");

    assert!(context.begin_frame().unwrap_err().is_device_lost());

    let generation = context.recover_device(&HeadlessWindow::new(1)).unwrap();
    assert_eq!(context.frame_index(), 0);
    let buffers = context.frame_buffers();
    assert!(buffers.iter().all(|buffer| buffer.device_generation() == generation));
    assert!(old_buffers.iter().all(|buffer| buffer.device_generation() != generation));

    context.begin_frame().unwrap();
    context.present().unwrap();
}

#[test]
fn test_initialization_and_release() {
    let context = common::compute_context();
    let events = context.subscribe();
    let queue = context.default_command_queue(CommandListType::Compute).unwrap();
    let texture = context
        .create_texture(
            "lut",
            prism_core::TextureSettings::image_2d(2, 1, PixelFormat::R8Unorm, 1),
        )
        .unwrap();
    texture
        .set_data(&[prism_core::SubResourceData::new(&[3, 4])], &queue)
        .unwrap();

    context.complete_initialization().unwrap();
    assert_eq!(queue.pending_upload_count(), 0);
    assert_eq!(texture.native().contents(0).unwrap(), vec![3, 4]);
    assert_eq!(events.try_recv(), Ok(ContextEvent::Initialized));

    context.release().unwrap();
    assert!(!context.is_alive());
    assert_eq!(events.try_recv(), Ok(ContextEvent::Released));
    let error = context
        .create_buffer("late", BufferSettings::host(16, ResourceUsage::empty()))
        .unwrap_err();
    assert!(matches!(
        error.as_validation(),
        Some(ValidationError::ContextReleased { .. })
    ));
    assert!(context.descriptor_manager().is_err());
    // Releasing twice is harmless.
    context.release().unwrap();
}

#[test]
fn test_program_shaders_load_from_files() {
    let directory = tempfile::tempdir().unwrap();
    std::fs::create_dir(directory.path().join("shaders")).unwrap();
    std::fs::write(directory.path().join("shaders/blur.bin"), [1u8, 2, 3, 4, 5]).unwrap();
    let provider = FileProvider::new(directory.path());

    let shader = ShaderSettings::load(&provider, "shaders/blur.bin", ShaderStage::Compute, "main")
        .unwrap();
    assert_eq!(shader.binary.len(), 5);
    let missing = ShaderSettings::load(&provider, "shaders/none.bin", ShaderStage::Compute, "main")
        .unwrap_err();
    assert!(matches!(
        missing.as_validation(),
        Some(ValidationError::DataNotFound { .. })
    ));

    let context = common::compute_context();
    let program = context
        .create_program(
            "blur",
            ProgramSettings {
                shaders: vec![shader],
                arguments: Vec::new(),
            },
        )
        .unwrap();
    assert!(program.is_compute());
}
