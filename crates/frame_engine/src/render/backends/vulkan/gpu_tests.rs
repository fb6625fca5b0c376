//! Tests against a real device and display
//!
//! Run with `cargo test -- --ignored` on a machine with a Vulkan driver, a display
//! and compiled shaders under `target/shaders`.

use ash::vk;

use crate::assets::ImageData;
use crate::core::config::{RendererConfig, WindowConfig};
use crate::render::backends::vulkan::{FrameStatus, TextureRegistry, VulkanError, VulkanRenderer};
use crate::render::window::Window;

fn open() -> (Window, VulkanRenderer) {
    open_with(RendererConfig::new("frame_engine gpu test").with_validation(true))
}

fn open_with(config: RendererConfig) -> (Window, VulkanRenderer) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut window = Window::new(&WindowConfig::new("frame_engine gpu test", 320, 240)).unwrap();
    let renderer = VulkanRenderer::initialize(&mut window, &config, TextureRegistry::new()).unwrap();
    (window, renderer)
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn test_two_by_two_texture_upload() {
    let (_window, mut renderer) = open();

    let pixels = ImageData::solid_color(2, 2, [255, 0, 255, 255]);
    let index = renderer.load_image("checker", &pixels).unwrap();
    assert_eq!(index, 0);

    let texture = renderer.textures().get("checker").unwrap();
    assert!(texture.memory_size() >= 16);
    assert_eq!(texture.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(texture.extent(), vk::Extent2D { width: 2, height: 2 });

    renderer.unload_texture("checker").unwrap();
    assert!(renderer.textures().is_empty());
    renderer.shutdown();
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn test_five_updates_present_frames() {
    let (mut window, mut renderer) = open();
    assert_eq!(renderer.frames_in_flight(), 2);

    let mut presented = 0;
    for _ in 0..5 {
        window.poll_events();
        match renderer.update(1.0 / 60.0).unwrap() {
            FrameStatus::Presented { image_index } => {
                assert!((image_index as usize) < renderer.image_count());
                presented += 1;
            }
            FrameStatus::SwapchainRebuilt | FrameStatus::RebuildPending => {}
        }
    }

    assert!(presented > 0);
    assert!(renderer.frame_count() >= presented);
    renderer.shutdown();
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn test_resize_signal_rebuilds_once() {
    let (_window, mut renderer) = open();
    let signal = renderer.resize_signal();
    signal.notify();
    signal.notify();

    assert_eq!(renderer.update(0.0).unwrap(), FrameStatus::SwapchainRebuilt);
    assert!(!matches!(renderer.update(0.0).unwrap(), FrameStatus::SwapchainRebuilt));
    renderer.shutdown();
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn test_missing_texture_unload_is_reported() {
    let (_window, mut renderer) = open();
    let err = renderer.unload_texture("nowhere.png").unwrap_err();
    assert_eq!(err.to_string(), "unable to locate resource with url: nowhere.png");
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn test_failed_loads_leave_rendering_intact() {
    let config = RendererConfig::new("frame_engine gpu test")
        .with_validation(true)
        .with_max_textures(1);
    let (mut window, mut renderer) = open_with(config);
    renderer.load_image("first", &ImageData::solid_color(2, 2, [0, 255, 0, 255])).unwrap();

    let err = renderer.load_texture("broken.png", b"not a png").unwrap_err();
    assert!(matches!(err, VulkanError::Asset(_)));
    let err = renderer
        .load_image("second", &ImageData::solid_color(2, 2, [0, 0, 255, 255]))
        .unwrap_err();
    assert!(matches!(err, VulkanError::TextureLimit { max: 1 }));

    assert_eq!(renderer.textures().len(), 1);
    assert_eq!(renderer.textures().index_of("first"), Some(0));

    let presented = (0..4).any(|_| {
        window.poll_events();
        matches!(renderer.update(1.0 / 60.0).unwrap(), FrameStatus::Presented { .. })
    });
    assert!(presented);
    renderer.shutdown();
}
