//! # Frame Engine
//!
//! Lifecycle core of a Vulkan presentation pipeline: it negotiates a capable device,
//! builds a presentable image chain, keeps a bounded number of frames in flight and
//! owns the GPU buffers, images and descriptors used by a fixed render pass.
//!
//! ## Features
//!
//! - **Device negotiation**: queue family discovery, extension checks, configurable candidate policy
//! - **Swapchain lifecycle**: full rebuild on resize or out-of-date surfaces
//! - **Frames in flight**: fence-per-slot backpressure with bounded waits
//! - **Resources**: staging uploads, texture registry, per-image uniforms and descriptor sets
//! - **Ordered teardown**: every object destroyed in reverse creation order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     frame_engine::foundation::logging::init();
//!
//!     let config = ApplicationConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut renderer = VulkanRenderer::initialize(&mut window, &config.renderer, TextureRegistry::new())?;
//!
//!     let mut timer = Timer::new();
//!     while !window.should_close() {
//!         window.poll_events();
//!         timer.update();
//!         renderer.update(timer.delta_time())?;
//!     }
//!
//!     renderer.shutdown();
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ImageCrateDecoder, ImageData, ImageDecoder},
        core::config::{ApplicationConfig, DeviceSelectionPolicy, RendererConfig, ShaderConfig, WindowConfig},
        config::{Config, ConfigError},
        foundation::time::Timer,
        render::backends::vulkan::{
            FrameStatus, ResizeSignal, SurfaceProvider, TextureRegistry, VulkanError, VulkanRenderer,
            VulkanResult,
        },
        render::window::{Window, WindowError},
    };
}
