//! Vulkan backend implementation
//!
//! Organized into initialization, rendering, resources and state modules, with
//! [`VulkanRenderer`] driving them.

/// Instance, surface and device bring-up
pub mod initialization;

/// Render pass, pipeline, framebuffers and command recording
pub mod rendering;

/// Buffers, textures, uniforms and descriptor sets
pub mod resources;

/// Swapchain, frame slots, frame scheduling and teardown
pub mod state;

/// Lifecycle facade
#[allow(unsafe_code)]
pub mod renderer;

#[cfg(test)]
mod gpu_tests;

pub use renderer::VulkanRenderer;

pub use initialization::context::{StepContext, VulkanContext, VulkanError, VulkanResult};
pub use initialization::surface::{ResizeSignal, SurfaceProvider};

pub use resources::texture_registry::TextureRegistry;
pub use state::frame_scheduler::FrameStatus;
