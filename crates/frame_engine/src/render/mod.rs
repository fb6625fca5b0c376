//! Rendering: the Vulkan backend and the window it presents into

pub mod backends;
pub mod window;
