//! Swapchain, frame slots, per-frame scheduling and teardown

pub mod frame_scheduler;
#[allow(unsafe_code)]
pub mod swapchain;
#[allow(unsafe_code)]
pub mod sync;
pub mod teardown;
