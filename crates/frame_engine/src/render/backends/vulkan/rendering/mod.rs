//! Render pass, pipeline, framebuffers and command recording

#[allow(unsafe_code)]
pub mod commands;
#[allow(unsafe_code)]
pub mod framebuffer;
#[allow(unsafe_code)]
pub mod render_pass;
#[allow(unsafe_code)]
pub mod shader;
#[allow(unsafe_code)]
pub mod vertex_layout;
