//! Window management using GLFW
//!
//! Provides window creation, event pumping and the [`SurfaceProvider`] the renderer
//! presents through.

use ash::vk;
use thiserror::Error;

use crate::core::config::WindowConfig;
use crate::render::backends::vulkan::{ResizeSignal, SurfaceProvider};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The native window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),

    /// Vulkan surface creation failed
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

#[allow(clippy::cast_sign_loss)]
fn to_extent((width, height): (i32, i32)) -> (u32, u32) {
    (width.max(0) as u32, height.max(0) as u32)
}

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resize: ResizeSignal,
}

impl Window {
    /// Create a resizable window without a client API
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::GlfwError("Vulkan loader not found".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Created window '{}' ({}x{})", config.title, config.width, config.height);

        let resize = ResizeSignal::new();
        let (width, height) = to_extent(window.get_framebuffer_size());
        resize.publish_size(width, height);

        Ok(Self {
            glfw,
            window,
            events,
            resize,
        })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request (or cancel) closing the window
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the event queue
    ///
    /// Framebuffer size changes raise the resize signal and the current size is
    /// published to it after every pump; Escape requests close.
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        let mut close = false;
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    let (width, height) = to_extent((width, height));
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                    self.resize.notify_resized(width, height);
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) | glfw::WindowEvent::Close => {
                    close = true;
                }
                _ => {}
            }
        }
        if close {
            self.window.set_should_close(true);
        }
        let (width, height) = self.get_framebuffer_size();
        self.resize.publish_size(width, height);
    }

    /// Block until at least one event arrives
    ///
    /// Useful while minimized, when there is nothing to present.
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Framebuffer size in pixels
    pub fn get_framebuffer_size(&self) -> (u32, u32) {
        to_extent(self.window.get_framebuffer_size())
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    fn create_surface(&mut self, instance: vk::Instance) -> Result<vk::SurfaceKHR, WindowError> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(format!("{result:?}")))
        }
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.get_framebuffer_size()
    }

    fn resize_signal(&self) -> ResizeSignal {
        self.resize.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_sizes_clamp_to_zero() {
        assert_eq!(to_extent((-1, 600)), (0, 600));
        assert_eq!(to_extent((800, 600)), (800, 600));
    }

    #[test]
    fn test_error_messages() {
        let err = WindowError::SurfaceCreation("ERROR_INITIALIZATION_FAILED".to_string());
        assert_eq!(err.to_string(), "Surface creation failed: ERROR_INITIALIZATION_FAILED");
    }
}
