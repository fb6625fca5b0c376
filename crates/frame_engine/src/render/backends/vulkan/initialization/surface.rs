//! Surface provider seam and resize notification
//!
//! The render core never talks to a windowing library directly. A [`SurfaceProvider`]
//! supplies the instance extensions it needs and creates the surface, and a
//! [`ResizeSignal`] carries the "framebuffer changed" edge from the window thread to
//! the render thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;

use crate::render::window::WindowError;

/// Collaborator that owns the native window the renderer presents into
pub trait SurfaceProvider {
    /// Instance extensions the platform surface requires
    fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError>;

    /// Create a surface bound to `instance`
    ///
    /// Ownership of the returned handle passes to the renderer, which destroys it
    /// during teardown.
    fn create_surface(&mut self, instance: vk::Instance) -> Result<vk::SurfaceKHR, WindowError>;

    /// Current drawable size in pixels, used when the surface leaves the extent to the application
    fn drawable_size(&self) -> (u32, u32);

    /// Signal raised whenever the framebuffer size changes
    ///
    /// Providers also publish their current size to it with
    /// [`ResizeSignal::publish_size`] whenever they pump events.
    fn resize_signal(&self) -> ResizeSignal;
}

#[derive(Debug, Default)]
struct ResizeState {
    pending: bool,
    drawable: Option<(u32, u32)>,
}

/// Edge-triggered "framebuffer changed" flag shared between the window and render threads
///
/// Any number of notifications before the render thread observes the flag collapse
/// into a single rebuild.
#[derive(Debug, Clone, Default)]
pub struct ResizeSignal {
    state: Arc<Mutex<ResizeState>>,
}

impl ResizeSignal {
    /// Create a new, lowered signal
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResizeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the flag
    pub fn notify(&self) {
        self.lock().pending = true;
    }

    /// Raise the flag and record the new drawable size
    pub fn notify_resized(&self, width: u32, height: u32) {
        let mut state = self.lock();
        state.pending = true;
        state.drawable = Some((width, height));
    }

    /// Record the provider's current drawable size without raising the flag
    ///
    /// Providers publish on every event pump, so a bare [`ResizeSignal::notify`]
    /// still rebuilds at the live size.
    pub fn publish_size(&self, width: u32, height: u32) {
        self.lock().drawable = Some((width, height));
    }

    /// Whether a resize is waiting to be handled
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Clear the flag, returning whether it was raised
    pub fn take(&self) -> bool {
        std::mem::take(&mut self.lock().pending)
    }

    /// Last drawable size reported with [`ResizeSignal::notify_resized`] or
    /// [`ResizeSignal::publish_size`]
    pub fn drawable_size(&self) -> Option<(u32, u32)> {
        self.lock().drawable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears_flag() {
        let signal = ResizeSignal::new();
        assert!(!signal.take());
        signal.notify();
        assert!(signal.is_pending());
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn test_repeated_notifications_collapse() {
        let signal = ResizeSignal::new();
        signal.notify_resized(640, 480);
        signal.notify_resized(800, 600);
        signal.notify();
        assert!(signal.take());
        assert!(!signal.is_pending());
        assert_eq!(signal.drawable_size(), Some((800, 600)));
    }

    #[test]
    fn test_bare_notify_keeps_published_size() {
        let signal = ResizeSignal::new();
        signal.publish_size(1024, 768);
        assert!(!signal.is_pending());

        signal.notify();
        assert!(signal.take());
        assert_eq!(signal.drawable_size(), Some((1024, 768)));
    }

    #[test]
    fn test_publish_tracks_latest_size() {
        let signal = ResizeSignal::new();
        signal.notify_resized(640, 480);
        signal.publish_size(0, 0);
        assert_eq!(signal.drawable_size(), Some((0, 0)));
        assert!(signal.take());
    }

    #[test]
    fn test_notify_from_another_thread() {
        let signal = ResizeSignal::new();
        let notifier = signal.clone();
        std::thread::spawn(move || {
            for size in 1..=10 {
                notifier.notify_resized(size, size);
            }
        })
        .join()
        .expect("notifier thread");

        assert!(signal.take());
        assert_eq!(signal.drawable_size(), Some((10, 10)));
    }
}
