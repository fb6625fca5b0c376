//! Ordered teardown
//!
//! Objects are released in the reverse of creation order. Destroying a pool
//! before its sets, or the device before the objects it owns, is undefined
//! behavior, so the order is fixed here and every owner releases exactly one
//! step at a time through [`Teardown`].

/// One stage of the teardown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    /// Bounded wait until the GPU is idle
    WaitIdle,
    /// Per-slot semaphores and fences
    FrameSync,
    /// Command pool, implicitly freeing its command buffers
    CommandPool,
    /// Descriptor pool, implicitly freeing its sets
    DescriptorPool,
    /// Descriptor set layouts
    DescriptorSetLayouts,
    /// Uniform buffers and their memory
    UniformBuffers,
    /// Index buffer and its memory
    IndexBuffer,
    /// Vertex buffer and its memory
    VertexBuffer,
    /// Texture samplers, views, images and memory
    Textures,
    /// Framebuffers, pipeline, pipeline layout, render pass, image views, swapchain
    Swapchain,
    /// Presentation surface
    Surface,
    /// Logical device
    Device,
    /// Instance and debug messenger
    Instance,
}

/// The complete sequence, in order
pub const TEARDOWN_ORDER: [TeardownStep; 13] = [
    TeardownStep::WaitIdle,
    TeardownStep::FrameSync,
    TeardownStep::CommandPool,
    TeardownStep::DescriptorPool,
    TeardownStep::DescriptorSetLayouts,
    TeardownStep::UniformBuffers,
    TeardownStep::IndexBuffer,
    TeardownStep::VertexBuffer,
    TeardownStep::Textures,
    TeardownStep::Swapchain,
    TeardownStep::Surface,
    TeardownStep::Device,
    TeardownStep::Instance,
];

/// Owner of the objects released by the teardown sequence
pub trait Teardown {
    /// Release everything belonging to `step`; called once per step, in order
    fn release(&mut self, step: TeardownStep);
}

/// Run every step of [`TEARDOWN_ORDER`] against `target`
pub fn run_teardown<T: Teardown + ?Sized>(target: &mut T) {
    for step in TEARDOWN_ORDER {
        log::trace!("Teardown: {:?}", step);
        target.release(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        steps: Vec<TeardownStep>,
    }

    impl Teardown for Recorder {
        fn release(&mut self, step: TeardownStep) {
            self.steps.push(step);
        }
    }

    fn position(step: TeardownStep) -> usize {
        TEARDOWN_ORDER
            .iter()
            .position(|&s| s == step)
            .unwrap_or_else(|| panic!("{step:?} missing from teardown order"))
    }

    #[test]
    fn test_every_step_runs_once_in_order() {
        let mut recorder = Recorder::default();
        run_teardown(&mut recorder);
        assert_eq!(recorder.steps, TEARDOWN_ORDER.to_vec());

        let unique: std::collections::HashSet<_> = recorder.steps.iter().collect();
        assert_eq!(unique.len(), TEARDOWN_ORDER.len());
    }

    #[test]
    fn test_idle_wait_comes_first() {
        assert_eq!(TEARDOWN_ORDER[0], TeardownStep::WaitIdle);
    }

    #[test]
    fn test_pools_before_what_they_allocate_from() {
        assert!(position(TeardownStep::DescriptorPool) < position(TeardownStep::DescriptorSetLayouts));
        assert!(position(TeardownStep::CommandPool) < position(TeardownStep::Device));
    }

    #[test]
    fn test_device_objects_before_device_before_instance() {
        let device = position(TeardownStep::Device);
        for step in &TEARDOWN_ORDER[..device] {
            assert_ne!(*step, TeardownStep::Instance);
        }
        assert!(position(TeardownStep::Swapchain) < position(TeardownStep::Surface));
        assert!(position(TeardownStep::Surface) < device);
        assert!(device < position(TeardownStep::Instance));
        assert_eq!(TEARDOWN_ORDER.last(), Some(&TeardownStep::Instance));
    }

    #[test]
    fn test_buffers_released_in_reverse_creation_order() {
        assert!(position(TeardownStep::UniformBuffers) < position(TeardownStep::IndexBuffer));
        assert!(position(TeardownStep::IndexBuffer) < position(TeardownStep::VertexBuffer));
        assert!(position(TeardownStep::VertexBuffer) < position(TeardownStep::Textures));
    }
}
