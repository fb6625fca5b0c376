//! Frame scheduler
//!
//! Drives one frame per call: wait on the slot fence, rebuild if a resize was
//! signaled, acquire, refresh uniforms, submit, present. The GPU side sits behind
//! [`FrameBackend`] so the slot protocol can be exercised without a device.
//!
//! Status codes that only mean "the surface changed" are folded into
//! [`FrameStatus`]; everything else comes back as an error.

use ash::vk;

use crate::render::backends::vulkan::initialization::surface::ResizeSignal;
use crate::render::backends::vulkan::{StepContext, VulkanError, VulkanResult};

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available; `suboptimal` asks for a rebuild after this frame
    Acquired {
        /// Index of the acquired image
        image_index: u32,
        /// The surface no longer matches the swapchain exactly
        suboptimal: bool,
    },
    /// The swapchain can no longer present to the surface
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Queued normally
    Presented,
    /// Queued, but the swapchain should be rebuilt
    Suboptimal,
    /// Not queued, the swapchain must be rebuilt
    OutOfDate,
}

/// Map the result of `vkAcquireNextImageKHR`
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Map the result of `vkQueuePresentKHR`
pub fn classify_present(result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// What one call to [`FrameScheduler::run_cycle`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and queued for presentation
    Presented {
        /// Swapchain image that was drawn
        image_index: u32,
    },
    /// The swapchain was rebuilt instead of drawing
    SwapchainRebuilt,
    /// A rebuild is owed: the surface went stale or has zero area
    RebuildPending,
}

/// GPU operations the scheduler sequences
pub trait FrameBackend {
    /// Block until the last submission that used `slot` has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Tear down and recreate the swapchain
    ///
    /// Returns `false` when the surface currently has zero area; the old
    /// swapchain is kept and the rebuild is retried on a later cycle.
    fn rebuild_swapchain(&mut self) -> VulkanResult<bool>;

    /// Acquire the next image, signaling the slot's "image available" semaphore
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome>;

    /// Rewrite the uniform buffer belonging to `image_index`
    fn update_uniforms(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Reset the slot fence and submit the image's recorded command buffer
    fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Present `image_index` once the slot's "render finished" semaphore is signaled
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;
}

/// Per-frame state machine over a fixed number of frame slots
#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    frame_counter: u64,
    resize: ResizeSignal,
    needs_rebuild: bool,
}

impl FrameScheduler {
    /// Create a scheduler for `frames_in_flight` slots observing `resize`
    pub fn new(frames_in_flight: usize, resize: ResizeSignal) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            frame_counter: 0,
            resize,
            needs_rebuild: false,
        }
    }

    /// Number of frame slots
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Frames submitted so far
    pub const fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next cycle will use
    #[allow(clippy::cast_possible_truncation)]
    pub const fn current_slot(&self) -> usize {
        (self.frame_counter % self.frames_in_flight as u64) as usize
    }

    /// Whether a rebuild is owed
    pub const fn rebuild_pending(&self) -> bool {
        self.needs_rebuild
    }

    /// Force a rebuild on the next cycle
    pub fn request_rebuild(&mut self) {
        self.needs_rebuild = true;
    }

    /// Run one frame
    pub fn run_cycle<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<FrameStatus> {
        let slot = self.current_slot();
        backend.wait_for_slot(slot).step("wait for frame slot")?;

        // take() first so a pending resize is consumed even when a rebuild was already owed
        let resized = self.resize.take();
        if resized || self.needs_rebuild {
            return self.rebuild(backend);
        }

        let image_index = match backend.acquire_image(slot).step("acquire image")? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", image_index);
                    self.needs_rebuild = true;
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date at acquire, rebuilding");
                return self.rebuild(backend);
            }
        };

        backend.update_uniforms(slot, image_index).step("update uniforms")?;
        backend.submit(slot, image_index).step("submit frame")?;
        let presented = backend.present(slot, image_index).step("present frame")?;
        self.frame_counter += 1;

        match presented {
            PresentOutcome::Presented => Ok(FrameStatus::Presented { image_index }),
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                log::warn!("Swapchain {:?} at present, rebuild scheduled", presented);
                self.needs_rebuild = true;
                Ok(FrameStatus::RebuildPending)
            }
        }
    }

    fn rebuild<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<FrameStatus> {
        if backend.rebuild_swapchain().step("rebuild swapchain")? {
            self.needs_rebuild = false;
            Ok(FrameStatus::SwapchainRebuilt)
        } else {
            self.needs_rebuild = true;
            Ok(FrameStatus::RebuildPending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Rebuild,
        Acquire(usize),
        Uniforms(u32),
        Submit(usize, u32),
        Present(usize, u32),
    }

    /// In-memory backend: the GPU finishes a submission only when its fence is waited on
    struct MockBackend {
        fence_signaled: Vec<bool>,
        waited_since_submit: Vec<bool>,
        outstanding: Vec<usize>,
        max_outstanding: usize,
        image_count: u32,
        next_image: u32,
        acquire_script: VecDeque<VulkanResult<AcquireOutcome>>,
        present_script: VecDeque<PresentOutcome>,
        rebuild_script: VecDeque<bool>,
        events: Vec<Event>,
    }

    impl MockBackend {
        fn new(slots: usize) -> Self {
            Self {
                fence_signaled: vec![true; slots],
                waited_since_submit: vec![false; slots],
                outstanding: Vec::new(),
                max_outstanding: 0,
                image_count: 3,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                rebuild_script: VecDeque::new(),
                events: Vec::new(),
            }
        }

        fn count(&self, wanted: fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| wanted(e)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::Wait(slot));
            if !self.fence_signaled[slot] {
                self.outstanding.retain(|&s| s != slot);
                self.fence_signaled[slot] = true;
            }
            self.waited_since_submit[slot] = true;
            Ok(())
        }

        fn rebuild_swapchain(&mut self) -> VulkanResult<bool> {
            self.events.push(Event::Rebuild);
            Ok(self.rebuild_script.pop_front().unwrap_or(true))
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
            self.events.push(Event::Acquire(slot));
            if let Some(scripted) = self.acquire_script.pop_front() {
                return scripted;
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn update_uniforms(&mut self, _slot: usize, image_index: u32) -> VulkanResult<()> {
            self.events.push(Event::Uniforms(image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            assert!(self.waited_since_submit[slot], "slot {slot} reused without waiting");
            assert!(self.fence_signaled[slot], "slot {slot} fence reset while unsignaled");
            self.waited_since_submit[slot] = false;
            self.fence_signaled[slot] = false;
            self.outstanding.push(slot);
            self.max_outstanding = self.max_outstanding.max(self.outstanding.len());
            self.events.push(Event::Submit(slot, image_index));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
            self.events.push(Event::Present(slot, image_index));
            Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
        }
    }

    #[test]
    fn test_five_updates_keep_two_frames_in_flight() {
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        let mut backend = MockBackend::new(2);

        for _ in 0..5 {
            let status = scheduler.run_cycle(&mut backend).unwrap();
            assert!(matches!(status, FrameStatus::Presented { .. }));
            assert!(backend.outstanding.len() <= 2);
        }

        assert_eq!(backend.max_outstanding, 2);
        assert_eq!(scheduler.frame_count(), 5);
        assert_eq!(backend.count(|e| matches!(e, Event::Rebuild)), 0);
    }

    #[test]
    fn test_slots_alternate_and_wait_precedes_submit() {
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        let mut backend = MockBackend::new(2);

        for _ in 0..4 {
            scheduler.run_cycle(&mut backend).unwrap();
        }

        let submits: Vec<usize> = backend
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submit(slot, _) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![0, 1, 0, 1]);

        assert_eq!(
            &backend.events[..5],
            &[
                Event::Wait(0),
                Event::Acquire(0),
                Event::Uniforms(0),
                Event::Submit(0, 0),
                Event::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_single_slot_never_overlaps() {
        let mut scheduler = FrameScheduler::new(1, ResizeSignal::new());
        let mut backend = MockBackend::new(1);
        for _ in 0..3 {
            scheduler.run_cycle(&mut backend).unwrap();
        }
        assert_eq!(backend.max_outstanding, 1);
    }

    #[test]
    fn test_repeated_resize_signals_rebuild_once() {
        let resize = ResizeSignal::new();
        let mut scheduler = FrameScheduler::new(2, resize.clone());
        let mut backend = MockBackend::new(2);

        scheduler.run_cycle(&mut backend).unwrap();
        resize.notify_resized(640, 480);
        resize.notify_resized(800, 600);
        resize.notify();

        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::SwapchainRebuilt);
        assert!(matches!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::Presented { .. }));
        assert_eq!(backend.count(|e| matches!(e, Event::Rebuild)), 1);
        // the rebuild cycle skipped acquire and submit
        assert_eq!(backend.count(|e| matches!(e, Event::Submit(..))), 2);
        assert_eq!(scheduler.frame_count(), 2);
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_without_submitting() {
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        let mut backend = MockBackend::new(2);
        backend.acquire_script.push_back(Ok(AcquireOutcome::OutOfDate));

        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::SwapchainRebuilt);
        assert_eq!(backend.count(|e| matches!(e, Event::Submit(..))), 0);
        assert_eq!(scheduler.frame_count(), 0);
        assert_eq!(scheduler.current_slot(), 0);

        assert!(matches!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::Presented { .. }));
    }

    #[test]
    fn test_suboptimal_present_schedules_rebuild() {
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        let mut backend = MockBackend::new(2);
        backend.present_script.push_back(PresentOutcome::Suboptimal);

        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::RebuildPending);
        assert!(scheduler.rebuild_pending());
        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::SwapchainRebuilt);
        assert!(!scheduler.rebuild_pending());
    }

    #[test]
    fn test_suboptimal_acquire_still_presents() {
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        let mut backend = MockBackend::new(2);
        backend.acquire_script.push_back(Ok(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        }));

        assert_eq!(
            scheduler.run_cycle(&mut backend).unwrap(),
            FrameStatus::Presented { image_index: 1 }
        );
        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::SwapchainRebuilt);
    }

    #[test]
    fn test_zero_area_rebuild_is_deferred() {
        let resize = ResizeSignal::new();
        let mut scheduler = FrameScheduler::new(2, resize.clone());
        let mut backend = MockBackend::new(2);
        backend.rebuild_script.extend([false, false, true]);

        resize.notify_resized(0, 0);
        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::RebuildPending);
        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::RebuildPending);
        assert_eq!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::SwapchainRebuilt);
        assert!(matches!(scheduler.run_cycle(&mut backend).unwrap(), FrameStatus::Presented { .. }));
        assert_eq!(backend.count(|e| matches!(e, Event::Submit(..))), 1);
    }

    #[test]
    fn test_fatal_acquire_error_names_step() {
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        let mut backend = MockBackend::new(2);
        backend
            .acquire_script
            .push_back(Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));

        let err = scheduler.run_cycle(&mut backend).unwrap_err();
        assert!(matches!(err, VulkanError::Step { step: "acquire image", .. }));
        assert!(matches!(err.root(), VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
    }

    #[test]
    fn test_status_codes_are_classified() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());

        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
