//! Vulkan synchronization primitives
//!
//! Each frame slot owns an "image available" semaphore (acquire to submit), a
//! "render finished" semaphore (submit to present) and an "in flight" fence that
//! the CPU waits on before reusing the slot. Fences start signaled so the first
//! wait on every slot returns immediately.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, fence })
    }

    /// Wait for the fence, giving up after `timeout_ns`
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::DeviceTimeout {
                waited_ms: timeout_ns / 1_000_000,
            }),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Reset the fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects of one frame slot
pub struct FrameSync {
    /// Signaled by acquire, waited by submit
    pub image_available: Semaphore,
    /// Signaled by submit, waited by present
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completes
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the objects for one slot, fence signaled
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }

    /// Create `count` slots
    pub fn create_slots(device: &Device, count: usize) -> VulkanResult<Vec<Self>> {
        (0..count).map(|_| Self::new(device)).collect()
    }
}
