//! Buffer management
//!
//! A [`Buffer`] owns its handle and the memory bound to it.

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::memory;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer of `size` bytes and bind memory with `properties` to it
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(|e| VulkanError::from_allocation(e, size))?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = match memory::allocate(&device, memory_properties, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Owned from here, Drop frees both
        let created = Self {
            device,
            buffer,
            memory,
            size,
        };
        unsafe {
            created
                .device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(created)
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        let len = bytes.len() as vk::DeviceSize;
        if len > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Write of {len} bytes exceeds buffer size {}", self.size),
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
