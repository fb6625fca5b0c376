//! Synchronous staging uploads
//!
//! Every upload records a one-time command buffer, submits it to the graphics
//! queue and waits for the queue to go idle before returning. The staging buffer
//! is dropped after that wait.

use ash::{vk, Device};

use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Host-visible, coherent memory for staging and uniform buffers
pub const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// What an upload needs from the renderer
pub struct UploadContext<'a> {
    /// Logical device
    pub device: &'a Device,
    /// Memory-property table of the chosen adapter
    pub memory_properties: &'a vk::PhysicalDeviceMemoryProperties,
    /// Pool the one-time command buffers come from
    pub command_pool: &'a CommandPool,
    /// Queue the copies are submitted to
    pub queue: vk::Queue,
    /// Whether the device was created with anisotropic filtering
    pub anisotropy: bool,
}

impl UploadContext<'_> {
    /// Create a host-visible buffer holding `bytes`
    pub fn staging_buffer(&self, bytes: &[u8]) -> VulkanResult<Buffer> {
        let staging = Buffer::new(
            self.device.clone(),
            self.memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HOST_MEMORY,
        )?;
        staging.write_bytes(bytes)?;
        Ok(staging)
    }

    /// Record commands with `record`, submit them and block until the queue is idle
    pub fn submit_one_time<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let command_buffers = self.command_pool.allocate_command_buffers(1)?;
        let result = self.record_and_wait(&command_buffers, record);
        self.command_pool.free_command_buffers(&command_buffers);
        result
    }

    fn record_and_wait<F>(&self, command_buffers: &[vk::CommandBuffer], record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let command_buffer = command_buffers
            .first()
            .copied()
            .ok_or_else(|| VulkanError::InitializationFailed("No command buffer allocated".to_string()))?;

        let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder)?;
        recorder.end()?;

        let submit_info = vk::SubmitInfo::builder().command_buffers(command_buffers).build();
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device.queue_wait_idle(self.queue).map_err(VulkanError::Api)
        }
    }

    /// Copy `bytes` into a new device-local buffer with `usage`
    pub fn upload_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<Buffer> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = self.staging_buffer(bytes)?;
        let destination = Buffer::new(
            self.device.clone(),
            self.memory_properties,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        self.submit_one_time(|recorder| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            recorder.cmd_copy_buffer(staging.handle(), destination.handle(), &[region]);
            Ok(())
        })?;

        log::debug!("Uploaded {} bytes to device-local buffer", size);
        Ok(destination)
    }
}
