//! Command buffer management
//!
//! Type-safe command buffer recording. Draw command buffers are recorded once per
//! swapchain image and replayed every frame until the swapchain or the bound
//! resources change.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool on `queue_family_index`
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool =
            unsafe { device.create_command_pool(&pool_create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(VulkanError::Api) }
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Frees every buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Type-safe command buffer recorder
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Create a new command recorder
    pub const fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin command recording
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);

        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Begin render pass
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// Record a pipeline barrier with image barriers only
    pub fn cmd_image_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            );
        }
    }

    /// Copy between buffers
    pub fn cmd_copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, regions);
        }
    }

    /// Copy a buffer into an image in `TRANSFER_DST_OPTIMAL`
    pub fn cmd_copy_buffer_to_image(&mut self, src: vk::Buffer, dst: vk::Image, regions: &[vk::BufferImageCopy]) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            );
        }
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer).map_err(VulkanError::Api)?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }
}

/// Active render pass, ended when dropped
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl ActiveRenderPass<'_> {
    /// Bind graphics pipeline
    pub fn cmd_bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind vertex buffers
    pub fn cmd_bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_vertex_buffers(self.recorder.command_buffer, first_binding, buffers, offsets);
        }
    }

    /// Bind index buffer
    pub fn cmd_bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_index_buffer(self.recorder.command_buffer, buffer, offset, index_type);
        }
    }

    /// Bind descriptor sets for the graphics bind point
    pub fn cmd_bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    /// Draw indexed
    pub fn cmd_draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.recorder.device.cmd_draw_indexed(
                self.recorder.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

/// Everything a pre-recorded quad draw binds
#[derive(Debug, Clone, Copy)]
pub struct QuadDraw {
    /// Render pass the framebuffers were created for
    pub render_pass: vk::RenderPass,
    /// Pipeline to bind
    pub pipeline: vk::Pipeline,
    /// Layout of `pipeline`
    pub pipeline_layout: vk::PipelineLayout,
    /// Render area
    pub extent: vk::Extent2D,
    /// Vertex buffer bound at binding 0
    pub vertex_buffer: vk::Buffer,
    /// 16-bit index buffer
    pub index_buffer: vk::Buffer,
    /// Number of indices to draw
    pub index_count: u32,
}

/// Background color every frame is cleared to
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Record one draw command buffer per framebuffer
///
/// Buffer `i` renders into `framebuffers[i]` with `descriptor_sets[i]` bound, so
/// the slices must be the same length.
pub fn record_quad_draws(
    device: &Device,
    command_buffers: &[vk::CommandBuffer],
    framebuffers: &[vk::Framebuffer],
    descriptor_sets: &[vk::DescriptorSet],
    draw: &QuadDraw,
) -> VulkanResult<()> {
    if command_buffers.len() != framebuffers.len() || descriptor_sets.len() != framebuffers.len() {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "Mismatched draw inputs: {} command buffers, {} framebuffers, {} descriptor sets",
                command_buffers.len(),
                framebuffers.len(),
                descriptor_sets.len()
            ),
        });
    }

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue { float32: CLEAR_COLOR },
    }];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: draw.extent,
    };

    for ((&command_buffer, &framebuffer), &descriptor_set) in
        command_buffers.iter().zip(framebuffers).zip(descriptor_sets)
    {
        let mut recorder = CommandRecorder::new(command_buffer, device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
        {
            let mut pass = recorder.begin_render_pass(draw.render_pass, framebuffer, render_area, &clear_values)?;
            pass.cmd_bind_pipeline(draw.pipeline);
            pass.cmd_bind_vertex_buffers(0, &[draw.vertex_buffer], &[0]);
            pass.cmd_bind_index_buffer(draw.index_buffer, 0, vk::IndexType::UINT16);
            pass.cmd_bind_descriptor_sets(draw.pipeline_layout, 0, &[descriptor_set]);
            pass.cmd_draw_indexed(draw.index_count, 1, 0, 0, 0);
        }
        recorder.end()?;
    }

    log::trace!("Recorded {} draw command buffer(s)", command_buffers.len());
    Ok(())
}
