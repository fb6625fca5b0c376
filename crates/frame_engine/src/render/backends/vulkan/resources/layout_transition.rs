//! Image layout transitions around a staging copy

use ash::vk;

use crate::render::backends::vulkan::rendering::commands::CommandRecorder;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Access masks and stages for one supported transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Current layout
    pub old_layout: vk::ImageLayout,
    /// Target layout
    pub new_layout: vk::ImageLayout,
    /// Writes that must be available before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the transition
    pub dst_access: vk::AccessFlags,
    /// Stage that produces `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that performs `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Masks for `old -> new`
    pub fn between(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> VulkanResult<Self> {
        let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            (from, to) => return Err(VulkanError::UnsupportedLayoutTransition { from, to }),
        };

        Ok(Self {
            old_layout,
            new_layout,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }

    /// Barrier covering the single color mip and layer of `image`
    pub fn barrier(&self, image: vk::Image) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .build()
    }

    /// Record the barrier into `recorder`
    pub fn record(&self, recorder: &mut CommandRecorder, image: vk::Image) {
        recorder.cmd_image_barrier(self.src_stage, self.dst_stage, &[self.barrier(image)]);
    }
}
