//! Framebuffer management

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer binding `color_view` to `render_pass`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        color_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let attachments = [color_view];
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, framebuffer })
    }

    /// Create one framebuffer per swapchain image view
    pub fn for_views(
        device: &Device,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<Self>> {
        views
            .iter()
            .map(|&view| Self::new(device.clone(), render_pass, view, extent))
            .collect()
    }

    /// Get the framebuffer handle
    pub const fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
