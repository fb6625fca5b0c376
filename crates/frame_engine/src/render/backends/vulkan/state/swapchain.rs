//! Swapchain management
//!
//! The selection rules are plain functions over the surface capability record so
//! they can be checked without a device. [`SwapchainState`] bundles everything
//! whose lifetime is tied to one image chain; it is always built whole and
//! dropped whole.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::device_selection::{QueueFamilyIndices, SurfaceSupport};
use crate::render::backends::vulkan::rendering::framebuffer::Framebuffer;
use crate::render::backends::vulkan::rendering::render_pass::RenderPass;
use crate::render::backends::vulkan::rendering::shader::{GraphicsPipeline, ShaderCode};
use crate::render::backends::vulkan::state::frame_scheduler::{
    classify_acquire, classify_present, AcquireOutcome, PresentOutcome,
};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Format used when the surface leaves the choice open
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the surface format
///
/// A lone `UNDEFINED` entry means any format is acceptable.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_SURFACE_FORMAT;
        }
    }

    formats
        .iter()
        .find(|f| f.format == PREFERRED_SURFACE_FORMAT.format && f.color_space == PREFERRED_SURFACE_FORMAT.color_space)
        .or_else(|| formats.first())
        .copied()
        .unwrap_or(PREFERRED_SURFACE_FORMAT)
}

/// Mailbox, then immediate, then FIFO
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|preferred| modes.contains(preferred))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Current extent when the surface dictates one, otherwise the drawable size clamped per axis
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: drawable.0.max(min.width).min(max.width),
        height: drawable.1.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by the maximum when one is advertised
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Sharing mode and the queue families that access the images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingPlan {
    /// Exclusive or concurrent
    pub mode: vk::SharingMode,
    /// Families listed for concurrent sharing, empty when exclusive
    pub families: Vec<u32>,
}

/// Exclusive for a shared family, concurrent across both otherwise
pub fn choose_sharing(families: QueueFamilyIndices) -> SharingPlan {
    if families.is_shared() {
        SharingPlan {
            mode: vk::SharingMode::EXCLUSIVE,
            families: Vec::new(),
        }
    } else {
        SharingPlan {
            mode: vk::SharingMode::CONCURRENT,
            families: vec![families.graphics, families.present],
        }
    }
}

/// A minimized window reports a zero-area extent, which no swapchain can have
pub const fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Swapchain handle plus one view per image
///
/// Views are destroyed before the swapchain.
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the image chain for `extent`
    pub fn new(context: &VulkanContext, support: &SurfaceSupport, extent: vk::Extent2D) -> VulkanResult<Self> {
        let device = context.device().clone();
        let loader = context.swapchain_loader().clone();
        let capabilities = &support.capabilities;

        let format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let image_count = choose_image_count(capabilities);
        let sharing = choose_sharing(context.adapter().queue_families);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.families)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };

        // From here on, Drop releases whatever has been created
        let mut chain = Self {
            device,
            loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };

        chain.images = unsafe { chain.loader.get_swapchain_images(swapchain).map_err(VulkanError::Api)? };
        for &image in &chain.images {
            let view = create_color_view(&chain.device, image, format.format)?;
            chain.image_views.push(view);
        }

        Ok(chain)
    }

    /// Get surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get present mode
    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get swapchain extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images the implementation actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_color_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None).map_err(VulkanError::Api) }
}

/// Everything whose lifetime is one image chain
///
/// Field order is drop order: framebuffers, pipeline and its layout, render pass,
/// then the image views and the swapchain itself.
pub struct SwapchainState {
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
}

impl SwapchainState {
    /// Build the image chain, render pass, pipeline and framebuffers
    pub fn build(
        context: &VulkanContext,
        support: &SurfaceSupport,
        extent: vk::Extent2D,
        shaders: &ShaderCode,
        set_layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<Self> {
        let device = context.device();

        let swapchain = Swapchain::new(context, support, extent)?;
        let render_pass = RenderPass::new_present_pass(device.clone(), swapchain.format().format)?;
        let pipeline = GraphicsPipeline::new(device.clone(), render_pass.handle(), shaders, set_layout, extent)?;
        let framebuffers = Framebuffer::for_views(device, render_pass.handle(), swapchain.image_views(), extent)?;

        log::info!(
            "Swapchain ready: {}x{}, {} image(s), {:?}/{:?}, {:?}",
            extent.width,
            extent.height,
            swapchain.image_count(),
            swapchain.format().format,
            swapchain.format().color_space,
            swapchain.present_mode()
        );

        Ok(Self {
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
        })
    }

    /// Acquire the next image, signaling `image_available` when it can be written
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain
                .loader
                .acquire_next_image(self.swapchain.swapchain, u64::MAX, image_available, vk::Fence::null())
        };
        classify_acquire(result)
    }

    /// Queue `image_index` for presentation once `render_finished` is signaled
    pub fn present(
        &self,
        queue: vk::Queue,
        render_finished: vk::Semaphore,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [render_finished];
        let swapchains = [self.swapchain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain.loader.queue_present(queue, &present_info) };
        classify_present(result)
    }

    /// Get swapchain extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Get surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.format()
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Framebuffer handles, one per image
    pub fn framebuffers(&self) -> Vec<vk::Framebuffer> {
        self.framebuffers.iter().map(Framebuffer::handle).collect()
    }

    /// Get render pass handle
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Get pipeline handle
    pub const fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// Get pipeline layout handle
    pub const fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 16, height: 8 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_format_found_in_any_order() {
        let preferred = PREFERRED_SURFACE_FORMAT;
        let other = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let same_format_other_space = format(vk::Format::B8G8R8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);

        assert_eq!(choose_surface_format(&[other, same_format_other_space, preferred]), preferred);
        assert_eq!(choose_surface_format(&[preferred, other]), preferred);
        assert_eq!(choose_surface_format(&[same_format_other_space, preferred, other]), preferred);
    }

    #[test]
    fn test_lone_undefined_format_yields_preferred() {
        let undefined = format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let chosen = choose_surface_format(&[undefined]);
        assert_eq!(chosen, PREFERRED_SURFACE_FORMAT);
        assert_ne!(chosen.format, vk::Format::UNDEFINED);
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let first = format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let second = format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(choose_surface_format(&[first, second]), first);
    }

    #[test]
    fn test_present_mode_preference() {
        use vk::PresentModeKHR as M;
        assert_eq!(choose_present_mode(&[M::IMMEDIATE, M::MAILBOX, M::FIFO]), M::MAILBOX);
        assert_eq!(choose_present_mode(&[M::FIFO, M::IMMEDIATE]), M::IMMEDIATE);
        assert_eq!(choose_present_mode(&[M::FIFO_RELAXED, M::FIFO]), M::FIFO);
        assert_eq!(choose_present_mode(&[M::FIFO]), M::FIFO);
    }

    #[test]
    fn test_scenario_a_format_and_present_mode() {
        let formats = [format(vk::Format::B8G8R8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_surface_format(&formats), formats[0]);
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_scenario_b_unbounded_image_count() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn test_image_count_respects_maximum() {
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(1, 3)), 2);
    }

    #[test]
    fn test_definite_extent_used_verbatim() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = vk::Extent2D { width: 1280, height: 720 };
        assert_eq!(choose_extent(&caps, (10, 10)), caps.current_extent);
    }

    #[test]
    fn test_extent_clamped_within_bounds() {
        let caps = capabilities(2, 0);
        let (min, max) = (caps.min_image_extent, caps.max_image_extent);
        let requests = [0, 1, 7, 8, 16, 640, 2048, 4096, 5000, u32::MAX - 1];
        for &width in &requests {
            for &height in &requests {
                let extent = choose_extent(&caps, (width, height));
                assert!((min.width..=max.width).contains(&extent.width), "{width}x{height}");
                assert!((min.height..=max.height).contains(&extent.height), "{width}x{height}");
            }
        }
        assert_eq!(choose_extent(&caps, (800, 600)), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_sharing_mode_follows_queue_families() {
        let shared = choose_sharing(QueueFamilyIndices { graphics: 0, present: 0 });
        assert_eq!(shared.mode, vk::SharingMode::EXCLUSIVE);
        assert!(shared.families.is_empty());

        let split = choose_sharing(QueueFamilyIndices { graphics: 0, present: 2 });
        assert_eq!(split.mode, vk::SharingMode::CONCURRENT);
        assert_eq!(split.families, vec![0, 2]);
    }

    #[test]
    fn test_zero_area_detection() {
        assert!(is_zero_area(vk::Extent2D { width: 0, height: 600 }));
        assert!(is_zero_area(vk::Extent2D { width: 800, height: 0 }));
        assert!(!is_zero_area(vk::Extent2D { width: 1, height: 1 }));
    }
}
