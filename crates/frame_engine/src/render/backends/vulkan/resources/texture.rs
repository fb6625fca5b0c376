//! Sampled textures uploaded through staging

use ash::{vk, Device};

use crate::assets::ImageData;
use crate::render::backends::vulkan::resources::layout_transition::LayoutTransition;
use crate::render::backends::vulkan::resources::memory;
use crate::render::backends::vulkan::resources::upload::UploadContext;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Pixel format of every uploaded texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Anisotropy level requested when the device supports it
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Bytes staged for an RGBA8 image
pub const fn staging_size(width: u32, height: u32) -> vk::DeviceSize {
    width as vk::DeviceSize * height as vk::DeviceSize * 4
}

/// Whole-image copy from a tightly packed buffer
pub fn copy_region(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    }
}

/// Linear filtering, repeat addressing, a single mip level
pub fn sampler_info(anisotropy: bool) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(if anisotropy { MAX_ANISOTROPY } else { 1.0 })
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .build()
}

/// Device-local image with its view and sampler
pub struct Texture {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    memory_size: vk::DeviceSize,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    extent: vk::Extent2D,
    layout: vk::ImageLayout,
}

impl Texture {
    /// Upload `pixels`, leaving the image in `SHADER_READ_ONLY_OPTIMAL`
    pub fn upload(upload: &UploadContext<'_>, pixels: &ImageData) -> VulkanResult<Self> {
        pixels
            .validate()
            .map_err(|e| VulkanError::InvalidImageData(e.to_string()))?;

        let device = upload.device;
        let extent = vk::Extent2D {
            width: pixels.width,
            height: pixels.height,
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(|e| VulkanError::from_allocation(e, staging_size(extent.width, extent.height)))?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match memory::allocate(
            device,
            upload.memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        // Owned from here, Drop releases whatever has been created
        let mut texture = Self {
            device: device.clone(),
            image,
            memory,
            memory_size: requirements.size,
            image_view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent,
            layout: vk::ImageLayout::UNDEFINED,
        };

        unsafe { device.bind_image_memory(image, memory, 0).map_err(VulkanError::Api)? };

        texture.copy_from_staging(upload, &pixels.data)?;
        texture.image_view = texture.create_view()?;
        let sampler_info = sampler_info(upload.anisotropy);
        texture.sampler = unsafe { device.create_sampler(&sampler_info, None).map_err(VulkanError::Api)? };

        log::debug!(
            "Uploaded {}x{} texture ({} bytes of device memory)",
            extent.width,
            extent.height,
            texture.memory_size
        );
        Ok(texture)
    }

    fn copy_from_staging(&mut self, upload: &UploadContext<'_>, bytes: &[u8]) -> VulkanResult<()> {
        let to_transfer = LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
        let to_shader =
            LayoutTransition::between(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        let staging = upload.staging_buffer(bytes)?;
        let image = self.image;
        let region = copy_region(self.extent);

        upload.submit_one_time(|recorder| {
            to_transfer.record(recorder, image);
            recorder.cmd_copy_buffer_to_image(staging.handle(), image, &[region]);
            to_shader.record(recorder, image);
            Ok(())
        })?;

        self.layout = to_shader.new_layout;
        Ok(())
    }

    fn create_view(&self) -> VulkanResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.create_image_view(&create_info, None).map_err(VulkanError::Api) }
    }

    /// Size of the device memory bound to the image
    pub const fn memory_size(&self) -> vk::DeviceSize {
        self.memory_size
    }

    /// Layout the image was left in
    pub const fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Image dimensions
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get image view handle
    pub const fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Get sampler handle
    pub const fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Descriptor for a combined image sampler binding
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image_view,
            image_layout: self.layout,
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("image", &self.image)
            .field("memory", &self.memory)
            .field("memory_size", &self.memory_size)
            .field("image_view", &self.image_view)
            .field("sampler", &self.sampler)
            .field("extent", &self.extent)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
            if self.image_view != vk::ImageView::null() {
                self.device.destroy_image_view(self.image_view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_by_two_stages_sixteen_bytes() {
        assert_eq!(staging_size(2, 2), 16);
        let pixels = ImageData::solid_color(2, 2, [255, 0, 0, 255]);
        assert_eq!(pixels.data.len() as vk::DeviceSize, staging_size(pixels.width, pixels.height));
    }

    #[test]
    fn test_staging_size_does_not_overflow_u32() {
        assert_eq!(staging_size(65_536, 65_536), 17_179_869_184);
    }

    #[test]
    fn test_copy_region_covers_whole_image() {
        let region = copy_region(vk::Extent2D { width: 2, height: 2 });
        assert_eq!(region.image_extent.width, 2);
        assert_eq!(region.image_extent.height, 2);
        assert_eq!(region.image_extent.depth, 1);
        assert_eq!(region.buffer_row_length, 0);
        assert_eq!(region.image_subresource.layer_count, 1);
    }

    #[test]
    fn test_sampler_anisotropy_follows_device_support() {
        let with = sampler_info(true);
        assert_eq!(with.anisotropy_enable, vk::TRUE);
        assert!((with.max_anisotropy - MAX_ANISOTROPY).abs() < f32::EPSILON);

        let without = sampler_info(false);
        assert_eq!(without.anisotropy_enable, vk::FALSE);
        assert!((without.max_anisotropy - 1.0).abs() < f32::EPSILON);
        assert_eq!(without.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(without.mag_filter, vk::Filter::LINEAR);
        assert!(without.max_lod.abs() < f32::EPSILON);
    }
}
