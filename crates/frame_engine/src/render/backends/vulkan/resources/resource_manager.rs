//! Resource management for the quad renderer
//!
//! Owns the vertex and index buffers, one uniform buffer per swapchain image, the
//! descriptor set layout and the pool holding one descriptor set per image.
//! Each group can be released on its own so the teardown sequence controls the
//! order; fields are declared in that same order for the drop fallback.

use ash::{vk, Device};

use crate::render::backends::vulkan::rendering::vertex_layout::Vertex;
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::{
    quad_layout_builder, DescriptorPool, DescriptorSetLayout, DescriptorSetWriter, TEXTURE_BINDING, UNIFORM_BINDING,
};
use crate::render::backends::vulkan::resources::texture_registry::TextureRegistry;
use crate::render::backends::vulkan::resources::uniform::UniformBufferObject;
use crate::render::backends::vulkan::resources::upload::{UploadContext, HOST_MEMORY};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Manages GPU resources like buffers and descriptor sets
pub struct ResourceManager {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    max_textures: u32,

    descriptor_pool: Option<DescriptorPool>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    set_layout: Option<DescriptorSetLayout>,
    uniform_buffers: Vec<Buffer>,
    index_buffer: Option<Buffer>,
    index_count: u32,
    vertex_buffer: Option<Buffer>,
}

impl ResourceManager {
    /// Create the descriptor set layout; buffers come later
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        max_textures: u32,
    ) -> VulkanResult<Self> {
        log::debug!("Creating ResourceManager...");
        let set_layout = quad_layout_builder(max_textures).build(device)?;

        Ok(Self {
            device: device.clone(),
            memory_properties: *memory_properties,
            max_textures,
            descriptor_pool: None,
            descriptor_sets: Vec::new(),
            set_layout: Some(set_layout),
            uniform_buffers: Vec::new(),
            index_buffer: None,
            index_count: 0,
            vertex_buffer: None,
        })
    }

    /// Create a buffer backed by memory with `properties`
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(self.device.clone(), &self.memory_properties, size, usage, properties)
    }

    /// Upload vertex and 16-bit index data to device-local buffers
    pub fn upload_geometry(&mut self, upload: &UploadContext<'_>, vertices: &[Vertex], indices: &[u16]) -> VulkanResult<()> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Geometry needs at least one vertex and one index".to_string(),
            });
        }
        let index_count = u32::try_from(indices.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("{} indices do not fit a single draw", indices.len()),
        })?;

        let vertex_buffer = upload.upload_buffer(bytemuck::cast_slice(vertices), vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer = upload.upload_buffer(bytemuck::cast_slice(indices), vk::BufferUsageFlags::INDEX_BUFFER)?;

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.index_count = index_count;
        log::debug!("Uploaded {} vertices and {} indices", vertices.len(), indices.len());
        Ok(())
    }

    /// Make sure there is exactly one uniform buffer per swapchain image
    ///
    /// Returns `true` when the buffers were recreated. The descriptor sets refer
    /// to the old buffers until [`ResourceManager::rebuild_descriptor_sets`] runs.
    pub fn ensure_uniform_buffers(&mut self, image_count: usize) -> VulkanResult<bool> {
        if self.uniform_buffers.len() == image_count {
            return Ok(false);
        }

        let buffers = (0..image_count)
            .map(|_| self.create_buffer(UniformBufferObject::SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER, HOST_MEMORY))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Uniform buffers: {} -> {} ({} bytes each)",
            self.uniform_buffers.len(),
            image_count,
            UniformBufferObject::SIZE
        );
        self.uniform_buffers = buffers;
        Ok(true)
    }

    /// Recreate the pool and write one set per uniform buffer
    ///
    /// Every set binds its image's uniform buffer at binding 0 and all loaded
    /// textures, in registry order, at binding 1. The old pool and its sets are
    /// only released once the new ones are written, so on error the current sets
    /// stay valid. The caller must ensure no submitted work still uses the old sets.
    pub fn rebuild_descriptor_sets(&mut self, textures: &TextureRegistry) -> VulkanResult<&[vk::DescriptorSet]> {
        check_texture_limit(textures.len(), self.max_textures)?;
        let layout = self
            .set_layout
            .as_ref()
            .ok_or_else(|| released("descriptor set layout"))?
            .handle();

        let set_count = u32::try_from(self.uniform_buffers.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: "Too many swapchain images".to_string(),
        })?;

        let pool = DescriptorPool::new(self.device.clone(), set_count, self.max_textures)?;
        let layouts = vec![layout; self.uniform_buffers.len()];
        let sets = pool.allocate_descriptor_sets(&layouts)?;

        let images = textures.descriptor_image_infos();
        let writer = sets
            .iter()
            .zip(&self.uniform_buffers)
            .fold(DescriptorSetWriter::new(), |writer, (&set, buffer)| {
                writer
                    .write_buffer(set, UNIFORM_BINDING, buffer.handle(), 0, UniformBufferObject::SIZE)
                    .write_image_array(set, TEXTURE_BINDING, &images)
            });
        writer.update(&self.device);

        log::debug!("Wrote {} descriptor set(s) with {} texture(s)", sets.len(), images.len());
        // Replacing the old pool frees the old sets with it
        self.descriptor_sets = sets;
        self.descriptor_pool = Some(pool);
        Ok(&self.descriptor_sets)
    }

    /// Write `ubo` into the uniform buffer of `image_index`
    pub fn write_uniforms(&self, image_index: u32, ubo: &UniformBufferObject) -> VulkanResult<()> {
        let buffer = self
            .uniform_buffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!(
                    "No uniform buffer for image {image_index} ({} allocated)",
                    self.uniform_buffers.len()
                ),
            })?;
        buffer.write_bytes(ubo.as_bytes())
    }

    /// Get the descriptor set layout handle
    pub fn set_layout(&self) -> VulkanResult<vk::DescriptorSetLayout> {
        self.set_layout
            .as_ref()
            .map(DescriptorSetLayout::handle)
            .ok_or_else(|| released("descriptor set layout"))
    }

    /// One descriptor set per swapchain image
    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet] {
        &self.descriptor_sets
    }

    /// Get the vertex buffer handle
    pub fn vertex_buffer(&self) -> VulkanResult<vk::Buffer> {
        self.vertex_buffer
            .as_ref()
            .map(Buffer::handle)
            .ok_or_else(|| released("vertex buffer"))
    }

    /// Get the index buffer handle
    pub fn index_buffer(&self) -> VulkanResult<vk::Buffer> {
        self.index_buffer
            .as_ref()
            .map(Buffer::handle)
            .ok_or_else(|| released("index buffer"))
    }

    /// Number of indices in the index buffer
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Size of the binding-1 sampler array
    pub const fn max_textures(&self) -> u32 {
        self.max_textures
    }

    /// Destroy the descriptor pool and the sets allocated from it
    pub fn release_descriptor_pool(&mut self) {
        self.descriptor_sets.clear();
        self.descriptor_pool = None;
    }

    /// Destroy the descriptor set layout
    pub fn release_set_layout(&mut self) {
        self.set_layout = None;
    }

    /// Destroy every uniform buffer
    pub fn release_uniform_buffers(&mut self) {
        self.uniform_buffers.clear();
    }

    /// Destroy the index buffer
    pub fn release_index_buffer(&mut self) {
        self.index_buffer = None;
        self.index_count = 0;
    }

    /// Destroy the vertex buffer
    pub fn release_vertex_buffer(&mut self) {
        self.vertex_buffer = None;
    }
}

/// Fail when `loaded` textures do not fit the sampler array
pub fn check_texture_limit(loaded: usize, max_textures: u32) -> VulkanResult<()> {
    if loaded > max_textures as usize {
        Err(VulkanError::TextureLimit { max: max_textures })
    } else {
        Ok(())
    }
}

fn released(what: &str) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("The {what} has already been released"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_limit() {
        assert!(check_texture_limit(0, 16).is_ok());
        assert!(check_texture_limit(16, 16).is_ok());
        assert!(matches!(
            check_texture_limit(17, 16),
            Err(VulkanError::TextureLimit { max: 16 })
        ));
    }

    #[test]
    fn test_released_resource_message() {
        let err = released("vertex buffer");
        assert_eq!(err.to_string(), "Invalid operation: The vertex buffer has already been released");
    }
}
