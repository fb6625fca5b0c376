//! Descriptor set layouts, pools and writes
//!
//! The quad pipeline uses a single set layout: the per-image uniform buffer at
//! binding 0 and an array of combined image samplers at binding 1, one element
//! per loaded texture.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Binding of the per-image uniform buffer
pub const UNIFORM_BINDING: u32 = 0;

/// Binding of the texture sampler array
pub const TEXTURE_BINDING: u32 = 1;

/// Descriptor set layout builder for creating reusable layouts
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub const fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add an array of `count` combined image samplers
    #[must_use]
    pub fn add_combined_image_sampler_array(
        mut self,
        binding: u32,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(count)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Bindings collected so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Layout of the quad pipeline's only descriptor set
pub fn quad_layout_builder(max_textures: u32) -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)
        .add_combined_image_sampler_array(TEXTURE_BINDING, max_textures, vk::ShaderStageFlags::FRAGMENT)
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool sizes for `set_count` quad sets with room for `max_textures` samplers each
pub fn quad_pool_sizes(set_count: u32, max_textures: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: set_count.saturating_mul(max_textures),
        },
    ]
}

/// Descriptor pool for allocating descriptor sets
///
/// Destroying the pool frees every set allocated from it.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
    max_sets: u32,
}

impl DescriptorPool {
    /// Pool holding exactly `set_count` quad sets
    pub fn new(device: Device, set_count: u32, max_textures: u32) -> VulkanResult<Self> {
        let pool_sizes = quad_pool_sizes(set_count, max_textures);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(set_count)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        log::debug!("Created descriptor pool for {} sets", set_count);

        Ok(Self {
            pool,
            device,
            max_sets: set_count,
        })
    }

    /// Allocate one set per layout handle
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        if layouts.len() > self.max_sets as usize {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Pool holds {} sets, {} requested", self.max_sets, layouts.len()),
            });
        }

        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Number of sets this pool was sized for
    pub const fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Get the pool handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingWrite {
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        info: usize,
    },
    Images {
        set: vk::DescriptorSet,
        binding: u32,
        first: usize,
        count: usize,
    },
}

/// Descriptor set writer for updating descriptor sets
///
/// Infos are collected first and the `vk::WriteDescriptorSet` structs pointing
/// at them are only built in [`DescriptorSetWriter::update`], once the info
/// vectors can no longer reallocate.
#[derive(Default)]
pub struct DescriptorSetWriter {
    writes: Vec<PendingWrite>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    image_infos: Vec<vk::DescriptorImageInfo>,
}

impl DescriptorSetWriter {
    /// Create a new descriptor set writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a uniform buffer to a descriptor set
    #[must_use]
    pub fn write_buffer(
        mut self,
        descriptor_set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        self.buffer_infos.push(vk::DescriptorBufferInfo { buffer, offset, range });
        self.writes.push(PendingWrite::Buffer {
            set: descriptor_set,
            binding,
            info: self.buffer_infos.len() - 1,
        });
        self
    }

    /// Write `images` into consecutive array elements starting at 0
    ///
    /// An empty slice writes nothing.
    #[must_use]
    pub fn write_image_array(
        mut self,
        descriptor_set: vk::DescriptorSet,
        binding: u32,
        images: &[vk::DescriptorImageInfo],
    ) -> Self {
        if images.is_empty() {
            return self;
        }
        let first = self.image_infos.len();
        self.image_infos.extend_from_slice(images);
        self.writes.push(PendingWrite::Images {
            set: descriptor_set,
            binding,
            first,
            count: images.len(),
        });
        self
    }

    /// Number of writes queued
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn build_writes(&self) -> Vec<vk::WriteDescriptorSet> {
        self.writes
            .iter()
            .map(|write| match *write {
                PendingWrite::Buffer { set, binding, info } => vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&self.buffer_infos[info]))
                    .build(),
                PendingWrite::Images {
                    set,
                    binding,
                    first,
                    count,
                } => vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&self.image_infos[first..first + count])
                    .build(),
            })
            .collect()
    }

    /// Execute all write operations
    pub fn update(self, device: &Device) {
        let writes = self.build_writes();
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}
