//! Memory type selection and raw allocation

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// First memory type allowed by `type_bits` whose flags include all of `required`
///
/// No scoring among several matches: enumeration order decides.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);

    (0u32..)
        .zip(&memory_properties.memory_types[..count])
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index)
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Allocate memory satisfying `requirements` with `properties`
pub fn allocate(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe {
        device
            .allocate_memory(&alloc_info, None)
            .map_err(|e| VulkanError::from_allocation(e, requirements.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: u32::try_from(types.len()).unwrap(),
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            *slot = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn test_first_matching_type_wins() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, HOST).unwrap(), 1);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_type_bits_filter_candidates() {
        let props = properties(&[HOST, HOST]);
        assert_eq!(find_memory_type(&props, 0b10, HOST).unwrap(), 1);
    }

    #[test]
    fn test_superset_of_requested_flags_matches() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL | HOST]);
        assert_eq!(
            find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            0
        );
    }

    #[test]
    fn test_no_match_is_an_error() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(matches!(
            find_memory_type(&props, 0b1, HOST),
            Err(VulkanError::NoSuitableMemoryType)
        ));
        let props = properties(&[HOST]);
        assert!(matches!(
            find_memory_type(&props, 0b10, HOST),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }

    #[test]
    fn test_types_beyond_count_are_ignored() {
        let mut props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = HOST;
        assert!(find_memory_type(&props, 0b11, HOST).is_err());
    }
}
