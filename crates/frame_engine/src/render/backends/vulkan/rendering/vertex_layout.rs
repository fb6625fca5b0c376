//! Vertex format of the built-in quad and its Vulkan input description

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// 2D position plus RGB color, 20 bytes, tightly packed
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 2],
    /// Per-vertex color
    pub color: [f32; 3],
}

unsafe impl Pod for Vertex {}
unsafe impl Zeroable for Vertex {}

/// Corners of the unit quad centered at the origin
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { position: [-0.5, -0.5], color: [1.0, 0.0, 0.0] },
    Vertex { position: [0.5, -0.5], color: [0.0, 1.0, 0.0] },
    Vertex { position: [0.5, 0.5], color: [0.0, 0.0, 1.0] },
    Vertex { position: [-0.5, 0.5], color: [1.0, 1.0, 1.0] },
];

/// Two counter-clockwise triangles covering the quad
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

impl Vertex {
    /// One binding, advancing per vertex
    #[allow(clippy::cast_possible_truncation)]
    pub const fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position at location 0, color at location 1
    pub const fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 8,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding_description().stride, 20);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&QUAD_VERTICES).len(), 80);
    }

    #[test]
    fn test_attribute_offsets_match_fields() {
        let [position, color] = Vertex::attribute_descriptions();
        assert_eq!(position.offset, 0);
        assert_eq!(position.format, vk::Format::R32G32_SFLOAT);
        assert_eq!(color.location, 1);
        assert_eq!(color.offset as usize, std::mem::size_of::<[f32; 2]>());
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn test_quad_indices_reference_all_corners() {
        assert_eq!(QUAD_INDICES.len(), 6);
        for corner in 0..QUAD_VERTICES.len() {
            assert!(QUAD_INDICES.iter().any(|&i| usize::from(i) == corner));
        }
        assert!(QUAD_INDICES.iter().all(|&i| usize::from(i) < QUAD_VERTICES.len()));
    }

    #[test]
    fn test_quad_triangles_wind_counter_clockwise() {
        for tri in QUAD_INDICES.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| QUAD_VERTICES[usize::from(i)].position);
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0);
        }
    }
}
