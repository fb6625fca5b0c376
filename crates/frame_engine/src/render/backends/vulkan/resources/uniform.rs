//! Per-image uniform record for the spinning quad

use ash::vk;

use crate::foundation::math::{to_columns, Mat4, Point, Vec3};

/// Model, view and projection matrices in column-major order
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformBufferObject {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to camera
    pub view: [[f32; 4]; 4],
    /// Camera to clip space
    pub projection: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for UniformBufferObject {}
unsafe impl bytemuck::Zeroable for UniformBufferObject {}

/// Rotation speed of the quad
pub const DEGREES_PER_SECOND: f32 = 90.0;

const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 10.0;

impl UniformBufferObject {
    /// Size of the record in bytes
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;

    /// Matrices for the quad after `elapsed` seconds, viewed into `extent`
    pub fn spinning_quad(elapsed: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_axis_angle(&Vec3::z_axis(), elapsed * DEGREES_PER_SECOND.to_radians());
        let view = Mat4::look_at_rh(&Point::new(2.0, 2.0, 2.0), &Point::origin(), &Vec3::z());
        Self {
            model: to_columns(&model),
            view: to_columns(&view),
            projection: to_columns(&projection(extent)),
        }
    }

    /// Raw bytes as written to the uniform buffer
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Aspect ratio of `extent`, 1.0 when it has no height
#[allow(clippy::cast_precision_loss)]
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

/// Perspective projection with Y flipped for Vulkan clip space
pub fn projection(extent: vk::Extent2D) -> Mat4 {
    let mut projection = Mat4::new_perspective(
        aspect_ratio(extent),
        FIELD_OF_VIEW_DEGREES.to_radians(),
        NEAR_PLANE,
        FAR_PLANE,
    );
    projection[(1, 1)] *= -1.0;
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    fn matrix(columns: [[f32; 4]; 4]) -> Mat4 {
        Mat4::from(columns)
    }

    #[test]
    fn test_record_is_48_floats() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        let ubo = UniformBufferObject::spinning_quad(0.0, EXTENT);
        assert_eq!(ubo.as_bytes().len(), 192);
    }

    #[test]
    fn test_model_turns_quarter_per_second() {
        let ubo = UniformBufferObject::spinning_quad(1.0, EXTENT);
        let rotated = matrix(ubo.model) * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(rotated, Vector4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-5);

        let start = UniformBufferObject::spinning_quad(0.0, EXTENT);
        assert_relative_eq!(matrix(start.model), Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_view_looks_at_origin_from_corner() {
        let ubo = UniformBufferObject::spinning_quad(0.0, EXTENT);
        let view = matrix(ubo.view);

        let eye = view * Vector4::new(2.0, 2.0, 2.0, 1.0);
        assert_relative_eq!(eye, Vector4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-5);

        // Right-handed: the target lies on the negative Z axis in view space
        let target = view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.z, -(12.0_f32.sqrt()), epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y_and_uses_aspect() {
        let projection = projection(EXTENT);
        assert!(projection[(1, 1)] < 0.0);

        let focal = 1.0 / (FIELD_OF_VIEW_DEGREES.to_radians() / 2.0).tan();
        assert_relative_eq!(projection[(1, 1)], -focal, epsilon = 1e-5);
        assert_relative_eq!(projection[(0, 0)], focal / (800.0 / 600.0), epsilon = 1e-5);
    }

    #[test]
    fn test_zero_height_extent_uses_square_aspect() {
        let extent = vk::Extent2D { width: 800, height: 0 };
        assert_relative_eq!(aspect_ratio(extent), 1.0);
        let projection = projection(extent);
        assert_relative_eq!(projection[(0, 0)], -projection[(1, 1)], epsilon = 1e-6);
    }

    #[test]
    fn test_columns_are_column_major() {
        let ubo = UniformBufferObject::spinning_quad(1.0, EXTENT);
        let model = matrix(ubo.model);
        // Column 0 holds the image of +X
        assert_relative_eq!(ubo.model[0][1], model[(1, 0)]);
        assert_relative_eq!(ubo.model[0][1], 1.0, epsilon = 1e-5);
    }
}
