//! Math type aliases over nalgebra

pub use nalgebra::{Matrix4, Point3, Unit, Vector3};

/// 3D vector
pub type Vec3 = Vector3<f32>;
/// 4x4 matrix
pub type Mat4 = Matrix4<f32>;
/// 3D point
pub type Point = Point3<f32>;

/// Column-major array form of a matrix, matching GLSL `mat4` memory layout
pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}
