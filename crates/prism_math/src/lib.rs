// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod projection;
mod ray;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use projection::{
    invert_projection, projection_matrix, unproject_pixel, Camera, FitPolicy,
};
pub use ray::Ray;
pub use transform::{invert_orthonormal, Mat4Ext};
