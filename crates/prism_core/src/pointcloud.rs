//! Point-cloud buffers. Points are never ray-cast; the renderer splats them
//! through the projection pipeline against the mesh depth buffer.

use glam::{Mat4, Vec3};
use prism_math::Aabb;

#[derive(Debug, Clone)]
pub struct PointCloud {
    pub positions: Vec<Vec3>,

    /// Per-point unit normals, if present (used for shaded splats).
    pub normals: Option<Vec<Vec3>>,

    /// Per-point packed RGBA colors, if present.
    pub colors: Option<Vec<u32>>,

    /// Object-to-world transform. Rigid only.
    pub transform: Mat4,

    /// Bounds of `positions` in object space.
    pub bounds: Aabb,
}

impl PointCloud {
    pub fn new(positions: Vec<Vec3>) -> Self {
        let bounds = Aabb::enclosing(&positions);
        Self {
            positions,
            normals: None,
            colors: None,
            transform: Mat4::IDENTITY,
            bounds,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        assert_eq!(normals.len(), self.positions.len());
        self.normals = Some(normals);
        self
    }

    pub fn with_colors(mut self, colors: Vec<u32>) -> Self {
        assert_eq!(colors.len(), self.positions.len());
        self.colors = Some(colors);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }
}
