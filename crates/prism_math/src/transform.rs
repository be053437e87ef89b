// Transform utilities for Mat4.
//
// glam::Mat4 provides transform_point3() and a general inverse(); the viewer
// only ever deals with rigid (orthonormal basis + translation) transforms,
// so the inverse here is the cheap transposed form.

use crate::Aabb;
use glam::{Mat3, Mat4, Vec3, Vec4};

/// Extension trait adding the transform helpers the renderer needs.
pub trait Mat4Ext {
    /// Rotate a direction (implicit w = 0): translation does not apply.
    fn rotate_vec3(&self, v: Vec3) -> Vec3;

    /// Bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn rotate_vec3(&self, v: Vec3) -> Vec3 {
        let rotated = *self * Vec4::new(v.x, v.y, v.z, 0.0);
        rotated.truncate()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        let lo = aabb.min_corner();
        let hi = aabb.max_corner();
        let corners = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ];

        let mut min = self.transform_point3(corners[0]);
        let mut max = min;
        for corner in &corners[1..] {
            let p = self.transform_point3(*corner);
            min = min.min(p);
            max = max.max(p);
        }
        Aabb::from_points(min, max)
    }
}

/// Invert a rigid transform (orthonormal 3x3 basis plus translation).
///
/// The basis is transposed and the translation rotated back through it.
/// Callers must not pass scaled or sheared matrices; for those use
/// `Mat4::inverse`.
pub fn invert_orthonormal(m: &Mat4) -> Mat4 {
    let basis = Mat3::from_mat4(*m).transpose();
    let translation = -(basis * m.w_axis.truncate());
    Mat4::from_cols(
        basis.x_axis.extend(0.0),
        basis.y_axis.extend(0.0),
        basis.z_axis.extend(0.0),
        translation.extend(1.0),
    )
}
