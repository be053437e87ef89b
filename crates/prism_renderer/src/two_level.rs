//! Two-level visibility query.
//!
//! Each mesh carries its own spatial index in object space plus a rigid
//! object-to-world transform. A world ray is transformed into every object's
//! local space and delegated to that object's index; the closest hit across
//! objects wins. Because the transforms are rigid, object-space distances
//! equal world-space distances and the parametric interval never needs
//! rescaling.

use glam::{Mat4, Vec2, Vec3};
use prism_core::{Rgba8Image, TriangleBvh};
use prism_math::{Interval, Mat4Ext, Ray};

/// Borrowed view of one visible mesh for the duration of a frame.
///
/// All slices point into store-owned buffers; the store must outlive the
/// render call and stay unmutated while any of these exist.
pub struct SceneObjectRef<'a> {
    /// Packed store id, written into G-buffer samples.
    pub raw_id: u32,
    /// None while the object has no usable index (empty geometry or a
    /// pending rebuild); such objects are skipped, never dereferenced.
    pub bvh: Option<&'a TriangleBvh>,
    pub transform: Mat4,
    pub inv_transform: Mat4,
    pub triangles: &'a [[u32; 3]],
    pub positions: &'a [Vec3],
    pub face_normals: &'a [Vec3],
    pub vertex_colors: Option<&'a [Vec3]>,
    pub uvs: Option<&'a [[Vec2; 3]]>,
    pub texture: Option<&'a Rgba8Image>,
}

/// A hit resolved across all objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Index into the query's object array.
    pub object: usize,
    /// Triangle index within that object.
    pub triangle: u32,
    /// World-space hit distance.
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

pub struct TwoLevelQuery<'a> {
    objects: &'a [SceneObjectRef<'a>],
}

impl<'a> TwoLevelQuery<'a> {
    pub fn new(objects: &'a [SceneObjectRef<'a>]) -> Self {
        Self { objects }
    }

    /// Globally closest intersection within ray_t, or None.
    ///
    /// The interval's far end shrinks as soon as any object reports a hit,
    /// so later objects only search a strictly smaller range.
    pub fn closest_hit(&self, ray: &Ray, ray_t: Interval) -> Option<HitRecord> {
        if ray_t.min >= ray_t.max {
            return None;
        }

        let mut closest = ray_t.max;
        let mut best: Option<HitRecord> = None;

        for (index, obj) in self.objects.iter().enumerate() {
            let Some(bvh) = obj.bvh else { continue };

            let local = Ray::new(
                obj.inv_transform.transform_point3(ray.origin),
                obj.inv_transform.rotate_vec3(ray.direction),
            );

            if let Some(hit) = bvh.closest_hit(
                obj.triangles,
                obj.positions,
                &local,
                Interval::new(ray_t.min, closest),
            ) {
                closest = hit.t;
                best = Some(HitRecord {
                    object: index,
                    triangle: hit.triangle,
                    t: hit.t,
                    u: hit.u,
                    v: hit.v,
                });
            }
        }

        best
    }

    /// True if anything intersects the ray within ray_t. Stops at the first
    /// hit from any object without resolving the closest one.
    pub fn any_hit(&self, ray: &Ray, ray_t: Interval) -> bool {
        if ray_t.min >= ray_t.max {
            return false;
        }
        self.objects.iter().any(|obj| {
            let Some(bvh) = obj.bvh else { return false };
            let local = Ray::new(
                obj.inv_transform.transform_point3(ray.origin),
                obj.inv_transform.rotate_vec3(ray.direction),
            );
            bvh.any_hit(obj.triangles, obj.positions, &local, ray_t)
        })
    }
}
