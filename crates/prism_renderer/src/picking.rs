//! Picking: map a screen pixel's G-buffer sample back to geometry.
//!
//! Both operations are read-only against already-computed samples; neither
//! re-casts a ray.

use glam::Vec3;
use prism_core::{Mesh, ObjectId, ObjectStore};

use crate::gbuffer::PixelSample;

/// Barycentric-interpolated hit position in the mesh's object space.
fn local_hit_position(sample: &PixelSample, mesh: &Mesh) -> Vec3 {
    let tri = mesh.triangles[sample.primitive as usize];
    let v0 = mesh.positions[tri[0] as usize];
    let v1 = mesh.positions[tri[1] as usize];
    let v2 = mesh.positions[tri[2] as usize];
    let w0 = 1.0 - sample.bary_u - sample.bary_v;
    v0 * w0 + v1 * sample.bary_u + v2 * sample.bary_v
}

/// Index of the hit triangle's vertex closest to the hit point.
///
/// Ties break in v0, v1, v2 order.
pub fn closest_vertex(sample: &PixelSample, mesh: &Mesh) -> u32 {
    let tri = mesh.triangles[sample.primitive as usize];
    let pos = local_hit_position(sample, mesh);

    let d0 = (pos - mesh.positions[tri[0] as usize]).length_squared();
    let d1 = (pos - mesh.positions[tri[1] as usize]).length_squared();
    let d2 = (pos - mesh.positions[tri[2] as usize]).length_squared();

    if d0 <= d1 && d0 <= d2 {
        tri[0]
    } else if d1 <= d2 {
        tri[1]
    } else {
        tri[2]
    }
}

/// World-space position of a sample, resolved through the owning object.
///
/// Returns None for background samples and stale ids. The mesh path rebuilds
/// the exact (non-snapped) barycentric position; the point-cloud path returns
/// the splatted vertex.
pub fn world_position(sample: &PixelSample, store: &ObjectStore) -> Option<Vec3> {
    let id = ObjectId::from_raw(sample.id)?;
    if let Some(mesh) = store.mesh(id) {
        let local = local_hit_position(sample, mesh);
        return Some(mesh.transform.transform_point3(local));
    }
    if let Some(pc) = store.pointcloud(id) {
        let local = pc.positions[sample.primitive as usize];
        return Some(pc.transform.transform_point3(local));
    }
    None
}

/// Closest-vertex index of a sample, for vertex highlighting.
///
/// Point-cloud samples are their own vertex.
pub fn vertex_index(sample: &PixelSample, store: &ObjectStore) -> Option<u32> {
    let id = ObjectId::from_raw(sample.id)?;
    if let Some(mesh) = store.mesh(id) {
        return Some(closest_vertex(sample, mesh));
    }
    if let Some(pc) = store.pointcloud(id) {
        // Guard against a stale primitive index after point-count edits.
        if (sample.primitive as usize) < pc.point_count() {
            return Some(sample.primitive);
        }
    }
    None
}
