//! Triangle mesh buffers as delivered by the file-format readers.
//!
//! A mesh owns plain vertex/triangle arrays plus the optional attribute
//! buffers the stylization modes consume (vertex colors, per-corner UVs, a
//! texture image). Face normals are precomputed here once; the renderer only
//! ever reads them.

use glam::{Mat4, Vec2, Vec3};
use prism_math::Aabb;

use crate::texture::Rgba8Image;

#[derive(Debug, Clone)]
pub struct Mesh {
    /// Vertex positions.
    pub positions: Vec<Vec3>,

    /// Triangle index triples into `positions`.
    pub triangles: Vec<[u32; 3]>,

    /// Unit face normal per triangle (zero for degenerate triangles).
    pub face_normals: Vec<Vec3>,

    /// Per-vertex RGB colors in [0, 1], if present.
    pub vertex_colors: Option<Vec<Vec3>>,

    /// Per-triangle corner UVs, if present.
    pub uvs: Option<Vec<[Vec2; 3]>>,

    /// Texture image sampled through `uvs`, if present.
    pub texture: Option<Rgba8Image>,

    /// Object-to-world transform. Rigid (rotation + translation) only.
    pub transform: Mat4,

    /// Bounds of `positions` in object space.
    pub bounds: Aabb,
}

impl Mesh {
    /// Build a mesh from positions and triangle indices.
    ///
    /// Every index must address a vertex; an out-of-range index is a bug in
    /// the geometry provider and fails loudly here rather than corrupting a
    /// render later.
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        for tri in &triangles {
            assert!(
                tri.iter().all(|&i| (i as usize) < positions.len()),
                "triangle {:?} indexes past {} vertices",
                tri,
                positions.len()
            );
        }

        let face_normals = compute_face_normals(&positions, &triangles);
        let bounds = Aabb::enclosing(&positions);

        Self {
            positions,
            triangles,
            face_normals,
            vertex_colors: None,
            uvs: None,
            texture: None,
            transform: Mat4::IDENTITY,
            bounds,
        }
    }

    pub fn with_vertex_colors(mut self, colors: Vec<Vec3>) -> Self {
        assert_eq!(colors.len(), self.positions.len());
        self.vertex_colors = Some(colors);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<[Vec2; 3]>) -> Self {
        assert_eq!(uvs.len(), self.triangles.len());
        self.uvs = Some(uvs);
        self
    }

    pub fn with_texture(mut self, texture: Rgba8Image) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Unit face normal per triangle, zero where the triangle is degenerate.
fn compute_face_normals(positions: &[Vec3], triangles: &[[u32; 3]]) -> Vec<Vec3> {
    let mut degenerate = 0usize;
    let normals = triangles
        .iter()
        .map(|tri| {
            let p0 = positions[tri[0] as usize];
            let p1 = positions[tri[1] as usize];
            let p2 = positions[tri[2] as usize];
            let n = (p1 - p0).cross(p2 - p0);
            let len = n.length();
            if len > 0.0 {
                n / len
            } else {
                degenerate += 1;
                Vec3::ZERO
            }
        })
        .collect();
    if degenerate > 0 {
        log::warn!("{} degenerate triangle(s) got a zero face normal", degenerate);
    }
    normals
}
