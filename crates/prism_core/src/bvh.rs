//! Per-mesh bounding volume hierarchy over triangle indices.
//!
//! Built once when a mesh enters the object store and queried through two
//! contracts: closest-hit and all-hits. The tree stores triangle ids only;
//! vertex data stays in the mesh buffers and is passed to every query, so a
//! query borrows geometry instead of copying it.

use glam::Vec3;
use prism_math::{Aabb, Interval, Ray};

/// Maximum triangles per leaf before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// One accepted ray/triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Index into the mesh's triangle array.
    pub triangle: u32,
    /// Ray parameter of the intersection.
    pub t: f32,
    /// Barycentric coordinates within the triangle.
    pub u: f32,
    pub v: f32,
}

/// BVH node: a branch with two children, a leaf with a few triangles, or
/// the empty index (zero triangles), which reports "not found" for every
/// query instead of being an error.
pub enum TriangleBvh {
    Branch {
        left: Box<TriangleBvh>,
        right: Box<TriangleBvh>,
        bbox: Aabb,
    },
    Leaf {
        triangles: Vec<u32>,
        bbox: Aabb,
    },
    Empty,
}

fn triangle_bounds(tri: &[u32; 3], positions: &[Vec3]) -> Aabb {
    let p0 = positions[tri[0] as usize];
    let p1 = positions[tri[1] as usize];
    let p2 = positions[tri[2] as usize];
    Aabb::from_points(p0.min(p1).min(p2), p0.max(p1).max(p2))
}

/// Moller-Trumbore ray/triangle intersection.
///
/// Returns (t, u, v) when the ray crosses the triangle within ray_t.
pub fn intersect_triangle(
    ray: &Ray,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    ray_t: Interval,
) -> Option<(f32, f32, f32)> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray parallel to the triangle plane.
    if a.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    if !ray_t.contains(t) {
        return None;
    }

    Some((t, u, v))
}

impl TriangleBvh {
    /// Build an index over all triangles of a mesh.
    ///
    /// Median split on the longest centroid axis; tolerates zero triangles by
    /// producing [`TriangleBvh::Empty`].
    pub fn build(triangles: &[[u32; 3]], positions: &[Vec3]) -> Self {
        if triangles.is_empty() {
            return TriangleBvh::Empty;
        }
        let ids: Vec<u32> = (0..triangles.len() as u32).collect();
        let node = Self::build_node(ids, triangles, positions);
        log::debug!("built triangle index over {} triangles", triangles.len());
        node
    }

    fn build_node(mut ids: Vec<u32>, triangles: &[[u32; 3]], positions: &[Vec3]) -> Self {
        let bounds = ids
            .iter()
            .map(|&id| triangle_bounds(&triangles[id as usize], positions))
            .fold(Aabb::EMPTY, |acc, b| Aabb::surrounding(&acc, &b));

        if ids.len() <= LEAF_MAX_SIZE {
            return TriangleBvh::Leaf {
                triangles: ids,
                bbox: bounds,
            };
        }

        // Split axis from the spread of centroids, not of the boxes.
        let centroid_bounds = ids.iter().fold(Aabb::EMPTY, |acc, &id| {
            let c = triangle_bounds(&triangles[id as usize], positions).centroid();
            Aabb::surrounding(&acc, &Aabb::from_points(c, c))
        });
        let axis = centroid_bounds.longest_axis();

        ids.sort_unstable_by(|&a, &b| {
            let ca = triangle_bounds(&triangles[a as usize], positions).centroid()[axis];
            let cb = triangle_bounds(&triangles[b as usize], positions).centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let right_ids = ids.split_off(ids.len() / 2);
        let left = Self::build_node(ids, triangles, positions);
        let right = Self::build_node(right_ids, triangles, positions);

        TriangleBvh::Branch {
            left: Box::new(left),
            right: Box::new(right),
            bbox: bounds,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match self {
            TriangleBvh::Empty => Aabb::EMPTY,
            TriangleBvh::Leaf { bbox, .. } => *bbox,
            TriangleBvh::Branch { bbox, .. } => *bbox,
        }
    }

    /// Nearest intersection along the ray within ray_t, or None.
    ///
    /// A degenerate interval (min >= max) is an immediate miss.
    pub fn closest_hit(
        &self,
        triangles: &[[u32; 3]],
        positions: &[Vec3],
        ray: &Ray,
        ray_t: Interval,
    ) -> Option<TriangleHit> {
        if ray_t.min >= ray_t.max {
            return None;
        }
        match self {
            TriangleBvh::Empty => None,

            TriangleBvh::Leaf {
                triangles: ids,
                bbox,
            } => {
                if !bbox.hit(ray, ray_t) {
                    return None;
                }
                let mut best: Option<TriangleHit> = None;
                let mut closest = ray_t.max;
                for &id in ids {
                    let tri = &triangles[id as usize];
                    let v0 = positions[tri[0] as usize];
                    let v1 = positions[tri[1] as usize];
                    let v2 = positions[tri[2] as usize];
                    if let Some((t, u, v)) =
                        intersect_triangle(ray, v0, v1, v2, Interval::new(ray_t.min, closest))
                    {
                        closest = t;
                        best = Some(TriangleHit {
                            triangle: id,
                            t,
                            u,
                            v,
                        });
                    }
                }
                best
            }

            TriangleBvh::Branch { left, right, bbox } => {
                if !bbox.hit(ray, ray_t) {
                    return None;
                }
                let left_hit = left.closest_hit(triangles, positions, ray, ray_t);
                // The right subtree only needs to beat the left hit.
                let right_max = left_hit.map_or(ray_t.max, |h| h.t);
                let right_hit = right.closest_hit(
                    triangles,
                    positions,
                    ray,
                    Interval::new(ray_t.min, right_max),
                );
                right_hit.or(left_hit)
            }
        }
    }

    /// True if any triangle intersects the ray within ray_t. Stops at the
    /// first accepted intersection; used for shadow tests.
    pub fn any_hit(
        &self,
        triangles: &[[u32; 3]],
        positions: &[Vec3],
        ray: &Ray,
        ray_t: Interval,
    ) -> bool {
        if ray_t.min >= ray_t.max {
            return false;
        }
        match self {
            TriangleBvh::Empty => false,

            TriangleBvh::Leaf {
                triangles: ids,
                bbox,
            } => {
                bbox.hit(ray, ray_t)
                    && ids.iter().any(|&id| {
                        let tri = &triangles[id as usize];
                        intersect_triangle(
                            ray,
                            positions[tri[0] as usize],
                            positions[tri[1] as usize],
                            positions[tri[2] as usize],
                            ray_t,
                        )
                        .is_some()
                    })
            }

            TriangleBvh::Branch { left, right, bbox } => {
                bbox.hit(ray, ray_t)
                    && (left.any_hit(triangles, positions, ray, ray_t)
                        || right.any_hit(triangles, positions, ray, ray_t))
            }
        }
    }

    /// Every intersection along the ray within ray_t, nearest first.
    pub fn all_hits(
        &self,
        triangles: &[[u32; 3]],
        positions: &[Vec3],
        ray: &Ray,
        ray_t: Interval,
    ) -> Vec<TriangleHit> {
        let mut hits = Vec::new();
        if ray_t.min < ray_t.max {
            self.collect_hits(triangles, positions, ray, ray_t, &mut hits);
            hits.sort_unstable_by(|a, b| a.t.partial_cmp(&b.t).unwrap_or(std::cmp::Ordering::Equal));
        }
        hits
    }

    fn collect_hits(
        &self,
        triangles: &[[u32; 3]],
        positions: &[Vec3],
        ray: &Ray,
        ray_t: Interval,
        out: &mut Vec<TriangleHit>,
    ) {
        match self {
            TriangleBvh::Empty => {}

            TriangleBvh::Leaf {
                triangles: ids,
                bbox,
            } => {
                if !bbox.hit(ray, ray_t) {
                    return;
                }
                for &id in ids {
                    let tri = &triangles[id as usize];
                    if let Some((t, u, v)) = intersect_triangle(
                        ray,
                        positions[tri[0] as usize],
                        positions[tri[1] as usize],
                        positions[tri[2] as usize],
                        ray_t,
                    ) {
                        out.push(TriangleHit {
                            triangle: id,
                            t,
                            u,
                            v,
                        });
                    }
                }
            }

            TriangleBvh::Branch { left, right, bbox } => {
                if !bbox.hit(ray, ray_t) {
                    return;
                }
                left.collect_hits(triangles, positions, ray, ray_t, out);
                right.collect_hits(triangles, positions, ray, ray_t, out);
            }
        }
    }
}
