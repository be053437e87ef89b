//! The per-frame scene aggregate.
//!
//! A scene is a list of visible object handles plus the camera coordinate
//! system. It owns no geometry: handles resolve against the [`ObjectStore`]
//! at render time, and the object list must be rebuilt whenever the store
//! mutates.

use glam::{Mat4, Vec3};
use prism_math::{invert_orthonormal, Aabb, Mat4Ext};

use crate::store::{ObjectId, ObjectStore};

pub struct Scene {
    /// Camera-to-world transform (orthonormal).
    pub coordinate_system: Mat4,
    /// World-to-camera transform, kept in lockstep with `coordinate_system`.
    pub coordinate_system_inv: Mat4,

    /// Rotation/zoom center in world space.
    pub pivot: Vec3,

    /// World bounds of all visible objects.
    pub bounds: Aabb,

    /// Largest axis extent of `bounds`; scales navigation speed and the
    /// primary-ray epsilon.
    pub diagonal: f32,

    pub meshes: Vec<ObjectId>,
    pub pointclouds: Vec<ObjectId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            coordinate_system: Mat4::IDENTITY,
            coordinate_system_inv: Mat4::IDENTITY,
            pivot: Vec3::ZERO,
            bounds: Aabb::EMPTY,
            diagonal: 0.0,
            meshes: Vec::new(),
            pointclouds: Vec::new(),
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a stored object visible. Mesh and point-cloud handles go to
    /// their own lists; a stale handle is ignored.
    pub fn add_object(&mut self, id: ObjectId, store: &ObjectStore) {
        if store.is_mesh(id) {
            self.meshes.push(id);
            log::info!("scene: mesh {:08x} visible", id.to_raw());
        } else if store.is_pointcloud(id) {
            self.pointclouds.push(id);
            log::info!("scene: point cloud {:08x} visible", id.to_raw());
        }
    }

    pub fn remove_object(&mut self, id: ObjectId) {
        self.meshes.retain(|&m| m != id);
        self.pointclouds.retain(|&p| p != id);
    }

    /// Recompute world bounds, pivot-independent diagonal, and drop handles
    /// that no longer resolve. Must run after any store mutation and before
    /// rendering.
    pub fn prepare(&mut self, store: &ObjectStore) {
        self.meshes.retain(|&id| store.mesh(id).is_some());
        self.pointclouds.retain(|&id| store.pointcloud(id).is_some());

        let mut bounds: Option<Aabb> = None;
        for &id in &self.meshes {
            if let Some(mesh) = store.mesh(id) {
                let world = mesh.transform.transform_aabb(&mesh.bounds);
                bounds = Some(match bounds {
                    Some(b) => Aabb::surrounding(&b, &world),
                    None => world,
                });
            }
        }
        for &id in &self.pointclouds {
            if let Some(pc) = store.pointcloud(id) {
                let world = pc.transform.transform_aabb(&pc.bounds);
                bounds = Some(match bounds {
                    Some(b) => Aabb::surrounding(&b, &world),
                    None => world,
                });
            }
        }

        match bounds {
            Some(b) => {
                self.bounds = b;
                self.diagonal = b.largest_extent();
            }
            None => {
                self.bounds = Aabb::from_points(Vec3::ZERO, Vec3::ZERO);
                self.diagonal = 0.0;
            }
        }
    }

    /// Reset the view: pivot at the center of the world bounds, camera
    /// backed off along +Z by twice the diagonal, identity orientation.
    pub fn home(&mut self) {
        self.pivot = self.bounds.centroid();
        self.coordinate_system = Mat4::from_translation(Vec3::new(
            self.pivot.x,
            self.pivot.y,
            self.pivot.z + self.diagonal * 2.0,
        ));
        self.coordinate_system_inv = invert_orthonormal(&self.coordinate_system);
    }

    /// Replace the camera transform, keeping the inverse in lockstep.
    pub fn set_coordinate_system(&mut self, cs: Mat4) {
        self.coordinate_system = cs;
        self.coordinate_system_inv = invert_orthonormal(&cs);
    }
}
