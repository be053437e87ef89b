//! Soft-delete object store.
//!
//! Meshes and point clouds live in separate slot arenas (their render paths
//! never share code, so there is no common base type). Each slot is
//! `Active | Deleted | Empty`; delete parks the object for restore, remove
//! frees the slot and bumps its generation so stale handles can never
//! resolve to a newcomer.
//!
//! Handles pack to a nonzero `u32` for storage in G-buffer samples, where 0
//! stays reserved as the background sentinel.

use thiserror::Error;

use crate::bvh::TriangleBvh;
use crate::mesh::Mesh;
use crate::pointcloud::PointCloud;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Mesh,
    PointCloud,
}

/// Stable generational handle to a stored object.
///
/// Packs to `kind(2) | generation(14) | index+1(16)` bits. The low half is
/// never zero, so a packed id never collides with the background sentinel;
/// the kind bits keep mesh and point-cloud handles from resolving in the
/// wrong arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    kind: ObjectKind,
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub fn kind(self) -> ObjectKind {
        self.kind
    }

    pub fn to_raw(self) -> u32 {
        let kind = match self.kind {
            ObjectKind::Mesh => 1u32,
            ObjectKind::PointCloud => 2u32,
        };
        debug_assert!(self.index < 0xffff);
        (kind << 30) | ((self.generation & 0x3fff) << 16) | (self.index + 1)
    }

    /// Unpack a raw id; 0 (the background sentinel) has no object.
    pub fn from_raw(raw: u32) -> Option<ObjectId> {
        let low = raw & 0xffff;
        if low == 0 {
            return None;
        }
        let kind = match raw >> 30 {
            1 => ObjectKind::Mesh,
            2 => ObjectKind::PointCloud,
            _ => return None,
        };
        Some(ObjectId {
            kind,
            index: low - 1,
            generation: (raw >> 16) & 0x3fff,
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The handle's slot was freed or recycled since the handle was issued.
    #[error("stale object handle")]
    StaleHandle,
    /// The operation needed the object in the other soft-delete state.
    #[error("object is not in the expected delete state")]
    WrongState,
}

enum Slot<T> {
    Active(T),
    Deleted(T),
    Empty,
}

struct SlotArena<T> {
    kind: ObjectKind,
    slots: Vec<(u32, Slot<T>)>,
    free: Vec<u32>,
}

impl<T> SlotArena<T> {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> ObjectId {
        if let Some(index) = self.free.pop() {
            let (generation, slot) = &mut self.slots[index as usize];
            *slot = Slot::Active(value);
            ObjectId {
                kind: self.kind,
                index,
                generation: *generation,
            }
        } else {
            let index = self.slots.len() as u32;
            assert!(index < 0xffff, "object store slot capacity exceeded");
            self.slots.push((0, Slot::Active(value)));
            ObjectId {
                kind: self.kind,
                index,
                generation: 0,
            }
        }
    }

    fn get(&self, id: ObjectId) -> Option<&T> {
        if id.kind != self.kind {
            return None;
        }
        match self.slots.get(id.index as usize) {
            Some((generation, Slot::Active(value))) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        if id.kind != self.kind {
            return None;
        }
        match self.slots.get_mut(id.index as usize) {
            Some((generation, Slot::Active(value))) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    fn set_deleted(&mut self, id: ObjectId, deleted: bool) -> Result<(), StoreError> {
        if id.kind != self.kind {
            return Err(StoreError::StaleHandle);
        }
        let (generation, slot) = self
            .slots
            .get_mut(id.index as usize)
            .ok_or(StoreError::StaleHandle)?;
        if *generation != id.generation || matches!(slot, Slot::Empty) {
            return Err(StoreError::StaleHandle);
        }
        let is_active = matches!(slot, Slot::Active(_));
        if is_active != deleted {
            return Err(StoreError::WrongState);
        }
        // Move the payload between the two tagged states.
        let current = std::mem::replace(slot, Slot::Empty);
        *slot = match current {
            Slot::Active(v) => Slot::Deleted(v),
            Slot::Deleted(v) => Slot::Active(v),
            Slot::Empty => unreachable!(),
        };
        Ok(())
    }

    /// Free the slot for reuse. Not restorable; the generation bump
    /// invalidates every outstanding handle.
    fn remove(&mut self, id: ObjectId) -> Result<T, StoreError> {
        if id.kind != self.kind {
            return Err(StoreError::StaleHandle);
        }
        let (generation, slot) = self
            .slots
            .get_mut(id.index as usize)
            .ok_or(StoreError::StaleHandle)?;
        if *generation != id.generation || matches!(slot, Slot::Empty) {
            return Err(StoreError::StaleHandle);
        }
        let current = std::mem::replace(slot, Slot::Empty);
        *generation = generation.wrapping_add(1) & 0x3fff;
        self.free.push(id.index);
        match current {
            Slot::Active(v) | Slot::Deleted(v) => Ok(v),
            Slot::Empty => unreachable!(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (ObjectId, &T)> {
        let kind = self.kind;
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, (generation, slot))| match slot {
                Slot::Active(value) => Some((
                    ObjectId {
                        kind,
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                _ => None,
            })
    }

    fn clear(&mut self) {
        for (index, (generation, slot)) in self.slots.iter_mut().enumerate() {
            if !matches!(slot, Slot::Empty) {
                *slot = Slot::Empty;
                *generation = generation.wrapping_add(1) & 0x3fff;
                self.free.push(index as u32);
            }
        }
    }
}

struct MeshEntry {
    mesh: Mesh,
    /// Built once at insert; geometry edits require `rebuild_index`.
    index: Option<TriangleBvh>,
}

/// The object database backing scenes.
pub struct ObjectStore {
    meshes: SlotArena<MeshEntry>,
    pointclouds: SlotArena<PointCloud>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self {
            meshes: SlotArena::new(ObjectKind::Mesh),
            pointclouds: SlotArena::new(ObjectKind::PointCloud),
        }
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mesh and build its spatial index.
    pub fn insert_mesh(&mut self, mesh: Mesh) -> ObjectId {
        let index = TriangleBvh::build(&mesh.triangles, &mesh.positions);
        let id = self.meshes.insert(MeshEntry {
            mesh,
            index: Some(index),
        });
        log::debug!("stored mesh {:08x}", id.to_raw());
        id
    }

    pub fn insert_pointcloud(&mut self, pointcloud: PointCloud) -> ObjectId {
        let id = self.pointclouds.insert(pointcloud);
        log::debug!("stored point cloud {:08x}", id.to_raw());
        id
    }

    pub fn mesh(&self, id: ObjectId) -> Option<&Mesh> {
        self.meshes.get(id).map(|entry| &entry.mesh)
    }

    pub fn mesh_index(&self, id: ObjectId) -> Option<&TriangleBvh> {
        self.meshes.get(id).and_then(|entry| entry.index.as_ref())
    }

    pub fn pointcloud(&self, id: ObjectId) -> Option<&PointCloud> {
        self.pointclouds.get(id)
    }

    pub fn is_mesh(&self, id: ObjectId) -> bool {
        self.meshes.get(id).is_some()
    }

    pub fn is_pointcloud(&self, id: ObjectId) -> bool {
        self.pointclouds.get(id).is_some()
    }

    /// Mutable mesh access for geometry edits. The spatial index is dropped:
    /// it no longer matches the buffers, and a stale index must never be
    /// queried. Call [`ObjectStore::rebuild_index`] when the edit is done.
    pub fn mesh_mut(&mut self, id: ObjectId) -> Option<&mut Mesh> {
        let entry = self.meshes.get_mut(id)?;
        entry.index = None;
        Some(&mut entry.mesh)
    }

    /// Rebuild a mesh's spatial index after its geometry changed.
    pub fn rebuild_index(&mut self, id: ObjectId) -> Result<(), StoreError> {
        let entry = self.meshes.get_mut(id).ok_or(StoreError::StaleHandle)?;
        entry.index = Some(TriangleBvh::build(
            &entry.mesh.triangles,
            &entry.mesh.positions,
        ));
        Ok(())
    }

    /// Soft-delete: the object leaves every lookup but can be restored.
    pub fn delete(&mut self, id: ObjectId) -> Result<(), StoreError> {
        match id.kind {
            ObjectKind::Mesh => self.meshes.set_deleted(id, true),
            ObjectKind::PointCloud => self.pointclouds.set_deleted(id, true),
        }
    }

    pub fn restore(&mut self, id: ObjectId) -> Result<(), StoreError> {
        match id.kind {
            ObjectKind::Mesh => self.meshes.set_deleted(id, false),
            ObjectKind::PointCloud => self.pointclouds.set_deleted(id, false),
        }
    }

    /// Hard delete: frees the slot, not restorable.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), StoreError> {
        match id.kind {
            ObjectKind::Mesh => self.meshes.remove(id).map(|_| ()),
            ObjectKind::PointCloud => self.pointclouds.remove(id).map(|_| ()),
        }
    }

    pub fn clear(&mut self) {
        self.meshes.clear();
        self.pointclouds.clear();
    }

    pub fn iter_meshes(&self) -> impl Iterator<Item = (ObjectId, &Mesh)> {
        self.meshes.iter().map(|(id, entry)| (id, &entry.mesh))
    }

    pub fn iter_pointclouds(&self) -> impl Iterator<Item = (ObjectId, &PointCloud)> {
        self.pointclouds.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn triangle_mesh() -> Mesh {
        Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 2]])
    }

    #[test]
    fn test_raw_id_is_nonzero_and_roundtrips() {
        let mut store = ObjectStore::new();
        let id = store.insert_mesh(triangle_mesh());
        let raw = id.to_raw();
        assert_ne!(raw, 0);
        assert_eq!(ObjectId::from_raw(raw), Some(id));
        assert_eq!(ObjectId::from_raw(0), None);
    }

    #[test]
    fn test_delete_restore() {
        let mut store = ObjectStore::new();
        let id = store.insert_mesh(triangle_mesh());

        store.delete(id).unwrap();
        assert!(store.mesh(id).is_none());

        store.restore(id).unwrap();
        assert!(store.mesh(id).is_some());

        // Restoring an active object is a state error, not a stale handle.
        assert_eq!(store.restore(id), Err(StoreError::WrongState));
    }

    #[test]
    fn test_remove_invalidates_handle() {
        let mut store = ObjectStore::new();
        let id = store.insert_mesh(triangle_mesh());
        store.remove(id).unwrap();

        assert!(store.mesh(id).is_none());
        assert_eq!(store.delete(id), Err(StoreError::StaleHandle));

        // The slot is recycled with a fresh generation.
        let id2 = store.insert_mesh(triangle_mesh());
        assert_ne!(id.to_raw(), id2.to_raw());
        assert!(store.mesh(id).is_none());
        assert!(store.mesh(id2).is_some());
    }

    #[test]
    fn test_index_built_on_insert_and_dropped_on_edit() {
        let mut store = ObjectStore::new();
        let id = store.insert_mesh(triangle_mesh());
        assert!(store.mesh_index(id).is_some());

        store.mesh_mut(id).unwrap();
        assert!(store.mesh_index(id).is_none());

        store.rebuild_index(id).unwrap();
        assert!(store.mesh_index(id).is_some());
    }

    #[test]
    fn test_kinds_do_not_cross_resolve() {
        let mut store = ObjectStore::new();
        let mesh_id = store.insert_mesh(triangle_mesh());
        let pc_id = store.insert_pointcloud(PointCloud::new(vec![Vec3::ZERO]));

        // Same slot index in both arenas, but the kind bits keep the packed
        // ids distinct and the lookups separate.
        assert_ne!(mesh_id.to_raw(), pc_id.to_raw());
        assert!(store.is_mesh(mesh_id));
        assert!(!store.is_pointcloud(mesh_id));
        assert!(store.is_pointcloud(pc_id));
        assert!(!store.is_mesh(pc_id));

        assert_eq!(store.iter_meshes().count(), 1);
        assert_eq!(store.iter_pointclouds().count(), 1);
    }

    #[test]
    fn test_empty_mesh_gets_always_miss_index() {
        let mut store = ObjectStore::new();
        let id = store.insert_mesh(Mesh::new(vec![], vec![]));
        assert!(matches!(store.mesh_index(id), Some(TriangleBvh::Empty)));
    }
}
