//! Prism core - geometry model, object store, and material lookup for the
//! viewer's CPU renderer.
//!
//! This crate provides:
//!
//! - **Geometry types**: [`Mesh`] and [`PointCloud`] buffers with rigid
//!   transforms and bounds
//! - **Spatial index**: the per-mesh [`TriangleBvh`] answering closest-hit
//!   and all-hits ray queries
//! - **Object store**: a soft-delete arena handing out stable generational
//!   [`ObjectId`]s
//! - **Materials**: procedural and file-backed [`Matcap`] lookup images
//! - **Scene**: the per-frame aggregate of visible objects and the camera
//!   coordinate system

pub mod bvh;
pub mod matcap;
pub mod mesh;
pub mod pointcloud;
pub mod scene;
pub mod store;
pub mod texture;

// Re-export commonly used types
pub use bvh::{TriangleBvh, TriangleHit};
pub use matcap::{Matcap, MatcapError, MatcapLibrary};
pub use mesh::Mesh;
pub use pointcloud::PointCloud;
pub use scene::Scene;
pub use store::{ObjectId, ObjectStore, StoreError};
pub use texture::Rgba8Image;
