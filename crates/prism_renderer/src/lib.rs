//! Prism renderer - per-pixel ray casting and stylization.
//!
//! One primary ray per pixel against a two-level BVH fills a compact
//! G-buffer of geometric samples; a second pass stylizes those samples into
//! RGBA under one of the viewer's modes (matcap shaded, textured,
//! vertex-colored, wireframe, edge/contour, one-bit halftone), with an
//! optional shadow-ray pass and point-cloud splatting on top.
//!
//! [`Canvas`] is the invocation surface: resize, update settings, render a
//! scene, pick pixels back into world space.

mod blit;
mod canvas;
mod gbuffer;
mod picking;
mod pool;
mod sampler;
mod settings;
mod splat;
mod stylize;
mod two_level;

pub use blit::{blit_onto, fill_background_gradient};
pub use canvas::Canvas;
pub use gbuffer::{flags, GBuffer, PixelSample};
pub use picking::{closest_vertex, vertex_index, world_position};
pub use pool::RenderPool;
pub use sampler::{update_region, FrameContext};
pub use settings::{RenderSettings, StyleMode};
pub use splat::{splat_pointclouds, PointCloudRef};
pub use stylize::{stylize, Reprojection};
pub use two_level::{HitRecord, SceneObjectRef, TwoLevelQuery};

/// Re-export the query contracts and math types callers need.
pub use prism_core::{TriangleBvh, TriangleHit};
pub use prism_math::{Aabb, Interval, Ray};
