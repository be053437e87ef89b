//! Per-pixel sampler: fills the G-buffer by casting one ray per pixel.
//!
//! Rows are embarrassingly parallel: each row task owns a disjoint slice of
//! the G-buffer and only reads the shared scene arrays, so the dispatch is a
//! plain parallel loop with a join at the end and no other synchronization.
//! The scene must stay immutable for the duration of the call.

use glam::Vec3;
use prism_math::{unproject_pixel, Interval, Mat4, Mat4Ext, Ray};
use rayon::prelude::*;

use crate::gbuffer::{flags, GBuffer, PixelSample};
use crate::pool::RenderPool;
use crate::settings::RenderSettings;
use crate::two_level::{SceneObjectRef, TwoLevelQuery};
use prism_core::texture::{blue, green, red};

/// Everything a frame's worth of sampling reads.
pub struct FrameContext<'a> {
    pub objects: &'a [SceneObjectRef<'a>],
    /// Orthonormal camera-to-world transform.
    pub camera_to_world: Mat4,
    pub world_to_camera: Mat4,
    /// Analytic inverse of the projection matrix.
    pub projection_inv: Mat4,
    pub near: f32,
    pub pivot: Vec3,
    /// Largest world-bounds extent; scales the primary-ray epsilon and
    /// places the light.
    pub diagonal: f32,
}

/// Re-sample the (inclusive) pixel rectangle [x0, x1] x [y0, y1].
///
/// Coordinates are clamped to the buffer, matching the caller convention of
/// passing a possibly-overshooting invalidated rectangle. Every pixel in the
/// region is overwritten in full: either with a hit sample or with the
/// background sentinel.
pub fn update_region(
    gbuffer: &mut GBuffer,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    ctx: &FrameContext,
    settings: &RenderSettings,
    pool: &RenderPool,
) {
    let w = gbuffer.width();
    let h = gbuffer.height();
    debug_assert!(w >= 1 && h >= 1);

    let x0 = x0.clamp(0, w as i32 - 1) as usize;
    let y0 = y0.clamp(0, h as i32 - 1) as usize;
    let x1 = x1.clamp(0, w as i32 - 1) as usize;
    let y1 = y1.clamp(0, h as i32 - 1) as usize;

    // Nothing to cast against: the whole region is background.
    if ctx.objects.iter().all(|o| o.bvh.is_none()) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                *gbuffer.get_mut(x as u32, y as u32) = PixelSample::BACKGROUND;
            }
        }
        return;
    }

    let origin = ctx.camera_to_world.transform_point3(Vec3::ZERO);
    let light = ctx.pivot + Vec3::splat(ctx.diagonal * 3.0);
    // Scale-relative epsilon against self-intersection at the camera.
    let t_near = ctx.diagonal / 100.0;

    let query = TwoLevelQuery::new(ctx.objects);

    let row_span = w as usize;
    let rows = &mut gbuffer.samples_mut()[y0 * row_span..(y1 + 1) * row_span];

    pool.install(|| {
        rows.par_chunks_mut(row_span)
            .enumerate()
            .for_each(|(i, row)| {
                let y = (y0 + i) as u32;
                for x in x0..=x1 {
                    row[x] = sample_pixel(
                        x as u32, y, w, h, origin, light, t_near, ctx, &query, settings,
                    );
                }
            });
    });
}

#[allow(clippy::too_many_arguments)]
fn sample_pixel(
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    origin: Vec3,
    light: Vec3,
    t_near: f32,
    ctx: &FrameContext,
    query: &TwoLevelQuery,
    settings: &RenderSettings,
) -> PixelSample {
    let dir_cam = unproject_pixel(x, y, w, h, ctx.near, &ctx.projection_inv);
    let ray = Ray::new(origin, ctx.camera_to_world.rotate_vec3(dir_cam));

    let Some(hit) = query.closest_hit(&ray, Interval::new(t_near, f32::INFINITY)) else {
        return PixelSample::BACKGROUND;
    };

    let obj = &ctx.objects[hit.object];
    let n_world = obj.transform.rotate_vec3(obj.face_normals[hit.triangle as usize]);
    let n_cam = ctx.world_to_camera.rotate_vec3(n_world);

    let mut sample = PixelSample {
        id: obj.raw_id,
        primitive: hit.triangle,
        normal_x: n_cam.x,
        normal_y: n_cam.y,
        depth: hit.t,
        bary_u: hit.u,
        bary_v: hit.v,
        flags: 0,
        r: 0,
        g: 0,
        b: 0,
    };

    let w0 = 1.0 - hit.u - hit.v;

    // Resolve the material color now so the stylization pass never touches
    // mesh memory again.
    let mut material = None;
    if settings.textured {
        if let (Some(uvs), Some(texture)) = (obj.uvs, obj.texture) {
            let corners = &uvs[hit.triangle as usize];
            let uv = corners[0] * w0 + corners[1] * hit.u + corners[2] * hit.v;
            let texel = texture.sample_nearest_clamped(uv.x, uv.y);
            material = Some((red(texel), green(texel), blue(texel)));
        }
    }
    if material.is_none() && settings.vertexcolors {
        if let Some(colors) = obj.vertex_colors {
            let tri = obj.triangles[hit.triangle as usize];
            let c = colors[tri[0] as usize] * w0
                + colors[tri[1] as usize] * hit.u
                + colors[tri[2] as usize] * hit.v;
            material = Some((
                (c.x.clamp(0.0, 1.0) * 255.0) as u8,
                (c.y.clamp(0.0, 1.0) * 255.0) as u8,
                (c.z.clamp(0.0, 1.0) * 255.0) as u8,
            ));
        }
    }
    if let Some((r, g, b)) = material {
        sample.r = r;
        sample.g = g;
        sample.b = b;
        sample.flags |= flags::MATERIAL;
    }

    if settings.shadow {
        let tri = obj.triangles[hit.triangle as usize];
        let p0 = obj.transform.transform_point3(obj.positions[tri[0] as usize]);
        let p1 = obj.transform.transform_point3(obj.positions[tri[1] as usize]);
        let p2 = obj.transform.transform_point3(obj.positions[tri[2] as usize]);
        let pos = p0 * w0 + p1 * hit.u + p2 * hit.v;

        let shadow_ray = Ray::new(pos, light - pos);
        if query.any_hit(&shadow_ray, Interval::new(1e-3, f32::INFINITY)) {
            sample.flags |= flags::SHADOW;
        }
    }

    sample
}
