//! Point-cloud splatting.
//!
//! Point clouds are never ray-cast. After the mesh G-buffer is stylized,
//! every point is pushed through the projection pipeline and depth-tested
//! against a float z-buffer seeded from the mesh sample depths, so points
//! composite correctly in front of and behind already-sampled surfaces.
//! Surviving points write their color to the output image and their
//! {id, vertex index, depth} back into the G-buffer so picking sees them.

use glam::{Mat4, Vec3};
use prism_core::texture::{blue, green, pack_rgb, red, Rgba8Image};
use prism_math::Mat4Ext;

use crate::gbuffer::{GBuffer, PixelSample};
use crate::settings::RenderSettings;

/// Borrowed view of one visible point cloud for the duration of a frame.
pub struct PointCloudRef<'a> {
    pub raw_id: u32,
    pub positions: &'a [Vec3],
    pub normals: Option<&'a [Vec3]>,
    pub colors: Option<&'a [u32]>,
    pub transform: Mat4,
}

const DEFAULT_POINT_COLOR: u32 = pack_rgb(0xc0, 0xc0, 0xc0);

/// Splat all point clouds into the image and G-buffer.
pub fn splat_pointclouds(
    image: &mut Rgba8Image,
    gbuffer: &mut GBuffer,
    zbuffer: &mut Vec<f32>,
    clouds: &[PointCloudRef],
    world_to_camera: Mat4,
    projection: Mat4,
    settings: &RenderSettings,
) {
    if clouds.is_empty() {
        return;
    }

    let w = gbuffer.width();
    let h = gbuffer.height();

    // Seed the z-buffer from the mesh pass so splats depth-test against
    // surfaces that were already sampled.
    zbuffer.clear();
    zbuffer.extend(gbuffer.samples().iter().map(|s| s.depth));

    for cloud in clouds {
        let to_camera = world_to_camera * cloud.transform;

        for (index, &position) in cloud.positions.iter().enumerate() {
            let cam = to_camera.transform_point3(position);
            let clip = projection * cam.extend(1.0);
            if clip.w <= 0.0 {
                continue; // behind the camera
            }
            let ndc = clip.truncate() / clip.w;
            if ndc.x < -1.0 || ndc.x > 1.0 || ndc.y < -1.0 || ndc.y > 1.0 || ndc.z.abs() > 1.0 {
                continue;
            }

            let x = ((ndc.x + 1.0) * 0.5 * w as f32) as u32;
            let y = ((ndc.y + 1.0) * 0.5 * h as f32) as u32;
            let x = x.min(w - 1);
            let y = y.min(h - 1);

            // Pixel ray directions have z = -1, so -z is the comparable depth.
            let depth = -cam.z;
            let slot = (y * w + x) as usize;
            if depth >= zbuffer[slot] {
                continue;
            }
            zbuffer[slot] = depth;

            image.set(x, y, point_color(cloud, index, &to_camera, settings));
            *gbuffer.get_mut(x, y) = PixelSample {
                id: cloud.raw_id,
                primitive: index as u32,
                depth,
                ..PixelSample::BACKGROUND
            };
        }
    }
}

fn point_color(
    cloud: &PointCloudRef,
    index: usize,
    to_camera: &Mat4,
    settings: &RenderSettings,
) -> u32 {
    // One-bit output draws plain white points over the halftone.
    if settings.one_bit {
        return pack_rgb(255, 255, 255);
    }

    let base = cloud
        .colors
        .map(|colors| colors[index])
        .unwrap_or(DEFAULT_POINT_COLOR);

    if settings.shading {
        if let Some(normals) = cloud.normals {
            let n = to_camera.rotate_vec3(normals[index]).normalize_or_zero();
            let diffuse = n.z.clamp(0.0, 1.0);
            return pack_rgb(
                (red(base) as f32 * diffuse) as u8,
                (green(base) as f32 * diffuse) as u8,
                (blue(base) as f32 * diffuse) as u8,
            );
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_math::{invert_orthonormal, projection_matrix, Camera};

    fn setup(camera_z: f32, w: u32, h: u32) -> (Mat4, Mat4) {
        let camera = Camera::default();
        let projection = projection_matrix(&camera, w, h);
        let cs = Mat4::from_translation(Vec3::new(0.0, 0.0, camera_z));
        (invert_orthonormal(&cs), projection)
    }

    #[test]
    fn test_point_splats_at_center() {
        let positions = vec![Vec3::ZERO];
        let colors = vec![pack_rgb(10, 20, 30)];
        let cloud = PointCloudRef {
            raw_id: 0x8001_0001,
            positions: &positions,
            normals: None,
            colors: Some(&colors),
            transform: Mat4::IDENTITY,
        };

        let (world_to_camera, projection) = setup(5.0, 16, 16);
        let mut image = Rgba8Image::new(16, 16);
        let mut gb = GBuffer::new(16, 16);
        let mut zbuffer = Vec::new();

        splat_pointclouds(
            &mut image,
            &mut gb,
            &mut zbuffer,
            &[cloud],
            world_to_camera,
            projection,
            &RenderSettings::default(),
        );

        let s = gb.get(8, 8);
        assert_eq!(s.id, 0x8001_0001);
        assert_eq!(s.primitive, 0);
        assert!((s.depth - 5.0).abs() < 1e-4);
        assert_eq!(image.get(8, 8), pack_rgb(10, 20, 30));
    }

    #[test]
    fn test_point_behind_mesh_is_depth_rejected() {
        let positions = vec![Vec3::ZERO];
        let cloud = PointCloudRef {
            raw_id: 0x8001_0001,
            positions: &positions,
            normals: None,
            colors: None,
            transform: Mat4::IDENTITY,
        };

        let (world_to_camera, projection) = setup(5.0, 16, 16);
        let mut image = Rgba8Image::new(16, 16);
        let mut gb = GBuffer::new(16, 16);
        // A mesh surface already sits closer at that pixel.
        *gb.get_mut(8, 8) = PixelSample {
            id: 0x4001_0001,
            primitive: 0,
            depth: 2.0,
            ..PixelSample::BACKGROUND
        };
        let mut zbuffer = Vec::new();

        splat_pointclouds(
            &mut image,
            &mut gb,
            &mut zbuffer,
            &[cloud],
            world_to_camera,
            projection,
            &RenderSettings::default(),
        );

        // The mesh sample survives.
        assert_eq!(gb.get(8, 8).id, 0x4001_0001);
        assert_eq!(image.get(8, 8), 0);
    }

    #[test]
    fn test_point_behind_camera_is_culled() {
        let positions = vec![Vec3::new(0.0, 0.0, 10.0)];
        let cloud = PointCloudRef {
            raw_id: 0x8001_0001,
            positions: &positions,
            normals: None,
            colors: None,
            transform: Mat4::IDENTITY,
        };

        let (world_to_camera, projection) = setup(5.0, 16, 16);
        let mut image = Rgba8Image::new(16, 16);
        let mut gb = GBuffer::new(16, 16);
        let mut zbuffer = Vec::new();

        splat_pointclouds(
            &mut image,
            &mut gb,
            &mut zbuffer,
            &[cloud],
            world_to_camera,
            projection,
            &RenderSettings::default(),
        );

        for s in gb.samples() {
            assert!(s.is_background());
        }
    }

    #[test]
    fn test_shaded_point_uses_normal() {
        let positions = vec![Vec3::ZERO];
        let normals = vec![Vec3::Z];
        let colors = vec![pack_rgb(200, 200, 200)];
        let cloud = PointCloudRef {
            raw_id: 0x8001_0001,
            positions: &positions,
            normals: Some(&normals),
            colors: Some(&colors),
            transform: Mat4::IDENTITY,
        };

        let (world_to_camera, projection) = setup(5.0, 16, 16);
        let mut image = Rgba8Image::new(16, 16);
        let mut gb = GBuffer::new(16, 16);
        let mut zbuffer = Vec::new();

        let settings = RenderSettings {
            shading: true,
            ..Default::default()
        };
        splat_pointclouds(
            &mut image,
            &mut gb,
            &mut zbuffer,
            &[cloud],
            world_to_camera,
            projection,
            &settings,
        );

        // Normal faces the camera: full diffuse.
        assert_eq!(image.get(8, 8), pack_rgb(200, 200, 200));
    }
}
