//! The renderer's invocation surface.
//!
//! A [`Canvas`] owns the output image, the G-buffer, the projection pair,
//! and the worker pool. One `render` call runs the full pipeline: backdrop
//! copy, per-pixel sampling, stylization, point splatting. The scene and
//! store are borrowed immutably for the whole call; callers serialize scene
//! mutation against rendering with whatever coarse lock the app layer holds
//! (a frame in flight always runs to completion, there is no cancellation).

use glam::Vec3;
use prism_core::texture::pack_rgb;
use prism_core::{MatcapLibrary, ObjectId, ObjectStore, Rgba8Image, Scene};
use prism_math::{invert_orthonormal, invert_projection, projection_matrix, Camera, Mat4};

use crate::blit;
use crate::gbuffer::{GBuffer, PixelSample};
use crate::picking;
use crate::pool::RenderPool;
use crate::sampler::{update_region, FrameContext};
use crate::settings::RenderSettings;
use crate::splat::{splat_pointclouds, PointCloudRef};
use crate::stylize::{stylize, Reprojection};
use crate::two_level::SceneObjectRef;

pub struct Canvas {
    image: Rgba8Image,
    background: Rgba8Image,
    gbuffer: GBuffer,
    zbuffer: Vec<f32>,
    camera: Camera,
    projection: Mat4,
    projection_inv: Mat4,
    settings: RenderSettings,
    pool: RenderPool,
}

impl Canvas {
    /// A canvas with the default camera. The pool is injected so callers
    /// (and tests) decide the threading.
    pub fn new(width: u32, height: u32, pool: RenderPool) -> Self {
        let camera = Camera::default();
        let projection = projection_matrix(&camera, width, height);
        let mut background = Rgba8Image::new(width, height);
        blit::fill_background_gradient(&mut background);

        Self {
            image: Rgba8Image::new(width, height),
            background,
            gbuffer: GBuffer::new(width, height),
            zbuffer: Vec::new(),
            camera,
            projection_inv: invert_projection(&projection),
            projection,
            settings: RenderSettings::default(),
            pool,
        }
    }

    /// Drop all buffers and rebuild for a new resolution. The caller layer
    /// rejects zero sizes before they get here.
    pub fn resize(&mut self, width: u32, height: u32) {
        debug_assert!(width >= 1 && height >= 1);
        self.image = Rgba8Image::new(width, height);
        self.background = Rgba8Image::new(width, height);
        blit::fill_background_gradient(&mut self.background);
        self.gbuffer = GBuffer::new(width, height);
        self.zbuffer = Vec::new();
        self.projection = projection_matrix(&self.camera, width, height);
        self.projection_inv = invert_projection(&self.projection);
        log::info!("canvas resized to {}x{}", width, height);
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Swap the camera and rebuild the projection pair for it.
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.projection = projection_matrix(&self.camera, self.width(), self.height());
        self.projection_inv = invert_projection(&self.projection);
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    /// Replace the gradient backdrop with a solid color.
    pub fn set_background_color(&mut self, r: u8, g: u8, b: u8) {
        self.background.fill(pack_rgb(r, g, b));
    }

    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    pub fn projection_matrix_inv(&self) -> &Mat4 {
        &self.projection_inv
    }

    pub fn image(&self) -> &Rgba8Image {
        &self.image
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// Render the full frame.
    pub fn render(&mut self, scene: &Scene, store: &ObjectStore, matcaps: &MatcapLibrary) {
        let (w, h) = (self.width() as i32, self.height() as i32);
        self.render_region(0, 0, w - 1, h - 1, scene, store, matcaps);
    }

    /// Re-sample only the (inclusive, clamped) pixel rectangle, then re-run
    /// the cheap second pass over the whole frame. There is no finer
    /// incremental recomputation than this.
    pub fn render_region(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        scene: &Scene,
        store: &ObjectStore,
        matcaps: &MatcapLibrary,
    ) {
        self.image
            .texels_mut()
            .copy_from_slice(self.background.texels());

        let mesh_refs = collect_mesh_refs(scene, store);
        let ctx = FrameContext {
            objects: &mesh_refs,
            camera_to_world: scene.coordinate_system,
            world_to_camera: scene.coordinate_system_inv,
            projection_inv: self.projection_inv,
            near: self.camera.near,
            pivot: scene.pivot,
            diagonal: scene.diagonal,
        };
        update_region(
            &mut self.gbuffer,
            x0,
            y0,
            x1,
            y1,
            &ctx,
            &self.settings,
            &self.pool,
        );

        stylize(
            &mut self.image,
            &self.gbuffer,
            matcaps,
            &self.settings,
            Reprojection {
                projection_inv: self.projection_inv,
                near: self.camera.near,
            },
        );

        let cloud_refs = collect_cloud_refs(scene, store);
        splat_pointclouds(
            &mut self.image,
            &mut self.gbuffer,
            &mut self.zbuffer,
            &cloud_refs,
            scene.coordinate_system_inv,
            self.projection,
            &self.settings,
        );
    }

    pub fn sample_at(&self, x: i32, y: i32) -> Option<&PixelSample> {
        self.gbuffer.sample_at(x, y)
    }

    /// World-space position under a pixel, or None over the backdrop.
    pub fn pick(&self, x: i32, y: i32, store: &ObjectStore) -> Option<Vec3> {
        let sample = self.gbuffer.sample_at(x, y)?;
        if sample.is_background() {
            return None;
        }
        picking::world_position(sample, store)
    }

    /// Closest vertex index under a pixel, for vertex highlighting.
    pub fn pick_vertex(&self, x: i32, y: i32, store: &ObjectStore) -> Option<u32> {
        let sample = self.gbuffer.sample_at(x, y)?;
        if sample.is_background() {
            return None;
        }
        picking::vertex_index(sample, store)
    }

    /// Owning object id under a pixel.
    pub fn pick_id(&self, x: i32, y: i32) -> Option<ObjectId> {
        let sample = self.gbuffer.sample_at(x, y)?;
        ObjectId::from_raw(sample.id)
    }

    /// Composite the finished frame onto a bottom-up screen image.
    pub fn blit_onto(&self, screen: &mut Rgba8Image, pos_x: i32, pos_y: i32) {
        blit::blit_onto(screen, &self.image, pos_x, pos_y);
    }
}

/// Borrow every visible, resolvable mesh out of the store for one frame.
fn collect_mesh_refs<'a>(scene: &Scene, store: &'a ObjectStore) -> Vec<SceneObjectRef<'a>> {
    scene
        .meshes
        .iter()
        .filter_map(|&id| {
            let mesh = store.mesh(id)?;
            Some(SceneObjectRef {
                raw_id: id.to_raw(),
                bvh: store.mesh_index(id),
                transform: mesh.transform,
                inv_transform: invert_orthonormal(&mesh.transform),
                triangles: &mesh.triangles,
                positions: &mesh.positions,
                face_normals: &mesh.face_normals,
                vertex_colors: mesh.vertex_colors.as_deref(),
                uvs: mesh.uvs.as_deref(),
                texture: mesh.texture.as_ref(),
            })
        })
        .collect()
}

fn collect_cloud_refs<'a>(scene: &Scene, store: &'a ObjectStore) -> Vec<PointCloudRef<'a>> {
    scene
        .pointclouds
        .iter()
        .filter_map(|&id| {
            let pc = store.pointcloud(id)?;
            Some(PointCloudRef {
                raw_id: id.to_raw(),
                positions: &pc.positions,
                normals: pc.normals.as_deref(),
                colors: pc.colors.as_deref(),
                transform: pc.transform,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use prism_core::Mesh;
    use std::collections::VecDeque;

    fn unit_cube() -> Mesh {
        let positions = vec![
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, -0.5),
            Vec3::new(0.5, 0.5, -0.5),
            Vec3::new(-0.5, 0.5, -0.5),
            Vec3::new(-0.5, -0.5, 0.5),
            Vec3::new(0.5, -0.5, 0.5),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(-0.5, 0.5, 0.5),
        ];
        let triangles = vec![
            [4, 5, 6],
            [4, 6, 7], // +z
            [1, 0, 3],
            [1, 3, 2], // -z
            [5, 1, 2],
            [5, 2, 6], // +x
            [0, 4, 7],
            [0, 7, 3], // -x
            [7, 6, 2],
            [7, 2, 3], // +y
            [0, 1, 5],
            [0, 5, 4], // -y
        ];
        Mesh::new(positions, triangles)
    }

    fn plane(half: f32, z: f32) -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(-half, -half, z),
                Vec3::new(half, -half, z),
                Vec3::new(half, half, z),
                Vec3::new(-half, half, z),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    fn cube_setup() -> (Canvas, Scene, ObjectStore, MatcapLibrary, ObjectId) {
        let mut store = ObjectStore::new();
        let id = store.insert_mesh(unit_cube());
        let mut scene = Scene::new();
        scene.add_object(id, &store);
        scene.prepare(&store);
        scene.home();

        let canvas = Canvas::new(64, 64, RenderPool::single_threaded().unwrap());
        (canvas, scene, store, MatcapLibrary::new(), id)
    }

    /// Count the connected foreground component containing (x, y).
    fn flood_count(gbuffer: &GBuffer, x: u32, y: u32) -> usize {
        let (w, h) = (gbuffer.width(), gbuffer.height());
        let mut seen = vec![false; (w * h) as usize];
        let mut queue = VecDeque::from([(x, y)]);
        seen[(y * w + x) as usize] = true;
        let mut count = 0;
        while let Some((cx, cy)) = queue.pop_front() {
            count += 1;
            let mut push = |nx: i64, ny: i64| {
                if nx >= 0 && ny >= 0 && nx < w as i64 && ny < h as i64 {
                    let idx = (ny as u32 * w + nx as u32) as usize;
                    if !seen[idx] && !gbuffer.get(nx as u32, ny as u32).is_background() {
                        seen[idx] = true;
                        queue.push_back((nx as u32, ny as u32));
                    }
                }
            };
            push(cx as i64 + 1, cy as i64);
            push(cx as i64 - 1, cy as i64);
            push(cx as i64, cy as i64 + 1);
            push(cx as i64, cy as i64 - 1);
        }
        count
    }

    #[test]
    fn test_unit_cube_shaded_scenario() {
        let (mut canvas, scene, store, matcaps, id) = cube_setup();
        canvas.render(&scene, &store, &matcaps);

        let gb = canvas.gbuffer();
        let center = gb.get(32, 32);
        assert!(!center.is_background());
        assert_eq!(center.id, id.to_raw());
        // Front face of the cube: depth = camera distance minus half extent.
        assert!((center.depth - 1.5).abs() < 0.02);

        // Exactly one connected silhouette region with a constant owning id.
        let foreground: Vec<&PixelSample> =
            gb.samples().iter().filter(|s| !s.is_background()).collect();
        assert!(!foreground.is_empty());
        assert!(foreground.iter().all(|s| s.id == id.to_raw()));
        assert_eq!(flood_count(gb, 32, 32), foreground.len());

        // The image border transitions to background all around.
        for i in 0..64 {
            assert!(gb.get(i, 0).is_background());
            assert!(gb.get(i, 63).is_background());
            assert!(gb.get(0, i).is_background());
            assert!(gb.get(63, i).is_background());
        }

        // Center pixel: camera-facing normal, matcap lookup at (0, 0).
        assert!(center.normal_x.abs() < 1e-3);
        assert!(center.normal_y.abs() < 1e-3);
        let matcap = matcaps.matcap_for(id.to_raw());
        assert_eq!(canvas.image().get(32, 32), matcap.image.get(256, 256));
    }

    #[test]
    fn test_background_pixels_keep_backdrop() {
        let (mut canvas, scene, store, matcaps, _) = cube_setup();
        canvas.set_background_color(7, 8, 9);
        canvas.render(&scene, &store, &matcaps);
        assert_eq!(canvas.image().get(0, 0), pack_rgb(7, 8, 9));
    }

    #[test]
    fn test_render_twice_is_byte_identical() {
        let (mut canvas, scene, store, matcaps, _) = cube_setup();
        canvas.render(&scene, &store, &matcaps);
        let first = canvas.image().clone();
        canvas.render(&scene, &store, &matcaps);
        assert_eq!(&first, canvas.image());
    }

    #[test]
    fn test_shadow_flag_consistency() {
        let mut store = ObjectStore::new();
        let floor_id = store.insert_mesh(plane(1.0, 0.0));
        let mut scene = Scene::new();
        scene.add_object(floor_id, &store);
        scene.prepare(&store);
        scene.home();

        let mut canvas = Canvas::new(32, 32, RenderPool::single_threaded().unwrap());
        canvas.update_settings(RenderSettings {
            shadow: true,
            ..Default::default()
        });
        let matcaps = MatcapLibrary::new();

        // Nothing between the floor and the light: no shadow anywhere.
        canvas.render(&scene, &store, &matcaps);
        let center = canvas.sample_at(16, 16).unwrap();
        assert!(!center.is_background());
        assert!(!center.in_shadow());

        // Drop an occluder across the light direction. The scene keeps its
        // pivot and diagonal (no re-prepare), so the light stays put at
        // pivot + 3 * diagonal = (6, 6, 6) and the blocker at z = 3 sits on
        // the center sample's shadow ray.
        let blocker = store.insert_mesh(plane(2.0, 3.0).with_transform(Mat4::from_translation(
            Vec3::new(3.0, 3.0, 0.0),
        )));
        scene.add_object(blocker, &store);
        canvas.render(&scene, &store, &matcaps);
        let center = canvas.sample_at(16, 16).unwrap();
        assert!(center.in_shadow());
    }

    /// Project a world point to pixel coordinates the way the splat path does.
    fn project_to_pixel(canvas: &Canvas, scene: &Scene, world: Vec3) -> (f32, f32) {
        let cam = scene.coordinate_system_inv.transform_point3(world);
        let clip = *canvas.projection_matrix() * Vec4::new(cam.x, cam.y, cam.z, 1.0);
        let ndc = clip.truncate() / clip.w;
        (
            (ndc.x + 1.0) * 0.5 * canvas.width() as f32,
            (ndc.y + 1.0) * 0.5 * canvas.height() as f32,
        )
    }

    #[test]
    fn test_picking_returns_nearest_vertex() {
        let mut store = ObjectStore::new();
        let mesh = Mesh::new(
            vec![
                Vec3::new(-3.0, -3.0, 0.0),
                Vec3::new(3.0, -3.0, 0.0),
                Vec3::new(0.0, 3.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let id = store.insert_mesh(mesh);
        let mut scene = Scene::new();
        scene.add_object(id, &store);
        scene.prepare(&store);
        scene.home();

        let mut canvas = Canvas::new(64, 64, RenderPool::single_threaded().unwrap());
        let matcaps = MatcapLibrary::new();
        canvas.render(&scene, &store, &matcaps);

        // Picking outside the silhouette reports no hit.
        assert!(canvas.pick(0, 0, &store).is_none());
        assert!(canvas.pick_vertex(0, 0, &store).is_none());
        assert!(canvas.pick(-5, 2, &store).is_none());

        let positions = store.mesh(id).unwrap().positions.clone();
        for (vertex, &position) in positions.iter().enumerate() {
            let (px, py) = project_to_pixel(&canvas, &scene, position);

            // The on-silhouette pixel nearest the vertex's projection.
            let mut best = None;
            for y in 0..64u32 {
                for x in 0..64u32 {
                    if canvas.gbuffer().get(x, y).is_background() {
                        continue;
                    }
                    let d = (x as f32 + 0.5 - px).powi(2) + (y as f32 + 0.5 - py).powi(2);
                    if best.map_or(true, |(bd, _, _)| d < bd) {
                        best = Some((d, x, y));
                    }
                }
            }
            let (_, x, y) = best.expect("triangle must cover some pixels");
            assert_eq!(
                canvas.pick_vertex(x as i32, y as i32, &store),
                Some(vertex as u32),
                "vertex {} at pixel ({}, {})",
                vertex,
                x,
                y
            );

            // World-position lookup lands near the true surface point.
            let world = canvas.pick(x as i32, y as i32, &store).unwrap();
            assert!(world.z.abs() < 1e-3);
            assert!((world - position).length() < 1.0);
        }
    }

    #[test]
    fn test_pick_id_roundtrips() {
        let (mut canvas, scene, store, matcaps, id) = cube_setup();
        canvas.render(&scene, &store, &matcaps);
        assert_eq!(canvas.pick_id(32, 32), Some(id));
        assert_eq!(canvas.pick_id(0, 0), None);
    }

    #[test]
    fn test_resize_rebuilds_buffers() {
        let (mut canvas, scene, store, matcaps, _) = cube_setup();
        canvas.render(&scene, &store, &matcaps);
        canvas.resize(16, 20);
        assert_eq!(canvas.width(), 16);
        assert_eq!(canvas.height(), 20);
        assert!(canvas.sample_at(8, 10).unwrap().is_background());
        canvas.render(&scene, &store, &matcaps);
        assert!(!canvas.sample_at(8, 10).unwrap().is_background());
    }

    #[test]
    fn test_empty_scene_renders_backdrop() {
        let store = ObjectStore::new();
        let scene = Scene::new();
        let mut canvas = Canvas::new(8, 8, RenderPool::single_threaded().unwrap());
        canvas.set_background_color(1, 2, 3);
        canvas.render(&scene, &store, &MatcapLibrary::new());
        assert!(canvas.image().texels().iter().all(|&t| t == pack_rgb(1, 2, 3)));
        assert!(canvas.gbuffer().samples().iter().all(|s| s.is_background()));
    }

    #[test]
    fn test_pointcloud_composites_with_mesh() {
        let mut store = ObjectStore::new();
        // Cube in front, one point behind it and one beside it.
        let cube_id = store.insert_mesh(unit_cube());
        let pc_id = store.insert_pointcloud(prism_core::PointCloud::new(vec![
            Vec3::new(0.0, 0.0, -2.0), // hidden behind the cube
            Vec3::new(0.0, 0.45, 0.5), // on the front face edge region
        ]));
        let mut scene = Scene::new();
        scene.add_object(cube_id, &store);
        scene.add_object(pc_id, &store);
        scene.prepare(&store);
        scene.home();

        let mut canvas = Canvas::new(64, 64, RenderPool::single_threaded().unwrap());
        let matcaps = MatcapLibrary::new();
        canvas.render(&scene, &store, &matcaps);

        // The hidden point never replaces the cube's center sample.
        assert_eq!(canvas.pick_id(32, 32), Some(cube_id));
    }
}
