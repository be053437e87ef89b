//! Headless render example.
//!
//! Builds a small scene (a cube and a ring of points), renders it in every
//! stylization mode, and saves the frames as PNG.

use anyhow::Result;
use prism_core::{Matcap, MatcapLibrary, Mesh, ObjectStore, PointCloud, Scene};
use prism_math::Vec3;
use prism_renderer::{Canvas, RenderPool, RenderSettings};

fn main() -> Result<()> {
    env_logger::init();

    let (scene, store) = build_scene();

    let mut matcaps = MatcapLibrary::new();
    matcaps.add(Matcap::brown());

    let pool = RenderPool::threaded(0)?;
    let mut canvas = Canvas::new(800, 600, pool);

    let modes = [
        ("shaded", RenderSettings::default()),
        (
            "shadowed",
            RenderSettings {
                shadow: true,
                ..Default::default()
            },
        ),
        (
            "wireframe",
            RenderSettings {
                wireframe: true,
                ..Default::default()
            },
        ),
        (
            "edges",
            RenderSettings {
                edges: true,
                ..Default::default()
            },
        ),
        (
            "one_bit",
            RenderSettings {
                one_bit: true,
                ..Default::default()
            },
        ),
    ];

    for (name, settings) in modes {
        canvas.update_settings(settings);

        let start = std::time::Instant::now();
        canvas.render(&scene, &store, &matcaps);
        println!("{}: rendered in {:?}", name, start.elapsed());

        let filename = format!("cube_{}.png", name);
        save_png(&canvas, &filename)?;
        println!("saved {}", filename);
    }

    Ok(())
}

fn build_scene() -> (Scene, ObjectStore) {
    let mut store = ObjectStore::new();

    let cube_id = store.insert_mesh(unit_cube());

    // A ring of points around the cube.
    let ring: Vec<Vec3> = (0..256)
        .map(|i| {
            let angle = i as f32 / 256.0 * std::f32::consts::TAU;
            Vec3::new(angle.cos() * 1.2, angle.sin() * 1.2, 0.0)
        })
        .collect();
    let normals = ring.iter().map(|p| p.normalize()).collect();
    let ring_id = store.insert_pointcloud(PointCloud::new(ring).with_normals(normals));

    let mut scene = Scene::new();
    scene.add_object(cube_id, &store);
    scene.add_object(ring_id, &store);
    scene.prepare(&store);
    scene.home();

    (scene, store)
}

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
        [4, 6, 7],
        [1, 0, 3],
        [1, 3, 2],
        [5, 1, 2],
        [5, 2, 6],
        [0, 4, 7],
        [0, 7, 3],
        [7, 6, 2],
        [7, 2, 3],
        [0, 1, 5],
        [0, 5, 4],
    ];
    Mesh::new(positions, triangles)
}

fn save_png(canvas: &Canvas, filename: &str) -> Result<()> {
    let im = canvas.image();
    let buffer = image::RgbaImage::from_raw(im.width(), im.height(), im.as_bytes().to_vec())
        .expect("image buffer size matches dimensions");
    buffer.save(filename)?;
    Ok(())
}
