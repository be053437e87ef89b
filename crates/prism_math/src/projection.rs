//! Physical camera model and the viewer's perspective projection.
//!
//! The projection matrix is kept in a fixed sparse frustum form so that its
//! inverse can be written down analytically. Unprojection (pixel to ray) runs
//! once per pixel per frame, so the closed form matters.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

const INCH_TO_MM: f32 = 25.4;

/// Rule for reconciling the film aspect ratio with the output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitPolicy {
    /// Whole film visible; borders may appear.
    Fill,
    /// Film fills the screen; content may be cropped.
    Overscan,
}

/// Physical camera: focal length, film aperture, clip planes, zoom, fit rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Camera {
    /// Focal length in millimeters.
    pub focal_length: f32,
    /// Film aperture width in inches.
    pub aperture_width: f32,
    /// Film aperture height in inches.
    pub aperture_height: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub fit: FitPolicy,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            focal_length: 35.0,
            aperture_width: 1.024,
            aperture_height: 0.768,
            near: 0.1,
            far: f32::MAX,
            zoom: 1.0,
            fit: FitPolicy::Overscan,
        }
    }
}

/// Asymmetric frustum matrix in the viewer's fixed layout.
///
/// Column-major entries: [0] = 2n/(r-l), [5] = -2n/(t-b), [8] = (r+l)/(r-l),
/// [9] = -(t+b)/(t-b), [10] = -(F+n)/(F-n), [11] = -1, [14] = -2Fn/(F-n).
/// The negated Y term bakes in the top-down raster convention.
fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(2.0 * near / (right - left), 0.0, 0.0, 0.0),
        Vec4::new(0.0, -2.0 * near / (top - bottom), 0.0, 0.0),
        Vec4::new(
            (right + left) / (right - left),
            -(top + bottom) / (top - bottom),
            -(far + near) / (far - near),
            -1.0,
        ),
        // 2*near*far, in this order: far may be f32::MAX and 2*far overflows.
        Vec4::new(0.0, 0.0, -(2.0 * near * far) / (far - near), 0.0),
    )
}

/// Build the projection matrix for a camera and output resolution.
pub fn projection_matrix(camera: &Camera, screen_w: u32, screen_h: u32) -> Mat4 {
    let top = ((camera.aperture_height * INCH_TO_MM / 2.0) / camera.focal_length) * camera.near;
    let right = ((camera.aperture_width * INCH_TO_MM / 2.0) / camera.focal_length) * camera.near;

    let mut xscale = camera.zoom;
    let mut yscale = camera.zoom;

    let device_aspect = screen_w as f32 / screen_h as f32;
    let film_aspect = camera.aperture_width / camera.aperture_height;

    match camera.fit {
        FitPolicy::Fill => {
            if film_aspect > device_aspect {
                xscale *= device_aspect / film_aspect;
            } else {
                yscale *= film_aspect / device_aspect;
            }
        }
        FitPolicy::Overscan => {
            if film_aspect > device_aspect {
                yscale *= film_aspect / device_aspect;
            } else {
                xscale *= device_aspect / film_aspect;
            }
        }
    }

    let right = right * xscale;
    let top = top * yscale;

    frustum(-right, right, -top, top, camera.near, camera.far)
}

/// Analytic inverse of a matrix produced by [`projection_matrix`].
///
/// Valid only for that restricted sparsity (two diagonal scale terms, the
/// third-column asymmetry terms, and the perspective -1); a general 4x4
/// inverse must never be substituted here, and any future off-axis
/// projection has to extend this by hand.
pub fn invert_projection(m: &Mat4) -> Mat4 {
    let sx = m.x_axis.x; // 2n/(r-l)
    let sy = m.y_axis.y; // -2n/(t-b)
    let ax = m.z_axis.x; // (r+l)/(r-l)
    let ay = m.z_axis.y; // -(t+b)/(t-b)
    let c = m.z_axis.z; // -(F+n)/(F-n)
    let d = m.w_axis.z; // -2Fn/(F-n)

    Mat4::from_cols(
        Vec4::new(1.0 / sx, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0 / sy, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 0.0, 1.0 / d),
        Vec4::new(ax / sx, ay / sy, -1.0, c / d),
    )
}

/// Camera-space ray direction through the center of pixel (x, y).
///
/// The pixel is mapped to normalized device coordinates at the near plane and
/// pushed through the inverse projection; the w component is dropped so the
/// result is a direction, not a point. Its z is always -1, so a hit distance
/// t along this direction equals -z in camera space.
pub fn unproject_pixel(x: u32, y: u32, width: u32, height: u32, near: f32, proj_inv: &Mat4) -> Vec3 {
    let ndc = Vec4::new(
        2.0 * ((x as f32 + 0.5) / width as f32) - 1.0,
        2.0 * ((y as f32 + 0.5) / height as f32) - 1.0,
        near,
        1.0,
    );
    (*proj_inv * ndc).truncate()
}
