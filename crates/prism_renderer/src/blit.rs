//! Backdrop fills and the final composite blit.
//!
//! The blit historically used 4-wide aligned vector loads; here the fast
//! path is a whole-row `copy_from_slice` (which the compiler vectorizes)
//! selected by an explicit geometry check, with a scalar per-pixel fallback
//! for clipped edges. Misalignment can no longer be undefined behavior,
//! only the slow path.

use prism_core::texture::{pack_rgb, Rgba8Image};

/// Fill with the viewer's default vertical gradient, dark at the top.
pub fn fill_background_gradient(image: &mut Rgba8Image) {
    let h = image.height();
    for y in 0..h {
        let level = (y as f32 / h as f32 * 75.0) as u8;
        image.row_mut(y).fill(pack_rgb(level, level, level));
    }
}

/// Copy the canvas into a screen image at (pos_x, pos_y), clipping as
/// needed. The screen uses a bottom-up row order (GL texture convention),
/// so rows are flipped on the way out.
pub fn blit_onto(screen: &mut Rgba8Image, canvas: &Rgba8Image, pos_x: i32, pos_y: i32) {
    let (src_x, dst_x) = if pos_x < 0 {
        ((-pos_x) as u32, 0u32)
    } else {
        (0u32, pos_x as u32)
    };
    let (src_y, dst_y) = if pos_y < 0 {
        ((-pos_y) as u32, 0u32)
    } else {
        (0u32, pos_y as u32)
    };

    if src_x >= canvas.width() || src_y >= canvas.height() {
        return;
    }
    if dst_x >= screen.width() || dst_y >= screen.height() {
        return;
    }

    let span_x = (canvas.width() - src_x).min(screen.width() - dst_x);
    let span_y = (canvas.height() - src_y).min(screen.height() - dst_y);

    for row in 0..span_y {
        let screen_y = screen.height() - 1 - (dst_y + row);
        if span_x == canvas.width() && span_x == screen.width() {
            // Fast path: full rows, one contiguous copy each.
            let src = canvas.row(src_y + row);
            screen.row_mut(screen_y).copy_from_slice(src);
        } else {
            // Scalar fallback for clipped spans.
            for col in 0..span_x {
                let texel = canvas.get(src_x + col, src_y + row);
                screen.set(dst_x + col, screen_y, texel);
            }
        }
    }
}
