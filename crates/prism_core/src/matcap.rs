//! Matcap lookup tables.
//!
//! A matcap is a 512x512 RGBA image indexed by a camera-space normal's xy,
//! approximating lit shading without any light transport, plus a single
//! "cavity" tint the edge stylization blends toward at creases. Four
//! procedural matcaps ship by default; any number of image-backed ones can
//! be loaded on top.

use std::collections::HashMap;
use std::path::Path;

use glam::Vec3;
use thiserror::Error;

use crate::texture::{blue, green, pack_rgb, red, Rgba8Image};

const MATCAP_SIZE: u32 = 512;

#[derive(Error, Debug)]
pub enum MatcapError {
    #[error("failed to decode matcap image: {0}")]
    Image(#[from] image::ImageError),
}

/// A shading lookup image and its crease tint.
#[derive(Debug, Clone)]
pub struct Matcap {
    pub image: Rgba8Image,
    /// Color blended in at concave/convex creases by the edge mode.
    pub cavity: u32,
}

/// Weights for the procedural lit-sphere generator: a base offset plus four
/// cosine lobes of increasing sharpness against fixed light directions.
struct LobeWeights {
    base: [f32; 3],
    grazing: [f32; 3],
    fill: [f32; 3],
    core: [f32; 3],
    highlight: [f32; 3],
}

/// Paint a lit sphere into a matcap image from cosine lobes.
fn lit_sphere(weights: &LobeWeights, cavity: u32) -> Matcap {
    let w = MATCAP_SIZE;
    let h = MATCAP_SIZE;
    let mut image = Rgba8Image::filled(w, h, pack_rgb(0, 0, 0));

    let light_high = Vec3::new(0.0, 0.8, 1.0).normalize();
    let light_low = Vec3::new(0.0, 0.4, 1.0).normalize();
    let light_front = Vec3::Z;

    for y in 0..h {
        // Top row holds normal y = +1.
        let v = 1.0 - 2.0 * y as f32 / (h - 1) as f32;
        for x in 0..w {
            let u = 2.0 * x as f32 / (w - 1) as f32 - 1.0;
            let rr = u * u + v * v;
            if rr > 1.01 {
                continue;
            }
            let sphere = Vec3::new(u, v, (1.01 - rr).sqrt());
            let cos1 = sphere.dot(light_high);
            let cos2 = sphere.dot(light_low).powf(3.0);
            let cos3 = sphere.dot(light_front).powf(5.0);
            let cos4 = sphere.dot(light_front).powf(50.0);

            let mut channel = [0u8; 3];
            for c in 0..3 {
                let value = weights.base[c]
                    + weights.grazing[c] * cos1
                    + weights.fill[c] * cos2
                    + weights.core[c] * cos3
                    + weights.highlight[c] * cos4;
                channel[c] = value.clamp(0.0, 255.0) as u8;
            }
            image.set(x, y, pack_rgb(channel[0], channel[1], channel[2]));
        }
    }

    Matcap { image, cavity }
}

impl Matcap {
    /// Warm red wax, the viewer's default look.
    pub fn red_wax() -> Matcap {
        lit_sphere(
            &LobeWeights {
                base: [32.0, 0.0, 0.0],
                grazing: [200.0 / 1.5, 200.0 / 4.0, 150.0 / 4.0],
                fill: [30.0, 25.0, 20.0],
                core: [50.0, 50.0, 50.0],
                highlight: [30.0, 30.0, 30.0],
            },
            pack_rgb(0xff, 0x7d, 0x7d),
        )
    }

    pub fn gray() -> Matcap {
        lit_sphere(
            &LobeWeights {
                base: [32.0, 32.0, 32.0],
                grazing: [50.0, 50.0, 50.0],
                fill: [50.0, 50.0, 50.0],
                core: [50.0, 50.0, 50.0],
                highlight: [30.0, 30.0, 30.0],
            },
            pack_rgb(0x50, 0x50, 0x50),
        )
    }

    pub fn brown() -> Matcap {
        lit_sphere(
            &LobeWeights {
                base: [32.0, 20.0, 10.0],
                grazing: [50.0, 45.0, 40.0],
                fill: [50.0, 40.0, 30.0],
                core: [50.0, 50.0, 50.0],
                highlight: [30.0, 30.0, 30.0],
            },
            pack_rgb(0x60, 0x50, 0x40),
        )
    }

    /// Halftone-friendly sketch ramp: bright except near the silhouette.
    pub fn sketch() -> Matcap {
        let threshold = 0.4f32;
        let w = MATCAP_SIZE;
        let h = MATCAP_SIZE;
        let mut image = Rgba8Image::new(w, h);
        for y in 0..h {
            let v = 1.0 - 2.0 * y as f32 / (h - 1) as f32;
            for x in 0..w {
                let u = 2.0 * x as f32 / (w - 1) as f32 - 1.0;
                let val = (1.0 - u * u - v * v).abs();
                let texel = if val < threshold {
                    let s = (val / threshold * 0xe1 as f32) as u8;
                    pack_rgb(s, s, s)
                } else {
                    pack_rgb(0xe1, 0xe1, 0xe1)
                };
                image.set(x, y, texel);
            }
        }
        Matcap {
            image,
            cavity: pack_rgb(0x50, 0x50, 0x50),
        }
    }

    /// Load a matcap from an image file.
    ///
    /// The cavity tint is the mean of all non-black texels, so loaded
    /// matcaps get a crease color in their own palette.
    pub fn from_file(path: &Path) -> Result<Matcap, MatcapError> {
        let decoded = image::open(path)?.to_rgba8();
        let (w, h) = decoded.dimensions();
        let texels: Vec<u32> = decoded
            .pixels()
            .map(|p| u32::from_le_bytes(p.0))
            .collect();
        let image = Rgba8Image::from_texels(w, h, texels);

        let (mut r, mut g, mut b, mut count) = (0u32, 0u32, 0u32, 0u32);
        for &texel in image.texels() {
            if texel & 0x00ff_ffff != 0 {
                r += red(texel) as u32;
                g += green(texel) as u32;
                b += blue(texel) as u32;
                count += 1;
            }
        }
        let cavity = if count > 0 {
            pack_rgb((r / count) as u8, (g / count) as u8, (b / count) as u8)
        } else {
            pack_rgb(0x50, 0x50, 0x50)
        };

        Ok(Matcap { image, cavity })
    }
}

/// The default matcap set plus per-object overrides.
pub struct MatcapLibrary {
    matcaps: Vec<Matcap>,
    assignments: HashMap<u32, usize>,
}

impl Default for MatcapLibrary {
    fn default() -> Self {
        Self {
            matcaps: vec![
                Matcap::red_wax(),
                Matcap::gray(),
                Matcap::brown(),
                Matcap::sketch(),
            ],
            assignments: HashMap::new(),
        }
    }
}

impl MatcapLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matcaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matcaps.is_empty()
    }

    /// Add a matcap and return its slot.
    pub fn add(&mut self, matcap: Matcap) -> usize {
        self.matcaps.push(matcap);
        self.matcaps.len() - 1
    }

    /// Load an image-backed matcap; decode failures fall back to the default
    /// red wax so a bad file never leaves an object unshadeable.
    pub fn load(&mut self, path: &Path) -> usize {
        match Matcap::from_file(path) {
            Ok(matcap) => self.add(matcap),
            Err(err) => {
                log::warn!("matcap {:?} failed to load, using red wax: {}", path, err);
                self.add(Matcap::red_wax())
            }
        }
    }

    /// Pin an object (by packed id) to a matcap slot.
    pub fn assign(&mut self, raw_id: u32, slot: usize) {
        self.assignments.insert(raw_id, slot);
    }

    /// Matcap for an object: its pinned slot, or a stable semi-random pick
    /// from the default four so neighboring objects rarely match.
    pub fn matcap_for(&self, raw_id: u32) -> &Matcap {
        let slot = self
            .assignments
            .get(&raw_id)
            .copied()
            .unwrap_or_else(|| default_slot(raw_id));
        &self.matcaps[slot.min(self.matcaps.len() - 1)]
    }
}

/// Stable hash of the object id onto the four built-in matcaps.
fn default_slot(raw_id: u32) -> usize {
    let mixed = (raw_id ^ (raw_id >> 16)).wrapping_mul(0x9e37_79b1);
    (mixed >> 28) as usize % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedural_matcaps_are_512() {
        for matcap in [Matcap::red_wax(), Matcap::gray(), Matcap::brown(), Matcap::sketch()] {
            assert_eq!(matcap.image.width(), 512);
            assert_eq!(matcap.image.height(), 512);
        }
    }

    #[test]
    fn test_center_of_lit_sphere_is_bright() {
        let matcap = Matcap::gray();
        let center = matcap.image.get(256, 256);
        let rim = matcap.image.get(0, 0);
        assert!(red(center) > red(rim));
    }

    #[test]
    fn test_cavity_colors() {
        assert_eq!(Matcap::gray().cavity, pack_rgb(0x50, 0x50, 0x50));
        assert_eq!(Matcap::red_wax().cavity, pack_rgb(0xff, 0x7d, 0x7d));
    }

    #[test]
    fn test_default_assignment_is_stable() {
        let lib = MatcapLibrary::new();
        let a = lib.matcap_for(17).image.get(10, 10);
        let b = lib.matcap_for(17).image.get(10, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_explicit_assignment_wins() {
        let mut lib = MatcapLibrary::new();
        lib.assign(42, 3);
        assert_eq!(lib.matcap_for(42).cavity, Matcap::sketch().cavity);
    }
}
