//! Ray type for the visibility queries.

use glam::Vec3;

/// A ray with an origin and a direction.
///
/// The direction is not required to be normalized; hit distances are
/// expressed in multiples of the direction's length.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point along the ray at parameter t: origin + t * direction.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + t * self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(ray.at(0.0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(ray.at(0.5), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(ray.at(2.0), Vec3::new(1.0, 4.0, 0.0));
    }
}
