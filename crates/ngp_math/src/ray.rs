use crate::Vec3;

/// A ray in 3D space with an origin and a direction.
///
/// Directions produced by the intersector are unit length, so `t` is a
/// world-space distance along the ray.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// True if the direction cannot be marched along (zero-length or non-finite).
    pub fn is_degenerate(&self) -> bool {
        !self.direction.is_finite() || self.direction.length_squared() <= f32::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(1.0), Vec3::X);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_degenerate() {
        assert!(Ray::new(Vec3::ZERO, Vec3::ZERO).is_degenerate());
        assert!(Ray::new(Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 1.0)).is_degenerate());
        assert!(!Ray::new(Vec3::ZERO, Vec3::Z).is_degenerate());
    }
}
