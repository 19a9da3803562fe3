// Re-export glam for convenience
pub use glam::*;

// NGP math types
mod aabb;
mod interval;
mod morton;
mod pose;
mod ray;

pub use aabb::Aabb;
pub use interval::Interval;
pub use morton::encode_morton_3d;
pub use pose::CameraPose;
pub use ray::Ray;

/// sqrt(3), the diagonal of a unit cube.
pub const SQRT3: f32 = 1.732_050_8;

/// Exponent `e` of `x = m * 2^e` with `m` in `[0.5, 1)` (C `frexp`).
///
/// Returns `i32::MIN` for zero and non-finite inputs so callers clamping into
/// a cascade range land on the finest level.
#[inline]
pub fn frexp_exponent(x: f32) -> i32 {
    let x = x.abs();
    if x == 0.0 || !x.is_finite() {
        return i32::MIN;
    }
    x.log2().floor() as i32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
    }

    #[test]
    fn test_frexp_exponent() {
        // 0.75 = 0.75 * 2^0
        assert_eq!(frexp_exponent(0.75), 0);
        // 1.0 = 0.5 * 2^1
        assert_eq!(frexp_exponent(1.0), 1);
        // 0.3 = 0.6 * 2^-1
        assert_eq!(frexp_exponent(0.3), -1);
        assert_eq!(frexp_exponent(-4.0), 3);
        assert_eq!(frexp_exponent(0.0), i32::MIN);
    }
}
