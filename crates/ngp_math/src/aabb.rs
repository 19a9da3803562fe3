use crate::{Interval, Ray};

/// Axis-Aligned Bounding Box used as the scene bound for ray marching.
///
/// An AABB is defined by three intervals (one per axis) that bound a 3D volume.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    /// Create a new AABB from three intervals.
    pub fn new(x: Interval, y: Interval, z: Interval) -> Self {
        Self { x, y, z }
    }

    /// Create a cube of the given half-extent centered at the origin.
    pub fn cube(half_extent: f32) -> Self {
        let axis = Interval::new(-half_extent, half_extent);
        Self::new(axis, axis, axis)
    }

    /// Get the interval for a specific axis (0=X, 1=Y, 2=Z).
    pub fn axis_interval(&self, n: usize) -> Interval {
        match n {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Entry/exit distances of an infinite line through this box (slab method).
    ///
    /// The returned interval has `min > max` when the line misses. Entry may
    /// be negative when the origin is inside the box or the box is behind it.
    pub fn intersect(&self, r: &Ray) -> Interval {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;

        for axis in 0..3 {
            let slab = self.axis_interval(axis);
            let adinv = 1.0 / r.direction[axis];
            let mut t0 = (slab.min - r.origin[axis]) * adinv;
            let mut t1 = (slab.max - r.origin[axis]) * adinv;
            if adinv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            // f32::max/min drop the NaN of an origin lying exactly on a slab
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
        }

        Interval::new(t_enter, t_exit)
    }
}
