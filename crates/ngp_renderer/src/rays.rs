//! Per-ray state and the scene-bound intersector.

use glam::Vec3;
use ngp_core::PixelDirections;
use ngp_math::{Aabb, CameraPose, Interval, Ray};

use crate::buffer::FloatBuffer;
use crate::device::{ComputeDevice, DeviceResult};

/// Closest distance at which marching may start.
pub const NEAR_DISTANCE: f32 = 0.01;

/// Clip a ray against the scene bound.
///
/// Returns `[max(t_enter, NEAR_DISTANCE), t_exit]`, or [`Interval::MISS`]
/// when the ray misses, the bound lies behind the origin, or the direction
/// is degenerate.
pub fn clip_to_bound(ray: &Ray, bound: &Aabb) -> Interval {
    if ray.is_degenerate() {
        return Interval::MISS;
    }

    let slab = bound.intersect(ray);
    if slab.max > 0.0 && slab.min < slab.max {
        let near = slab.min.max(NEAR_DISTANCE);
        if near < slab.max {
            return Interval::new(near, slab.max);
        }
    }
    Interval::MISS
}

/// Device-resident state of every ray in a frame.
///
/// `t_near` doubles as the current march distance once sampling starts.
#[derive(Debug)]
pub struct RayBuffers {
    count: usize,
    pub origins: FloatBuffer,
    pub directions: FloatBuffer,
    pub t_near: FloatBuffer,
    pub t_far: FloatBuffer,
    pub opacity: FloatBuffer,
    pub rgb: FloatBuffer,
    pub depth: FloatBuffer,
}

impl RayBuffers {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            origins: FloatBuffer::new(count * 3),
            directions: FloatBuffer::new(count * 3),
            t_near: FloatBuffer::new(count),
            t_far: FloatBuffer::new(count),
            opacity: FloatBuffer::new(count),
            rgb: FloatBuffer::new(count * 3),
            depth: FloatBuffer::new(count),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Clear the accumulators for a new frame.
    pub fn reset(&self) {
        self.opacity.fill(0.0);
        self.rgb.fill(0.0);
        self.depth.fill(0.0);
    }

    #[inline]
    pub fn ray(&self, r: usize) -> Ray {
        Ray::new(self.origins.get_vec3(r), self.directions.get_vec3(r))
    }

    /// Remaining march interval of ray `r`.
    #[inline]
    pub fn interval(&self, r: usize) -> Interval {
        Interval::new(self.t_near.get(r), self.t_far.get(r))
    }
}

/// Build world-space rays for `pose` and clip them against the cube of
/// half-extent `scale`.
pub fn intersect(
    device: &dyn ComputeDevice,
    rays: &RayBuffers,
    pose: &CameraPose,
    directions: &PixelDirections,
    scale: f32,
) -> DeviceResult<()> {
    let bound = Aabb::cube(scale);
    let pixel_dirs = directions.as_slice();
    let count = rays.len().min(pixel_dirs.len());

    device.dispatch("intersect", count, &|r| {
        let d = pose.transform_direction(pixel_dirs[r]);
        let direction = if d.is_finite() { d.normalize_or_zero() } else { Vec3::ZERO };
        let ray = Ray::new(pose.origin, direction);
        let hit = clip_to_bound(&ray, &bound);

        rays.origins.set_vec3(r, ray.origin);
        rays.directions.set_vec3(r, ray.direction);
        rays.t_near.set(r, hit.min);
        rays.t_far.set(r, hit.max);
    })
}
