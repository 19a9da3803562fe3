//! Adaptive ray marching through the occupancy grid.
//!
//! Every alive ray advances from its current march distance, emitting a
//! sample for each step that lands in an occupied voxel and skipping empty
//! voxels along the step lattice. A round emits at most `N_samples` samples
//! per ray into a fixed chunk of sample slots.

use glam::Vec3;
use ngp_core::occupancy::cascade_bound;
use ngp_core::{ModelConfig, OccupancyGrid};
use ngp_math::{encode_morton_3d, frexp_exponent, SQRT3};

use crate::alive::{AliveSet, RETIRED};
use crate::buffer::{FloatBuffer, IndexBuffer};
use crate::device::{ComputeDevice, DeviceResult};
use crate::rays::RayBuffers;

/// Samples per alive ray this round: `clamp(n_rays / n_alive, 1, max)`.
///
/// Keeps `n_alive * samples` at or below `n_rays`. `n_alive` must be
/// non-zero.
pub fn samples_per_round(n_rays: usize, n_alive: usize, max_samples: usize) -> usize {
    debug_assert!(n_alive > 0);
    (n_rays / n_alive.max(1)).clamp(1, max_samples.max(1))
}

/// Scene constants the march depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchParams {
    pub scale: f32,
    pub cascades: u32,
    pub grid_size: u32,
    /// Step growth with distance; 0 gives uniform steps
    pub exp_step_factor: f32,
}

impl MarchParams {
    pub fn new(config: &ModelConfig, exp_step_factor: f32) -> Self {
        Self {
            scale: config.scale,
            cascades: config.cascades,
            grid_size: config.grid_size,
            exp_step_factor,
        }
    }

    /// Step length at distance `t`.
    #[inline]
    pub fn step_size(&self, t: f32) -> f32 {
        let min = SQRT3 / 1024.0;
        let max = SQRT3 * 2.0 * self.scale / self.grid_size as f32;
        (t * self.exp_step_factor).clamp(min, max.max(min))
    }

    /// Occupancy cascade for a sample at `x` taking a step of `dt`.
    ///
    /// The finest cascade that contains `x` and whose voxels are no smaller
    /// than the step.
    #[inline]
    pub fn cascade(&self, x: Vec3, dt: f32) -> u32 {
        let top = self.cascades.saturating_sub(1) as i32;
        let from_pos = frexp_exponent(x.abs().max_element()).saturating_add(1).clamp(0, top);
        let from_dt = frexp_exponent(dt * self.grid_size as f32).clamp(0, top);
        from_pos.max(from_dt) as u32
    }
}

/// One emitted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchSample {
    pub position: Vec3,
    /// Step length the sample stands for
    pub delta: f32,
    /// March distance after the step
    pub t: f32,
}

/// Where a march stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchEnd {
    pub t: f32,
    pub count: usize,
}

#[inline]
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Distance to leave voxel `voxel` of a cascade with half-extent `bound`.
#[inline]
fn voxel_exit(x: Vec3, d: Vec3, voxel: Vec3, bound: f32, grid_size: f32) -> f32 {
    let mut exit = f32::INFINITY;
    for axis in 0..3 {
        if d[axis] == 0.0 {
            continue;
        }
        let face = ((voxel[axis] + 0.5 + 0.5 * sign(d[axis])) / grid_size * 2.0 - 1.0) * bound;
        exit = exit.min((face - x[axis]) / d[axis]);
    }
    exit.max(0.0)
}

/// March one ray from `t` towards `t_far`, emitting up to `max_samples`
/// samples through `emit(index, sample)`.
///
/// Empty voxels are skipped in whole steps so every sample stays on the same
/// step lattice. The skip never runs past `t_far`.
#[allow(clippy::too_many_arguments)]
pub fn march(
    origin: Vec3,
    direction: Vec3,
    mut t: f32,
    t_far: f32,
    max_samples: usize,
    params: &MarchParams,
    grid: &OccupancyGrid,
    mut emit: impl FnMut(usize, MarchSample),
) -> MarchEnd {
    let g = params.grid_size as f32;
    let mut count = 0;

    while t >= 0.0 && t < t_far && count < max_samples {
        let x = origin + direction * t;
        let dt = params.step_size(t);
        let cascade = params.cascade(x, dt);
        let bound = cascade_bound(cascade, params.scale);
        let v = (0.5 * (x / bound + 1.0) * g).clamp(Vec3::ZERO, Vec3::splat(g - 1.0));
        let voxel = v.floor();
        let morton = encode_morton_3d(voxel.x as u32, voxel.y as u32, voxel.z as u32);

        if grid.is_occupied(cascade, morton) {
            t += dt;
            emit(
                count,
                MarchSample {
                    position: x,
                    delta: dt,
                    t,
                },
            );
            count += 1;
        } else {
            let t_exit = (t + voxel_exit(x, direction, voxel, bound, g)).min(t_far);
            t += dt;
            while t < t_exit {
                t += params.step_size(t);
            }
        }
    }

    MarchEnd { t, count }
}

/// Per-round sample slots plus the per-alive-slot effective counts.
///
/// Slot `n * N_samples + s` holds step `s` of alive slot `n`.
#[derive(Debug)]
pub struct SampleBuffers {
    capacity: usize,
    pub positions: FloatBuffer,
    pub directions: FloatBuffer,
    pub deltas: FloatBuffer,
    pub ts: FloatBuffer,
    pub valid: IndexBuffer,
    pub effective: IndexBuffer,
}

impl SampleBuffers {
    /// Buffers for `capacity` sample slots and as many alive slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            positions: FloatBuffer::new(capacity * 3),
            directions: FloatBuffer::new(capacity * 3),
            deltas: FloatBuffer::new(capacity),
            ts: FloatBuffer::new(capacity),
            valid: IndexBuffer::new(capacity, 0),
            effective: IndexBuffer::new(capacity, 0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Advance every alive ray by up to `n_samples` samples.
pub fn sample(
    device: &dyn ComputeDevice,
    alive: &AliveSet,
    rays: &RayBuffers,
    grid: &OccupancyGrid,
    params: &MarchParams,
    n_samples: usize,
    samples: &SampleBuffers,
) -> DeviceResult<()> {
    let n_alive = alive.count();
    debug_assert!(n_alive * n_samples <= samples.capacity());

    device.dispatch("sample", n_alive, &|n| {
        let base = n * n_samples;
        let r = alive.ray(n);

        let count = if r == RETIRED {
            0
        } else {
            let r = r as usize;
            let ray = rays.ray(r);
            let hit = rays.interval(r);
            let end = march(
                ray.origin,
                ray.direction,
                hit.min,
                hit.max,
                n_samples,
                params,
                grid,
                |s, sample| {
                    let slot = base + s;
                    samples.positions.set_vec3(slot, sample.position);
                    samples.directions.set_vec3(slot, ray.direction);
                    samples.deltas.set(slot, sample.delta);
                    samples.ts.set(slot, sample.t);
                    samples.valid.set(slot, 1);
                },
            );
            rays.t_near.set(r, end.t);
            end.count
        };

        samples.effective.set(n, count as u32);
        for s in count..n_samples {
            samples.valid.set(base + s, 0);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SerialDevice;
    use glam::UVec3;

    fn params(cascades: u32, grid_size: u32) -> MarchParams {
        MarchParams {
            scale: 0.5,
            cascades,
            grid_size,
            exp_step_factor: 0.0,
        }
    }

    #[test]
    fn test_samples_per_round() {
        assert_eq!(samples_per_round(640_000, 640_000, 64), 1);
        assert_eq!(samples_per_round(640_000, 1, 64), 64);
        assert_eq!(samples_per_round(640_000, 20_000, 64), 32);
        assert_eq!(samples_per_round(100, 99, 64), 1);
    }

    #[test]
    fn test_step_size_bounds() {
        let uniform = params(1, 128);
        assert_eq!(uniform.step_size(1.0), SQRT3 / 1024.0);

        let growing = MarchParams {
            exp_step_factor: 1.0 / 256.0,
            ..params(1, 128)
        };
        assert!(growing.step_size(1.0) > SQRT3 / 1024.0);
        assert_eq!(growing.step_size(1e6), SQRT3 * 2.0 * 0.5 / 128.0);
    }

    #[test]
    fn test_cascade_selection() {
        let p = MarchParams {
            scale: 8.0,
            ..params(4, 128)
        };
        let dt = SQRT3 / 1024.0;
        assert_eq!(p.cascade(Vec3::new(0.3, 0.0, 0.0), dt), 0);
        assert_eq!(p.cascade(Vec3::new(0.0, -0.7, 0.0), dt), 1);
        assert_eq!(p.cascade(Vec3::new(0.0, 0.0, 3.0), dt), 3);
        assert_eq!(p.cascade(Vec3::splat(100.0), dt), 3);
        // Large steps force a coarse cascade
        assert_eq!(p.cascade(Vec3::ZERO, 0.05), 3);
        assert_eq!(params(1, 128).cascade(Vec3::splat(3.0), 1.0), 0);
    }

    #[test]
    fn test_march_full_grid_emits_every_step() {
        let p = params(1, 16);
        let grid = OccupancyGrid::full(1, 16);
        let mut emitted = Vec::new();
        let end = march(
            Vec3::new(0.0, 0.0, 2.0),
            -Vec3::Z,
            1.5,
            2.5,
            10,
            &p,
            &grid,
            |s, sample| emitted.push((s, sample)),
        );

        assert_eq!(end.count, 10);
        assert_eq!(emitted.len(), 10);
        let dt = p.step_size(1.5);
        for (i, (s, sample)) in emitted.iter().enumerate() {
            assert_eq!(*s, i);
            assert_eq!(sample.delta, dt);
            assert!((sample.t - (1.5 + dt * (i + 1) as f32)).abs() < 1e-5);
        }
        assert_eq!(end.t, emitted[9].1.t);
    }

    #[test]
    fn test_march_empty_grid_exhausts_interval() {
        let p = params(1, 16);
        let grid = OccupancyGrid::empty(1, 16);
        let end = march(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z, 1.5, 2.5, 64, &p, &grid, |_, _| {
            panic!("no sample expected")
        });
        assert_eq!(end.count, 0);
        assert!(end.t >= 2.5);
    }

    #[test]
    fn test_march_stops_at_far() {
        let p = params(1, 16);
        let grid = OccupancyGrid::full(1, 16);
        let dt = p.step_size(0.0);
        let end = march(Vec3::ZERO, Vec3::X, 0.1, 0.1 + 5.5 * dt, 64, &p, &grid, |_, _| {});
        assert_eq!(end.count, 6);
    }

    #[test]
    fn test_march_samples_only_occupied_voxel() {
        let p = params(1, 16);
        let target = UVec3::new(8, 8, 8);
        let grid = OccupancyGrid::from_fn(1, 16, |_, v| v == target);
        let mut positions = Vec::new();
        let end = march(Vec3::new(0.01, 0.01, 2.0), -Vec3::Z, 1.5, 2.5, 64, &p, &grid, |_, s| {
            positions.push(s.position)
        });

        assert!(end.count > 0);
        // Voxel 8 spans [0, 1/16) on every axis
        for x in positions {
            assert!(x.z >= 0.0 && x.z < 0.0625 + 1e-4, "sample at {:?}", x);
        }
    }

    #[test]
    fn test_march_maps_coarse_cascade_voxels() {
        let p = MarchParams {
            scale: 1.0,
            ..params(2, 16)
        };
        // Cascade 1 spans [-1, 1]; voxel 12 covers x in [0.5, 0.625), outside cascade 0
        let target = UVec3::new(12, 8, 8);
        let grid = OccupancyGrid::from_fn(2, 16, |c, v| c == 1 && v == target);
        let mut positions = Vec::new();
        let end = march(Vec3::new(-1.5, 0.06, 0.06), Vec3::X, 0.5, 2.5, 256, &p, &grid, |_, s| {
            positions.push(s.position)
        });

        // 0.125 wide voxel over steps of sqrt(3) / 1024
        assert!((72..=75).contains(&end.count), "{} samples", end.count);
        for x in positions {
            assert!(x.x >= 0.5 - 1e-4 && x.x < 0.625 + 1e-4, "sample at {:?}", x);
        }
        assert!(end.t >= 2.5);
    }

    #[test]
    fn test_march_ignores_fine_cascade_outside_its_cube() {
        let p = MarchParams {
            scale: 1.0,
            ..params(2, 16)
        };
        let grid = OccupancyGrid::from_fn(2, 16, |c, _| c == 0);
        let mut positions = Vec::new();
        march(Vec3::new(-1.5, 0.2, 0.2), Vec3::X, 0.5, 2.5, 2048, &p, &grid, |_, s| {
            positions.push(s.position)
        });

        assert!(!positions.is_empty());
        for x in &positions {
            assert!(x.x.abs() < 0.5 + 1e-4, "sample at {:?}", x);
        }
        // Uniform steps across the whole cascade 0 cube
        let dt = p.step_size(0.0);
        let expected = (1.0 / dt) as usize;
        assert!(positions.len().abs_diff(expected) <= 2, "{} samples", positions.len());
    }

    #[test]
    fn test_miss_sentinel_never_marches() {
        let p = params(1, 16);
        let grid = OccupancyGrid::full(1, 16);
        let end = march(Vec3::ZERO, Vec3::X, -1.0, -1.0, 64, &p, &grid, |_, _| {});
        assert_eq!(end.count, 0);
        assert_eq!(end.t, -1.0);
    }

    #[test]
    fn test_sample_kernel_marks_unused_slots_invalid() {
        let rays = RayBuffers::new(2);
        rays.origins.set_vec3(0, Vec3::new(0.0, 0.0, 2.0));
        rays.directions.set_vec3(0, -Vec3::Z);
        rays.t_near.set(0, 1.5);
        rays.t_far.set(0, 2.5);
        rays.origins.set_vec3(1, Vec3::new(0.0, 0.0, 2.0));
        rays.directions.set_vec3(1, -Vec3::Z);
        rays.t_near.set(1, 2.499);
        rays.t_far.set(1, 2.5);

        let mut alive = AliveSet::new(2);
        alive.rebuild(&SerialDevice, &rays).unwrap();

        let grid = OccupancyGrid::full(1, 16);
        let samples = SampleBuffers::new(8);
        samples.valid.fill(1);
        sample(&SerialDevice, &alive, &rays, &grid, &params(1, 16), 4, &samples).unwrap();

        assert_eq!(samples.effective.to_vec(2), vec![4, 1]);
        assert_eq!(samples.valid.to_vec(8), vec![1, 1, 1, 1, 1, 0, 0, 0]);
        assert!(rays.t_near.get(0) > 1.5);
        assert!(rays.t_near.get(1) >= 2.5);
    }
}
