//! Front-to-back volume compositing with early ray termination.

use glam::Vec3;

use crate::alive::{AliveSet, RETIRED};
use crate::buffer::FloatBuffer;
use crate::device::{ComputeDevice, DeviceResult};
use crate::rays::RayBuffers;
use crate::sampler::SampleBuffers;

/// One evaluated sample along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadedSample {
    pub sigma: f32,
    pub delta: f32,
    pub t: f32,
    pub rgb: Vec3,
}

/// Accumulated radiance of one ray.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RayAccumulator {
    pub opacity: f32,
    pub rgb: Vec3,
    pub depth: f32,
}

impl RayAccumulator {
    /// Composite `samples` in order. Returns true once transmittance falls to
    /// `threshold`, in which case later samples are not consumed.
    pub fn composite(&mut self, samples: impl IntoIterator<Item = ShadedSample>, threshold: f32) -> bool {
        let mut transmittance = 1.0 - self.opacity;
        for sample in samples {
            let alpha = 1.0 - (-sample.sigma * sample.delta).exp();
            let weight = alpha * transmittance;

            self.rgb += weight * sample.rgb;
            self.opacity = (self.opacity + weight).min(1.0);
            self.depth += weight * sample.t;
            transmittance *= 1.0 - alpha;

            if transmittance <= threshold {
                return true;
            }
        }
        false
    }
}

/// Composite this round's samples into every alive ray and retire rays that
/// saturated or ran out of interval.
#[allow(clippy::too_many_arguments)]
pub fn composite(
    device: &dyn ComputeDevice,
    alive: &AliveSet,
    rays: &RayBuffers,
    samples: &SampleBuffers,
    sigmas: &FloatBuffer,
    rgbs: &FloatBuffer,
    n_samples: usize,
    threshold: f32,
) -> DeviceResult<()> {
    device.dispatch("composite", alive.count(), &|n| {
        let r = alive.ray(n);
        if r == RETIRED {
            return;
        }
        let r = r as usize;
        let base = n * n_samples;
        let count = samples.effective.get(n) as usize;

        let mut acc = RayAccumulator {
            opacity: rays.opacity.get(r),
            rgb: rays.rgb.get_vec3(r),
            depth: rays.depth.get(r),
        };
        let shaded = (base..base + count).map(|slot| ShadedSample {
            sigma: sigmas.get(slot),
            delta: samples.deltas.get(slot),
            t: samples.ts.get(slot),
            rgb: rgbs.get_vec3(slot),
        });
        let saturated = count > 0 && acc.composite(shaded, threshold);

        rays.opacity.set(r, acc.opacity);
        rays.rgb.set_vec3(r, acc.rgb);
        rays.depth.set(r, acc.depth);

        if saturated || count < n_samples {
            alive.retire(n);
        }
    })
}
