//! Double-buffered set of rays still being marched.

use crate::buffer::{Counter, IndexBuffer};
use crate::device::{ComputeDevice, DeviceResult};
use crate::rays::RayBuffers;

/// Marks an alive slot whose ray was retired this round.
pub const RETIRED: u32 = u32::MAX;

/// Ping-pong alive-ray index buffers plus the live count.
///
/// Each round the compositor overwrites retired slots with [`RETIRED`] and
/// [`AliveSet::repartition`] packs the survivors into the other buffer.
#[derive(Debug)]
pub struct AliveSet {
    buffers: [IndexBuffer; 2],
    current: usize,
    counter: Counter,
}

impl AliveSet {
    /// Alive set able to hold `capacity` rays.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: [IndexBuffer::new(capacity, RETIRED), IndexBuffer::new(capacity, RETIRED)],
            current: 0,
            counter: Counter::new(),
        }
    }

    /// Number of alive rays.
    pub fn count(&self) -> usize {
        self.counter.load()
    }

    /// Ray index in alive slot `n`.
    #[inline]
    pub fn ray(&self, n: usize) -> u32 {
        self.buffers[self.current].get(n)
    }

    /// Mark alive slot `n` as retired.
    #[inline]
    pub fn retire(&self, n: usize) {
        self.buffers[self.current].set(n, RETIRED);
    }

    /// Current alive ray indices.
    pub fn indices(&self) -> Vec<u32> {
        self.buffers[self.current].to_vec(self.count())
    }

    /// Start a frame: every ray with a non-empty interval is alive.
    pub fn rebuild(&mut self, device: &dyn ComputeDevice, rays: &RayBuffers) -> DeviceResult<usize> {
        self.current = 0;
        self.counter.reset();

        let target = &self.buffers[0];
        let counter = &self.counter;
        device.dispatch("alive_init", rays.len(), &|r| {
            if !rays.interval(r).is_empty() {
                target.set(counter.claim(), r as u32);
            }
        })?;
        Ok(self.count())
    }

    /// Drop retired slots by scattering survivors into the other buffer.
    pub fn repartition(&mut self, device: &dyn ComputeDevice) -> DeviceResult<usize> {
        let previous = self.count();
        self.counter.reset();
        self.current ^= 1;

        let (source, target) = if self.current == 1 {
            (&self.buffers[0], &self.buffers[1])
        } else {
            (&self.buffers[1], &self.buffers[0])
        };
        let counter = &self.counter;
        device.dispatch("repartition", previous, &|n| {
            let r = source.get(n);
            if r != RETIRED {
                target.set(counter.claim(), r);
            }
        })?;
        Ok(self.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CpuDevice, SerialDevice};

    fn rays_with_hits(hits: &[bool]) -> RayBuffers {
        let rays = RayBuffers::new(hits.len());
        for (r, &hit) in hits.iter().enumerate() {
            let (near, far) = if hit { (1.0, 2.0) } else { (-1.0, -1.0) };
            rays.t_near.set(r, near);
            rays.t_far.set(r, far);
        }
        rays
    }

    #[test]
    fn test_rebuild_skips_missed_rays() {
        let rays = rays_with_hits(&[true, false, true, true, false]);
        let mut alive = AliveSet::new(5);

        assert_eq!(alive.rebuild(&SerialDevice, &rays).unwrap(), 3);
        assert_eq!(alive.indices(), vec![0, 2, 3]);
    }

    #[test]
    fn test_repartition_drops_retired() {
        let rays = rays_with_hits(&[true; 6]);
        let mut alive = AliveSet::new(6);
        alive.rebuild(&SerialDevice, &rays).unwrap();

        alive.retire(1);
        alive.retire(4);
        assert_eq!(alive.repartition(&SerialDevice).unwrap(), 4);
        assert_eq!(alive.indices(), vec![0, 2, 3, 5]);
    }

    #[test]
    fn test_repartition_is_idempotent_when_all_retired() {
        let rays = rays_with_hits(&[true; 4]);
        let mut alive = AliveSet::new(4);
        alive.rebuild(&SerialDevice, &rays).unwrap();
        for n in 0..4 {
            alive.retire(n);
        }

        assert_eq!(alive.repartition(&SerialDevice).unwrap(), 0);
        assert_eq!(alive.repartition(&SerialDevice).unwrap(), 0);
        assert!(alive.indices().is_empty());
    }

    #[test]
    fn test_parallel_repartition_keeps_distinct_indices() {
        let device = CpuDevice::new(Some(4)).unwrap();
        let rays = rays_with_hits(&[true; 5000]);
        let mut alive = AliveSet::new(5000);
        alive.rebuild(&device, &rays).unwrap();
        let before = alive.indices();
        let mut retired = Vec::new();
        for n in (0..5000).step_by(3) {
            retired.push(before[n]);
            alive.retire(n);
        }
        alive.repartition(&device).unwrap();

        let mut indices = alive.indices();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 5000 - 1667);
        assert!(retired.iter().all(|r| indices.binary_search(r).is_err()));
    }
}
