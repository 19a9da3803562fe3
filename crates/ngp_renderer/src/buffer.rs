//! Fixed-capacity device buffers.
//!
//! Every element is an `AtomicU32` so kernels can write through a shared
//! reference. Floats are stored by bit pattern. All accesses use relaxed
//! ordering; the end of a dispatch is the synchronization point.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

/// Buffer of `f32` values.
#[derive(Debug)]
pub struct FloatBuffer {
    data: Vec<AtomicU32>,
}

impl FloatBuffer {
    /// Zero-filled buffer of `len` floats.
    pub fn new(len: usize) -> Self {
        Self {
            data: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        f32::from_bits(self.data[index].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, index: usize, value: f32) {
        self.data[index].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Read element `index` of a buffer of packed 3-vectors.
    #[inline]
    pub fn get_vec3(&self, index: usize) -> Vec3 {
        let base = index * 3;
        Vec3::new(self.get(base), self.get(base + 1), self.get(base + 2))
    }

    #[inline]
    pub fn set_vec3(&self, index: usize, value: Vec3) {
        let base = index * 3;
        self.set(base, value.x);
        self.set(base + 1, value.y);
        self.set(base + 2, value.z);
    }

    /// Overwrite the whole buffer from the host.
    pub fn fill(&self, value: f32) {
        let bits = value.to_bits();
        for v in &self.data {
            v.store(bits, Ordering::Relaxed);
        }
    }

    /// Copy the buffer back to the host.
    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

/// Buffer of `u32` values (indices, counts, flags).
#[derive(Debug)]
pub struct IndexBuffer {
    data: Vec<AtomicU32>,
}

impl IndexBuffer {
    /// Buffer of `len` entries, all set to `value`.
    pub fn new(len: usize, value: u32) -> Self {
        Self {
            data: (0..len).map(|_| AtomicU32::new(value)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.data[index].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, index: usize, value: u32) {
        self.data[index].store(value, Ordering::Relaxed);
    }

    pub fn fill(&self, value: u32) {
        for v in &self.data {
            v.store(value, Ordering::Relaxed);
        }
    }

    /// Copy the first `count` entries back to the host.
    pub fn to_vec(&self, count: usize) -> Vec<u32> {
        (0..count.min(self.len())).map(|i| self.get(i)).collect()
    }
}

/// Atomic counter that hands out dense positions.
#[derive(Debug, Default)]
pub struct Counter(AtomicU32);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Claim the next position.
    #[inline]
    pub fn claim(&self) -> usize {
        self.0.fetch_add(1, Ordering::Relaxed) as usize
    }

    pub fn load(&self) -> usize {
        self.0.load(Ordering::Relaxed) as usize
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}
