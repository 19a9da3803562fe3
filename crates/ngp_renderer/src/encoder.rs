//! Multi-resolution hash grid encoding of sample positions.

use std::sync::Arc;

use glam::{UVec3, Vec3};
use ngp_core::network::MAX_LAYER_WIDTH;
use ngp_core::HashGridTable;

use crate::buffer::{FloatBuffer, IndexBuffer};
use crate::compaction::{Compaction, INVALID_SLOT};
use crate::device::{ComputeDevice, DeviceResult};

/// Encodes world positions into the concatenated per-level feature vector.
#[derive(Debug, Clone)]
pub struct HashGridEncoder {
    table: Arc<HashGridTable>,
    scale: f32,
    /// (lattice scale, resolution) per level
    levels: Vec<(f32, u32)>,
}

impl HashGridEncoder {
    /// Encoder for a table covering the cube of half-extent `scale`.
    pub fn new(table: Arc<HashGridTable>, scale: f32) -> Self {
        let config = table.config();
        let levels = (0..config.levels).map(|l| config.level_geometry(l)).collect();
        Self { table, scale, levels }
    }

    /// Length of one embedding.
    pub fn width(&self) -> usize {
        self.levels.len() * self.table.features_per_level()
    }

    /// Write the embedding of world position `x` into `out[..self.width()]`.
    pub fn encode(&self, x: Vec3, out: &mut [f32]) {
        let width = self.table.features_per_level();
        let p = ((x + self.scale) / (2.0 * self.scale)).clamp(Vec3::ZERO, Vec3::ONE);

        for (level, &(level_scale, resolution)) in self.levels.iter().enumerate() {
            let q = p * level_scale + 0.5;
            let base = q.floor();
            let frac = q - base;
            let base = base.as_uvec3();

            let feature = &mut out[level * width..(level + 1) * width];
            feature.fill(0.0);

            for corner in 0..8u32 {
                let offset = UVec3::new(corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
                let mut weight = 1.0;
                for axis in 0..3 {
                    weight *= if offset[axis] == 1 {
                        frac[axis]
                    } else {
                        1.0 - frac[axis]
                    };
                }

                let index = self.table.entry_index(level, base + offset, resolution);
                for (f, value) in feature.iter_mut().zip(self.table.entry(index)) {
                    *f += weight * value;
                }
            }
        }
    }
}

/// Encode the positions of every launched sample into `embedding`.
///
/// Padding entries get an all-zero embedding.
pub fn encode(
    device: &dyn ComputeDevice,
    encoder: &HashGridEncoder,
    launch: &IndexBuffer,
    compaction: Compaction,
    positions: &FloatBuffer,
    embedding: &FloatBuffer,
) -> DeviceResult<()> {
    let width = encoder.width();
    debug_assert!(width <= MAX_LAYER_WIDTH);

    device.dispatch("encode", compaction.launch_count, &|i| {
        let mut local = [0.0f32; MAX_LAYER_WIDTH];
        let slot = launch.get(i);
        if slot != INVALID_SLOT {
            encoder.encode(positions.get_vec3(slot as usize), &mut local[..width]);
        }
        for (k, value) in local[..width].iter().enumerate() {
            embedding.set(i * width + k, *value);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SerialDevice;
    use ngp_core::HashGridConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_config() -> HashGridConfig {
        HashGridConfig {
            levels: 4,
            features_per_level: 2,
            base_resolution: 4.0,
            finest_resolution: 32.0,
        }
    }

    #[test]
    fn test_constant_table_encodes_constant() {
        let table = HashGridTable::constant(small_config(), 10, 0.5).unwrap();
        let encoder = HashGridEncoder::new(Arc::new(table), 0.5);
        let mut out = vec![0.0; encoder.width()];

        for x in [Vec3::ZERO, Vec3::splat(-0.5), Vec3::new(0.49, -0.2, 0.13)] {
            encoder.encode(x, &mut out);
            assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-5), "{:?} -> {:?}", x, out);
        }
    }

    #[test]
    fn test_encoding_is_continuous() {
        let mut table = HashGridTable::constant(small_config(), 10, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for f in table.features_mut() {
            *f = rng.gen_range(-1.0..1.0);
        }
        let encoder = HashGridEncoder::new(Arc::new(table), 0.5);

        let mut a = vec![0.0; encoder.width()];
        let mut b = vec![0.0; encoder.width()];
        let x = Vec3::new(0.1, -0.2, 0.3);
        encoder.encode(x, &mut a);
        encoder.encode(x + Vec3::splat(1e-5), &mut b);
        for (va, vb) in a.iter().zip(&b) {
            assert!((va - vb).abs() < 1e-2);
        }
    }

    #[test]
    fn test_lattice_point_reads_single_entry() {
        let config = HashGridConfig {
            levels: 1,
            features_per_level: 2,
            base_resolution: 5.0,
            finest_resolution: 5.0,
        };
        let mut table = HashGridTable::constant(config, 10, 0.0).unwrap();
        // Level scale 4: p = 0.125 lands on lattice point 1 on every axis
        let (_, resolution) = table.config().level_geometry(0);
        let index = table.entry_index(0, UVec3::splat(1), resolution);
        let width = table.features_per_level();
        table.features_mut()[index * width] = 3.0;
        table.features_mut()[index * width + 1] = -1.0;

        let encoder = HashGridEncoder::new(Arc::new(table), 0.5);
        let mut out = vec![0.0; 2];
        encoder.encode(Vec3::splat(-0.375), &mut out);
        assert!((out[0] - 3.0).abs() < 1e-5);
        assert!((out[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_encode_kernel_zeroes_padding() {
        let table = HashGridTable::constant(small_config(), 10, 1.0).unwrap();
        let encoder = HashGridEncoder::new(Arc::new(table), 0.5);
        let width = encoder.width();

        let positions = FloatBuffer::new(3);
        let launch = IndexBuffer::new(2, 0);
        launch.set(1, INVALID_SLOT);
        let embedding = FloatBuffer::new(2 * width);
        embedding.fill(9.0);

        let compaction = Compaction {
            launch_count: 2,
            valid_count: 1,
        };
        encode(&SerialDevice, &encoder, &launch, compaction, &positions, &embedding).unwrap();

        let values = embedding.to_vec();
        assert!(values[..width].iter().all(|v| (v - 1.0).abs() < 1e-5));
        assert!(values[width..].iter().all(|&v| v == 0.0));
    }
}
