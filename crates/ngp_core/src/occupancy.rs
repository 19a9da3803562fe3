//! Cascaded occupancy bitfield.
//!
//! Each cascade is a `G³` voxel grid covering the cube of half-extent
//! `min(2^(c-1), scale)`. Voxels are laid out along a Morton curve and packed
//! one bit per voxel into `u32` words, cascade after cascade.

use glam::{UVec3, Vec3};
use ngp_math::encode_morton_3d;

use crate::assets::{AssetError, AssetResult};

/// Half-extent of the region covered by cascade `cascade`.
#[inline]
pub fn cascade_bound(cascade: u32, scale: f32) -> f32 {
    (0.5 * (1u32 << cascade.min(31)) as f32).min(scale)
}

/// Immutable occupancy grid.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    cascades: u32,
    grid_size: u32,
    bits: Vec<u32>,
}

impl OccupancyGrid {
    /// Number of `u32` words needed for a grid layout.
    pub fn word_count(cascades: u32, grid_size: u32) -> usize {
        let voxels = cascades as usize * (grid_size as usize).pow(3);
        voxels.div_ceil(32)
    }

    /// Wrap a packed bitfield, checking it covers every voxel.
    pub fn new(cascades: u32, grid_size: u32, bits: Vec<u32>) -> AssetResult<Self> {
        let expected = Self::word_count(cascades, grid_size);
        if bits.len() != expected {
            return Err(AssetError::SizeMismatch {
                what: "occupancy bitfield".into(),
                expected,
                actual: bits.len(),
            });
        }
        Ok(Self {
            cascades,
            grid_size,
            bits,
        })
    }

    /// Grid with every voxel empty.
    pub fn empty(cascades: u32, grid_size: u32) -> Self {
        Self {
            cascades,
            grid_size,
            bits: vec![0; Self::word_count(cascades, grid_size)],
        }
    }

    /// Grid with every voxel occupied.
    pub fn full(cascades: u32, grid_size: u32) -> Self {
        Self {
            cascades,
            grid_size,
            bits: vec![u32::MAX; Self::word_count(cascades, grid_size)],
        }
    }

    /// Grid whose voxels are occupied where `occupied(cascade, voxel)` holds.
    pub fn from_fn(cascades: u32, grid_size: u32, mut occupied: impl FnMut(u32, UVec3) -> bool) -> Self {
        let mut grid = Self::empty(cascades, grid_size);
        for cascade in 0..cascades {
            for z in 0..grid_size {
                for y in 0..grid_size {
                    for x in 0..grid_size {
                        let voxel = UVec3::new(x, y, z);
                        if occupied(cascade, voxel) {
                            grid.set(cascade, voxel);
                        }
                    }
                }
            }
        }
        grid
    }

    /// Grid occupied wherever a voxel center falls inside `world_occupied`.
    pub fn from_world_fn(
        cascades: u32,
        grid_size: u32,
        scale: f32,
        mut world_occupied: impl FnMut(Vec3) -> bool,
    ) -> Self {
        let inv = 1.0 / grid_size as f32;
        Self::from_fn(cascades, grid_size, |cascade, voxel| {
            let bound = cascade_bound(cascade, scale);
            let center = ((voxel.as_vec3() + 0.5) * inv * 2.0 - 1.0) * bound;
            world_occupied(center)
        })
    }

    fn bit_index(&self, cascade: u32, morton: u32) -> usize {
        cascade as usize * (self.grid_size as usize).pow(3) + morton as usize
    }

    fn set(&mut self, cascade: u32, voxel: UVec3) {
        let idx = self.bit_index(cascade, encode_morton_3d(voxel.x, voxel.y, voxel.z));
        self.bits[idx / 32] |= 1 << (idx % 32);
    }

    /// Test the bit of a voxel given its Morton code within a cascade.
    #[inline]
    pub fn is_occupied(&self, cascade: u32, morton: u32) -> bool {
        let idx = self.bit_index(cascade, morton);
        self.bits[idx / 32] & (1 << (idx % 32)) != 0
    }

    /// Test the bit of a voxel by coordinates.
    pub fn is_voxel_occupied(&self, cascade: u32, voxel: UVec3) -> bool {
        self.is_occupied(cascade, encode_morton_3d(voxel.x, voxel.y, voxel.z))
    }

    /// Number of occupied voxels across all cascades.
    pub fn occupied_count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn cascades(&self) -> u32 {
        self.cascades
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// The packed words.
    pub fn words(&self) -> &[u32] {
        &self.bits
    }
}
