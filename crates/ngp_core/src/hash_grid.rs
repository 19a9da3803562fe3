//! Multi-resolution hash grid feature table.
//!
//! The table is a concatenation of per-level tables. Coarse levels whose full
//! lattice fits in the level's table are stored densely; finer levels are
//! indexed through a spatial hash. Both are addressed the same way: compute a
//! raw index for a lattice corner, wrap it by the level's table size and add
//! the level's offset.

use glam::UVec3;
use serde::{Deserialize, Serialize};

use crate::assets::{AssetError, AssetResult};
use crate::config::HashGridConfig;

/// Spatial hash primes for the y and z lattice coordinates (x uses 1).
const HASH_PRIME_Y: u32 = 2_654_435_761;
const HASH_PRIME_Z: u32 = 805_459_861;

/// Placement of one level inside the concatenated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLevel {
    /// First entry of this level
    pub offset: u32,
    /// Number of entries in this level
    pub table_size: u32,
    /// Dense lattice indexing instead of hashing
    pub dense: bool,
}

/// Spatial hash of a lattice corner.
#[inline]
pub fn hash_corner(corner: UVec3) -> u32 {
    corner.x ^ corner.y.wrapping_mul(HASH_PRIME_Y) ^ corner.z.wrapping_mul(HASH_PRIME_Z)
}

/// Row-major lattice index of a corner in a `resolution³` grid.
#[inline]
pub fn dense_corner(corner: UVec3, resolution: u32) -> u32 {
    corner
        .x
        .wrapping_add(corner.y.wrapping_mul(resolution))
        .wrapping_add(corner.z.wrapping_mul(resolution.wrapping_mul(resolution)))
}

/// Immutable hash grid: level layout plus the flat feature array.
#[derive(Debug, Clone)]
pub struct HashGridTable {
    config: HashGridConfig,
    levels: Vec<HashLevel>,
    features: Vec<f32>,
}

impl HashGridTable {
    /// Wrap a feature array and its level layout, checking they agree.
    pub fn new(config: HashGridConfig, levels: Vec<HashLevel>, features: Vec<f32>) -> AssetResult<Self> {
        if levels.len() != config.levels as usize {
            return Err(AssetError::SizeMismatch {
                what: "hash grid level metadata".into(),
                expected: config.levels as usize,
                actual: levels.len(),
            });
        }

        let width = config.features_per_level as usize;
        if features.len() % width != 0 {
            return Err(AssetError::InvalidConfig(format!(
                "hash table holds {} floats, not a multiple of {} features per entry",
                features.len(),
                width
            )));
        }

        let entries = features.len() / width;
        for (i, level) in levels.iter().enumerate() {
            let end = level.offset as usize + level.table_size as usize;
            if level.table_size == 0 || end > entries {
                return Err(AssetError::InvalidConfig(format!(
                    "hash level {} spans entries {}..{} but the table has {}",
                    i, level.offset, end, entries
                )));
            }
        }

        Ok(Self {
            config,
            levels,
            features,
        })
    }

    /// Level layout the trainer uses: a level is dense when its whole lattice
    /// fits in `2^log2_table_size` entries, otherwise hashed into that many.
    /// Sizes are rounded up to a multiple of 8.
    pub fn standard_levels(config: &HashGridConfig, log2_table_size: u32) -> Vec<HashLevel> {
        let max_entries = 1u64 << log2_table_size;
        let mut offset = 0u64;

        (0..config.levels)
            .map(|level| {
                let (_, resolution) = config.level_geometry(level);
                let lattice = (resolution as u64).pow(3);
                let dense = lattice <= max_entries;
                let table_size = lattice.min(max_entries).div_ceil(8) * 8;
                let entry = HashLevel {
                    offset: offset as u32,
                    table_size: table_size as u32,
                    dense,
                };
                offset += table_size;
                entry
            })
            .collect()
    }

    /// Total entries required by a level layout.
    pub fn entry_count(levels: &[HashLevel]) -> usize {
        levels
            .iter()
            .map(|l| l.offset as usize + l.table_size as usize)
            .max()
            .unwrap_or(0)
    }

    /// A table with every feature set to `value`.
    pub fn constant(config: HashGridConfig, log2_table_size: u32, value: f32) -> AssetResult<Self> {
        let levels = Self::standard_levels(&config, log2_table_size);
        let len = Self::entry_count(&levels) * config.features_per_level as usize;
        Self::new(config, levels, vec![value; len])
    }

    pub fn config(&self) -> &HashGridConfig {
        &self.config
    }

    pub fn levels(&self) -> &[HashLevel] {
        &self.levels
    }

    pub fn features_per_level(&self) -> usize {
        self.config.features_per_level as usize
    }

    /// The flat feature array.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Mutable feature array, for building tables by hand.
    pub fn features_mut(&mut self) -> &mut [f32] {
        &mut self.features
    }

    /// Absolute table entry of a lattice corner in `level`.
    #[inline]
    pub fn entry_index(&self, level: usize, corner: UVec3, resolution: u32) -> usize {
        let meta = self.levels[level];
        let raw = if meta.dense {
            dense_corner(corner, resolution)
        } else {
            hash_corner(corner)
        };
        meta.offset as usize + (raw % meta.table_size) as usize
    }

    /// Feature vector stored at an absolute entry.
    #[inline]
    pub fn entry(&self, index: usize) -> &[f32] {
        let width = self.features_per_level();
        &self.features[index * width..(index + 1) * width]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> HashGridConfig {
        HashGridConfig {
            levels: 4,
            features_per_level: 2,
            base_resolution: 4.0,
            finest_resolution: 32.0,
        }
    }

    #[test]
    fn test_standard_levels_dense_then_hashed() {
        let config = small_config();
        // 2^11 entries: 4³ and 8³ lattices fit, 16³ and 32³ do not
        let levels = HashGridTable::standard_levels(&config, 11);

        assert_eq!(levels.len(), 4);
        assert!(levels[0].dense);
        assert!(levels[1].dense);
        assert!(!levels[2].dense);
        assert!(!levels[3].dense);
        assert_eq!(levels[2].table_size, 1 << 11);

        // Levels are packed back to back
        for pair in levels.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].table_size);
        }
        assert!(levels.iter().all(|l| l.table_size % 8 == 0));
    }

    #[test]
    fn test_hash_corner_mixes_axes() {
        assert_eq!(hash_corner(UVec3::new(5, 0, 0)), 5);
        assert_ne!(hash_corner(UVec3::new(0, 1, 0)), hash_corner(UVec3::new(0, 0, 1)));
        assert_eq!(hash_corner(UVec3::new(0, 1, 0)), HASH_PRIME_Y);
    }

    #[test]
    fn test_dense_corner_row_major() {
        assert_eq!(dense_corner(UVec3::new(1, 2, 3), 10), 321);
    }

    #[test]
    fn test_entry_index_stays_in_level() {
        let table = HashGridTable::constant(small_config(), 12, 0.0).unwrap();
        for (level, meta) in table.levels().iter().enumerate() {
            let (_, res) = table.config().level_geometry(level as u32);
            for corner in [UVec3::ZERO, UVec3::splat(res), UVec3::new(123, 77, 9)] {
                let index = table.entry_index(level, corner, res);
                assert!(index >= meta.offset as usize);
                assert!(index < (meta.offset + meta.table_size) as usize);
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_level() {
        let config = HashGridConfig {
            levels: 1,
            ..small_config()
        };
        let levels = vec![HashLevel {
            offset: 4,
            table_size: 8,
            dense: true,
        }];
        assert!(HashGridTable::new(config, levels, vec![0.0; 16]).is_err());
    }

    #[test]
    fn test_rejects_wrong_level_count() {
        let levels = HashGridTable::standard_levels(&small_config(), 12);
        let len = HashGridTable::entry_count(&levels[..2]) * 2;
        let config = small_config();
        assert!(HashGridTable::new(config, levels[..2].to_vec(), vec![0.0; len]).is_err());
    }
}
