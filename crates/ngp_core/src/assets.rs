//! Scene asset loading.
//!
//! A scene directory holds a `scene.json` manifest plus little-endian binary
//! blobs for the hash table, network weights, occupancy bitfield and
//! (optionally) the pixel direction table and camera pose:
//!
//! ```text
//! scene/
//!   scene.json            ModelConfig, hash level layout, file names
//!   hash_embedding.bin    f32 features, levels back to back
//!   sigma_weights.bin     f32 density network weights
//!   rgb_weights.bin       f32 color network weights
//!   density_bitfield.bin  u32 occupancy words
//!   directions.bin        f32 xyz per pixel (omitted when `focal` is given)
//!   pose.bin              f32 3x4 row-major (omitted when `pose` is inline)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ngp_math::CameraPose;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::directions::PixelDirections;
use crate::hash_grid::{HashGridTable, HashLevel};
use crate::network::MlpWeights;
use crate::occupancy::OccupancyGrid;

/// File name of the manifest inside a scene directory.
pub const MANIFEST_FILE: &str = "scene.json";

/// Errors that can occur while loading or validating scene assets.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{what}: expected {expected} values, found {actual}")]
    SizeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: {len} bytes is not a whole number of 4-byte values")]
    Misaligned { path: PathBuf, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;

/// Blob file names inside a scene directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetFiles {
    pub hash_table: String,
    pub density_weights: String,
    pub color_weights: String,
    pub density_bitfield: String,
    pub directions: String,
    pub pose: String,
}

impl Default for AssetFiles {
    fn default() -> Self {
        Self {
            hash_table: "hash_embedding.bin".into(),
            density_weights: "sigma_weights.bin".into(),
            color_weights: "rgb_weights.bin".into(),
            density_bitfield: "density_bitfield.bin".into(),
            directions: "directions.bin".into(),
            pose: "pose.bin".into(),
        }
    }
}

/// Contents of `scene.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneManifest {
    #[serde(default)]
    pub name: String,
    pub model: ModelConfig,
    pub hash_levels: Vec<HashLevel>,
    #[serde(default)]
    pub files: AssetFiles,
    /// Pinhole focal length in pixels; replaces the direction table when set
    #[serde(default)]
    pub focal: Option<f32>,
    /// Inline 3x4 row-major pose; replaces the pose file when set
    #[serde(default)]
    pub pose: Option<[f32; 12]>,
}

/// Everything a rendering session needs, validated against one `ModelConfig`.
#[derive(Debug, Clone)]
pub struct SceneAssets {
    pub name: String,
    pub config: ModelConfig,
    pub hash_grid: Arc<HashGridTable>,
    pub occupancy: Arc<OccupancyGrid>,
    pub density_weights: Arc<MlpWeights>,
    pub color_weights: Arc<MlpWeights>,
    pub directions: Arc<PixelDirections>,
    /// Default camera pose shipped with the scene
    pub pose: CameraPose,
}

impl SceneAssets {
    /// Assemble assets, checking every resource matches the configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        config: ModelConfig,
        hash_grid: HashGridTable,
        occupancy: OccupancyGrid,
        density_weights: MlpWeights,
        color_weights: MlpWeights,
        directions: PixelDirections,
        pose: CameraPose,
    ) -> AssetResult<Self> {
        config.validate()?;

        if hash_grid.config() != &config.hash {
            return Err(AssetError::InvalidConfig(
                "hash grid parameters differ from the model configuration".into(),
            ));
        }
        if occupancy.cascades() != config.cascades || occupancy.grid_size() != config.grid_size {
            return Err(AssetError::InvalidConfig(format!(
                "occupancy grid is {} x {}³ but the model expects {} x {}³",
                occupancy.cascades(),
                occupancy.grid_size(),
                config.cascades,
                config.grid_size
            )));
        }
        if density_weights.topology() != &config.density_network {
            return Err(AssetError::InvalidConfig("density weights have the wrong topology".into()));
        }
        if color_weights.topology() != &config.color_network {
            return Err(AssetError::InvalidConfig("color weights have the wrong topology".into()));
        }
        if directions.width() != config.width || directions.height() != config.height {
            return Err(AssetError::InvalidConfig(format!(
                "direction table is {}x{} but the image is {}x{}",
                directions.width(),
                directions.height(),
                config.width,
                config.height
            )));
        }

        Ok(Self {
            name: name.into(),
            config,
            hash_grid: Arc::new(hash_grid),
            occupancy: Arc::new(occupancy),
            density_weights: Arc::new(density_weights),
            color_weights: Arc::new(color_weights),
            directions: Arc::new(directions),
            pose,
        })
    }

    /// Load a scene directory.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let assets = SceneAssets::load("scenes/lego")?;
    /// ```
    pub fn load<P: AsRef<Path>>(dir: P) -> AssetResult<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&manifest_path).map_err(|source| AssetError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest: SceneManifest = serde_json::from_str(&text)?;
        Self::from_manifest(dir, manifest)
    }

    /// Load the blobs a manifest names, relative to `dir`.
    pub fn from_manifest(dir: &Path, manifest: SceneManifest) -> AssetResult<Self> {
        let config = manifest.model;
        config.validate()?;
        let files = &manifest.files;

        let features = read_f32_blob(&dir.join(&files.hash_table))?;
        let hash_grid = HashGridTable::new(config.hash.clone(), manifest.hash_levels, features)?;

        let bits = read_u32_blob(&dir.join(&files.density_bitfield))?;
        let occupancy = OccupancyGrid::new(config.cascades, config.grid_size, bits)?;

        let density = read_f32_blob(&dir.join(&files.density_weights))?;
        let density_weights = MlpWeights::new(config.density_network.clone(), density)?;

        let color = read_f32_blob(&dir.join(&files.color_weights))?;
        let color_weights = MlpWeights::new(config.color_network.clone(), color)?;

        let directions = match manifest.focal {
            Some(focal) => PixelDirections::pinhole(config.width, config.height, focal),
            None => {
                let flat = read_f32_blob(&dir.join(&files.directions))?;
                PixelDirections::from_flat(config.width, config.height, &flat)?
            }
        };

        let pose = match manifest.pose {
            Some(m) => CameraPose::from_row_major(&m),
            None => {
                let flat = read_f32_blob(&dir.join(&files.pose))?;
                let m: [f32; 12] = flat.as_slice().try_into().map_err(|_| AssetError::SizeMismatch {
                    what: "camera pose".into(),
                    expected: 12,
                    actual: flat.len(),
                })?;
                CameraPose::from_row_major(&m)
            }
        };

        let name = if manifest.name.is_empty() {
            dir.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unnamed")
                .to_string()
        } else {
            manifest.name
        };

        let assets = Self::new(
            name,
            config,
            hash_grid,
            occupancy,
            density_weights,
            color_weights,
            directions,
            pose,
        )?;

        log::info!(
            "Loaded scene '{}': {}x{}, {} hash entries, {} occupied voxels",
            assets.name,
            assets.config.width,
            assets.config.height,
            HashGridTable::entry_count(assets.hash_grid.levels()),
            assets.occupancy.occupied_count()
        );

        Ok(assets)
    }

    /// Write this scene as a directory `load` can read back.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> AssetResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| AssetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let files = AssetFiles::default();
        write_f32_blob(&dir.join(&files.hash_table), self.hash_grid.features())?;
        write_f32_blob(&dir.join(&files.density_weights), self.density_weights.as_slice())?;
        write_f32_blob(&dir.join(&files.color_weights), self.color_weights.as_slice())?;
        write_u32_blob(&dir.join(&files.density_bitfield), self.occupancy.words())?;
        write_f32_blob(&dir.join(&files.directions), &self.directions.to_flat())?;

        let manifest = SceneManifest {
            name: self.name.clone(),
            model: self.config.clone(),
            hash_levels: self.hash_grid.levels().to_vec(),
            files,
            focal: None,
            pose: Some(self.pose.to_row_major()),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(&manifest)?;
        fs::write(&manifest_path, text).map_err(|source| AssetError::Io {
            path: manifest_path,
            source,
        })?;

        log::info!("Saved scene '{}' to {}", self.name, dir.display());
        Ok(())
    }
}

fn read_blob(path: &Path) -> AssetResult<Vec<u8>> {
    let bytes = fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() % 4 != 0 {
        return Err(AssetError::Misaligned {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Read a little-endian `f32` blob.
pub fn read_f32_blob(path: &Path) -> AssetResult<Vec<f32>> {
    let bytes = read_blob(path)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Read a little-endian `u32` blob.
pub fn read_u32_blob(path: &Path) -> AssetResult<Vec<u32>> {
    let bytes = read_blob(path)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_blob(path: &Path, bytes: Vec<u8>) -> AssetResult<()> {
    fs::write(path, bytes).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a little-endian `f32` blob.
pub fn write_f32_blob(path: &Path, values: &[f32]) -> AssetResult<()> {
    write_blob(path, values.iter().flat_map(|v| v.to_le_bytes()).collect())
}

/// Write a little-endian `u32` blob.
pub fn write_u32_blob(path: &Path, values: &[u32]) -> AssetResult<()> {
    write_blob(path, values.iter().flat_map(|v| v.to_le_bytes()).collect())
}
