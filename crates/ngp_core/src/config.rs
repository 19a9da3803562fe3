//! Model configuration.
//!
//! Everything here is a property of the trained model or its output
//! resolution and is fixed for the lifetime of a rendering session.

use serde::{Deserialize, Serialize};

use crate::assets::{AssetError, AssetResult};
use crate::network::MlpTopology;

/// Number of spherical-harmonics values used to encode view directions.
pub const DIRECTION_ENCODING_WIDTH: usize = 16;

/// Multi-resolution hash grid parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashGridConfig {
    /// Number of resolution levels
    pub levels: u32,
    /// Feature values stored per table entry
    pub features_per_level: u32,
    /// Lattice resolution of the coarsest level
    pub base_resolution: f32,
    /// Lattice resolution of the finest level
    pub finest_resolution: f32,
}

impl Default for HashGridConfig {
    fn default() -> Self {
        Self {
            levels: 16,
            features_per_level: 2,
            base_resolution: 16.0,
            // 2048 * scale for the default 0.5 scene bound
            finest_resolution: 1024.0,
        }
    }
}

impl HashGridConfig {
    /// Geometric growth factor between consecutive levels.
    pub fn per_level_scale(&self) -> f32 {
        if self.levels <= 1 {
            return 1.0;
        }
        ((self.finest_resolution / self.base_resolution).log2() / (self.levels - 1) as f32).exp2()
    }

    /// Lattice scale and integer resolution of a level.
    ///
    /// Positions in `[0, 1]` map onto `[0.5, scale + 0.5]` lattice units.
    pub fn level_geometry(&self, level: u32) -> (f32, u32) {
        let scale = self.base_resolution * self.per_level_scale().powi(level as i32) - 1.0;
        let resolution = scale.ceil() as u32 + 1;
        (scale, resolution)
    }

    /// Width of the concatenated embedding.
    pub fn embedding_width(&self) -> usize {
        (self.levels * self.features_per_level) as usize
    }
}

/// Configuration of a trained scene and its output image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Output image width in pixels
    pub width: u32,
    /// Output image height in pixels
    pub height: u32,
    /// Half-extent of the scene bounding cube
    pub scale: f32,
    /// Occupancy grid cascade count
    pub cascades: u32,
    /// Occupancy grid voxels per axis (per cascade)
    pub grid_size: u32,
    /// Hash grid encoder parameters
    pub hash: HashGridConfig,
    /// Embedding -> (sigma, feature) network
    pub density_network: MlpTopology,
    /// (direction encoding, feature) -> RGB network
    pub color_network: MlpTopology,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            scale: 0.5,
            cascades: 1,
            grid_size: 128,
            hash: HashGridConfig::default(),
            density_network: MlpTopology::density_default(),
            color_network: MlpTopology::color_default(),
        }
    }
}

impl ModelConfig {
    /// Set image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set occupancy grid layout.
    pub fn with_grid(mut self, cascades: u32, grid_size: u32) -> Self {
        self.cascades = cascades;
        self.grid_size = grid_size;
        self
    }

    /// Set the scene bound half-extent.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Set hash grid parameters.
    pub fn with_hash(mut self, hash: HashGridConfig) -> Self {
        self.hash = hash;
        self
    }

    /// Fewest cascades whose coarsest level covers the scene bound.
    ///
    /// Cascade `c` spans half-extent `2^(c-1)`, so the top one must reach `scale`.
    pub fn required_cascades(scale: f32) -> u32 {
        let mut cascades = 1;
        while cascades < 32 && 0.5 * ((1u64 << (cascades - 1)) as f32) < scale {
            cascades += 1;
        }
        cascades
    }

    /// Number of rays per frame (one per pixel).
    pub fn ray_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Check that the configuration describes a renderable model.
    pub fn validate(&self) -> AssetResult<()> {
        let invalid = |msg: String| Err(AssetError::InvalidConfig(msg));

        if self.width == 0 || self.height == 0 {
            return invalid(format!("image size {}x{} is empty", self.width, self.height));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return invalid(format!("scene scale {} must be positive", self.scale));
        }
        if self.cascades == 0 {
            return invalid("at least one occupancy cascade is required".into());
        }
        let required = Self::required_cascades(self.scale);
        if self.cascades < required {
            return invalid(format!(
                "{} cascades cover half-extent {} but the scene bound is {} (needs {})",
                self.cascades,
                0.5 * (1u64 << (self.cascades - 1).min(31)) as f32,
                self.scale,
                required
            ));
        }
        // Morton codes are 10 bits per axis
        if !self.grid_size.is_power_of_two() || self.grid_size < 4 || self.grid_size > 1024 {
            return invalid(format!(
                "grid size {} must be a power of two in 4..=1024",
                self.grid_size
            ));
        }
        if self.hash.levels == 0 || self.hash.features_per_level == 0 {
            return invalid("hash grid needs at least one level and one feature".into());
        }
        if !(self.hash.base_resolution >= 1.0 && self.hash.finest_resolution >= self.hash.base_resolution) {
            return invalid(format!(
                "hash resolutions {}..{} are not increasing",
                self.hash.base_resolution, self.hash.finest_resolution
            ));
        }

        self.density_network.validate()?;
        self.color_network.validate()?;

        let embedding = self.hash.embedding_width();
        if self.density_network.input_width() != embedding {
            return invalid(format!(
                "density network takes {} inputs but the hash grid produces {}",
                self.density_network.input_width(),
                embedding
            ));
        }
        let color_inputs = DIRECTION_ENCODING_WIDTH + self.density_network.output_width();
        if self.color_network.input_width() != color_inputs {
            return invalid(format!(
                "color network takes {} inputs, expected {} (direction encoding + density feature)",
                self.color_network.input_width(),
                color_inputs
            ));
        }
        if self.color_network.output_width() < 3 {
            return invalid("color network must produce at least 3 outputs".into());
        }
        Ok(())
    }
}
