//! Procedural scenes with hand-built weights.
//!
//! The networks are wired so that, with a constant hash table, every sample
//! gets exactly the configured density and color:
//!
//! - density net: hidden unit 0 averages the embedding (1.0 for a table of
//!   ones) and the output layer scales it by `ln(sigma)` and by the logit of
//!   each color channel.
//! - color net: splits each color logit into positive and negative ReLU
//!   halves, carries them through, and recombines them before the sigmoid.
//!
//! Occupancy decides the shape. Optional noise perturbs the hash table so
//! density and color vary through space.

use glam::Vec3;
use ngp_math::CameraPose;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::assets::{AssetError, AssetResult, SceneAssets};
use crate::config::{HashGridConfig, ModelConfig, DIRECTION_ENCODING_WIDTH};
use crate::directions::PixelDirections;
use crate::hash_grid::HashGridTable;
use crate::network::{MlpTopology, MlpWeights};
use crate::occupancy::OccupancyGrid;

/// Occupied region of a synthetic scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticShape {
    /// Nothing is occupied
    Empty,
    /// Every voxel is occupied
    Full,
    /// Ball centered at the origin
    Sphere { radius: f32 },
    /// Axis-aligned cube centered at the origin
    Cube { half_extent: f32 },
}

impl SyntheticShape {
    fn contains(&self, p: Vec3) -> bool {
        match *self {
            SyntheticShape::Empty => false,
            SyntheticShape::Full => true,
            SyntheticShape::Sphere { radius } => p.length() <= radius,
            SyntheticShape::Cube { half_extent } => p.abs().max_element() <= half_extent,
        }
    }
}

/// Builder for a procedural scene.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    width: u32,
    height: u32,
    scale: f32,
    cascades: u32,
    grid_size: u32,
    hash: HashGridConfig,
    log2_table_size: u32,
    shape: SyntheticShape,
    sigma: f32,
    color: Vec3,
    noise: f32,
    seed: u64,
    eye: Vec3,
    fov_degrees: f32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticScene {
    pub fn new() -> Self {
        Self {
            width: 64,
            height: 64,
            scale: 0.5,
            cascades: 1,
            grid_size: 32,
            hash: HashGridConfig::default(),
            log2_table_size: 14,
            shape: SyntheticShape::Sphere { radius: 0.35 },
            sigma: 50.0,
            color: Vec3::new(0.8, 0.3, 0.2),
            noise: 0.0,
            seed: 7,
            eye: Vec3::new(0.0, 0.0, 2.0),
            fov_degrees: 40.0,
        }
    }

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

    /// Set the hash grid layout.
    pub fn with_hash(mut self, hash: HashGridConfig, log2_table_size: u32) -> Self {
        self.hash = hash;
        self.log2_table_size = log2_table_size;
        self
    }

    /// Set the occupied region.
    pub fn with_shape(mut self, shape: SyntheticShape) -> Self {
        self.shape = shape;
        self
    }

    /// Set the density and color every sample evaluates to.
    pub fn with_medium(mut self, sigma: f32, color: Vec3) -> Self {
        self.sigma = sigma;
        self.color = color;
        self
    }

    /// Perturb hash features by up to `amplitude` around 1.0.
    pub fn with_noise(mut self, amplitude: f32, seed: u64) -> Self {
        self.noise = amplitude;
        self.seed = seed;
        self
    }

    /// Set the camera position (always looking at the origin) and field of view.
    pub fn with_camera(mut self, eye: Vec3, fov_degrees: f32) -> Self {
        self.eye = eye;
        self.fov_degrees = fov_degrees;
        self
    }

    /// Build validated scene assets.
    pub fn build(&self) -> AssetResult<SceneAssets> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(AssetError::InvalidConfig(format!(
                "synthetic density {} must be positive",
                self.sigma
            )));
        }

        let config = ModelConfig::default()
            .with_resolution(self.width, self.height)
            .with_grid(self.cascades, self.grid_size)
            .with_scale(self.scale)
            .with_hash(self.hash.clone());
        config.validate()?;

        let mut hash_grid = HashGridTable::constant(config.hash.clone(), self.log2_table_size, 1.0)?;
        if self.noise > 0.0 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            for feature in hash_grid.features_mut() {
                *feature += rng.gen_range(-self.noise..=self.noise);
            }
        }

        let shape = self.shape;
        let occupancy = OccupancyGrid::from_world_fn(config.cascades, config.grid_size, config.scale, |p| {
            shape.contains(p)
        });

        let density_weights = self.density_weights(&config.density_network)?;
        let color_weights = self.color_weights(&config.color_network)?;

        let focal = PixelDirections::focal_from_fov(self.width, self.fov_degrees);
        let directions = PixelDirections::pinhole(self.width, self.height, focal);
        let pose = CameraPose::look_at(self.eye, Vec3::ZERO, Vec3::Y);

        log::debug!(
            "Built synthetic scene: {:?}, sigma {}, {} occupied voxels",
            self.shape,
            self.sigma,
            occupancy.occupied_count()
        );

        SceneAssets::new(
            "synthetic",
            config,
            hash_grid,
            occupancy,
            density_weights,
            color_weights,
            directions,
            pose,
        )
    }

    fn density_weights(&self, topology: &MlpTopology) -> AssetResult<MlpWeights> {
        if topology.layers.len() < 2 || topology.output_width() < 4 {
            return Err(AssetError::InvalidConfig(
                "synthetic density network needs a hidden layer and 4 outputs".into(),
            ));
        }
        let mut weights = MlpWeights::zeros(topology.clone())?;
        let last = weights.layer_count() - 1;

        // Hidden unit 0 carries the embedding mean through every hidden layer
        let first = topology.layers[0];
        for i in 0..first.inputs {
            weights.layer_mut(0)[i * first.outputs] = 1.0 / first.inputs as f32;
        }
        for layer in 1..last {
            weights.layer_mut(layer)[0] = 1.0;
        }

        let outputs = topology.layers[last].outputs;
        let out = weights.layer_mut(last);
        out[0] = self.sigma.ln();
        for c in 0..3 {
            out[1 + c] = logit(self.color[c]);
        }
        debug_assert!(outputs >= 4);
        Ok(weights)
    }

    fn color_weights(&self, topology: &MlpTopology) -> AssetResult<MlpWeights> {
        let hidden_ok = topology.layers[..topology.layers.len() - 1]
            .iter()
            .all(|l| l.outputs >= 6);
        if topology.layers.len() < 2 || !hidden_ok {
            return Err(AssetError::InvalidConfig(
                "synthetic color network needs hidden layers at least 6 wide".into(),
            ));
        }
        let mut weights = MlpWeights::zeros(topology.clone())?;
        let last = weights.layer_count() - 1;

        // Density feature k + 1 holds the logit of channel k
        let first = topology.layers[0];
        let w0 = weights.layer_mut(0);
        for c in 0..3 {
            let input = DIRECTION_ENCODING_WIDTH + 1 + c;
            w0[input * first.outputs + 2 * c] = 1.0;
            w0[input * first.outputs + 2 * c + 1] = -1.0;
        }
        for layer in 1..last {
            let outputs = topology.layers[layer].outputs;
            let w = weights.layer_mut(layer);
            for h in 0..6 {
                w[h * outputs + h] = 1.0;
            }
        }
        let outputs = topology.layers[last].outputs;
        let w = weights.layer_mut(last);
        for c in 0..3 {
            w[2 * c * outputs + c] = 1.0;
            w[(2 * c + 1) * outputs + c] = -1.0;
        }
        Ok(weights)
    }
}

fn logit(p: f32) -> f32 {
    let p = p.clamp(1e-4, 1.0 - 1e-4);
    (p / (1.0 - p)).ln()
}
