//! NGP Core - Frozen scene representation for hash-grid radiance fields.
//!
//! This crate provides:
//!
//! - **Model configuration**: `ModelConfig`, `HashGridConfig`
//! - **Scene resources**: `HashGridTable`, `OccupancyGrid`, `MlpWeights`,
//!   `PixelDirections`
//! - **Asset loading**: `SceneAssets::load` for a manifest + binary blob directory
//! - **Synthetic scenes**: `SyntheticScene` for demos and tests
//!
//! All resources are immutable once built and shared behind `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use ngp_core::SceneAssets;
//!
//! let assets = SceneAssets::load("scenes/lego")?;
//! println!("{}x{} image, {} hash levels",
//!     assets.config.width,
//!     assets.config.height,
//!     assets.hash_grid.levels().len());
//! ```

pub mod assets;
pub mod config;
pub mod directions;
pub mod hash_grid;
pub mod network;
pub mod occupancy;
pub mod synthetic;

// Re-export commonly used types
pub use assets::{AssetError, AssetResult, SceneAssets};
pub use config::{HashGridConfig, ModelConfig};
pub use directions::PixelDirections;
pub use hash_grid::{HashGridTable, HashLevel};
pub use network::{LayerShape, MlpTopology, MlpWeights, MAX_LAYER_WIDTH};
pub use occupancy::OccupancyGrid;
pub use synthetic::{SyntheticScene, SyntheticShape};
