//! NGP Renderer - round-based ray marching for hash-grid radiance fields.
//!
//! A frame runs the intersector once and then marches every alive ray in
//! rounds. Each round samples the occupancy grid, compacts the valid samples,
//! evaluates the hash encoding and both networks, composites front to back
//! and drops finished rays from the alive set.
//!
//! Stages run as kernels on a [`ComputeDevice`]; [`CpuDevice`] spreads them
//! over a rayon pool.
//!
//! # Example
//!
//! ```ignore
//! use ngp_core::SceneAssets;
//! use ngp_renderer::{RenderConfig, Renderer};
//!
//! let assets = SceneAssets::load("scenes/lego")?;
//! let mut renderer = Renderer::with_cpu(assets, RenderConfig::default())?;
//! let (frame, stats) = renderer.render_default()?;
//! ```

pub mod alive;
pub mod buffer;
pub mod compaction;
pub mod compositor;
pub mod device;
pub mod encoder;
pub mod frame;
pub mod network;
pub mod rays;
pub mod renderer;
pub mod sampler;

pub use alive::{AliveSet, RETIRED};
pub use compaction::{Compaction, INVALID_SLOT};
pub use compositor::{RayAccumulator, ShadedSample};
pub use device::{ComputeDevice, CpuDevice, DeviceError, DeviceResult, SerialDevice};
pub use encoder::HashGridEncoder;
pub use frame::{Frame, FrameSink, MemorySink};
pub use rays::NEAR_DISTANCE;
pub use renderer::{
    FrameSession, FrameStats, RenderConfig, RenderError, RenderResult, Renderer, RoundOutcome, RoundStats,
};
pub use sampler::{samples_per_round, MarchParams};

/// Re-export math types from ngp_math
pub use ngp_math::{CameraPose, Vec3};
