//! Per-frame orchestration.
//!
//! A frame runs the intersector once, then repeats rounds of
//! sample → compact → encode → density → color → composite → repartition
//! until no ray is alive or the per-ray sample budget is spent.

use std::time::{Duration, Instant};

use glam::Vec3;
use ngp_core::{AssetError, SceneAssets};
use ngp_math::CameraPose;
use thiserror::Error;

use crate::alive::AliveSet;
use crate::buffer::{Counter, FloatBuffer, IndexBuffer};
use crate::compaction::{self, padded_launch, Compaction, INVALID_SLOT};
use crate::compositor;
use crate::device::{ComputeDevice, CpuDevice, DeviceError};
use crate::encoder::{self, HashGridEncoder};
use crate::frame::Frame;
use crate::network;
use crate::rays::{self, RayBuffers};
use crate::sampler::{self, samples_per_round, MarchParams, SampleBuffers};

/// Errors that can occur while rendering.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Invalid render configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Render configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Upper bound on samples per ray in one round
    pub max_samples_per_round: usize,
    /// Rounds stop once this many samples per ray have been scheduled
    pub sample_budget: usize,
    /// Rays retire once transmittance falls to this value
    pub transmittance_threshold: f32,
    /// Network launches are padded to a multiple of this
    pub network_block_size: usize,
    /// Step growth with distance (0 = uniform steps)
    pub exp_step_factor: f32,
    /// Color behind the volume
    pub background: Vec3,
    /// Worker threads for the CPU device (None = one per core)
    pub threads: Option<usize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_samples_per_round: 64,
            sample_budget: 100,
            transmittance_threshold: 1e-4,
            network_block_size: 128,
            exp_step_factor: 0.0,
            background: Vec3::ZERO,
            threads: None,
        }
    }
}

impl RenderConfig {
    pub fn with_budget(mut self, sample_budget: usize, max_samples_per_round: usize) -> Self {
        self.sample_budget = sample_budget;
        self.max_samples_per_round = max_samples_per_round;
        self
    }

    pub fn with_threshold(mut self, transmittance_threshold: f32) -> Self {
        self.transmittance_threshold = transmittance_threshold;
        self
    }

    pub fn with_block_size(mut self, network_block_size: usize) -> Self {
        self.network_block_size = network_block_size;
        self
    }

    pub fn with_exp_step_factor(mut self, exp_step_factor: f32) -> Self {
        self.exp_step_factor = exp_step_factor;
        self
    }

    pub fn with_background(mut self, background: Vec3) -> Self {
        self.background = background;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> RenderResult<()> {
        if self.max_samples_per_round == 0 {
            return Err(RenderError::InvalidConfig("max_samples_per_round must be at least 1".into()));
        }
        if self.network_block_size == 0 {
            return Err(RenderError::InvalidConfig("network_block_size must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.transmittance_threshold) {
            return Err(RenderError::InvalidConfig(format!(
                "transmittance_threshold {} must lie in [0, 1)",
                self.transmittance_threshold
            )));
        }
        if !(self.exp_step_factor.is_finite() && self.exp_step_factor >= 0.0) {
            return Err(RenderError::InvalidConfig(format!(
                "exp_step_factor {} must be finite and non-negative",
                self.exp_step_factor
            )));
        }
        if self.threads == Some(0) {
            return Err(RenderError::InvalidConfig("thread count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Summary of one marching round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStats {
    /// Zero-based round index
    pub round: usize,
    /// Rays marched this round
    pub alive: usize,
    pub samples_per_ray: usize,
    pub valid_samples: usize,
    /// Network evaluations including padding
    pub launched: usize,
    /// Rays still alive after the round
    pub remaining: usize,
}

/// Summary of a whole frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub rounds: usize,
    /// Cumulative samples-per-ray scheduled across rounds
    pub samples_per_ray: usize,
    pub valid_samples: usize,
    /// Rays whose interval intersected the scene bound
    pub rays_hit: usize,
    /// Rays still alive when the frame ended
    pub alive_at_end: usize,
    /// The loop stopped on the sample budget with rays still alive
    pub budget_exhausted: bool,
    pub elapsed: Duration,
}

/// What a call to [`FrameSession::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Continue(RoundStats),
    Finished,
}

/// Device buffers reused across frames.
struct FrameBuffers {
    rays: RayBuffers,
    alive: AliveSet,
    samples: SampleBuffers,
    launch: IndexBuffer,
    launch_counter: Counter,
    embedding: FloatBuffer,
    features: FloatBuffer,
    sigmas: FloatBuffer,
    rgbs: FloatBuffer,
}

impl FrameBuffers {
    fn new(assets: &SceneAssets, config: &RenderConfig) -> Self {
        let n_rays = assets.config.ray_count();
        let launch_capacity = padded_launch(n_rays, config.network_block_size);
        let embed_width = assets.config.hash.embedding_width();
        let feature_width = assets.density_weights.topology().output_width();

        Self {
            rays: RayBuffers::new(n_rays),
            alive: AliveSet::new(n_rays),
            samples: SampleBuffers::new(n_rays),
            launch: IndexBuffer::new(launch_capacity, INVALID_SLOT),
            launch_counter: Counter::new(),
            embedding: FloatBuffer::new(launch_capacity * embed_width),
            features: FloatBuffer::new(launch_capacity * feature_width),
            sigmas: FloatBuffer::new(n_rays),
            rgbs: FloatBuffer::new(n_rays * 3),
        }
    }
}

/// Renders frames of one scene on one compute device.
pub struct Renderer {
    assets: SceneAssets,
    config: RenderConfig,
    device: Box<dyn ComputeDevice>,
    encoder: HashGridEncoder,
    params: MarchParams,
    buffers: FrameBuffers,
}

impl Renderer {
    /// Create a renderer, allocating every per-frame buffer up front.
    pub fn new(assets: SceneAssets, config: RenderConfig, device: Box<dyn ComputeDevice>) -> RenderResult<Self> {
        config.validate()?;
        assets.config.validate()?;

        let encoder = HashGridEncoder::new(assets.hash_grid.clone(), assets.config.scale);
        let params = MarchParams::new(&assets.config, config.exp_step_factor);
        let buffers = FrameBuffers::new(&assets, &config);

        log::info!(
            "Renderer for '{}' on {} device: {}x{} rays, {} cascades of {}³",
            assets.name,
            device.name(),
            assets.config.width,
            assets.config.height,
            assets.config.cascades,
            assets.config.grid_size
        );

        Ok(Self {
            assets,
            config,
            device,
            encoder,
            params,
            buffers,
        })
    }

    /// Create a renderer on a CPU device sized by `config.threads`.
    pub fn with_cpu(assets: SceneAssets, config: RenderConfig) -> RenderResult<Self> {
        let device = CpuDevice::new(config.threads)?;
        Self::new(assets, config, Box::new(device))
    }

    pub fn assets(&self) -> &SceneAssets {
        &self.assets
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render a full frame from `pose`.
    pub fn render_frame(&mut self, pose: &CameraPose) -> RenderResult<(Frame, FrameStats)> {
        let mut session = self.begin_frame(pose)?;
        while let RoundOutcome::Continue(_) = session.step()? {}
        Ok(session.finish())
    }

    /// Render a full frame from the pose shipped with the scene.
    pub fn render_default(&mut self) -> RenderResult<(Frame, FrameStats)> {
        let pose = self.assets.pose;
        self.render_frame(&pose)
    }

    /// Reset per-ray state, intersect every ray and build the alive set.
    pub fn begin_frame(&mut self, pose: &CameraPose) -> RenderResult<FrameSession<'_>> {
        let start = Instant::now();
        let device = self.device.as_ref();
        let buffers = &mut self.buffers;

        buffers.rays.reset();
        rays::intersect(
            device,
            &buffers.rays,
            pose,
            &self.assets.directions,
            self.assets.config.scale,
        )?;
        let rays_hit = buffers.alive.rebuild(device, &buffers.rays)?;
        device.wait()?;

        log::debug!("Frame start: {} of {} rays hit the scene bound", rays_hit, buffers.rays.len());

        Ok(FrameSession {
            renderer: self,
            start,
            stats: FrameStats {
                rays_hit,
                ..FrameStats::default()
            },
            done: false,
        })
    }

    fn run_round(&mut self, round: usize, n_samples: usize) -> RenderResult<RoundStats> {
        let device = self.device.as_ref();
        let b = &mut self.buffers;
        let n_alive = b.alive.count();

        sampler::sample(
            device,
            &b.alive,
            &b.rays,
            &self.assets.occupancy,
            &self.params,
            n_samples,
            &b.samples,
        )?;
        let compaction: Compaction = compaction::compact(
            device,
            &b.samples.valid,
            n_alive * n_samples,
            &b.launch_counter,
            &b.launch,
            self.config.network_block_size,
        )?;
        encoder::encode(
            device,
            &self.encoder,
            &b.launch,
            compaction,
            &b.samples.positions,
            &b.embedding,
        )?;
        network::run_density(
            device,
            &self.assets.density_weights,
            &b.launch,
            compaction,
            &b.embedding,
            &b.features,
            &b.sigmas,
        )?;
        network::run_color(
            device,
            &self.assets.color_weights,
            &b.launch,
            compaction,
            &b.features,
            &b.samples.directions,
            &b.rgbs,
        )?;
        compositor::composite(
            device,
            &b.alive,
            &b.rays,
            &b.samples,
            &b.sigmas,
            &b.rgbs,
            n_samples,
            self.config.transmittance_threshold,
        )?;
        let remaining = b.alive.repartition(device)?;
        device.wait()?;

        Ok(RoundStats {
            round,
            alive: n_alive,
            samples_per_ray: n_samples,
            valid_samples: compaction.valid_count,
            launched: compaction.launch_count,
            remaining,
        })
    }
}

/// A frame in progress, advanced one round at a time.
pub struct FrameSession<'a> {
    renderer: &'a mut Renderer,
    start: Instant,
    stats: FrameStats,
    done: bool,
}

impl FrameSession<'_> {
    /// Run one round, or report that the frame is complete.
    pub fn step(&mut self) -> RenderResult<RoundOutcome> {
        if self.done {
            return Ok(RoundOutcome::Finished);
        }

        let n_alive = self.renderer.buffers.alive.count();
        let config = &self.renderer.config;

        if self.stats.samples_per_ray >= config.sample_budget {
            if n_alive > 0 {
                self.stats.budget_exhausted = true;
                log::warn!(
                    "Sample budget of {} exhausted with {} rays still alive",
                    config.sample_budget,
                    n_alive
                );
            }
            self.done = true;
            return Ok(RoundOutcome::Finished);
        }
        if n_alive == 0 {
            self.done = true;
            return Ok(RoundOutcome::Finished);
        }

        let n_rays = self.renderer.buffers.rays.len();
        let n_samples = samples_per_round(n_rays, n_alive, config.max_samples_per_round);
        self.stats.samples_per_ray += n_samples;

        let round = match self.renderer.run_round(self.stats.rounds, n_samples) {
            Ok(round) => round,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };
        self.stats.rounds += 1;
        self.stats.valid_samples += round.valid_samples;

        log::debug!(
            "Round {}: samples {}, alive {}, samples/ray {}, valid {}, remaining {}",
            round.round,
            self.stats.samples_per_ray,
            round.alive,
            round.samples_per_ray,
            round.valid_samples,
            round.remaining
        );

        Ok(RoundOutcome::Continue(round))
    }

    /// Rays still being marched.
    pub fn alive_count(&self) -> usize {
        self.renderer.buffers.alive.count()
    }

    /// Current accumulated opacity per ray.
    pub fn opacity(&self) -> Vec<f32> {
        self.renderer.buffers.rays.opacity.to_vec()
    }

    /// Current accumulated color per ray, without background.
    pub fn rgb(&self) -> Vec<Vec3> {
        let rays = &self.renderer.buffers.rays;
        (0..rays.len()).map(|r| rays.rgb.get_vec3(r)).collect()
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Composite over the background and read the frame back.
    pub fn finish(self) -> (Frame, FrameStats) {
        let renderer = self.renderer;
        let rays = &renderer.buffers.rays;
        let background = renderer.config.background;
        let config = &renderer.assets.config;

        let mut frame = Frame::filled(config.width, config.height, background);
        for r in 0..rays.len() {
            let opacity = rays.opacity.get(r);
            frame.pixels[r] = rays.rgb.get_vec3(r) + (1.0 - opacity) * background;
            frame.opacity[r] = opacity;
            frame.depth[r] = rays.depth.get(r);
        }

        let mut stats = self.stats;
        stats.alive_at_end = renderer.buffers.alive.count();
        stats.elapsed = self.start.elapsed();

        log::info!(
            "Frame done in {:.1?}: {} rounds, {} samples/ray, {} valid samples, {} of {} rays hit",
            stats.elapsed,
            stats.rounds,
            stats.samples_per_ray,
            stats.valid_samples,
            stats.rays_hit,
            rays.len()
        );

        (frame, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceResult, SerialDevice};
    use ngp_core::{SyntheticScene, SyntheticShape};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn scene(shape: SyntheticShape) -> SyntheticScene {
        SyntheticScene::new().with_resolution(16, 16).with_shape(shape)
    }

    /// Narrow view where every ray crosses the whole bound.
    fn close_up(shape: SyntheticShape) -> SyntheticScene {
        scene(shape).with_camera(Vec3::new(0.0, 0.0, 2.0), 10.0)
    }

    fn serial(assets: SceneAssets, config: RenderConfig) -> Renderer {
        Renderer::new(assets, config, Box::new(SerialDevice)).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(RenderConfig::default().validate().is_ok());
        assert!(RenderConfig::default().with_block_size(0).validate().is_err());
        assert!(RenderConfig::default().with_threshold(1.0).validate().is_err());
        assert!(RenderConfig::default().with_budget(100, 0).validate().is_err());
        assert!(RenderConfig::default().with_exp_step_factor(-1.0).validate().is_err());
        assert!(RenderConfig::default().with_threads(Some(0)).validate().is_err());
    }

    #[test]
    fn test_empty_grid_finishes_after_one_round() {
        init_logger();
        let assets = close_up(SyntheticShape::Empty).build().unwrap();
        let background = Vec3::new(0.1, 0.2, 0.3);
        let mut renderer = serial(assets, RenderConfig::default().with_background(background));
        let pose = renderer.assets().pose;

        let mut session = renderer.begin_frame(&pose).unwrap();
        assert_eq!(session.alive_count(), 256);

        let RoundOutcome::Continue(round) = session.step().unwrap() else {
            panic!("expected one round");
        };
        assert_eq!(round.valid_samples, 0);
        assert_eq!(round.launched, 0);
        assert_eq!(round.remaining, 0);
        assert_eq!(session.alive_count(), 0);
        assert_eq!(session.step().unwrap(), RoundOutcome::Finished);

        let (frame, stats) = session.finish();
        assert_eq!(stats.rounds, 1);
        assert!(!stats.budget_exhausted);
        assert!(frame.opacity.iter().all(|&o| o == 0.0));
        assert!(frame.pixels.iter().all(|&p| p == background));
    }

    #[test]
    fn test_uniform_density_saturates() {
        init_logger();
        let assets = close_up(SyntheticShape::Full)
            .with_medium(1000.0, Vec3::new(0.2, 0.6, 0.4))
            .build()
            .unwrap();
        let mut renderer = serial(assets, RenderConfig::default());

        let (frame, stats) = renderer.render_default().unwrap();

        assert_eq!(stats.rays_hit, 256);
        assert_eq!(stats.alive_at_end, 0);
        assert!(!stats.budget_exhausted);
        // sigma * dt ≈ 1.7 per step, so a handful of steps reach 1e-4
        assert!(stats.rounds <= 10, "took {} rounds", stats.rounds);
        assert!(frame.opacity.iter().all(|&o| o > 1.0 - 1e-4 && o <= 1.0));
        for p in &frame.pixels {
            assert!((*p - Vec3::new(0.2, 0.6, 0.4)).abs().max_element() < 1e-3);
        }
    }

    #[test]
    fn test_opacity_monotonic_and_bounded() {
        init_logger();
        let assets = scene(SyntheticShape::Sphere { radius: 0.4 })
            .with_noise(0.3, 5)
            .build()
            .unwrap();
        let mut renderer = serial(assets, RenderConfig::default());
        let pose = renderer.assets().pose;
        let mut session = renderer.begin_frame(&pose).unwrap();

        let mut previous = session.opacity();
        while let RoundOutcome::Continue(_) = session.step().unwrap() {
            let current = session.opacity();
            for (before, after) in previous.iter().zip(&current) {
                assert!(after >= before);
                assert!((0.0..=1.0).contains(after));
            }
            previous = current;
        }
        assert!(previous.iter().any(|&o| o > 0.5));
    }

    #[test]
    fn test_missed_rays_show_background() {
        let assets = SyntheticScene::new()
            .with_resolution(24, 24)
            .with_camera(Vec3::new(0.0, 0.0, 2.0), 60.0)
            .build()
            .unwrap();
        let background = Vec3::new(0.0, 1.0, 0.0);
        let mut renderer = serial(assets, RenderConfig::default().with_background(background));

        let (frame, stats) = renderer.render_default().unwrap();

        assert!(stats.rays_hit < 24 * 24);
        // Corners look past the bound
        for (x, y) in [(0, 0), (23, 0), (0, 23), (23, 23)] {
            assert_eq!(frame.get(x, y), background);
            assert_eq!(frame.depth[(y * 24 + x) as usize], 0.0);
        }
        // The center sees the sphere
        assert!(frame.opacity[12 * 24 + 12] > 0.9);
    }

    #[test]
    fn test_center_pixel_shows_medium_color() {
        let color = Vec3::new(0.9, 0.1, 0.5);
        let assets = scene(SyntheticShape::Sphere { radius: 0.3 })
            .with_medium(400.0, color)
            .build()
            .unwrap();
        let mut renderer = serial(assets, RenderConfig::default());

        let (frame, _) = renderer.render_default().unwrap();
        let center = frame.get(8, 8);
        assert!((center - color).abs().max_element() < 1e-2, "center is {:?}", center);
        // Sphere front surface sits 1.7 from the camera
        let depth = frame.depth[8 * 16 + 8];
        assert!(depth > 1.65 && depth < 1.8, "depth {}", depth);
    }

    /// Sphere of radius 0.6 inside a bound of half-extent 2, so samples span
    /// cascades 0 and 1 and the bound reaches cascade 2.
    fn wide_bound_sphere() -> SceneAssets {
        SyntheticScene::new()
            .with_resolution(32, 32)
            .with_scale(2.0)
            .with_grid(3, 32)
            .with_shape(SyntheticShape::Sphere { radius: 0.6 })
            .with_camera(Vec3::new(0.0, 0.0, 6.0), 40.0)
            .build()
            .unwrap()
    }

    fn covered_pixels(frame: &Frame) -> usize {
        frame.opacity.iter().filter(|&&o| o > 0.5).count()
    }

    #[test]
    fn test_wide_bound_renders_sphere_across_cascades() {
        init_logger();
        let mut renderer = serial(wide_bound_sphere(), RenderConfig::default());

        let (frame, stats) = renderer.render_default().unwrap();

        assert_eq!(stats.rays_hit, 32 * 32);
        // Projected radius is about 4.5 pixels
        let covered = covered_pixels(&frame);
        assert!(covered > 30 && covered < 120, "{} pixels covered", covered);
        assert!(frame.opacity[16 * 32 + 16] > 0.99);
        for (x, y) in [(0, 0), (31, 0), (0, 31), (31, 31), (4, 16), (16, 4)] {
            assert_eq!(frame.opacity[(y * 32 + x) as usize], 0.0, "pixel ({}, {})", x, y);
        }
    }

    #[test]
    fn test_growing_steps_use_coarse_cascade() {
        init_logger();
        let exp_step_factor = 1.0 / 128.0;
        let mut renderer = serial(
            wide_bound_sphere(),
            RenderConfig::default().with_exp_step_factor(exp_step_factor),
        );

        let params = MarchParams::new(&renderer.assets().config, exp_step_factor);
        // Near the sphere the step outgrows a cascade 0 voxel
        assert_eq!(params.cascade(Vec3::ZERO, params.step_size(5.4)), 1);

        let (frame, stats) = renderer.render_default().unwrap();

        assert_eq!(stats.alive_at_end, 0);
        let covered = covered_pixels(&frame);
        assert!(covered > 30 && covered < 120, "{} pixels covered", covered);
        assert!(frame.opacity[16 * 32 + 16] > 0.99);
        assert_eq!(frame.opacity[0], 0.0);
    }

    #[test]
    fn test_block_size_does_not_change_image() {
        let build = || {
            scene(SyntheticShape::Sphere { radius: 0.4 })
                .with_noise(0.2, 9)
                .build()
                .unwrap()
        };
        let mut unpadded = Renderer::with_cpu(
            build(),
            RenderConfig::default().with_block_size(1).with_threads(Some(3)),
        )
        .unwrap();
        let mut padded = Renderer::with_cpu(
            build(),
            RenderConfig::default().with_block_size(128).with_threads(Some(3)),
        )
        .unwrap();

        let (a, stats_a) = unpadded.render_default().unwrap();
        let (b, stats_b) = padded.render_default().unwrap();

        assert_eq!(a.pixels, b.pixels);
        assert_eq!(a.opacity, b.opacity);
        assert_eq!(stats_a.rounds, stats_b.rounds);
        assert_eq!(stats_a.valid_samples, stats_b.valid_samples);
    }

    #[test]
    fn test_cpu_matches_serial() {
        let build = || scene(SyntheticShape::Sphere { radius: 0.35 }).build().unwrap();
        let mut cpu = Renderer::with_cpu(build(), RenderConfig::default().with_threads(Some(4))).unwrap();
        let mut single = serial(build(), RenderConfig::default());

        let (a, _) = cpu.render_default().unwrap();
        let (b, _) = single.render_default().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_budget_keeps_partial_accumulation() {
        let assets = close_up(SyntheticShape::Full)
            .with_medium(2.0, Vec3::ONE)
            .build()
            .unwrap();
        let background = Vec3::new(0.0, 0.0, 1.0);
        let config = RenderConfig::default()
            .with_budget(1, 64)
            .with_background(background);
        let mut renderer = serial(assets, config);

        let (frame, stats) = renderer.render_default().unwrap();

        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.samples_per_ray, 1);
        assert!(stats.budget_exhausted);
        assert_eq!(stats.alive_at_end, 256);
        for (p, &o) in frame.pixels.iter().zip(&frame.opacity) {
            assert!(o > 0.0 && o < 0.01);
            let expected = Vec3::new(o, o, o) + (1.0 - o) * background;
            assert!((*p - expected).abs().max_element() < 1e-5);
        }
    }

    #[test]
    fn test_frames_are_repeatable() {
        let assets = scene(SyntheticShape::Cube { half_extent: 0.25 }).build().unwrap();
        let mut renderer = serial(assets, RenderConfig::default());
        let (first, _) = renderer.render_default().unwrap();
        let (second, _) = renderer.render_default().unwrap();
        assert_eq!(first, second);
    }

    /// Serial device whose chosen stage panics until disarmed.
    struct FaultyDevice {
        stage: &'static str,
        armed: AtomicBool,
    }

    impl ComputeDevice for FaultyDevice {
        fn name(&self) -> &str {
            "faulty"
        }

        fn dispatch(&self, stage: &'static str, count: usize, kernel: &(dyn Fn(usize) + Sync)) -> DeviceResult<()> {
            if stage == self.stage && count > 0 && self.armed.swap(false, Ordering::Relaxed) {
                return SerialDevice.dispatch(stage, count, &|_| panic!("injected fault"));
            }
            SerialDevice.dispatch(stage, count, kernel)
        }
    }

    #[test]
    fn test_kernel_failure_fails_frame_then_recovers() {
        init_logger();
        let build = || scene(SyntheticShape::Sphere { radius: 0.35 }).build().unwrap();
        let device = FaultyDevice {
            stage: "color",
            armed: AtomicBool::new(true),
        };
        let mut renderer = Renderer::new(build(), RenderConfig::default(), Box::new(device)).unwrap();
        let mut reference = serial(build(), RenderConfig::default());

        let result = renderer.render_default();
        assert!(matches!(
            result,
            Err(RenderError::Device(DeviceError::KernelFailed { stage: "color" }))
        ));

        let (frame, _) = renderer.render_default().unwrap();
        let (expected, _) = reference.render_default().unwrap();
        assert_eq!(frame, expected);
    }
}
