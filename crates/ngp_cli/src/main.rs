//! ngp-render: render frames of a frozen hash-grid radiance field
//!
//! Usage:
//!   ngp-render path/to/scene --out render.png
//!   ngp-render --synthetic --width 256 --height 256 --out sphere.png
//!   ngp-render path/to/scene --frames 36 --out orbit.png

mod sink;

use std::f32::consts::TAU;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ngp_core::{SceneAssets, SyntheticScene};
use ngp_math::{CameraPose, Mat3, Vec3};
use ngp_renderer::{FrameSink, RenderConfig, Renderer};

use sink::PngSink;

/// Command-line options.
#[derive(Debug, Clone, PartialEq)]
struct Options {
    scene: Option<PathBuf>,
    synthetic: bool,
    width: u32,
    height: u32,
    out: PathBuf,
    frames: usize,
    threads: Option<usize>,
    background: Vec3,
    budget: Option<usize>,
    block_size: Option<usize>,
    save_scene: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            scene: None,
            synthetic: false,
            width: 256,
            height: 256,
            out: PathBuf::from("render.png"),
            frames: 1,
            threads: None,
            background: Vec3::ZERO,
            budget: None,
            block_size: None,
            save_scene: None,
        }
    }
}

fn next_value<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T> {
    let value = args.next().with_context(|| format!("Missing value for {}", flag))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value '{}' for {}", value, flag))
}

fn parse_color(text: &str) -> Result<Vec3> {
    let parts = text
        .split(',')
        .map(|s| s.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid color '{}'", text))?;
    if parts.len() != 3 {
        bail!("Color must be three comma-separated floats, got '{}'", text);
    }
    Ok(Vec3::new(parts[0], parts[1], parts[2]))
}

impl Options {
    /// Returns `None` when help was requested.
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>> {
        let mut options = Options::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--synthetic" => options.synthetic = true,
                "--width" => options.width = next_value(&mut args, "--width")?,
                "--height" => options.height = next_value(&mut args, "--height")?,
                "--out" => options.out = next_value(&mut args, "--out")?,
                "--frames" => options.frames = next_value(&mut args, "--frames")?,
                "--threads" => options.threads = Some(next_value(&mut args, "--threads")?),
                "--budget" => options.budget = Some(next_value(&mut args, "--budget")?),
                "--block-size" => options.block_size = Some(next_value(&mut args, "--block-size")?),
                "--save-scene" => options.save_scene = Some(next_value(&mut args, "--save-scene")?),
                "--background" => {
                    let text: String = next_value(&mut args, "--background")?;
                    options.background = parse_color(&text)?;
                }
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
                path => {
                    if options.scene.is_some() {
                        bail!("Only one scene directory may be given");
                    }
                    options.scene = Some(PathBuf::from(path));
                }
            }
        }

        if options.scene.is_none() && !options.synthetic {
            bail!("Give a scene directory or --synthetic (see --help)");
        }
        if options.frames == 0 {
            bail!("--frames must be at least 1");
        }
        Ok(Some(options))
    }

    fn render_config(&self) -> RenderConfig {
        let mut config = RenderConfig::default()
            .with_background(self.background)
            .with_threads(self.threads);
        if let Some(budget) = self.budget {
            config.sample_budget = budget;
        }
        if let Some(block) = self.block_size {
            config.network_block_size = block;
        }
        config
    }
}

fn print_help() {
    println!("ngp-render v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("  ngp-render <SCENE_DIR> [OPTIONS]");
    println!("  ngp-render --synthetic [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --synthetic           Render a procedural sphere instead of a scene directory");
    println!("  --width <N>           Synthetic image width (default 256)");
    println!("  --height <N>          Synthetic image height (default 256)");
    println!("  --out <PATH>          Output PNG (default render.png)");
    println!("  --frames <N>          Orbit the camera over N frames, numbering the outputs");
    println!("  --threads <N>         Worker threads (default: one per core)");
    println!("  --background <R,G,B>  Background color in [0, 1]");
    println!("  --budget <N>          Samples per ray before a frame stops (default 100)");
    println!("  --block-size <N>      Network launch block size (default 128)");
    println!("  --save-scene <DIR>    Write the loaded or synthetic scene to DIR");
}

/// Rotate `pose` about the world Y axis.
fn orbit(pose: &CameraPose, angle: f32) -> CameraPose {
    let rotation = Mat3::from_rotation_y(angle);
    CameraPose::new(rotation * pose.rotation, rotation * pose.origin)
}

fn load_assets(options: &Options) -> Result<SceneAssets> {
    match &options.scene {
        Some(dir) => SceneAssets::load(dir).with_context(|| format!("Failed to load scene {}", dir.display())),
        None => SyntheticScene::new()
            .with_resolution(options.width, options.height)
            .build()
            .context("Failed to build synthetic scene"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(options) = Options::parse(std::env::args().skip(1))? else {
        print_help();
        return Ok(());
    };

    let assets = load_assets(&options)?;
    if let Some(dir) = &options.save_scene {
        assets
            .save(dir)
            .with_context(|| format!("Failed to save scene to {}", dir.display()))?;
    }

    let base_pose = assets.pose;
    let mut renderer = Renderer::with_cpu(assets, options.render_config()).context("Failed to create renderer")?;
    let mut sink = PngSink::new(&options.out, options.frames > 1);

    for i in 0..options.frames {
        let pose = orbit(&base_pose, TAU * i as f32 / options.frames as f32);
        let (frame, stats) = renderer
            .render_frame(&pose)
            .with_context(|| format!("Frame {} failed", i))?;
        if stats.budget_exhausted {
            log::warn!("Frame {}: {} rays ran out of samples", i, stats.alive_at_end);
        }
        sink.present(&frame)?;
    }

    log::info!("Rendered {} frame(s)", sink.written());
    Ok(())
}
