//! PNG output for rendered frames.

use std::path::PathBuf;

use anyhow::{Context, Result};
use image::RgbImage;
use ngp_renderer::{Frame, FrameSink};

/// Writes each presented frame to a PNG file.
///
/// With `numbered` set, frame `i` goes to `<stem>_<i>.png` next to `path`.
pub struct PngSink {
    path: PathBuf,
    numbered: bool,
    written: usize,
}

impl PngSink {
    pub fn new(path: impl Into<PathBuf>, numbered: bool) -> Self {
        Self {
            path: path.into(),
            numbered,
            written: 0,
        }
    }

    fn target(&self) -> PathBuf {
        if !self.numbered {
            return self.path.clone();
        }
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame");
        self.path.with_file_name(format!("{}_{:04}.png", stem, self.written))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for PngSink {
    type Error = anyhow::Error;

    fn present(&mut self, frame: &Frame) -> Result<()> {
        let target = self.target();
        let image = RgbImage::from_raw(frame.width, frame.height, frame.to_rgb8())
            .context("Frame size does not match its pixel buffer")?;
        image
            .save(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        log::info!("Wrote {}x{} image to {}", frame.width, frame.height, target.display());
        self.written += 1;
        Ok(())
    }
}
