//! Finished frames and where they go.

use std::convert::Infallible;

use glam::Vec3;

/// A rendered image with per-pixel opacity and expected depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB, background already composited
    pub pixels: Vec<Vec3>,
    pub opacity: Vec<f32>,
    /// Opacity-weighted distance along each ray (0 where nothing was hit)
    pub depth: Vec<f32>,
}

impl Frame {
    /// Create a frame filled with `color` and zero opacity.
    pub fn filled(width: u32, height: u32, color: Vec3) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            pixels: vec![color; len],
            opacity: vec![0.0; len],
            depth: vec![0.0; len],
        }
    }

    /// Get the pixel at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Convert to packed 8-bit RGB, clamping to `[0, 1]`.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 3);
        for p in &self.pixels {
            for c in p.to_array() {
                bytes.push((c.clamp(0.0, 1.0) * 255.0) as u8);
            }
        }
        bytes
    }
}

/// Consumer of finished frames (window, file, network stream).
pub trait FrameSink {
    type Error;

    fn present(&mut self, frame: &Frame) -> Result<(), Self::Error>;
}

/// Sink that keeps every presented frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<Frame>,
}

impl FrameSink for MemorySink {
    type Error = Infallible;

    fn present(&mut self, frame: &Frame) -> Result<(), Self::Error> {
        self.frames.push(frame.clone());
        Ok(())
    }
}
