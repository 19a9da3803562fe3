//! Per-pixel camera-space ray directions.

use glam::Vec3;

use crate::assets::{AssetError, AssetResult};

/// One camera-space direction per pixel, row-major.
///
/// The table is fixed for an output resolution and camera intrinsics; the
/// pose rotates it into world space every frame.
#[derive(Debug, Clone)]
pub struct PixelDirections {
    width: u32,
    height: u32,
    directions: Vec<Vec3>,
}

impl PixelDirections {
    /// Wrap a direction table, checking it has one entry per pixel.
    pub fn new(width: u32, height: u32, directions: Vec<Vec3>) -> AssetResult<Self> {
        let expected = width as usize * height as usize;
        if directions.len() != expected {
            return Err(AssetError::SizeMismatch {
                what: "pixel directions".into(),
                expected,
                actual: directions.len(),
            });
        }
        Ok(Self {
            width,
            height,
            directions,
        })
    }

    /// Build a direction table from flat `x, y, z` triples.
    pub fn from_flat(width: u32, height: u32, flat: &[f32]) -> AssetResult<Self> {
        if flat.len() % 3 != 0 {
            return Err(AssetError::InvalidConfig(format!(
                "direction table holds {} floats, not a multiple of 3",
                flat.len()
            )));
        }
        let directions = flat
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect();
        Self::new(width, height, directions)
    }

    /// Pinhole camera with square pixels and the principal point at the
    /// image center. Directions go through pixel centers, +X right, +Y up,
    /// looking down -Z.
    pub fn pinhole(width: u32, height: u32, focal: f32) -> Self {
        let cx = width as f32 * 0.5;
        let cy = height as f32 * 0.5;
        let mut directions = Vec::with_capacity(width as usize * height as usize);

        for j in 0..height {
            for i in 0..width {
                let d = Vec3::new(
                    (i as f32 + 0.5 - cx) / focal,
                    -(j as f32 + 0.5 - cy) / focal,
                    -1.0,
                );
                directions.push(d.normalize());
            }
        }

        Self {
            width,
            height,
            directions,
        }
    }

    /// Focal length (in pixels) giving a horizontal field of view in degrees.
    pub fn focal_from_fov(width: u32, fov_degrees: f32) -> f32 {
        0.5 * width as f32 / (0.5 * fov_degrees.to_radians()).tan()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn as_slice(&self) -> &[Vec3] {
        &self.directions
    }

    /// Flatten to `x, y, z` triples.
    pub fn to_flat(&self) -> Vec<f32> {
        self.directions.iter().flat_map(|d| d.to_array()).collect()
    }
}
