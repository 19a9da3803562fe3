//! Density and color network evaluation.
//!
//! Both networks are bias-free fully connected stacks with ReLU between
//! layers and a linear output. Weights for a layer are stored input-major:
//! `w[i * outputs + o]`.

use glam::Vec3;
use ngp_core::config::DIRECTION_ENCODING_WIDTH;
use ngp_core::{MlpWeights, MAX_LAYER_WIDTH};

use crate::buffer::{FloatBuffer, IndexBuffer};
use crate::compaction::{Compaction, INVALID_SLOT};
use crate::device::{ComputeDevice, DeviceResult};

/// Run `input` through every layer of `weights`, writing the final layer to
/// `output[..output_width]`.
pub fn forward(weights: &MlpWeights, input: &[f32], output: &mut [f32]) {
    let mut current = [0.0f32; MAX_LAYER_WIDTH];
    let mut next = [0.0f32; MAX_LAYER_WIDTH];
    let width = weights.topology().input_width();
    current[..width].copy_from_slice(&input[..width]);

    let last = weights.layer_count() - 1;
    for layer in 0..=last {
        let (shape, w) = weights.layer(layer);
        next[..shape.outputs].fill(0.0);
        for i in 0..shape.inputs {
            let x = current[i];
            if x == 0.0 {
                continue;
            }
            let row = &w[i * shape.outputs..(i + 1) * shape.outputs];
            for (acc, weight) in next[..shape.outputs].iter_mut().zip(row) {
                *acc += x * weight;
            }
        }
        if layer != last {
            for v in &mut next[..shape.outputs] {
                *v = v.max(0.0);
            }
        }
        std::mem::swap(&mut current, &mut next);
    }

    let width = weights.topology().output_width();
    output[..width].copy_from_slice(&current[..width]);
}

/// Real spherical harmonics basis up to degree 4 (16 values) of a unit
/// direction.
pub fn sh_encode(d: Vec3) -> [f32; DIRECTION_ENCODING_WIDTH] {
    let (x, y, z) = (d.x, d.y, d.z);
    let (xy, xz, yz) = (x * y, x * z, y * z);
    let (x2, y2, z2) = (x * x, y * y, z * z);

    [
        0.282_094_79,
        -0.488_602_51 * y,
        0.488_602_51 * z,
        -0.488_602_51 * x,
        1.092_548_4 * xy,
        -1.092_548_4 * yz,
        0.946_174_7 * z2 - 0.315_391_57,
        -1.092_548_4 * xz,
        0.546_274_2 * (x2 - y2),
        0.590_043_6 * y * (-3.0 * x2 + y2),
        2.890_611_4 * xy * z,
        0.457_045_8 * y * (1.0 - 5.0 * z2),
        0.373_176_33 * z * (5.0 * z2 - 3.0),
        0.457_045_8 * x * (1.0 - 5.0 * z2),
        1.445_305_7 * z * (x2 - y2),
        0.590_043_6 * x * (-x2 + 3.0 * y2),
    ]
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Evaluate the density network on one embedding.
///
/// Returns `sigma = exp(out[0])` and writes the whole output layer, the
/// geometry feature, into `feature`.
pub fn evaluate_density(weights: &MlpWeights, embedding: &[f32], feature: &mut [f32]) -> f32 {
    forward(weights, embedding, feature);
    feature[0].exp()
}

/// Evaluate the color network for a view direction and geometry feature.
pub fn evaluate_color(weights: &MlpWeights, direction: Vec3, feature: &[f32]) -> Vec3 {
    let mut input = [0.0f32; MAX_LAYER_WIDTH];
    let mut output = [0.0f32; MAX_LAYER_WIDTH];
    let sh = sh_encode(direction);
    let feature_width = weights.topology().input_width() - DIRECTION_ENCODING_WIDTH;

    input[..DIRECTION_ENCODING_WIDTH].copy_from_slice(&sh);
    input[DIRECTION_ENCODING_WIDTH..DIRECTION_ENCODING_WIDTH + feature_width]
        .copy_from_slice(&feature[..feature_width]);
    forward(weights, &input, &mut output);

    Vec3::new(sigmoid(output[0]), sigmoid(output[1]), sigmoid(output[2]))
}

/// Evaluate the density network for every launched sample.
///
/// Sigma goes to the sample slot; the feature stays at the launch position.
/// Padding entries are evaluated but write nothing to any slot.
pub fn run_density(
    device: &dyn ComputeDevice,
    weights: &MlpWeights,
    launch: &IndexBuffer,
    compaction: Compaction,
    embedding: &FloatBuffer,
    features: &FloatBuffer,
    sigmas: &FloatBuffer,
) -> DeviceResult<()> {
    let in_width = weights.topology().input_width();
    let out_width = weights.topology().output_width();

    device.dispatch("density", compaction.launch_count, &|i| {
        let mut input = [0.0f32; MAX_LAYER_WIDTH];
        let mut feature = [0.0f32; MAX_LAYER_WIDTH];
        for (k, v) in input[..in_width].iter_mut().enumerate() {
            *v = embedding.get(i * in_width + k);
        }

        let sigma = evaluate_density(weights, &input, &mut feature);
        for (k, v) in feature[..out_width].iter().enumerate() {
            features.set(i * out_width + k, *v);
        }

        let slot = launch.get(i);
        if slot != INVALID_SLOT {
            sigmas.set(slot as usize, sigma);
        }
    })
}

/// Evaluate the color network for every launched sample.
pub fn run_color(
    device: &dyn ComputeDevice,
    weights: &MlpWeights,
    launch: &IndexBuffer,
    compaction: Compaction,
    features: &FloatBuffer,
    directions: &FloatBuffer,
    rgbs: &FloatBuffer,
) -> DeviceResult<()> {
    let feature_width = weights.topology().input_width() - DIRECTION_ENCODING_WIDTH;

    device.dispatch("color", compaction.launch_count, &|i| {
        let mut feature = [0.0f32; MAX_LAYER_WIDTH];
        for (k, v) in feature[..feature_width].iter_mut().enumerate() {
            *v = features.get(i * feature_width + k);
        }

        let slot = launch.get(i);
        let direction = if slot != INVALID_SLOT {
            directions.get_vec3(slot as usize)
        } else {
            Vec3::Z
        };
        let rgb = evaluate_color(weights, direction, &feature);

        if slot != INVALID_SLOT {
            rgbs.set_vec3(slot as usize, rgb);
        }
    })
}
