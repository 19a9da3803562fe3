//! Fully-connected network topology and frozen weights.
//!
//! Weights are stored the way the trainer exports them: one flat array with
//! the layers back to back, each layer an `inputs x outputs` matrix in
//! row-major order by input (`w[i * outputs + o]`). Networks have no biases.

use serde::{Deserialize, Serialize};

use crate::assets::{AssetError, AssetResult};

/// Widest layer supported by the fixed-size evaluation buffers.
pub const MAX_LAYER_WIDTH: usize = 128;

/// Input/output width of one dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShape {
    pub inputs: usize,
    pub outputs: usize,
}

impl LayerShape {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }

    /// Number of weights in this layer.
    pub fn parameter_count(&self) -> usize {
        self.inputs * self.outputs
    }
}

/// Ordered list of dense layers. Hidden layers use ReLU; the output layer is linear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MlpTopology {
    pub layers: Vec<LayerShape>,
}

impl MlpTopology {
    pub fn new(layers: Vec<LayerShape>) -> Self {
        Self { layers }
    }

    /// Hash embedding (16 levels x 2) -> 64 -> 16.
    pub fn density_default() -> Self {
        Self::new(vec![LayerShape::new(32, 64), LayerShape::new(64, 16)])
    }

    /// SH direction (16) + density feature (16) -> 64 -> 64 -> 8 (RGB + padding).
    pub fn color_default() -> Self {
        Self::new(vec![
            LayerShape::new(32, 64),
            LayerShape::new(64, 64),
            LayerShape::new(64, 8),
        ])
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    /// Start of each layer's matrix within the flat weight array.
    ///
    /// This is the only place layer offsets are computed.
    pub fn layer_offsets(&self) -> Vec<usize> {
        self.layers
            .iter()
            .scan(0, |offset, layer| {
                let start = *offset;
                *offset += layer.parameter_count();
                Some(start)
            })
            .collect()
    }

    /// Total number of weights across all layers.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(LayerShape::parameter_count).sum()
    }

    /// Check the layers chain together and fit the evaluation buffers.
    pub fn validate(&self) -> AssetResult<()> {
        if self.layers.is_empty() {
            return Err(AssetError::InvalidConfig("network has no layers".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.inputs == 0 || layer.outputs == 0 {
                return Err(AssetError::InvalidConfig(format!("layer {} has zero width", i)));
            }
            if layer.inputs > MAX_LAYER_WIDTH || layer.outputs > MAX_LAYER_WIDTH {
                return Err(AssetError::InvalidConfig(format!(
                    "layer {} ({}x{}) exceeds the maximum width {}",
                    i, layer.inputs, layer.outputs, MAX_LAYER_WIDTH
                )));
            }
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].outputs != pair[1].inputs {
                return Err(AssetError::InvalidConfig(format!(
                    "layer {} outputs {} values but layer {} takes {}",
                    i,
                    pair[0].outputs,
                    i + 1,
                    pair[1].inputs
                )));
            }
        }
        Ok(())
    }
}

/// Frozen weights for one network.
#[derive(Debug, Clone)]
pub struct MlpWeights {
    topology: MlpTopology,
    offsets: Vec<usize>,
    data: Vec<f32>,
}

impl MlpWeights {
    /// Wrap a flat weight array, checking it matches the topology exactly.
    pub fn new(topology: MlpTopology, data: Vec<f32>) -> AssetResult<Self> {
        topology.validate()?;
        let expected = topology.parameter_count();
        if data.len() != expected {
            return Err(AssetError::SizeMismatch {
                what: "network weights".into(),
                expected,
                actual: data.len(),
            });
        }
        let offsets = topology.layer_offsets();
        Ok(Self {
            topology,
            offsets,
            data,
        })
    }

    /// All-zero weights for a topology.
    pub fn zeros(topology: MlpTopology) -> AssetResult<Self> {
        let len = topology.parameter_count();
        Self::new(topology, vec![0.0; len])
    }

    pub fn topology(&self) -> &MlpTopology {
        &self.topology
    }

    /// Shape and matrix of layer `index`.
    pub fn layer(&self, index: usize) -> (LayerShape, &[f32]) {
        let shape = self.topology.layers[index];
        let start = self.offsets[index];
        (shape, &self.data[start..start + shape.parameter_count()])
    }

    /// Mutable matrix of layer `index`, for building weights by hand.
    pub fn layer_mut(&mut self, index: usize) -> &mut [f32] {
        let shape = self.topology.layers[index];
        let start = self.offsets[index];
        &mut self.data[start..start + shape.parameter_count()]
    }

    pub fn layer_count(&self) -> usize {
        self.topology.layers.len()
    }

    /// The flat weight array.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
