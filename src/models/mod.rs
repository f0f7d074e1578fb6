use rand::rngs::StdRng;

use crate::errors::{GradError, GradResult};
use crate::layers::Linear;
use crate::ops;
use crate::tape::Tape;
use crate::types::TensorId;

/// A multi-layer perceptron: Linear layers with ReLU between them and raw
/// logits out of the last layer.
pub struct Mlp {
    layers: Vec<Linear>,
}

impl Mlp {
    /// `dims` lists layer widths including input and output, e.g.
    /// `[4, 16, 3]` for a 4-feature, 3-class classifier.
    pub fn new(tape: &mut Tape, dims: &[usize], rng: &mut StdRng) -> GradResult<Self> {
        if dims.len() < 2 {
            return Err(GradError::WrongShape {
                shape: dims.to_vec(),
                reason: "a model needs at least an input and an output width".to_string(),
            });
        }
        let mut layers = Vec::with_capacity(dims.len() - 1);
        for pair in dims.windows(2) {
            layers.push(Linear::new(tape, pair[0], pair[1], rng)?);
        }
        Ok(Self { layers })
    }

    pub fn forward(&self, tape: &mut Tape, input: TensorId) -> GradResult<TensorId> {
        let mut current = input;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            current = layer.forward(tape, current)?;
            if i != last {
                current = ops::relu(tape, current)?;
            }
        }
        Ok(current)
    }

    pub fn params(&self) -> Vec<TensorId> {
        self.layers.iter().flat_map(|l| l.params()).collect()
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }
}
