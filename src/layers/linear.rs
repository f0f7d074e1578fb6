use ndarray::Array2;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;

use crate::errors::GradResult;
use crate::ops;
use crate::tape::Tape;
use crate::types::TensorId;

/// A fully-connected layer: weights `[in, out]` and a column bias `[out, 1]`
/// registered as tracked tensors on the tape.
pub struct Linear {
    pub weights: TensorId,
    pub bias: TensorId,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(
        tape: &mut Tape,
        in_features: usize,
        out_features: usize,
        rng: &mut StdRng,
    ) -> GradResult<Self> {
        let weights: Array2<f64> =
            Array2::random_using((in_features, out_features), StandardNormal, rng) * 0.1;
        let bias: Array2<f64> = Array2::zeros((out_features, 1));
        let weights = tape.alloc_from(weights.into_dyn())?;
        let bias = tape.alloc_from(bias.into_dyn())?;
        Ok(Self { weights, bias, in_features, out_features })
    }

    pub fn forward(&self, tape: &mut Tape, input: TensorId) -> GradResult<TensorId> {
        ops::linear(tape, input, self.weights, self.bias)
    }

    pub fn params(&self) -> [TensorId; 2] {
        [self.weights, self.bias]
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}
