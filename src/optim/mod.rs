use std::collections::HashMap;

use ndarray::ArrayD;

use crate::errors::GradResult;
use crate::tape::Tape;
use crate::types::TensorId;

/// Stochastic gradient descent with classical momentum:
/// `v <- momentum * v + grad`, `w <- w - lr * v`.
///
/// Velocity buffers are created lazily per parameter and survive across
/// steps. With `momentum == 0` this is plain SGD.
pub struct Sgd {
    learning_rate: f64,
    momentum: f64,
    velocity: HashMap<TensorId, ArrayD<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self { learning_rate, momentum, velocity: HashMap::new() }
    }

    /// Applies one update to every parameter that has a gradient.
    /// Parameters without one (untouched by backward) are skipped.
    pub fn step(&mut self, tape: &mut Tape, params: &[TensorId]) -> GradResult<()> {
        for &param in params {
            let grad_id = match tape.tensors.get(param)?.grad() {
                Some(g) => g,
                None => continue,
            };
            let grad = tape.tensors.take(grad_id)?;
            let applied = (|| -> GradResult<()> {
                let velocity = self
                    .velocity
                    .entry(param)
                    .or_insert_with(|| ArrayD::zeros(grad.data().raw_dim()));
                if self.momentum != 0.0 {
                    *velocity *= self.momentum;
                    *velocity += grad.data();
                } else {
                    velocity.assign(grad.data());
                }
                let tensor = tape.tensors.get_mut(param)?;
                tensor.data_mut().scaled_add(-self.learning_rate, velocity);
                Ok(())
            })();
            tape.tensors.restore(grad_id, grad);
            applied?;
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}
