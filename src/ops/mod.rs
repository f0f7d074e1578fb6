//! Operators: pure forward kernels plus graph-recording adapters.
//!
//! Every operator comes in two layers. The `*_forward` kernel validates
//! shapes and writes the output buffer with no graph effects. The adapter of
//! the same base name allocates the output from the tape, runs the kernel,
//! and records one link per operand slot carrying that slot's backward rule.

pub mod activations;
pub mod elementwise;
pub mod linear;
pub mod loss;
pub mod matmul;
pub mod reduce;

pub use activations::{relu, relu_forward, sigmoid, sigmoid_forward};
pub use elementwise::{add, add_forward, AddOperand};
pub use linear::{linear, linear_forward, LinearOperand};
pub use loss::{
    mse, mse_forward, softmax_cross_entropy, softmax_cross_entropy_forward, CrossEntropyOperand,
    MseOperand,
};
pub use matmul::{matmul, matmul_forward, MatMulOperand};
pub use reduce::{sum, sum_forward};

use ndarray::{ArrayD, ArrayView2, ArrayViewMut2, Ix2};

use crate::errors::{GradError, GradResult};
use crate::tensor::Tensor;

/// Operand slot for single-input operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperand {
    Only = 0,
}

pub(crate) fn as_2d(data: &ArrayD<f64>) -> GradResult<ArrayView2<'_, f64>> {
    data.view().into_dimensionality::<Ix2>().map_err(|_| GradError::WrongShape {
        shape: data.shape().to_vec(),
        reason: "expected a rank-2 tensor".to_string(),
    })
}

pub(crate) fn as_2d_mut(data: &mut ArrayD<f64>) -> GradResult<ArrayViewMut2<'_, f64>> {
    let shape = data.shape().to_vec();
    data.view_mut().into_dimensionality::<Ix2>().map_err(|_| GradError::WrongShape {
        shape,
        reason: "expected a rank-2 tensor".to_string(),
    })
}

pub(crate) fn same_shape(a: &Tensor, b: &Tensor) -> GradResult<()> {
    if a.shape() != b.shape() {
        return Err(GradError::ShapeMismatch {
            expected: a.shape().to_vec(),
            found: b.shape().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn scalar_of(t: &Tensor) -> GradResult<f64> {
    t.data()
        .iter()
        .next()
        .copied()
        .ok_or_else(|| GradError::TensorNull("empty scalar tensor".to_string()))
}
