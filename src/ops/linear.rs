use ndarray::Axis;

use crate::errors::{GradError, GradResult};
use crate::graph::BackwardCtx;
use crate::ops::as_2d;
use crate::tape::Tape;
use crate::tensor::Tensor;
use crate::types::TensorId;

/// Operand slots of the fused affine transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinearOperand {
    Input = 0,
    Weights = 1,
    Bias = 2,
}

/// `out = input . weights + bias` where `input` is `[m, k]`, `weights` is
/// `[k, n]` and `bias` is a column `[n, 1]` broadcast across the batch rows.
pub fn linear_forward(
    input: &Tensor,
    weights: &Tensor,
    bias: &Tensor,
    out: &mut Tensor,
) -> GradResult<()> {
    let x = as_2d(input.data())?;
    let w = as_2d(weights.data())?;
    let b = as_2d(bias.data())?;
    if x.ncols() != w.nrows() {
        return Err(GradError::ShapeMismatch {
            expected: vec![x.nrows(), x.ncols()],
            found: vec![w.nrows(), w.ncols()],
        });
    }
    if b.nrows() != w.ncols() || b.ncols() != 1 {
        return Err(GradError::ShapeMismatch {
            expected: vec![w.ncols(), 1],
            found: vec![b.nrows(), b.ncols()],
        });
    }
    if out.shape() != [x.nrows(), w.ncols()] {
        return Err(GradError::ShapeMismatch {
            expected: vec![x.nrows(), w.ncols()],
            found: out.shape().to_vec(),
        });
    }
    let mut res = x.dot(&w);
    res += &b.t();
    out.data_mut().assign(&res);
    Ok(())
}

/// Graph-recording affine transform: one link per operand slot.
pub fn linear(
    tape: &mut Tape,
    input: TensorId,
    weights: TensorId,
    bias: TensorId,
) -> GradResult<TensorId> {
    let out_shape = {
        let x = as_2d(tape.tensors.get(input)?.data())?;
        let w = as_2d(tape.tensors.get(weights)?.data())?;
        [x.nrows(), w.ncols()]
    };
    let out = tape.tensors.alloc_no_grad(&out_shape)?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let x = tape.tensors.get(input)?;
        let w = tape.tensors.get(weights)?;
        let b = tape.tensors.get(bias)?;
        linear_forward(x, w, b, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(input, LinearOperand::Input as usize, out, backward_input)?;
    tape.add_link(weights, LinearOperand::Weights as usize, out, backward_weights)?;
    tape.add_link(bias, LinearOperand::Bias as usize, out, backward_bias)?;
    Ok(out)
}

// grad_input = grad_out . weights^T
fn backward_input(ctx: &BackwardCtx<'_>, grad_out: &Tensor, grad_in: &mut Tensor) -> GradResult<()> {
    let weights = ctx.operand(LinearOperand::Weights as usize)?;
    let g = as_2d(grad_out.data())?;
    let w = as_2d(weights.data())?;
    grad_in.data_mut().assign(&g.dot(&w.t()));
    Ok(())
}

// grad_weights = input^T . grad_out
fn backward_weights(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    let input = ctx.operand(LinearOperand::Input as usize)?;
    let g = as_2d(grad_out.data())?;
    let x = as_2d(input.data())?;
    grad_in.data_mut().assign(&x.t().dot(&g));
    Ok(())
}

// grad_bias[j][0] = sum of grad_out over the batch rows
fn backward_bias(_ctx: &BackwardCtx<'_>, grad_out: &Tensor, grad_in: &mut Tensor) -> GradResult<()> {
    let g = as_2d(grad_out.data())?;
    let summed = g.sum_axis(Axis(0)).insert_axis(Axis(1));
    grad_in.data_mut().assign(&summed);
    Ok(())
}
