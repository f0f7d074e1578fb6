use ndarray::Zip;

use crate::errors::GradResult;
use crate::graph::BackwardCtx;
use crate::ops::{same_shape, UnaryOperand};
use crate::tape::Tape;
use crate::tensor::Tensor;
use crate::types::TensorId;

/// Rectified linear unit, element-wise.
pub fn relu_forward(input: &Tensor, out: &mut Tensor) -> GradResult<()> {
    same_shape(input, out)?;
    let zip = Zip::from(out.data_mut()).and(input.data());
    #[cfg(feature = "rayon")]
    zip.par_for_each(|o, &v| *o = if v > 0.0 { v } else { 0.0 });
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|o, &v| *o = if v > 0.0 { v } else { 0.0 });
    Ok(())
}

pub fn relu(tape: &mut Tape, input: TensorId) -> GradResult<TensorId> {
    unary(tape, input, relu_forward, relu_backward)
}

fn relu_backward(ctx: &BackwardCtx<'_>, grad_out: &Tensor, grad_in: &mut Tensor) -> GradResult<()> {
    let input = ctx.operand(UnaryOperand::Only as usize)?;
    Zip::from(grad_in.data_mut())
        .and(grad_out.data())
        .and(input.data())
        .for_each(|gi, &g, &v| *gi = if v > 0.0 { g } else { 0.0 });
    Ok(())
}

/// Logistic sigmoid, element-wise.
pub fn sigmoid_forward(input: &Tensor, out: &mut Tensor) -> GradResult<()> {
    same_shape(input, out)?;
    let zip = Zip::from(out.data_mut()).and(input.data());
    #[cfg(feature = "rayon")]
    zip.par_for_each(|o, &v| *o = 1.0 / (1.0 + (-v).exp()));
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|o, &v| *o = 1.0 / (1.0 + (-v).exp()));
    Ok(())
}

pub fn sigmoid(tape: &mut Tape, input: TensorId) -> GradResult<TensorId> {
    unary(tape, input, sigmoid_forward, sigmoid_backward)
}

// Recomputes y = sigmoid(x) from the recorded input; grad = g * y * (1 - y).
fn sigmoid_backward(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    let input = ctx.operand(UnaryOperand::Only as usize)?;
    Zip::from(grad_in.data_mut())
        .and(grad_out.data())
        .and(input.data())
        .for_each(|gi, &g, &v| {
            let y = 1.0 / (1.0 + (-v).exp());
            *gi = g * y * (1.0 - y);
        });
    Ok(())
}

fn unary(
    tape: &mut Tape,
    input: TensorId,
    forward: fn(&Tensor, &mut Tensor) -> GradResult<()>,
    backward: crate::graph::BackwardFn,
) -> GradResult<TensorId> {
    let out_shape = tape.tensors.get(input)?.shape().to_vec();
    let out = tape.tensors.alloc_no_grad(&out_shape)?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let x = tape.tensors.get(input)?;
        forward(x, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(input, UnaryOperand::Only as usize, out, backward)?;
    Ok(out)
}
