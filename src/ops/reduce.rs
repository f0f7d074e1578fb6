use crate::errors::{GradError, GradResult};
use crate::graph::BackwardCtx;
use crate::ops::{scalar_of, UnaryOperand};
use crate::tape::Tape;
use crate::tensor::Tensor;
use crate::types::TensorId;

/// Reduces a tensor to a `[1, 1]` scalar by summing every element.
pub fn sum_forward(input: &Tensor, out: &mut Tensor) -> GradResult<()> {
    if out.len() != 1 {
        return Err(GradError::ShapeMismatch {
            expected: vec![1, 1],
            found: out.shape().to_vec(),
        });
    }
    out.fill(input.data().sum());
    Ok(())
}

pub fn sum(tape: &mut Tape, input: TensorId) -> GradResult<TensorId> {
    let out = tape.tensors.alloc_no_grad(&[1, 1])?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let x = tape.tensors.get(input)?;
        sum_forward(x, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(input, UnaryOperand::Only as usize, out, backward_broadcast)?;
    Ok(out)
}

// Every element contributed once; the scalar upstream gradient fans out.
fn backward_broadcast(
    _ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    grad_in.fill(scalar_of(grad_out)?);
    Ok(())
}
