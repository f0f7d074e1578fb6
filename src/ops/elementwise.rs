use crate::errors::GradResult;
use crate::graph::BackwardCtx;
use crate::ops::same_shape;
use crate::tape::Tape;
use crate::tensor::Tensor;
use crate::types::TensorId;

/// Operand slots of the element-wise sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOperand {
    Lhs = 0,
    Rhs = 1,
}

/// `out = lhs + rhs`, identical shapes.
pub fn add_forward(lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> GradResult<()> {
    same_shape(lhs, rhs)?;
    same_shape(lhs, out)?;
    out.data_mut().assign(lhs.data());
    *out.data_mut() += rhs.data();
    Ok(())
}

pub fn add(tape: &mut Tape, lhs: TensorId, rhs: TensorId) -> GradResult<TensorId> {
    let out_shape = tape.tensors.get(lhs)?.shape().to_vec();
    let out = tape.tensors.alloc_no_grad(&out_shape)?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let a = tape.tensors.get(lhs)?;
        let b = tape.tensors.get(rhs)?;
        add_forward(a, b, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(lhs, AddOperand::Lhs as usize, out, backward_pass_through)?;
    tape.add_link(rhs, AddOperand::Rhs as usize, out, backward_pass_through)?;
    Ok(out)
}

// Both slots of an addition see the upstream gradient unchanged.
fn backward_pass_through(
    _ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    grad_in.data_mut().assign(grad_out.data());
    Ok(())
}
