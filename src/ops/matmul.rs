use crate::errors::{GradError, GradResult};
use crate::graph::BackwardCtx;
use crate::ops::as_2d;
use crate::tape::Tape;
use crate::tensor::Tensor;
use crate::types::TensorId;

/// Operand slots of the matrix product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatMulOperand {
    Lhs = 0,
    Rhs = 1,
}

/// `out = lhs . rhs` for 2-D tensors `[m, k] x [k, n] -> [m, n]`.
#[tracing::instrument(skip(lhs, rhs, out), name = "kernel_matmul")]
pub fn matmul_forward(lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> GradResult<()> {
    let a = as_2d(lhs.data())?;
    let b = as_2d(rhs.data())?;
    if a.ncols() != b.nrows() {
        return Err(GradError::ShapeMismatch {
            expected: vec![a.nrows(), a.ncols()],
            found: vec![b.nrows(), b.ncols()],
        });
    }
    if out.shape() != [a.nrows(), b.ncols()] {
        return Err(GradError::ShapeMismatch {
            expected: vec![a.nrows(), b.ncols()],
            found: out.shape().to_vec(),
        });
    }
    let res = a.dot(&b);
    out.data_mut().assign(&res);
    Ok(())
}

/// Graph-recording matmul: runs the kernel and links both operands.
pub fn matmul(tape: &mut Tape, lhs: TensorId, rhs: TensorId) -> GradResult<TensorId> {
    let out_shape = {
        let a = as_2d(tape.tensors.get(lhs)?.data())?;
        let b = as_2d(tape.tensors.get(rhs)?.data())?;
        [a.nrows(), b.ncols()]
    };
    let out = tape.tensors.alloc_no_grad(&out_shape)?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let a = tape.tensors.get(lhs)?;
        let b = tape.tensors.get(rhs)?;
        matmul_forward(a, b, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(lhs, MatMulOperand::Lhs as usize, out, backward_lhs)?;
    tape.add_link(rhs, MatMulOperand::Rhs as usize, out, backward_rhs)?;
    Ok(out)
}

// grad_lhs = grad_out . rhs^T
fn backward_lhs(ctx: &BackwardCtx<'_>, grad_out: &Tensor, grad_in: &mut Tensor) -> GradResult<()> {
    let rhs = ctx.operand(MatMulOperand::Rhs as usize)?;
    let g = as_2d(grad_out.data())?;
    let b = as_2d(rhs.data())?;
    grad_in.data_mut().assign(&g.dot(&b.t()));
    Ok(())
}

// grad_rhs = lhs^T . grad_out
fn backward_rhs(ctx: &BackwardCtx<'_>, grad_out: &Tensor, grad_in: &mut Tensor) -> GradResult<()> {
    let lhs = ctx.operand(MatMulOperand::Lhs as usize)?;
    let g = as_2d(grad_out.data())?;
    let a = as_2d(lhs.data())?;
    grad_in.data_mut().assign(&a.t().dot(&g));
    Ok(())
}
