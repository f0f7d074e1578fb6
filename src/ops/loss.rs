use ndarray::ArrayView2;

use crate::errors::{GradError, GradResult};
use crate::graph::BackwardCtx;
use crate::ops::{as_2d, as_2d_mut, scalar_of};
use crate::tape::Tape;
use crate::tensor::Tensor;
use crate::types::TensorId;

/// Operand slots of the mean-squared-error loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MseOperand {
    Pred = 0,
    Target = 1,
}

/// Operand slots of the fused softmax + cross-entropy loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrossEntropyOperand {
    Logits = 0,
    Targets = 1,
}

/// Mean of `(pred - target)^2 / 2` over column vectors `[batch, 1]`,
/// written to a `[1, 1]` scalar.
pub fn mse_forward(pred: &Tensor, target: &Tensor, out: &mut Tensor) -> GradResult<()> {
    let p = column(pred)?;
    let t = column(target)?;
    if p.nrows() != t.nrows() {
        return Err(GradError::ShapeMismatch {
            expected: vec![p.nrows(), 1],
            found: vec![t.nrows(), 1],
        });
    }
    if out.len() != 1 {
        return Err(GradError::ShapeMismatch {
            expected: vec![1, 1],
            found: out.shape().to_vec(),
        });
    }
    let batch = p.nrows() as f64;
    let mut acc = 0.0;
    for (pv, tv) in p.iter().zip(t.iter()) {
        let diff = pv - tv;
        acc += 0.5 * diff * diff;
    }
    out.fill(acc / batch);
    Ok(())
}

pub fn mse(tape: &mut Tape, pred: TensorId, target: TensorId) -> GradResult<TensorId> {
    let out = tape.tensors.alloc_no_grad(&[1, 1])?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let p = tape.tensors.get(pred)?;
        let t = tape.tensors.get(target)?;
        mse_forward(p, t, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(pred, MseOperand::Pred as usize, out, backward_mse_pred)?;
    tape.add_link(target, MseOperand::Target as usize, out, backward_mse_target)?;
    Ok(out)
}

// grad_pred = (pred - target) / batch
fn backward_mse_pred(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    mse_residual(ctx, grad_out, grad_in, 1.0)
}

// grad_target = -(pred - target) / batch
fn backward_mse_target(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    mse_residual(ctx, grad_out, grad_in, -1.0)
}

fn mse_residual(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
    sign: f64,
) -> GradResult<()> {
    let pred = ctx.operand(MseOperand::Pred as usize)?;
    let target = ctx.operand(MseOperand::Target as usize)?;
    let p = as_2d(pred.data())?;
    let t = as_2d(target.data())?;
    let batch = p.nrows() as f64;
    let g = scalar_of(grad_out)?;
    let mut gi = as_2d_mut(grad_in.data_mut())?;
    for i in 0..p.nrows() {
        gi[[i, 0]] = sign * (p[[i, 0]] - t[[i, 0]]) / batch * g;
    }
    Ok(())
}

/// Batch-mean cross-entropy of softmaxed logits `[batch, classes]` against
/// one-hot (or probability) targets of the same shape, written to a `[1, 1]`
/// scalar. Rows are stabilized by max subtraction before exponentiation.
pub fn softmax_cross_entropy_forward(
    logits: &Tensor,
    targets: &Tensor,
    out: &mut Tensor,
) -> GradResult<()> {
    let l = as_2d(logits.data())?;
    let t = as_2d(targets.data())?;
    if l.dim() != t.dim() {
        return Err(GradError::ShapeMismatch {
            expected: vec![l.nrows(), l.ncols()],
            found: vec![t.nrows(), t.ncols()],
        });
    }
    if l.nrows() == 0 || l.ncols() == 0 {
        return Err(GradError::WrongShape {
            shape: logits.shape().to_vec(),
            reason: "cross-entropy needs a non-empty batch".to_string(),
        });
    }
    if out.len() != 1 {
        return Err(GradError::ShapeMismatch {
            expected: vec![1, 1],
            found: out.shape().to_vec(),
        });
    }
    let batch = l.nrows() as f64;
    let mut loss = 0.0;
    for (lrow, trow) in l.outer_iter().zip(t.outer_iter()) {
        let max = lrow.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
        let lse = lrow.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
        for (&lv, &tv) in lrow.iter().zip(trow.iter()) {
            loss -= tv * (lv - max - lse);
        }
    }
    out.fill(loss / batch);
    Ok(())
}

pub fn softmax_cross_entropy(
    tape: &mut Tape,
    logits: TensorId,
    targets: TensorId,
) -> GradResult<TensorId> {
    let out = tape.tensors.alloc_no_grad(&[1, 1])?;
    let mut out_tensor = tape.tensors.take(out)?;
    let ran = (|| {
        let l = tape.tensors.get(logits)?;
        let t = tape.tensors.get(targets)?;
        softmax_cross_entropy_forward(l, t, &mut out_tensor)
    })();
    tape.tensors.restore(out, out_tensor);
    ran?;
    tape.add_link(logits, CrossEntropyOperand::Logits as usize, out, backward_ce_logits)?;
    tape.add_link(targets, CrossEntropyOperand::Targets as usize, out, backward_ce_targets)?;
    Ok(out)
}

// grad_logits = (softmax(logits) - targets) / batch
fn backward_ce_logits(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    let logits = ctx.operand(CrossEntropyOperand::Logits as usize)?;
    let targets = ctx.operand(CrossEntropyOperand::Targets as usize)?;
    let l = as_2d(logits.data())?;
    let t = as_2d(targets.data())?;
    let batch = l.nrows() as f64;
    let g = scalar_of(grad_out)?;
    let mut gi = as_2d_mut(grad_in.data_mut())?;
    for i in 0..l.nrows() {
        let row = l.row(i);
        let max = row.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
        let denom: f64 = row.iter().map(|&v| (v - max).exp()).sum();
        for j in 0..l.ncols() {
            let softmax = (row[j] - max).exp() / denom;
            gi[[i, j]] = (softmax - t[[i, j]]) / batch * g;
        }
    }
    Ok(())
}

// grad_targets = -log softmax(logits) / batch
fn backward_ce_targets(
    ctx: &BackwardCtx<'_>,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    let logits = ctx.operand(CrossEntropyOperand::Logits as usize)?;
    let l = as_2d(logits.data())?;
    let batch = l.nrows() as f64;
    let g = scalar_of(grad_out)?;
    let mut gi = as_2d_mut(grad_in.data_mut())?;
    for i in 0..l.nrows() {
        let row = l.row(i);
        let max = row.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
        let lse = row.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
        for j in 0..l.ncols() {
            gi[[i, j]] = -(row[j] - max - lse) / batch * g;
        }
    }
    Ok(())
}

fn column(t: &Tensor) -> GradResult<ArrayView2<'_, f64>> {
    let v = as_2d(t.data())?;
    if v.ncols() != 1 || v.nrows() == 0 {
        return Err(GradError::WrongShape {
            shape: t.shape().to_vec(),
            reason: "loss operands must be non-empty column vectors".to_string(),
        });
    }
    Ok(v)
}
