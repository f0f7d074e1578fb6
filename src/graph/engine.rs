//! Reverse-mode traversal.
//!
//! Edges are stored on the operand side (operand -> consumer), so the engine
//! first walks forward from the root through the operand snapshots to find
//! the reachable subgraph and count, per tensor, how many edges feed
//! reachable consumers. The worklist then drains consumers in
//! reverse-topological order: a tensor is visited only after every one of
//! those edges has deposited its contribution.
//!
//! Each pass keeps its own pooled accumulator per tensor and folds it into
//! the persistent `grad` when the tensor is finalized. Using the persistent
//! buffer directly as the upstream gradient would re-propagate whatever an
//! earlier backward call left there; with pass-local accumulators a second
//! backward adds exactly one more copy of every derivative.

use std::collections::{HashMap, HashSet};

use crate::errors::{GradError, GradResult};
use crate::graph::{BackwardCtx, BackwardFn, GraphArena};
use crate::tensor::{Tensor, TensorArena};
use crate::types::{TensorId, MAX_OPERANDS};

#[tracing::instrument(skip(tensors, graph), name = "backward")]
pub(crate) fn backward(
    tensors: &mut TensorArena,
    graph: &GraphArena,
    root: TensorId,
) -> GradResult<()> {
    let root_tensor = tensors.get(root).map_err(|_| GradError::InvalidRoot)?;
    if root_tensor.node().is_none() {
        return Err(GradError::InvalidRoot);
    }

    let (mut pending, edge_count) = plan(tensors, graph, root)?;
    tracing::debug!(reachable = pending.len() + 1, edges = edge_count, "reverse traversal planned");

    let root_acc = seed_root(tensors, root)?;
    let mut pass: HashMap<TensorId, TensorId> = HashMap::new();
    pass.insert(root, root_acc);
    let mut ready = vec![root];

    let result = drain(tensors, graph, root, &mut pass, &mut pending, &mut ready);

    // Scratch accumulators must go back to the pool even when an edge failed
    // half-way through the walk.
    for (_, acc) in pass.drain() {
        let _ = tensors.free_no_grad(acc);
    }
    result
}

/// Zeroes the gradient accumulators of the given tensors. Tensors that never
/// received a gradient are left without one; backward allocates lazily.
pub(crate) fn zero_grad(tensors: &mut TensorArena, params: &[TensorId]) -> GradResult<()> {
    for &param in params {
        if let Some(grad) = tensors.get(param)?.grad() {
            tensors.get_mut(grad)?.fill(0.0);
        }
    }
    Ok(())
}

/// Forward DFS from the root through operand snapshots. Returns the number
/// of edges into reachable consumers, keyed by operand tensor.
fn plan(
    tensors: &TensorArena,
    graph: &GraphArena,
    root: TensorId,
) -> GradResult<(HashMap<TensorId, usize>, usize)> {
    let mut pending: HashMap<TensorId, usize> = HashMap::new();
    let mut discovered: HashSet<TensorId> = HashSet::new();
    let mut stack = vec![root];
    let mut edge_count = 0;
    discovered.insert(root);

    while let Some(consumer) = stack.pop() {
        let node_id = match tensors.get(consumer)?.node() {
            Some(n) => n,
            None => continue,
        };
        let Some(snapshot) = graph.node(node_id)?.operands else { continue };
        for operand in distinct_operands(&snapshot) {
            let edges = count_edges(tensors, graph, operand, consumer)?;
            edge_count += edges;
            *pending.entry(operand).or_insert(0) += edges;
            if discovered.insert(operand) {
                stack.push(operand);
            }
        }
    }
    Ok((pending, edge_count))
}

/// Seeds the root gradient with ones (overwriting an existing accumulator)
/// and returns the root's pass-local accumulator, also filled with ones.
fn seed_root(tensors: &mut TensorArena, root: TensorId) -> GradResult<TensorId> {
    let shape = tensors.get(root)?.shape().to_vec();
    match tensors.get(root)?.grad() {
        Some(grad) => tensors.get_mut(grad)?.fill(1.0),
        None => {
            let grad = tensors.alloc_no_grad(&shape)?;
            tensors.get_mut(grad)?.fill(1.0);
            tensors.get_mut(root)?.set_grad(grad);
        }
    }
    let acc = tensors.alloc_no_grad(&shape)?;
    tensors.get_mut(acc)?.fill(1.0);
    Ok(acc)
}

fn drain(
    tensors: &mut TensorArena,
    graph: &GraphArena,
    root: TensorId,
    pass: &mut HashMap<TensorId, TensorId>,
    pending: &mut HashMap<TensorId, usize>,
    ready: &mut Vec<TensorId>,
) -> GradResult<()> {
    while let Some(consumer) = ready.pop() {
        let acc_id = pass.remove(&consumer).ok_or_else(|| {
            GradError::TensorNull(format!("no pass accumulator for {:?}", consumer))
        })?;
        let acc = tensors.take(acc_id)?;
        let step = visit(tensors, graph, root, consumer, &acc, pass, pending, ready);
        tensors.restore(acc_id, acc);
        let freed = tensors.free_no_grad(acc_id);
        step?;
        freed?;
    }
    Ok(())
}

/// Finalizes one consumer: folds its pass accumulator into the persistent
/// gradient, then evaluates every incoming edge, feeding the operands'
/// pass accumulators and release counts.
#[allow(clippy::too_many_arguments)]
fn visit(
    tensors: &mut TensorArena,
    graph: &GraphArena,
    root: TensorId,
    consumer: TensorId,
    acc: &Tensor,
    pass: &mut HashMap<TensorId, TensorId>,
    pending: &mut HashMap<TensorId, usize>,
    ready: &mut Vec<TensorId>,
) -> GradResult<()> {
    if consumer != root {
        accumulate_persistent(tensors, consumer, acc)?;
    }

    let node_id = match tensors.get(consumer)?.node() {
        Some(n) => n,
        None => return Ok(()),
    };
    let Some(snapshot) = graph.node(node_id)?.operands else {
        return Ok(());
    };

    for operand in distinct_operands(&snapshot) {
        let operand_node = tensors
            .get(operand)?
            .node()
            .ok_or(GradError::MissingNode(operand))?;
        let mut rules: Vec<BackwardFn> = Vec::new();
        for &link_id in &graph.node(operand_node)?.links {
            let link = graph.link(link_id)?;
            if link.consumer == consumer {
                rules.push(link.backward);
            }
        }
        for rule in rules {
            eval_edge(tensors, &snapshot, operand, rule, acc, pass)?;
            let left = pending.get_mut(&operand).ok_or_else(|| {
                GradError::TensorNull(format!("operand {:?} missing from traversal plan", operand))
            })?;
            *left -= 1;
            if *left == 0 {
                ready.push(operand);
            }
        }
    }
    Ok(())
}

/// Evaluates a single edge: zeroed scratch of the operand's shape, backward
/// rule, then accumulation into the operand's pass-local buffer. The scratch
/// tensor goes back to the pool on every exit path.
fn eval_edge(
    tensors: &mut TensorArena,
    snapshot: &[Option<TensorId>; MAX_OPERANDS],
    operand: TensorId,
    rule: BackwardFn,
    grad_out: &Tensor,
    pass: &mut HashMap<TensorId, TensorId>,
) -> GradResult<()> {
    let shape = tensors.get(operand)?.shape().to_vec();
    let scratch_id = tensors.alloc_no_grad_zero(&shape)?;
    let mut grad_in = tensors.take(scratch_id)?;

    let ran = run_rule(tensors, snapshot, rule, grad_out, &mut grad_in);
    let accumulated = ran.and_then(|_| accumulate_pass(tensors, operand, &grad_in, pass));

    tensors.restore(scratch_id, grad_in);
    let freed = tensors.free_no_grad(scratch_id);
    accumulated?;
    freed
}

fn run_rule(
    tensors: &TensorArena,
    snapshot: &[Option<TensorId>; MAX_OPERANDS],
    rule: BackwardFn,
    grad_out: &Tensor,
    grad_in: &mut Tensor,
) -> GradResult<()> {
    let mut operands: [Option<&Tensor>; MAX_OPERANDS] = [None; MAX_OPERANDS];
    for (slot, id) in snapshot.iter().enumerate() {
        if let Some(id) = id {
            operands[slot] = Some(tensors.get(*id)?);
        }
    }
    rule(&BackwardCtx { operands }, grad_out, grad_in)
}

fn accumulate_pass(
    tensors: &mut TensorArena,
    operand: TensorId,
    grad_in: &Tensor,
    pass: &mut HashMap<TensorId, TensorId>,
) -> GradResult<()> {
    let acc_id = match pass.get(&operand) {
        Some(&id) => id,
        None => {
            let id = tensors.alloc_no_grad_zero(grad_in.shape())?;
            pass.insert(operand, id);
            id
        }
    };
    let acc = tensors.get_mut(acc_id)?;
    *acc.data_mut() += grad_in.data();
    Ok(())
}

fn accumulate_persistent(
    tensors: &mut TensorArena,
    tensor: TensorId,
    contribution: &Tensor,
) -> GradResult<()> {
    let grad_id = match tensors.get(tensor)?.grad() {
        Some(g) => g,
        None => {
            let shape = tensors.get(tensor)?.shape().to_vec();
            let g = tensors.alloc_no_grad_zero(&shape)?;
            tensors.get_mut(tensor)?.set_grad(g);
            g
        }
    };
    let grad = tensors.get_mut(grad_id)?;
    *grad.data_mut() += contribution.data();
    Ok(())
}

/// Operand tensors of a snapshot, deduplicated: a tensor occupying two slots
/// of the same consumer already carries one link per appearance.
fn distinct_operands(snapshot: &[Option<TensorId>; MAX_OPERANDS]) -> Vec<TensorId> {
    let mut out = Vec::with_capacity(MAX_OPERANDS);
    for id in snapshot.iter().flatten() {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

fn count_edges(
    tensors: &TensorArena,
    graph: &GraphArena,
    operand: TensorId,
    consumer: TensorId,
) -> GradResult<usize> {
    let node_id = tensors
        .get(operand)?
        .node()
        .ok_or(GradError::MissingNode(operand))?;
    let mut count = 0;
    for &link_id in &graph.node(node_id)?.links {
        if graph.link(link_id)?.consumer == consumer {
            count += 1;
        }
    }
    Ok(count)
}
