use std::collections::HashSet;

use ndarray::ArrayD;

use crate::errors::{GradError, GradResult};
use crate::graph::{engine, BackwardFn, GraphArena, Link};
use crate::tensor::TensorArena;
use crate::types::{PoolSizing, TensorId, MAX_OPERANDS};

/// The allocator pair plus the graph it records: one resource bundle owned
/// by a single thread between forward start and backward end. Two disjoint
/// tapes may run on different threads.
pub struct Tape {
    pub tensors: TensorArena,
    pub graph: GraphArena,
}

impl Tape {
    pub fn new() -> Self {
        Self::with_sizing(&PoolSizing::default())
    }

    pub fn with_sizing(sizing: &PoolSizing) -> Self {
        Self {
            tensors: TensorArena::new(sizing),
            graph: GraphArena::new(sizing),
        }
    }

    /// Allocates a gradient-tracked tensor. Contents are unspecified; the
    /// gradient accumulator is created lazily on first accumulation.
    pub fn alloc(&mut self, shape: &[usize]) -> GradResult<TensorId> {
        let id = self.tensors.alloc_no_grad(shape)?;
        self.attach_node(id)?;
        Ok(id)
    }

    /// Adopts an array as a gradient-tracked tensor.
    pub fn alloc_from(&mut self, data: ArrayD<f64>) -> GradResult<TensorId> {
        let id = self.tensors.alloc_from(data)?;
        self.attach_node(id)?;
        Ok(id)
    }

    /// Records an edge from `operand` to `consumer` in slot `operand_index`,
    /// carrying the gradient-propagation rule for that slot.
    ///
    /// The operand must be tracked. The consumer becomes tracked on its
    /// first link; its operand snapshot is created then and filled in by
    /// subsequent calls. Links appear on the operand's node in call order.
    pub fn add_link(
        &mut self,
        operand: TensorId,
        operand_index: usize,
        consumer: TensorId,
        backward: BackwardFn,
    ) -> GradResult<()> {
        if operand_index >= MAX_OPERANDS {
            return Err(GradError::IndexOutOfBounds {
                index: operand_index,
                limit: MAX_OPERANDS,
            });
        }
        let operand_node = self
            .tensors
            .get(operand)?
            .node()
            .ok_or(GradError::MissingNode(operand))?;

        let consumer_node = match self.tensors.get(consumer)?.node() {
            Some(n) => {
                // Slot recycling can leave a recycled tensor pointing at a
                // node that belongs to a previous occupant.
                if self.graph.node(n)?.tensor != consumer {
                    return Err(GradError::TensorNull(format!(
                        "node backref mismatch for {consumer:?}"
                    )));
                }
                n
            }
            None => {
                let n = self.graph.alloc_node(consumer)?;
                self.tensors.get_mut(consumer)?.set_node(n);
                n
            }
        };

        {
            let node = self.graph.node_mut(consumer_node)?;
            let snapshot = node.operands.get_or_insert([None; MAX_OPERANDS]);
            snapshot[operand_index] = Some(operand);
        }

        let link = self.graph.alloc_link(Link { consumer, operand_index, backward })?;
        self.graph.node_mut(operand_node)?.links.push(link);
        Ok(())
    }

    /// Computes partial derivatives of `root` with respect to every tracked
    /// tensor in the reachable subgraph, accumulating into their gradient
    /// buffers. The root's gradient is seeded with ones.
    pub fn backward(&mut self, root: TensorId) -> GradResult<()> {
        engine::backward(&mut self.tensors, &self.graph, root)
    }

    /// Zeroes the gradient accumulators of `params` where present.
    pub fn zero_grad(&mut self, params: &[TensorId]) -> GradResult<()> {
        engine::zero_grad(&mut self.tensors, params)
    }

    /// The tensor's current value.
    pub fn value(&self, id: TensorId) -> GradResult<&ArrayD<f64>> {
        Ok(self.tensors.get(id)?.data())
    }

    /// Overwrites the tensor's value in place; the shape must match. Used to
    /// reload an input tensor between training steps.
    pub fn set_value(&mut self, id: TensorId, data: &ArrayD<f64>) -> GradResult<()> {
        let tensor = self.tensors.get_mut(id)?;
        if tensor.shape() != data.shape() {
            return Err(GradError::ShapeMismatch {
                expected: tensor.shape().to_vec(),
                found: data.shape().to_vec(),
            });
        }
        tensor.data_mut().assign(data);
        Ok(())
    }

    /// The tensor's gradient, if one has been accumulated.
    pub fn grad(&self, id: TensorId) -> GradResult<Option<&ArrayD<f64>>> {
        match self.tensors.get(id)?.grad() {
            Some(g) => Ok(Some(self.tensors.get(g)?.data())),
            None => Ok(None),
        }
    }

    /// Releases a tensor, its gradient, and its graph node with all
    /// outgoing links.
    pub fn free(&mut self, id: TensorId) -> GradResult<()> {
        if let Some(node) = self.tensors.get(id)?.node() {
            self.graph.free_node(node)?;
        }
        self.tensors.free(id)
    }

    /// Consumers recorded on the tensor's outgoing links, in insertion
    /// order, as `(consumer, operand_index)` pairs.
    pub fn outgoing_links(&self, id: TensorId) -> GradResult<Vec<(TensorId, usize)>> {
        let node = match self.tensors.get(id)?.node() {
            Some(n) => n,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for &link_id in &self.graph.node(node)?.links {
            let link = self.graph.link(link_id)?;
            out.push((link.consumer, link.operand_index));
        }
        Ok(out)
    }

    /// The operand recorded at `slot` of the consumer's snapshot.
    pub fn operand_at(&self, consumer: TensorId, slot: usize) -> GradResult<Option<TensorId>> {
        if slot >= MAX_OPERANDS {
            return Err(GradError::IndexOutOfBounds { index: slot, limit: MAX_OPERANDS });
        }
        let node = match self.tensors.get(consumer)?.node() {
            Some(n) => n,
            None => return Ok(None),
        };
        Ok(self.graph.node(node)?.operands.and_then(|snap| snap[slot]))
    }

    /// End-of-step cleanup: releases every tensor except those in `keep`
    /// (and their gradients), drops the whole graph, and re-attaches fresh
    /// edge-free nodes to the kept tensors so their handles stay valid for
    /// the next forward pass.
    pub fn reset(&mut self, keep: &[TensorId]) -> GradResult<()> {
        let mut kept: HashSet<usize> = HashSet::new();
        for &id in keep {
            kept.insert(id.0);
            if let Some(grad) = self.tensors.get(id)?.grad() {
                kept.insert(grad.0);
            }
        }
        for index in 0..self.tensors.slot_count() {
            if !kept.contains(&index) && self.tensors.slot_live(index) {
                self.tensors.release_slot(index);
            }
        }
        self.graph.clear();
        for &id in keep {
            let node = self.graph.alloc_node(id)?;
            self.tensors.get_mut(id)?.set_node(node);
        }
        Ok(())
    }

    fn attach_node(&mut self, id: TensorId) -> GradResult<()> {
        let node = self.graph.alloc_node(id)?;
        self.tensors.get_mut(id)?.set_node(node);
        Ok(())
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}
