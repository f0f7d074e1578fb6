pub mod arena;
pub use arena::TensorArena;

use ndarray::ArrayD;

use crate::types::{NodeId, TensorId};

/// A dense row-major tensor of 64-bit floats.
///
/// A tensor may carry a reference to its graph node (making it
/// gradient-tracked) and a reference to its gradient accumulator, an
/// untracked tensor of identical shape living in the same arena. Scratch
/// tensors allocated by the backward engine carry neither.
#[derive(Debug)]
pub struct Tensor {
    data: ArrayD<f64>,
    node: Option<NodeId>,
    grad: Option<TensorId>,
}

impl Tensor {
    pub(crate) fn new(data: ArrayD<f64>) -> Self {
        Self { data, node: None, grad: None }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether this tensor participates in the computational graph.
    pub fn is_tracked(&self) -> bool {
        self.node.is_some()
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn grad(&self) -> Option<TensorId> {
        self.grad
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub(crate) fn set_node(&mut self, node: NodeId) {
        self.node = Some(node);
    }

    pub(crate) fn set_grad(&mut self, grad: TensorId) {
        self.grad = Some(grad);
    }

    pub(crate) fn take_grad(&mut self) -> Option<TensorId> {
        self.grad.take()
    }

    pub(crate) fn into_raw(self) -> Vec<f64> {
        self.data.into_raw_vec()
    }
}
