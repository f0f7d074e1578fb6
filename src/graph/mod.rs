pub mod engine;

use crate::errors::{GradError, GradResult};
use crate::tensor::Tensor;
use crate::types::{LinkId, NodeId, PoolSizing, TensorId, MAX_OPERANDS};

/// Per-operand gradient-propagation rule.
///
/// Receives the consumer's operand snapshot, the gradient flowing into the
/// consumer, and a zeroed buffer of the operand's shape to write the partial
/// derivative into.
pub type BackwardFn = fn(&BackwardCtx<'_>, &Tensor, &mut Tensor) -> GradResult<()>;

/// Read-only view of a consumer's operand snapshot, handed to backward rules.
pub struct BackwardCtx<'a> {
    pub(crate) operands: [Option<&'a Tensor>; MAX_OPERANDS],
}

impl<'a> BackwardCtx<'a> {
    /// Returns the operand recorded at `slot`.
    pub fn operand(&self, slot: usize) -> GradResult<&'a Tensor> {
        if slot >= MAX_OPERANDS {
            return Err(GradError::IndexOutOfBounds { index: slot, limit: MAX_OPERANDS });
        }
        self.operands[slot]
            .ok_or_else(|| GradError::TensorNull(format!("operand slot {slot} was never recorded")))
    }
}

/// Per-tracked-tensor graph record: back-reference to the tensor, the
/// outgoing edges toward consumers, and (once this tensor is itself a
/// consumer) the operand snapshot shared by every incoming edge.
pub(crate) struct Node {
    pub tensor: TensorId,
    pub links: Vec<LinkId>,
    pub operands: Option<[Option<TensorId>; MAX_OPERANDS]>,
}

/// An edge from an operand tensor to the consumer produced from it.
pub(crate) struct Link {
    pub consumer: TensorId,
    pub operand_index: usize,
    pub backward: BackwardFn,
}

/// Pooled storage for graph nodes and links, with free-list recycling like
/// the tensor arena.
pub struct GraphArena {
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<usize>,
    links: Vec<Option<Link>>,
    free_links: Vec<usize>,
    max_nodes: Option<usize>,
    max_links: Option<usize>,
}

impl GraphArena {
    pub fn new(sizing: &PoolSizing) -> Self {
        let mut nodes = Vec::with_capacity(sizing.initial_nodes);
        let mut free_nodes = Vec::with_capacity(sizing.initial_nodes);
        for i in 0..sizing.initial_nodes {
            nodes.push(None);
            free_nodes.push(i);
        }
        let mut links = Vec::with_capacity(sizing.initial_links);
        let mut free_links = Vec::with_capacity(sizing.initial_links);
        for i in 0..sizing.initial_links {
            links.push(None);
            free_links.push(i);
        }
        Self {
            nodes,
            free_nodes,
            links,
            free_links,
            max_nodes: sizing.max_nodes,
            max_links: sizing.max_links,
        }
    }

    /// Allocates a node for `tensor` with no edges and no snapshot.
    pub fn alloc_node(&mut self, tensor: TensorId) -> GradResult<NodeId> {
        let node = Node { tensor, links: Vec::new(), operands: None };
        let index = match self.free_nodes.pop() {
            Some(i) => i,
            None => {
                if let Some(cap) = self.max_nodes {
                    if self.nodes.len() >= cap {
                        return Err(GradError::OutOfMemory(format!(
                            "node pool at capacity ({cap} slots)"
                        )));
                    }
                }
                tracing::trace!(nodes = self.nodes.len() + 1, "node pool grows");
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        };
        self.nodes[index] = Some(node);
        Ok(NodeId(index))
    }

    /// Releases a node together with its outgoing links.
    pub fn free_node(&mut self, id: NodeId) -> GradResult<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(|s| s.take())
            .ok_or_else(|| GradError::TensorNull(format!("stale node handle {:?}", id)))?;
        for link in node.links {
            self.free_link(link)?;
        }
        self.free_nodes.push(id.0);
        Ok(())
    }

    pub fn free_link(&mut self, id: LinkId) -> GradResult<()> {
        self.links
            .get_mut(id.0)
            .and_then(|s| s.take())
            .ok_or_else(|| GradError::TensorNull(format!("stale link handle {:?}", id)))?;
        self.free_links.push(id.0);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|s| s.is_some()).count()
    }

    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|s| s.is_some()).count()
    }

    /// Drops every node and link, returning all slots to the free lists.
    pub fn clear(&mut self) {
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free_nodes.push(i);
            }
        }
        for (i, slot) in self.links.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free_links.push(i);
            }
        }
    }

    pub(crate) fn alloc_link(&mut self, link: Link) -> GradResult<LinkId> {
        let index = match self.free_links.pop() {
            Some(i) => i,
            None => {
                if let Some(cap) = self.max_links {
                    if self.links.len() >= cap {
                        return Err(GradError::OutOfMemory(format!(
                            "link pool at capacity ({cap} slots)"
                        )));
                    }
                }
                tracing::trace!(links = self.links.len() + 1, "link pool grows");
                self.links.push(None);
                self.links.len() - 1
            }
        };
        self.links[index] = Some(link);
        Ok(LinkId(index))
    }

    pub(crate) fn node(&self, id: NodeId) -> GradResult<&Node> {
        self.nodes
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| GradError::TensorNull(format!("stale node handle {:?}", id)))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> GradResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| GradError::TensorNull(format!("stale node handle {:?}", id)))
    }

    pub(crate) fn link(&self, id: LinkId) -> GradResult<&Link> {
        self.links
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| GradError::TensorNull(format!("stale link handle {:?}", id)))
    }
}
