use serde::{Serialize, Deserialize};

/// Maximum tensor rank the engine accepts.
pub const MAX_RANK: usize = 4;

/// Width of the operand snapshot attached to every consumer node.
/// Four slots cover every operator in the crate (linear uses three).
pub const MAX_OPERANDS: usize = 4;

/// Handle to a tensor slot inside a [`crate::TensorArena`].
///
/// Handles are plain pool indices: freeing a tensor and allocating a new one
/// may recycle the slot, at which point stale handles alias the new tensor.
/// Callers must drop handles they have freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(pub(crate) usize);

/// Handle to a graph node inside a [`crate::graph::GraphArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Handle to an edge record inside a [`crate::graph::GraphArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub(crate) usize);

/// Pool sizing knobs for the allocator pair.
///
/// The initial counts only control how many slots are reserved up front; the
/// pools grow past them on demand. The optional caps turn growth beyond the
/// limit into an `OutOfMemory` error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSizing {
    pub initial_tensors: usize,
    pub initial_nodes: usize,
    pub initial_links: usize,
    pub max_tensors: Option<usize>,
    pub max_nodes: Option<usize>,
    pub max_links: Option<usize>,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            initial_tensors: 64,
            initial_nodes: 64,
            initial_links: 128,
            max_tensors: None,
            max_nodes: None,
            max_links: None,
        }
    }
}

/// Hyperparameters for the example training loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub momentum: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            momentum: 0.9,
            epochs: 50,
            batch_size: 8,
            seed: 42,
        }
    }
}
