pub mod data;
pub mod errors;
pub mod graph;
pub mod layers;
pub mod models;
pub mod ops;
pub mod optim;
pub mod tape;
pub mod tensor;
pub mod types;

pub use errors::{GradError, GradResult};
pub use tape::Tape;
pub use tensor::{Tensor, TensorArena};
pub use types::{PoolSizing, TensorId, TrainConfig, MAX_OPERANDS, MAX_RANK};
