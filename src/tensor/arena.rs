use ndarray::{ArrayD, IxDyn};

use crate::errors::{GradError, GradResult};
use crate::tensor::Tensor;
use crate::types::{PoolSizing, TensorId, MAX_RANK};

/// Pooled tensor storage with a free list of slots and a stash of recycled
/// raw buffers.
///
/// Allocation never splits or fragments: a request either reuses a recycled
/// buffer (resized when the new element count exceeds its capacity) or takes
/// a fresh one. Freed slots keep their buffer out of the global allocator
/// until the next request of any shape.
pub struct TensorArena {
    slots: Vec<Option<Tensor>>,
    free: Vec<usize>,
    spare: Vec<Vec<f64>>,
    max_slots: Option<usize>,
}

impl TensorArena {
    pub fn new(sizing: &PoolSizing) -> Self {
        let mut slots = Vec::with_capacity(sizing.initial_tensors);
        let mut free = Vec::with_capacity(sizing.initial_tensors);
        for i in 0..sizing.initial_tensors {
            slots.push(None);
            free.push(i);
        }
        Self { slots, free, spare: Vec::new(), max_slots: sizing.max_tensors }
    }

    /// Allocates an untracked tensor. Contents are unspecified.
    pub fn alloc_no_grad(&mut self, shape: &[usize]) -> GradResult<TensorId> {
        let data = self.build_buffer(shape)?;
        self.place(Tensor::new(data))
    }

    /// Allocates an untracked tensor with a zeroed buffer.
    pub fn alloc_no_grad_zero(&mut self, shape: &[usize]) -> GradResult<TensorId> {
        // build_buffer zeroes recycled contents already
        self.alloc_no_grad(shape)
    }

    /// Adopts an existing array as an untracked tensor.
    pub fn alloc_from(&mut self, data: ArrayD<f64>) -> GradResult<TensorId> {
        check_rank(data.shape())?;
        self.place(Tensor::new(data))
    }

    /// Releases a tensor and, if present, its gradient accumulator.
    /// The caller is responsible for releasing the graph node separately.
    pub fn free(&mut self, id: TensorId) -> GradResult<()> {
        let mut tensor = self.take(id)?;
        if let Some(grad) = tensor.take_grad() {
            self.free_no_grad(grad)?;
        }
        self.recycle(id, tensor);
        Ok(())
    }

    /// Releases an untracked tensor (scratch or gradient buffer).
    pub fn free_no_grad(&mut self, id: TensorId) -> GradResult<()> {
        let tensor = self.take(id)?;
        self.recycle(id, tensor);
        Ok(())
    }

    pub fn get(&self, id: TensorId) -> GradResult<&Tensor> {
        self.slots
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| GradError::TensorNull(format!("stale handle {:?}", id)))
    }

    pub fn get_mut(&mut self, id: TensorId) -> GradResult<&mut Tensor> {
        self.slots
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| GradError::TensorNull(format!("stale handle {:?}", id)))
    }

    /// Number of live tensors.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Total slot count, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Raw buffers waiting to be recycled.
    pub fn spare_buffers(&self) -> usize {
        self.spare.len()
    }

    /// Moves a tensor out of its slot, leaving the slot reserved. Pair with
    /// [`restore`](Self::restore); used where a kernel needs exclusive access
    /// to one tensor while reading others from the arena.
    pub(crate) fn take(&mut self, id: TensorId) -> GradResult<Tensor> {
        self.slots
            .get_mut(id.0)
            .and_then(|s| s.take())
            .ok_or_else(|| GradError::TensorNull(format!("stale handle {:?}", id)))
    }

    pub(crate) fn restore(&mut self, id: TensorId, tensor: Tensor) {
        self.slots[id.0] = Some(tensor);
    }

    /// Frees a slot without touching the tensor's grad reference. Used by the
    /// tape's bulk reset where every non-kept slot dies in one sweep.
    pub(crate) fn release_slot(&mut self, index: usize) {
        if let Some(tensor) = self.slots[index].take() {
            self.recycle(TensorId(index), tensor);
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot_live(&self, index: usize) -> bool {
        self.slots[index].is_some()
    }

    fn place(&mut self, tensor: Tensor) -> GradResult<TensorId> {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                if let Some(cap) = self.max_slots {
                    if self.slots.len() >= cap {
                        return Err(GradError::OutOfMemory(format!(
                            "tensor pool at capacity ({cap} slots)"
                        )));
                    }
                }
                tracing::trace!(slots = self.slots.len() + 1, "tensor pool grows");
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[index] = Some(tensor);
        Ok(TensorId(index))
    }

    fn recycle(&mut self, id: TensorId, tensor: Tensor) {
        self.free.push(id.0);
        self.spare.push(tensor.into_raw());
    }

    fn build_buffer(&mut self, shape: &[usize]) -> GradResult<ArrayD<f64>> {
        check_rank(shape)?;
        let len: usize = shape.iter().product();
        let mut raw = match self.spare.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        };
        raw.resize(len, 0.0);
        ArrayD::from_shape_vec(IxDyn(shape), raw).map_err(|_| GradError::DataSizeMismatch {
            shape: shape.to_vec(),
            found: len,
        })
    }
}

fn check_rank(shape: &[usize]) -> GradResult<()> {
    if shape.is_empty() || shape.len() > MAX_RANK {
        return Err(GradError::WrongShape {
            shape: shape.to_vec(),
            reason: format!("rank must be between 1 and {MAX_RANK}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_recycled() {
        let mut arena = TensorArena::new(&PoolSizing { initial_tensors: 1, ..Default::default() });
        let a = arena.alloc_no_grad_zero(&[2, 2]).unwrap();
        arena.free_no_grad(a).unwrap();
        let b = arena.alloc_no_grad_zero(&[4, 4]).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena.capacity(), 1);
        assert_eq!(arena.get(b).unwrap().len(), 16);
    }

    #[test]
    fn capped_pool_reports_exhaustion() {
        let sizing = PoolSizing { initial_tensors: 0, max_tensors: Some(1), ..Default::default() };
        let mut arena = TensorArena::new(&sizing);
        arena.alloc_no_grad(&[1]).unwrap();
        let err = arena.alloc_no_grad(&[1]).unwrap_err();
        assert!(matches!(err, GradError::OutOfMemory(_)));
    }

    #[test]
    fn rank_limit_is_enforced() {
        let mut arena = TensorArena::new(&PoolSizing::default());
        let err = arena.alloc_no_grad(&[1, 1, 1, 1, 1]).unwrap_err();
        assert!(matches!(err, GradError::WrongShape { .. }));
    }
}
