//! KV-cache variants: contiguous, paged, sliding-window (spec §4.8).

pub mod contiguous;
pub mod paged;
pub mod sliding;

pub use contiguous::ContiguousCache;
pub use paged::PagedCache;
pub use sliding::SlidingWindowCache;

use crate::error::DopplerResult;

/// Shared interface for all three cache variants (spec §4.8). `update` and
/// `get` operate on host-resident key/value slices in tests and on the CPU
/// reference path; `update_from_gpu` is the device-resident counterpart
/// used by the real layer executor (spec §4.10 step 5).
pub trait KvCache {
    /// Number of key/value-head-groups * head_dim elements per token.
    fn stride(&self) -> usize;

    fn max_seq_len(&self) -> usize;

    /// Writes `keys`/`values` (each `num_tokens * stride()` elements) for
    /// `layer_idx` starting at `start_pos`.
    fn update(&mut self, layer_idx: usize, keys: &[f32], values: &[f32], start_pos: usize) -> DopplerResult<()>;

    /// Returns `(keys, values)` for `layer_idx` over `[start_pos, end_pos)`,
    /// defaulting to the full observable range when bounds are `None`.
    fn get(&self, layer_idx: usize, start_pos: Option<usize>, end_pos: Option<usize>) -> (Vec<f32>, Vec<f32>);

    /// Observable sequence length for `layer_idx` (after truncation/wrap).
    fn seq_len(&self, layer_idx: usize) -> usize;

    /// `seqLen = min(seqLen, n)`; physical bytes are not zeroed (spec §4.8).
    fn truncate(&mut self, n: usize);
}
