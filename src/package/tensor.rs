//! Tensor descriptors: single-shard or multi-shard span layout (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Dtype {
    F32,
    F16,
    Q4_K_M,
    MXFP4,
}

impl Dtype {
    /// Bytes consumed on disk / in a shard for `count` logical elements.
    /// Quantized types are block-structured (spec §3, §6.4): Q4_K_M packs
    /// 256 elements into 144 bytes; MXFP4 packs 32 elements into 1 scale
    /// byte + 16 mantissa bytes.
    pub fn packed_size(&self, count: usize) -> usize {
        match self {
            Dtype::F32 => count * 4,
            Dtype::F16 => count * 2,
            Dtype::Q4_K_M => count.div_ceil(256) * 144,
            Dtype::MXFP4 => count.div_ceil(32) * 17,
        }
    }
}

/// One contiguous byte range within a single shard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShardSpan {
    pub shard_index: usize,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub shape: Vec<u64>,
    pub dtype: Dtype,
    pub size: u64,
    pub layout: TensorLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TensorLayout {
    Single { shard: usize, offset: u64 },
    Multi { spans: Vec<ShardSpan> },
}

impl TensorDescriptor {
    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    /// spec §3 invariant: concatenation of spans equals the tensor's
    /// logical byte size.
    pub fn spans_cover_size(&self) -> bool {
        match &self.layout {
            TensorLayout::Single { .. } => true,
            TensorLayout::Multi { spans } => {
                spans.iter().map(|s| s.size).sum::<u64>() == self.size
            }
        }
    }

    /// Every span (or the single shard) references a shard index strictly
    /// less than `shard_count`.
    pub fn references_only_shards_below(&self, shard_count: usize) -> bool {
        match &self.layout {
            TensorLayout::Single { shard, .. } => *shard < shard_count,
            TensorLayout::Multi { spans } => spans.iter().all(|s| s.shard_index < shard_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q4_k_m_packs_256_elements_into_144_bytes() {
        assert_eq!(Dtype::Q4_K_M.packed_size(256), 144);
        assert_eq!(Dtype::Q4_K_M.packed_size(257), 288);
    }

    #[test]
    fn mxfp4_packs_32_elements_into_17_bytes() {
        assert_eq!(Dtype::MXFP4.packed_size(32), 17);
    }

    #[test]
    fn multi_span_coverage_checks_sum_equals_size() {
        let t = TensorDescriptor {
            shape: vec![4, 4],
            dtype: Dtype::F32,
            size: 64,
            layout: TensorLayout::Multi {
                spans: vec![
                    ShardSpan {
                        shard_index: 0,
                        offset: 0,
                        size: 32,
                    },
                    ShardSpan {
                        shard_index: 1,
                        offset: 0,
                        size: 32,
                    },
                ],
            },
        };
        assert!(t.spans_cover_size());
        assert!(t.references_only_shards_below(2));
        assert!(!t.references_only_shards_below(1));
    }

    #[test]
    fn multi_span_coverage_rejects_mismatched_sum() {
        let t = TensorDescriptor {
            shape: vec![4, 4],
            dtype: Dtype::F32,
            size: 64,
            layout: TensorLayout::Multi {
                spans: vec![ShardSpan {
                    shard_index: 0,
                    offset: 0,
                    size: 32,
                }],
            },
        };
        assert!(!t.spans_cover_size());
    }
}
