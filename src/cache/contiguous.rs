//! Contiguous KV-cache: pre-allocated `[maxSeqLen, nKV*hD]` per layer,
//! per K and V (spec §4.8).

use super::KvCache;
use crate::error::{DopplerError, DopplerResult};

pub struct ContiguousCache {
    max_seq_len: usize,
    stride: usize,
    keys: Vec<Vec<f32>>,
    values: Vec<Vec<f32>>,
    seq_lens: Vec<usize>,
}

impl ContiguousCache {
    pub fn new(num_layers: usize, max_seq_len: usize, stride: usize) -> Self {
        Self {
            max_seq_len,
            stride,
            keys: vec![vec![0.0; max_seq_len * stride]; num_layers],
            values: vec![vec![0.0; max_seq_len * stride]; num_layers],
            seq_lens: vec![0; num_layers],
        }
    }
}

impl KvCache for ContiguousCache {
    fn stride(&self) -> usize {
        self.stride
    }

    fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    fn update(&mut self, layer_idx: usize, keys: &[f32], values: &[f32], start_pos: usize) -> DopplerResult<()> {
        let num_tokens = keys.len() / self.stride;
        if start_pos + num_tokens > self.max_seq_len {
            return Err(DopplerError::CacheOverflow {
                start_pos,
                num_tokens,
                max_seq_len: self.max_seq_len,
            });
        }

        let offset = start_pos * self.stride;
        self.keys[layer_idx][offset..offset + keys.len()].copy_from_slice(keys);
        self.values[layer_idx][offset..offset + values.len()].copy_from_slice(values);
        self.seq_lens[layer_idx] = (start_pos + num_tokens).max(self.seq_lens[layer_idx]);
        Ok(())
    }

    fn get(&self, layer_idx: usize, start_pos: Option<usize>, end_pos: Option<usize>) -> (Vec<f32>, Vec<f32>) {
        let start = start_pos.unwrap_or(0);
        let end = end_pos.unwrap_or(self.seq_lens[layer_idx]);
        let lo = start * self.stride;
        let hi = end * self.stride;
        (
            self.keys[layer_idx][lo..hi].to_vec(),
            self.values[layer_idx][lo..hi].to_vec(),
        )
    }

    fn seq_len(&self, layer_idx: usize) -> usize {
        self.seq_lens[layer_idx]
    }

    fn truncate(&mut self, n: usize) {
        for len in &mut self.seq_lens {
            *len = (*len).min(n);
        }
    }
}
