//! Sliding-window KV-cache: ring buffer of `windowSize` tokens per layer
//! (spec §4.8). `writePos = startPos mod windowSize`; a write spanning the
//! wrap boundary is split into two copies.

use super::KvCache;
use crate::error::DopplerResult;

struct LayerRing {
    keys: Vec<f32>,
    values: Vec<f32>,
    total_tokens_seen: usize,
}

pub struct SlidingWindowCache {
    window_size: usize,
    stride: usize,
    layers: Vec<LayerRing>,
}

impl SlidingWindowCache {
    pub fn new(num_layers: usize, window_size: usize, stride: usize) -> Self {
        Self {
            window_size,
            stride,
            layers: (0..num_layers)
                .map(|_| LayerRing {
                    keys: vec![0.0; window_size * stride],
                    values: vec![0.0; window_size * stride],
                    total_tokens_seen: 0,
                })
                .collect(),
        }
    }

    pub fn total_tokens_seen(&self, layer_idx: usize) -> usize {
        self.layers[layer_idx].total_tokens_seen
    }
}

impl KvCache for SlidingWindowCache {
    fn stride(&self) -> usize {
        self.stride
    }

    fn max_seq_len(&self) -> usize {
        self.window_size
    }

    fn update(&mut self, layer_idx: usize, keys: &[f32], values: &[f32], start_pos: usize) -> DopplerResult<()> {
        let num_tokens = keys.len() / self.stride;
        let window = self.window_size;
        let stride = self.stride;
        let layer = &mut self.layers[layer_idx];

        for token in 0..num_tokens {
            let write_pos = (start_pos + token) % window;
            let src = token * stride..(token + 1) * stride;
            let dst = write_pos * stride..(write_pos + 1) * stride;
            layer.keys[dst.clone()].copy_from_slice(&keys[src.clone()]);
            layer.values[dst].copy_from_slice(&values[src]);
        }

        layer.total_tokens_seen = layer.total_tokens_seen.max(start_pos + num_tokens);
        Ok(())
    }

    fn get(&self, layer_idx: usize, start_pos: Option<usize>, end_pos: Option<usize>) -> (Vec<f32>, Vec<f32>) {
        let layer = &self.layers[layer_idx];
        let observable = self.seq_len(layer_idx);
        let start = start_pos.unwrap_or(0);
        let end = end_pos.unwrap_or(observable);

        // Logical positions [start, end) map through the ring at
        // `(total_tokens_seen - observable + pos) mod window`.
        let base = layer.total_tokens_seen.saturating_sub(observable);
        let mut keys = Vec::with_capacity((end - start) * self.stride);
        let mut values = Vec::with_capacity((end - start) * self.stride);
        for logical in start..end {
            let write_pos = (base + logical) % self.window_size;
            let offset = write_pos * self.stride;
            keys.extend_from_slice(&layer.keys[offset..offset + self.stride]);
            values.extend_from_slice(&layer.values[offset..offset + self.stride]);
        }
        (keys, values)
    }

    /// Observable `seqLen` is `min(windowSize, totalTokensSeen)` (spec §4.8).
    fn seq_len(&self, layer_idx: usize) -> usize {
        self.window_size.min(self.layers[layer_idx].total_tokens_seen)
    }

    fn truncate(&mut self, n: usize) {
        for layer in &mut self.layers {
            layer.total_tokens_seen = layer.total_tokens_seen.min(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_ten_decodes_window_four_retains_last_four_tokens() {
        let mut cache = SlidingWindowCache::new(1, 4, 1);
        for i in 0..10 {
            cache.update(0, &[i as f32], &[i as f32], i).unwrap();
        }
        assert_eq!(cache.seq_len(0), 4);
        assert_eq!(cache.total_tokens_seen(0), 10);
        let (keys, _) = cache.get(0, None, None);
        assert_eq!(keys, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn write_spanning_wrap_boundary_splits_correctly() {
        let mut cache = SlidingWindowCache::new(1, 4, 1);
        cache.update(0, &[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], 0).unwrap();
        // Next write covers positions 3,4,5 — position 4 and 5 wrap to slots 0,1.
        cache.update(0, &[3.0, 4.0, 5.0], &[3.0, 4.0, 5.0], 3).unwrap();
        let (keys, _) = cache.get(0, None, None);
        assert_eq!(keys, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn only_last_min_window_p_plus_one_keys_influence_output() {
        let window = 3;
        let mut cache = SlidingWindowCache::new(1, window, 1);
        for i in 0..2 {
            cache.update(0, &[i as f32], &[i as f32], i).unwrap();
        }
        // totalTokensSeen=2 < window=3: observable seq_len is 2, not 3.
        assert_eq!(cache.seq_len(0), 2);
    }
}
