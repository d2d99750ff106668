//! Paged KV-cache: lazily allocated pages of `pageSize` tokens, no shift on
//! overflow (spec §4.8).

use super::KvCache;
use crate::error::{DopplerError, DopplerResult};
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: usize = 256;

struct LayerPages {
    pages: HashMap<usize, (Vec<f32>, Vec<f32>)>,
    seq_len: usize,
}

pub struct PagedCache {
    max_seq_len: usize,
    stride: usize,
    page_size: usize,
    layers: Vec<LayerPages>,
}

impl PagedCache {
    pub fn new(num_layers: usize, max_seq_len: usize, stride: usize, page_size: usize) -> Self {
        Self {
            max_seq_len,
            stride,
            page_size,
            layers: (0..num_layers)
                .map(|_| LayerPages {
                    pages: HashMap::new(),
                    seq_len: 0,
                })
                .collect(),
        }
    }

    fn page_of(&self, pos: usize) -> usize {
        pos / self.page_size
    }
}

impl KvCache for PagedCache {
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

        let page_size = self.page_size;
        let stride = self.stride;
        let layer = &mut self.layers[layer_idx];

        for token in 0..num_tokens {
            let pos = start_pos + token;
            let page_idx = pos / page_size;
            let within_page = pos % page_size;
            let entry = layer
                .pages
                .entry(page_idx)
                .or_insert_with(|| (vec![0.0; page_size * stride], vec![0.0; page_size * stride]));
            let k_slice = &keys[token * stride..(token + 1) * stride];
            let v_slice = &values[token * stride..(token + 1) * stride];
            let offset = within_page * stride;
            entry.0[offset..offset + stride].copy_from_slice(k_slice);
            entry.1[offset..offset + stride].copy_from_slice(v_slice);
        }

        layer.seq_len = layer.seq_len.max(start_pos + num_tokens);
        Ok(())
    }

    fn get(&self, layer_idx: usize, start_pos: Option<usize>, end_pos: Option<usize>) -> (Vec<f32>, Vec<f32>) {
        let layer = &self.layers[layer_idx];
        let start = start_pos.unwrap_or(0);
        let end = end_pos.unwrap_or(layer.seq_len);

        let mut keys = Vec::with_capacity((end - start) * self.stride);
        let mut values = Vec::with_capacity((end - start) * self.stride);
        for pos in start..end {
            let page_idx = self.page_of(pos);
            let within_page = pos % self.page_size;
            if let Some((k_page, v_page)) = layer.pages.get(&page_idx) {
                let offset = within_page * self.stride;
                keys.extend_from_slice(&k_page[offset..offset + self.stride]);
                values.extend_from_slice(&v_page[offset..offset + self.stride]);
            } else {
                keys.extend(std::iter::repeat(0.0).take(self.stride));
                values.extend(std::iter::repeat(0.0).take(self.stride));
            }
        }
        (keys, values)
    }

    fn seq_len(&self, layer_idx: usize) -> usize {
        self.layers[layer_idx].seq_len
    }

    fn truncate(&mut self, n: usize) {
        for layer in &mut self.layers {
            layer.seq_len = layer.seq_len.min(n);
        }
    }
}
