//! Softmax and MoE top-k router (spec §4.7).

/// Numerically stable softmax over the last axis of `X[T,H]`.
pub fn softmax_cpu_ref(x: &[f32], t: usize, h: usize) -> Vec<f32> {
    let mut out = vec![0f32; t * h];
    for row in 0..t {
        let slice = &x[row * h..row * h + h];
        let max = slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0f32;
        for (i, &v) in slice.iter().enumerate() {
            let e = (v - max).exp();
            out[row * h + i] = e;
            sum += e;
        }
        for i in 0..h {
            out[row * h + i] /= sum;
        }
    }
    out
}

/// Per-token router: softmax over expert logits, then top-k selection with
/// renormalized weights (spec §4.7, §4.10).
pub fn topk_router_cpu_ref(logits: &[f32], num_experts: usize, top_k: usize) -> (Vec<usize>, Vec<f32>) {
    let probs = softmax_cpu_ref(logits, 1, num_experts);
    let mut indexed: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    indexed.truncate(top_k);

    let sum: f32 = indexed.iter().map(|(_, p)| p).sum();
    let indices = indexed.iter().map(|(i, _)| *i).collect();
    let weights = indexed.iter().map(|(_, p)| p / sum).collect();
    (indices, weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_rows_sum_to_one_and_have_no_nan() {
        let x = vec![1.0, 2.0, 3.0, -1.0, 0.0, 5.0];
        let out = softmax_cpu_ref(&x, 2, 3);
        for row in 0..2 {
            let sum: f32 = out[row * 3..row * 3 + 3].iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!(out[row * 3..row * 3 + 3].iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn router_selects_top_k_and_renormalizes() {
        let logits = vec![10.0, 1.0, 1.0, 1.0];
        let (indices, weights) = topk_router_cpu_ref(&logits, 4, 2);
        assert_eq!(indices.len(), 2);
        assert_eq!(indices[0], 0);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
