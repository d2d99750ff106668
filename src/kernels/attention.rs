//! Fused multi-head attention: causal mask, sliding window, attention
//! sinks, GQA (spec §4.7). Blocked online-softmax accumulator semantics,
//! expressed here as a direct two-pass CPU reference (same result, no
//! need to block since there's no GPU memory budget on the host).

/// `Q[QT,nH,hD]`, `K[KT,nKV,hD]`, `V[KT,nKV,hD]`. `scale = 1/sqrt(hD)`.
/// `attention_sinks`, if present, is a per-head additive logit baseline
/// folded into the softmax denominator (one phantom key per head).
#[allow(clippy::too_many_arguments)]
pub fn fused_attention_cpu_ref(
    q: &[f32],
    qt: usize,
    k: &[f32],
    v: &[f32],
    kt: usize,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
    scale: f32,
    is_causal: bool,
    start_pos: usize,
    sliding_window: Option<usize>,
    attention_sinks: Option<&[f32]>,
) -> Vec<f32> {
    let group = num_heads / num_kv_heads;
    let mut out = vec![0f32; qt * num_heads * head_dim];

    for query_pos in 0..qt {
        for h in 0..num_heads {
            let kv_head = h / group;
            let mut logits = Vec::with_capacity(kt);
            for key_pos in 0..kt {
                let skip = (is_causal && key_pos > query_pos + start_pos)
                    || sliding_window
                        .map(|w| key_pos + w <= query_pos + start_pos)
                        .unwrap_or(false);
                if skip {
                    logits.push(f32::NEG_INFINITY);
                    continue;
                }
                let q_base = (query_pos * num_heads + h) * head_dim;
                let k_base = (key_pos * num_kv_heads + kv_head) * head_dim;
                let mut dot = 0f32;
                for d in 0..head_dim {
                    dot += q[q_base + d] * k[k_base + d];
                }
                logits.push(dot * scale);
            }

            let sink = attention_sinks.map(|s| s[h]).unwrap_or(f32::NEG_INFINITY);
            let max_logit = logits.iter().cloned().fold(sink, f32::max);
            let mut denom = if sink > f32::NEG_INFINITY { (sink - max_logit).exp() } else { 0.0 };
            let mut weights = vec![0f32; kt];
            for (i, &logit) in logits.iter().enumerate() {
                if logit == f32::NEG_INFINITY {
                    continue;
                }
                let w = (logit - max_logit).exp();
                weights[i] = w;
                denom += w;
            }

            let out_base = (query_pos * num_heads + h) * head_dim;
            if denom <= 0.0 {
                continue;
            }
            for key_pos in 0..kt {
                let w = weights[key_pos] / denom;
                if w == 0.0 {
                    continue;
                }
                let v_base = (key_pos * num_kv_heads + kv_head) * head_dim;
                for d in 0..head_dim {
                    out[out_base + d] += w * v[v_base + d];
                }
            }
        }
    }

    out
}
