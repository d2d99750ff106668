//! Token sampler (spec §4.12): temperature / top-k / top-p / repetition
//! penalty, falling back to argmax at `temperature == 0`.

use rand::Rng;
use serde::{Deserialize, Serialize};

const REPETITION_WINDOW: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerOptions {
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 40,
            top_p: 1.0,
            repetition_penalty: 1.0,
        }
    }
}

/// Samples one token id from `logits` given prior `previous_tokens`.
/// `rng` is injected so tests can pin the draw with a seeded generator.
pub fn sample(logits: &[f32], options: &SamplerOptions, previous_tokens: &[u32], rng: &mut impl Rng) -> u32 {
    if options.temperature == 0.0 {
        return argmax(logits);
    }

    let mut scored = apply_repetition_penalty(logits, options.repetition_penalty, previous_tokens);
    for v in scored.iter_mut() {
        *v /= options.temperature;
    }

    let probs = softmax(&scored);
    let restricted = top_k_restrict(&probs, options.top_k);
    let truncated = top_p_truncate(&restricted, options.top_p);
    let renormalized = renormalize(&truncated);

    draw(&renormalized, rng)
}

fn argmax(logits: &[f32]) -> u32 {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx as u32)
        .unwrap_or(0)
}

/// Divides by the penalty if positive logit, multiplies if negative (spec
/// §4.12), applied only to tokens within the last `REPETITION_WINDOW`.
fn apply_repetition_penalty(logits: &[f32], penalty: f32, previous_tokens: &[u32]) -> Vec<f32> {
    let mut out = logits.to_vec();
    if penalty == 1.0 {
        return out;
    }
    let start = previous_tokens.len().saturating_sub(REPETITION_WINDOW);
    for &token in &previous_tokens[start..] {
        if let Some(v) = out.get_mut(token as usize) {
            *v = if *v > 0.0 { *v / penalty } else { *v * penalty };
        }
    }
    out
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// Zeroes every probability outside the top `k` by value, keeping indices.
fn top_k_restrict(probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = probs.iter().enumerate().map(|(i, &p)| (i as u32, p)).collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let k = k.min(indexed.len()).max(1);
    indexed.truncate(k);
    indexed
}

/// Truncates to the smallest prefix (by descending probability, already
/// sorted by `top_k_restrict`) whose cumulative probability reaches `top_p`.
fn top_p_truncate(sorted: &[(u32, f32)], top_p: f32) -> Vec<(u32, f32)> {
    if top_p >= 1.0 {
        return sorted.to_vec();
    }
    let mut out = Vec::new();
    let mut cumulative = 0.0;
    for &(idx, p) in sorted {
        out.push((idx, p));
        cumulative += p;
        if cumulative >= top_p {
            break;
        }
    }
    if out.is_empty() {
        out.push(sorted[0]);
    }
    out
}

fn renormalize(candidates: &[(u32, f32)]) -> Vec<(u32, f32)> {
    let sum: f32 = candidates.iter().map(|(_, p)| p).sum();
    if sum == 0.0 {
        return candidates.to_vec();
    }
    candidates.iter().map(|&(idx, p)| (idx, p / sum)).collect()
}

fn draw(candidates: &[(u32, f32)], rng: &mut impl Rng) -> u32 {
    let draw: f32 = rng.gen_range(0.0..1.0);
    let mut cumulative = 0.0;
    for &(idx, p) in candidates {
        cumulative += p;
        if draw <= cumulative {
            return idx;
        }
    }
    candidates.last().map(|&(idx, _)| idx).unwrap_or(0)
}
