//! Inference config derivation (spec §3 "Config (parsed)", §4.5) and the
//! architecture-variant tag replacing boolean flags (spec §9 redesign note).

use crate::package::{ArchitectureParams, Manifest, TensorDescriptor};
use serde::{Deserialize, Serialize};

/// Replaces `isGemma`/`isGptOss` boolean flags per spec §9: the layer
/// executor pattern-matches on this instead of branching on flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchVariant {
    Dense,
    Gemma(GemmaVersion),
    MixtralMoE,
    GptOssMoE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GemmaVersion {
    V1,
    V2,
    V3,
}

impl ArchVariant {
    pub fn is_moe(&self) -> bool {
        matches!(self, ArchVariant::MixtralMoE | ArchVariant::GptOssMoE)
    }

    pub fn is_gemma3(&self) -> bool {
        matches!(self, ArchVariant::Gemma(GemmaVersion::V3))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Silu,
    Gelu,
}

/// Per-layer attention type, for architectures (GPT-OSS) that interleave
/// sliding-window and full-attention layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttentionType {
    Full,
    Sliding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub num_layers: usize,
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub num_heads: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
    pub vocab_size: usize,
    pub max_seq_len: usize,
    pub rope_theta: f64,
    pub rms_norm_eps: f64,
    pub rope_scaling_factor: f64,
    pub activation: Activation,
    pub arch: ArchVariant,
    pub scale_embeddings: bool,
    pub rms_norm_weight_offset: bool,
    pub sliding_window: Option<usize>,
    pub attention_types: Vec<AttentionType>,
    pub stop_tokens: Vec<u32>,
    pub tie_word_embeddings: bool,
}

const HEAD_DIM_CANDIDATES: [usize; 6] = [256, 128, 96, 80, 64, 160];

/// spec §4.5: prefer a `q_norm` weight's dimension; else the largest
/// candidate evenly dividing both Q and K projection output dims, subject
/// to `numHeads >= numKVHeads >= 1`; else `hiddenSize / 32`.
fn infer_head_dim(
    tensors: &std::collections::HashMap<String, TensorDescriptor>,
    q_proj_out: Option<usize>,
    k_proj_out: Option<usize>,
    num_heads: usize,
    num_kv_heads: usize,
    hidden_size: usize,
) -> usize {
    for (name, tensor) in tensors {
        if name.contains("q_norm") {
            if let Some(&dim) = tensor.shape.last() {
                return dim as usize;
            }
        }
    }

    if let (Some(q), Some(k)) = (q_proj_out, k_proj_out) {
        let mut best: Option<usize> = None;
        for &candidate in &HEAD_DIM_CANDIDATES {
            if q % candidate == 0 && k % candidate == 0 && num_heads >= num_kv_heads && num_kv_heads >= 1 {
                best = match best {
                    Some(b) if b >= candidate => Some(b),
                    _ => Some(candidate),
                };
            }
        }
        if let Some(dim) = best {
            return dim;
        }
    }

    (hidden_size / 32).max(1)
}

fn infer_vocab_size(
    config_field: Option<usize>,
    tokenizer_vocab: Option<usize>,
    tensors: &std::collections::HashMap<String, TensorDescriptor>,
) -> Option<usize> {
    let mut candidates: Vec<usize> = Vec::new();
    if let Some(v) = config_field {
        candidates.push(v);
    }
    if let Some(v) = tokenizer_vocab {
        candidates.push(v);
    }
    for (name, tensor) in tensors {
        if name.contains("embed_tokens") || name.contains("lm_head") {
            if let Some(&max_dim) = tensor.shape.iter().max() {
                candidates.push(max_dim as usize);
            }
        }
    }
    candidates.into_iter().filter(|v| *v > 1000).max()
}

fn infer_activation(architecture: &str) -> Activation {
    let lower = architecture.to_lowercase();
    if lower.contains("gelu") {
        Activation::Gelu
    } else if lower.contains("silu") || lower.contains("swish") {
        Activation::Silu
    } else {
        Activation::Silu
    }
}

fn infer_gemma_version(architecture: &str, model_type: &str) -> Option<GemmaVersion> {
    let haystack = format!("{architecture} {model_type}").to_lowercase();
    if !haystack.contains("gemma") {
        return None;
    }
    if haystack.contains("gemma3") || haystack.contains("gemma 3") || haystack.contains("gemma-3") {
        Some(GemmaVersion::V3)
    } else if haystack.contains("gemma2") || haystack.contains("gemma 2") || haystack.contains("gemma-2") {
        Some(GemmaVersion::V2)
    } else {
        Some(GemmaVersion::V1)
    }
}

fn infer_arch_variant(
    architecture: &str,
    model_type: &str,
    params: &ArchitectureParams,
    moe_present: bool,
) -> ArchVariant {
    if let Some(version) = infer_gemma_version(architecture, model_type) {
        return ArchVariant::Gemma(version);
    }
    if moe_present {
        let haystack = format!("{architecture} {model_type}").to_lowercase();
        if haystack.contains("gpt-oss") || haystack.contains("gpt_oss") || haystack.contains("gptoss") {
            return ArchVariant::GptOssMoE;
        }
        return ArchVariant::MixtralMoE;
    }
    let _ = params;
    ArchVariant::Dense
}

/// Derive a fully-resolved `InferenceConfig` from a validated manifest.
/// `q_proj_out`/`k_proj_out` are the output dims of the Q/K projection
/// tensors when known, used only as head-dim inference hints.
pub fn derive_config(
    manifest: &Manifest,
    q_proj_out: Option<usize>,
    k_proj_out: Option<usize>,
    tokenizer_vocab: Option<usize>,
    eos_token_ids: &[u32],
) -> crate::error::DopplerResult<InferenceConfig> {
    let params = &manifest.architecture_params;

    let is_gemma = infer_gemma_version(&manifest.architecture, &manifest.model_type).is_some();
    let moe_present = manifest.moe_config.is_some();
    let arch = infer_arch_variant(&manifest.architecture, &manifest.model_type, params, moe_present);

    let num_layers = params.num_layers.ok_or_else(|| {
        crate::error::DopplerError::Config("num_layers missing after validation".to_string())
    })?;
    let hidden_size = params.hidden_size.ok_or_else(|| {
        crate::error::DopplerError::Config("hidden_size missing after validation".to_string())
    })?;
    let num_heads = params.num_heads.unwrap_or(1);
    let num_kv_heads = params.num_kv_heads.unwrap_or(num_heads);

    let head_dim = params.head_dim.unwrap_or_else(|| {
        infer_head_dim(
            &manifest.tensors,
            q_proj_out,
            k_proj_out,
            num_heads,
            num_kv_heads,
            hidden_size,
        )
    });

    let vocab_size = infer_vocab_size(params.vocab_size, tokenizer_vocab, &manifest.tensors)
        .ok_or_else(|| crate::error::DopplerError::Config("vocab_size could not be inferred".to_string()))?;

    let rms_norm_eps = params.rms_norm_eps.unwrap_or(if is_gemma { 1e-6 } else { 1e-5 });
    let rope_theta = params.rope_theta.unwrap_or(if is_gemma { 1_000_000.0 } else { 10_000.0 });

    let stop_tokens = if !eos_token_ids.is_empty() {
        eos_token_ids.to_vec()
    } else if is_gemma {
        vec![1, 106]
    } else {
        Vec::new()
    };

    let sliding_window = params.sliding_window.filter(|_| matches!(arch, ArchVariant::GptOssMoE));

    let attention_types = if matches!(arch, ArchVariant::GptOssMoE) {
        match &params.layer_types {
            Some(layer_types) if layer_types.len() == num_layers => layer_types
                .iter()
                .map(|kind| {
                    if kind == "sliding_attention" {
                        AttentionType::Sliding
                    } else {
                        AttentionType::Full
                    }
                })
                .collect(),
            Some(layer_types) => {
                tracing::warn!(
                    declared = layer_types.len(),
                    num_layers,
                    "layer_types length does not match num_layers; defaulting every layer to full attention"
                );
                vec![AttentionType::Full; num_layers]
            }
            None => {
                tracing::warn!("GPT-OSS manifest has no layer_types; defaulting every layer to full attention");
                vec![AttentionType::Full; num_layers]
            }
        }
    } else {
        vec![AttentionType::Full; num_layers]
    };

    Ok(InferenceConfig {
        num_layers,
        hidden_size,
        intermediate_size: params.intermediate_size.unwrap_or(hidden_size * 4),
        num_heads,
        num_kv_heads,
        head_dim,
        vocab_size,
        max_seq_len: params.max_seq_len.unwrap_or(2048),
        rope_theta,
        rms_norm_eps,
        rope_scaling_factor: if matches!(arch, ArchVariant::GptOssMoE) { 32.0 } else { 1.0 },
        activation: infer_activation(&manifest.architecture),
        arch,
        scale_embeddings: matches!(arch, ArchVariant::Gemma(GemmaVersion::V2 | GemmaVersion::V3)),
        rms_norm_weight_offset: matches!(arch, ArchVariant::Gemma(_)),
        sliding_window,
        attention_types,
        stop_tokens,
        tie_word_embeddings: true,
    })
}
