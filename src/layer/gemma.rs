//! Gemma-specific layer behavior (spec §4.10 table): embedding scaling,
//! QK-norm, `(1+w)` RMSNorm, and Gemma-3 sandwich norm are all expressed
//! as data (weight presence, config flags) consumed by the generic
//! `execute_layer_cpu_ref` rather than a separate code path — this module
//! holds the one piece of behavior that's genuinely Gemma-specific: the
//! post-embedding scale application.

use crate::arch::{ArchVariant, GemmaVersion, InferenceConfig};
use crate::kernels::gather;

/// Applies Gemma's `×√hiddenSize` embedding scale when the config calls
/// for it (Gemma 2/3), otherwise returns the embedding unchanged.
pub fn embed_with_scaling(ids: &[u32], table: &[f32], vocab_size: usize, config: &InferenceConfig) -> Vec<f32> {
    gather::gather_embedding_cpu_ref(ids, table, vocab_size, config.hidden_size, config.scale_embeddings)
}

pub fn uses_sandwich_norm(arch: ArchVariant) -> bool {
    matches!(arch, ArchVariant::Gemma(GemmaVersion::V3))
}
