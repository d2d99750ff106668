//! Embedding gather, with Gemma's `scaleEmbeddings` (×√H) option (spec §4.7).

/// `I[T]`, table `E[V,H]`. Output `Y[T,H] = E[I[t], :]`, optionally scaled
/// by `√H`.
pub fn gather_embedding_cpu_ref(ids: &[u32], table: &[f32], vocab_size: usize, h: usize, scale: bool) -> Vec<f32> {
    let mut out = vec![0f32; ids.len() * h];
    let scale_factor = if scale { (h as f32).sqrt() } else { 1.0 };
    for (t, &id) in ids.iter().enumerate() {
        let row = (id as usize).min(vocab_size - 1);
        for col in 0..h {
            out[t * h + col] = table[row * h + col] * scale_factor;
        }
    }
    out
}
