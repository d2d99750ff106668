//! Layer executor (spec §4.10): one transformer block, architecture
//! variants dispatched by `ArchVariant` pattern match rather than booleans.
//!
//! `execute_layer_gpu` runs the same eleven steps through `gpu::forward`'s
//! per-kernel dispatch wrappers, one `wgpu` submission and host readback
//! per step rather than one batched submission for the whole layer;
//! `execute_layer_cpu_ref` is the step-for-step CPU-reference counterpart
//! used by the test suite and by `kernels::*::cpu_ref` conformance checks
//! (spec §8) where no physical device is available.

pub mod dense;
pub mod gemma;
pub mod moe;

use crate::arch::{ArchVariant, InferenceConfig};
use crate::error::DopplerResult;
use crate::kernels::{attention, matmul, residual, rmsnorm, rope};
use crate::package::Dtype;
use std::sync::Arc;

/// A layer's FFN block: either a single dense MLP, or an MoE block whose
/// expert weights are resolved lazily through the `expert_loader` passed to
/// `execute_layer_cpu_ref` rather than held here.
pub enum FfnKind<'a> {
    Dense(dense::FfnWeights<'a>),
    Moe { num_experts: usize },
}

/// Per-layer weights, held as dequantized (or native F32) host slices.
/// Both `execute_layer_cpu_ref` and `execute_layer_gpu` take the same
/// `&LayerWeights`; the GPU path uploads each projection through
/// `gpu::forward`'s dispatch wrappers rather than holding a separate
/// device-resident copy.
pub struct LayerWeights<'a> {
    pub input_norm_w: &'a [f32],
    pub wq: (&'a [u8], Dtype),
    pub wk: (&'a [u8], Dtype),
    pub wv: (&'a [u8], Dtype),
    pub wo: (&'a [u8], Dtype),
    pub q_norm_w: Option<&'a [f32]>,
    pub k_norm_w: Option<&'a [f32]>,
    pub post_attn_norm_w: Option<&'a [f32]>,
    pub pre_ffn_norm_w: &'a [f32],
    pub post_ffn_norm_w: Option<&'a [f32]>,
    pub ffn: FfnKind<'a>,
}

pub struct LayerOutput {
    pub x: Vec<f32>,
    pub k: Vec<f32>,
    pub v: Vec<f32>,
}

/// Executes the full layer operation order from spec §4.10 on host-resident
/// f32 buffers. `x` is `[T, hiddenSize]`; returns the residual stream plus
/// the freshly-computed `k`/`v` for the caller to write into the KV-cache.
#[allow(clippy::too_many_arguments)]
pub fn execute_layer_cpu_ref(
    x: &[f32],
    t: usize,
    config: &InferenceConfig,
    weights: &LayerWeights,
    start_pos: usize,
    cached_k: &[f32],
    cached_v: &[f32],
    kv_seq_len: usize,
    router_logits_fn: Option<&dyn Fn(&[f32]) -> Vec<f32>>,
    mut expert_loader: Option<&mut dyn FnMut(usize) -> DopplerResult<Arc<moe::LoadedExpert>>>,
) -> DopplerResult<LayerOutput> {
    let h = config.hidden_size;
    let weight_offset = config.rms_norm_weight_offset;

    // 1. x1 = RMSNorm(x, input_norm_w)
    let x1 = rmsnorm::rms_norm_cpu_ref(x, t, h, weights.input_norm_w, config.rms_norm_eps as f32, weight_offset);

    // 2. q/k/v = matmul(x1, Wq/Wk/Wv, transposeB=true)
    let qkv_dim = config.num_heads * config.head_dim;
    let kv_dim = config.num_kv_heads * config.head_dim;
    let mut q = matmul::matmul_cpu_ref(&x1, t, h, weights.wq.0, weights.wq.1, qkv_dim, true);
    let mut k = matmul::matmul_cpu_ref(&x1, t, h, weights.wk.0, weights.wk.1, kv_dim, true);
    let v = matmul::matmul_cpu_ref(&x1, t, h, weights.wv.0, weights.wv.1, kv_dim, true);

    // 3. Gemma QK-norm
    if let (Some(q_norm), Some(k_norm)) = (weights.q_norm_w, weights.k_norm_w) {
        q = rmsnorm::rms_norm_cpu_ref(&q, t * config.num_heads, config.head_dim, q_norm, config.rms_norm_eps as f32, weight_offset);
        k = rmsnorm::rms_norm_cpu_ref(&k, t * config.num_kv_heads, config.head_dim, k_norm, config.rms_norm_eps as f32, weight_offset);
    }

    // 4. RoPE(q, startPos), RoPE(k, startPos)
    let scaling = if config.rope_scaling_factor != 1.0 {
        rope::RopeScalingType::Linear
    } else {
        rope::RopeScalingType::None
    };
    rope::apply_rope_cpu_ref(&mut q, t, config.num_heads, config.head_dim, start_pos, config.rope_theta, scaling, config.rope_scaling_factor);
    rope::apply_rope_cpu_ref(&mut k, t, config.num_kv_heads, config.head_dim, start_pos, config.rope_theta, scaling, config.rope_scaling_factor);

    // 5. Cache write happens at the caller (KvCache::update); here we just
    // build the full K/V view the attention kernel needs by concatenating
    // already-cached history with this step's fresh k/v.
    let mut full_k = cached_k[..kv_seq_len * kv_dim].to_vec();
    full_k.extend_from_slice(&k);
    let mut full_v = cached_v[..kv_seq_len * kv_dim].to_vec();
    full_v.extend_from_slice(&v);
    let kt = kv_seq_len + t;

    // 6. attn = Attention(q, K, V, ...)
    let scale = 1.0 / (config.head_dim as f32).sqrt();
    let attn = attention::fused_attention_cpu_ref(
        &q,
        t,
        &full_k,
        &full_v,
        kt,
        config.num_heads,
        config.num_kv_heads,
        config.head_dim,
        scale,
        true,
        start_pos,
        config.sliding_window,
        None,
    );

    // 7. o = matmul(attn, Wo, transposeB=true)
    let o = matmul::matmul_cpu_ref(&attn, t, qkv_dim, weights.wo.0, weights.wo.1, h, true);

    // 8. Residual, with Gemma-3 sandwich norm applied to `o` first.
    let o_for_residual = if let Some(post_attn) = weights.post_attn_norm_w {
        rmsnorm::rms_norm_cpu_ref(&o, t, h, post_attn, config.rms_norm_eps as f32, weight_offset)
    } else {
        o
    };
    let x_after_attn = residual::residual_add_cpu_ref(x, &o_for_residual);

    // 9. x2 = RMSNorm(x, pre_ffn_norm_w)
    let x2 = rmsnorm::rms_norm_cpu_ref(&x_after_attn, t, h, weights.pre_ffn_norm_w, config.rms_norm_eps as f32, weight_offset);

    // 10. FFN
    let ffn_out = match (&weights.ffn, config.arch) {
        (FfnKind::Moe { num_experts }, ArchVariant::MixtralMoE | ArchVariant::GptOssMoE) => {
            let router_fn = router_logits_fn
                .ok_or_else(|| crate::error::DopplerError::Config("MoE layer requires a router function".to_string()))?;
            let expert_fn = expert_loader
                .as_deref_mut()
                .ok_or_else(|| crate::error::DopplerError::Config("MoE layer requires an expert loader".to_string()))?;
            moe::moe_ffn_cpu_ref(&x2, t, h, *num_experts, config.activation, router_fn, expert_fn)?
        }
        (FfnKind::Dense(ffn), _) => dense::dense_ffn_cpu_ref(&x2, t, h, ffn, config.activation),
        (FfnKind::Moe { .. }, _) => {
            return Err(crate::error::DopplerError::Config(
                "MoE FFN weights present for a non-MoE architecture variant".to_string(),
            ));
        }
    };

    // 11. Residual, symmetric with step 8.
    let ffn_for_residual = if let Some(post_ffn) = weights.post_ffn_norm_w {
        rmsnorm::rms_norm_cpu_ref(&ffn_out, t, h, post_ffn, config.rms_norm_eps as f32, weight_offset)
    } else {
        ffn_out
    };
    let x_final = residual::residual_add_cpu_ref(&x_after_attn, &ffn_for_residual);

    Ok(LayerOutput { x: x_final, k, v })
}

/// Same eleven-step algorithm as `execute_layer_cpu_ref`, with every matmul,
/// norm, RoPE rotation, attention pass, activation gate, and residual add
/// dispatched through `gpu::forward` instead of the CPU references.
#[allow(clippy::too_many_arguments)]
pub fn execute_layer_gpu(
    handle: &crate::device::DeviceHandle,
    kernels: &mut crate::kernels::PipelineManager,
    pool: &mut crate::gpu::BufferPool,
    x: &[f32],
    t: usize,
    config: &InferenceConfig,
    weights: &LayerWeights,
    start_pos: usize,
    cached_k: &[f32],
    cached_v: &[f32],
    kv_seq_len: usize,
    router_logits_fn: Option<&dyn Fn(&[f32]) -> Vec<f32>>,
    mut expert_loader: Option<&mut dyn FnMut(usize) -> DopplerResult<Arc<moe::LoadedExpert>>>,
) -> DopplerResult<LayerOutput> {
    use crate::gpu::forward;

    let h = config.hidden_size;
    let weight_offset = config.rms_norm_weight_offset;

    // 1. x1 = RMSNorm(x, input_norm_w)
    let x1 = forward::rms_norm(handle, kernels, pool, x, t, h, weights.input_norm_w, config.rms_norm_eps as f32, weight_offset)?;

    // 2. q/k/v = matmul(x1, Wq/Wk/Wv, transposeB=true)
    let qkv_dim = config.num_heads * config.head_dim;
    let kv_dim = config.num_kv_heads * config.head_dim;
    let mut q = forward::matmul(handle, kernels, pool, &x1, t, h, weights.wq.0, weights.wq.1, qkv_dim, true)?;
    let mut k = forward::matmul(handle, kernels, pool, &x1, t, h, weights.wk.0, weights.wk.1, kv_dim, true)?;
    let v = forward::matmul(handle, kernels, pool, &x1, t, h, weights.wv.0, weights.wv.1, kv_dim, true)?;

    // 3. Gemma QK-norm
    if let (Some(q_norm), Some(k_norm)) = (weights.q_norm_w, weights.k_norm_w) {
        q = forward::rms_norm(handle, kernels, pool, &q, t * config.num_heads, config.head_dim, q_norm, config.rms_norm_eps as f32, weight_offset)?;
        k = forward::rms_norm(handle, kernels, pool, &k, t * config.num_kv_heads, config.head_dim, k_norm, config.rms_norm_eps as f32, weight_offset)?;
    }

    // 4. RoPE(q, startPos), RoPE(k, startPos)
    let scaling = if config.rope_scaling_factor != 1.0 {
        rope::RopeScalingType::Linear
    } else {
        rope::RopeScalingType::None
    };
    q = forward::rope(handle, kernels, pool, &q, t, config.num_heads, config.head_dim, start_pos, config.rope_theta, scaling, config.rope_scaling_factor)?;
    k = forward::rope(handle, kernels, pool, &k, t, config.num_kv_heads, config.head_dim, start_pos, config.rope_theta, scaling, config.rope_scaling_factor)?;

    // 5. Concatenate this step's fresh k/v onto the cached history.
    let mut full_k = cached_k[..kv_seq_len * kv_dim].to_vec();
    full_k.extend_from_slice(&k);
    let mut full_v = cached_v[..kv_seq_len * kv_dim].to_vec();
    full_v.extend_from_slice(&v);
    let kt = kv_seq_len + t;

    // 6. attn = Attention(q, K, V, ...)
    let attn = forward::attention(
        handle,
        kernels,
        pool,
        &q,
        t,
        &full_k,
        &full_v,
        kt,
        config.num_heads,
        config.num_kv_heads,
        config.head_dim,
        true,
        start_pos,
        config.sliding_window,
    )?;

    // 7. o = matmul(attn, Wo, transposeB=true)
    let o = forward::matmul(handle, kernels, pool, &attn, t, qkv_dim, weights.wo.0, weights.wo.1, h, true)?;

    // 8. Residual, with Gemma-3 sandwich norm applied to `o` first.
    let o_for_residual = if let Some(post_attn) = weights.post_attn_norm_w {
        forward::rms_norm(handle, kernels, pool, &o, t, h, post_attn, config.rms_norm_eps as f32, weight_offset)?
    } else {
        o
    };
    let x_after_attn = forward::residual_add(handle, kernels, pool, x, &o_for_residual)?;

    // 9. x2 = RMSNorm(x, pre_ffn_norm_w)
    let x2 = forward::rms_norm(handle, kernels, pool, &x_after_attn, t, h, weights.pre_ffn_norm_w, config.rms_norm_eps as f32, weight_offset)?;

    // 10. FFN
    let ffn_out = match (&weights.ffn, config.arch) {
        (FfnKind::Moe { num_experts }, ArchVariant::MixtralMoE | ArchVariant::GptOssMoE) => {
            let router_fn = router_logits_fn
                .ok_or_else(|| crate::error::DopplerError::Config("MoE layer requires a router function".to_string()))?;
            let expert_fn = expert_loader
                .as_deref_mut()
                .ok_or_else(|| crate::error::DopplerError::Config("MoE layer requires an expert loader".to_string()))?;
            moe::moe_ffn_gpu(handle, kernels, pool, &x2, t, h, *num_experts, config.activation, router_fn, expert_fn)?
        }
        (FfnKind::Dense(ffn), _) => dense::dense_ffn_gpu(handle, kernels, pool, &x2, t, h, ffn, config.activation)?,
        (FfnKind::Moe { .. }, _) => {
            return Err(crate::error::DopplerError::Config(
                "MoE FFN weights present for a non-MoE architecture variant".to_string(),
            ));
        }
    };

    // 11. Residual, symmetric with step 8.
    let ffn_for_residual = if let Some(post_ffn) = weights.post_ffn_norm_w {
        forward::rms_norm(handle, kernels, pool, &ffn_out, t, h, post_ffn, config.rms_norm_eps as f32, weight_offset)?
    } else {
        ffn_out
    };
    let x_final = forward::residual_add(handle, kernels, pool, &x_after_attn, &ffn_for_residual)?;

    Ok(LayerOutput { x: x_final, k, v })
}
