//! MoE FFN: router top-k selection, weighted sum of expert outputs
//! (spec §4.10). `Wrouter` logits (plus, for GPT-OSS, a router bias) are
//! supplied by the caller via `router_logits_fn` because the router weight
//! shape and bias handling differ between Mixtral- and GPT-OSS-style
//! routers (spec §2.9 "GPT-OSS ... with router bias").
//!
//! Expert weights are resolved one at a time through `expert_fn` rather
//! than a pre-populated list: only the `top_k` experts a token actually
//! routes to need to be resident, and `Pipeline` backs `expert_fn` with an
//! LRU cache (`loader::expert_cache::ExpertCache`) so a long decode loop
//! doesn't re-load an expert it visited a few tokens ago.

use crate::arch::Activation;
use crate::error::{DopplerError, DopplerResult};
use crate::kernels::{activation, matmul, softmax};
use crate::package::Dtype;
use std::sync::Arc;

/// One MoE expert's three projections, raw bytes plus dtype the same way
/// `LayerWeights`' non-MoE projections are held.
pub struct LoadedExpert {
    pub gate: (Vec<u8>, Dtype),
    pub up: (Vec<u8>, Dtype),
    pub down: (Vec<u8>, Dtype),
}

/// Runs the router (softmax + top-k) per token, then accumulates
/// `α_e · down_e(act(gate_e(x)) * up_e(x))` over the selected experts,
/// loading each selected expert on demand through `expert_fn`.
pub fn moe_ffn_cpu_ref(
    x: &[f32],
    t: usize,
    h: usize,
    num_experts: usize,
    activation_kind: Activation,
    router_logits_fn: &dyn Fn(&[f32]) -> Vec<f32>,
    expert_fn: &mut dyn FnMut(usize) -> DopplerResult<Arc<LoadedExpert>>,
) -> DopplerResult<Vec<f32>> {
    if num_experts == 0 {
        return Err(DopplerError::Config("MoE FFN requires at least one expert".to_string()));
    }
    let top_k = 2.min(num_experts);

    let mut out = vec![0f32; t * h];
    for token in 0..t {
        let row = &x[token * h..(token + 1) * h];
        let logits = router_logits_fn(row);
        let (indices, weights) = softmax::topk_router_cpu_ref(&logits, num_experts, top_k);

        for (&expert_idx, &weight) in indices.iter().zip(weights.iter()) {
            let expert = expert_fn(expert_idx)?;
            let intermediate = bytes_elements(&expert.gate.0, expert.gate.1, h);
            let gate = matmul::matmul_cpu_ref(row, 1, h, &expert.gate.0, expert.gate.1, intermediate, true);
            let up = matmul::matmul_cpu_ref(row, 1, h, &expert.up.0, expert.up.1, intermediate, true);
            let gated = activation::activation_gate_cpu_ref(&gate, &up, activation_kind);
            let down = matmul::matmul_cpu_ref(&gated, 1, intermediate, &expert.down.0, expert.down.1, h, true);

            for col in 0..h {
                out[token * h + col] += weight * down[col];
            }
        }
    }

    Ok(out)
}

/// Same router-then-weighted-sum algorithm as `moe_ffn_cpu_ref`, with each
/// expert's gate/up/down projections dispatched through the GPU kernels.
/// Router softmax + top-k selection stays host-side either way: it operates
/// on a `num_experts`-long vector and its output indices immediately drive
/// which expert `expert_fn` loads next, so there's nothing to gain from a
/// round trip through the device for it.
pub fn moe_ffn_gpu(
    handle: &crate::device::DeviceHandle,
    kernels: &mut crate::kernels::PipelineManager,
    pool: &mut crate::gpu::BufferPool,
    x: &[f32],
    t: usize,
    h: usize,
    num_experts: usize,
    activation_kind: Activation,
    router_logits_fn: &dyn Fn(&[f32]) -> Vec<f32>,
    expert_fn: &mut dyn FnMut(usize) -> DopplerResult<Arc<LoadedExpert>>,
) -> DopplerResult<Vec<f32>> {
    use crate::gpu::forward;
    if num_experts == 0 {
        return Err(DopplerError::Config("MoE FFN requires at least one expert".to_string()));
    }
    let top_k = 2.min(num_experts);

    let mut out = vec![0f32; t * h];
    for token in 0..t {
        let row = &x[token * h..(token + 1) * h];
        let logits = router_logits_fn(row);
        let (indices, weights) = softmax::topk_router_cpu_ref(&logits, num_experts, top_k);

        for (&expert_idx, &weight) in indices.iter().zip(weights.iter()) {
            let expert = expert_fn(expert_idx)?;
            let intermediate = bytes_elements(&expert.gate.0, expert.gate.1, h);
            let gate = forward::matmul(handle, kernels, pool, row, 1, h, &expert.gate.0, expert.gate.1, intermediate, true)?;
            let up = forward::matmul(handle, kernels, pool, row, 1, h, &expert.up.0, expert.up.1, intermediate, true)?;
            let gated = forward::activation_gate(handle, kernels, pool, &gate, &up, activation_kind)?;
            let down = forward::matmul(handle, kernels, pool, &gated, 1, intermediate, &expert.down.0, expert.down.1, h, true)?;

            for col in 0..h {
                out[token * h + col] += weight * down[col];
            }
        }
    }

    Ok(out)
}

fn bytes_elements(bytes: &[u8], dtype: Dtype, rows: usize) -> usize {
    let per_row = match dtype {
        Dtype::F32 => bytes.len() / 4 / rows.max(1),
        Dtype::F16 => bytes.len() / 2 / rows.max(1),
        Dtype::Q4_K_M => (bytes.len() / 144) * 256 / rows.max(1),
        Dtype::MXFP4 => (bytes.len() / 17) * 32 / rows.max(1),
    };
    per_row.max(1)
}
