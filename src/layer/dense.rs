//! Dense FFN: `down(act(gate(x)) * up(x))` (spec §4.10).

use crate::arch::Activation;
use crate::kernels::{activation, matmul};
use crate::package::Dtype;

pub struct FfnWeights<'a> {
    pub gate: (&'a [u8], Dtype),
    pub up: (&'a [u8], Dtype),
    pub down: (&'a [u8], Dtype),
    pub intermediate_size: usize,
}

pub fn dense_ffn_cpu_ref(x: &[f32], t: usize, h: usize, ffn: &FfnWeights, activation_kind: Activation) -> Vec<f32> {
    let intermediate = ffn.intermediate_size;
    let gate = matmul::matmul_cpu_ref(x, t, h, ffn.gate.0, ffn.gate.1, intermediate, true);
    let up = matmul::matmul_cpu_ref(x, t, h, ffn.up.0, ffn.up.1, intermediate, true);
    let gated = activation::activation_gate_cpu_ref(&gate, &up, activation_kind);
    matmul::matmul_cpu_ref(&gated, t, intermediate, ffn.down.0, ffn.down.1, h, true)
}

/// Same algorithm as `dense_ffn_cpu_ref`, dispatched through the GPU kernels
/// instead of their CPU references.
pub fn dense_ffn_gpu(
    handle: &crate::device::DeviceHandle,
    kernels: &mut crate::kernels::PipelineManager,
    pool: &mut crate::gpu::BufferPool,
    x: &[f32],
    t: usize,
    h: usize,
    ffn: &FfnWeights,
    activation_kind: Activation,
) -> crate::error::DopplerResult<Vec<f32>> {
    use crate::gpu::forward;
    let intermediate = ffn.intermediate_size;
    let gate = forward::matmul(handle, kernels, pool, x, t, h, ffn.gate.0, ffn.gate.1, intermediate, true)?;
    let up = forward::matmul(handle, kernels, pool, x, t, h, ffn.up.0, ffn.up.1, intermediate, true)?;
    let gated = forward::activation_gate(handle, kernels, pool, &gate, &up, activation_kind)?;
    forward::matmul(handle, kernels, pool, &gated, t, intermediate, ffn.down.0, ffn.down.1, h, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_weights_with_silu_at_zero_gate_yield_zero() {
        // gate=0 everywhere => silu(0)=0 => up irrelevant => down(0)=0.
        let h = 2;
        let intermediate = 2;
        let x = vec![0.0, 0.0];
        let zero_w = vec![0f32; h * intermediate];
        let gate_bytes = bytemuck::cast_slice(&zero_w).to_vec();
        let ffn = FfnWeights {
            gate: (&gate_bytes, Dtype::F32),
            up: (&gate_bytes, Dtype::F32),
            down: (&gate_bytes, Dtype::F32),
            intermediate_size: intermediate,
        };
        let out = dense_ffn_cpu_ref(&x, 1, h, &ffn, Activation::Silu);
        assert!(out.iter().all(|v| v.abs() < 1e-6));
    }
}
