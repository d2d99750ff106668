//! Pointwise gate activation: `Y = act(gate) * up` (spec §4.7).

use crate::arch::Activation;

fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

fn gelu_tanh(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044715 * x.powi(3))).tanh())
}

pub fn activation_gate_cpu_ref(gate: &[f32], up: &[f32], activation: Activation) -> Vec<f32> {
    gate.iter()
        .zip(up.iter())
        .map(|(&g, &u)| {
            let activated = match activation {
                Activation::Silu => silu(g),
                Activation::Gelu => gelu_tanh(g),
            };
            activated * u
        })
        .collect()
}
