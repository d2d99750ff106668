//! Residual add `Y = X + R` (spec §4.7).

pub fn residual_add_cpu_ref(x: &[f32], r: &[f32]) -> Vec<f32> {
    x.iter().zip(r.iter()).map(|(&a, &b)| a + b).collect()
}
