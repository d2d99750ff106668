//! Rotary Positional Embedding, standard and YARN-linear scaling (spec §4.7).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RopeScalingType {
    /// No scaling beyond `scale_factor == 1.0`.
    None,
    /// YARN-style linear scaling of the rotation frequency.
    Linear,
    /// Unknown scaling label: treated as linear with a warning surfaced by
    /// the caller (spec §4.7: "if type is unknown, [treat] as linear with
    /// a warning").
    Unknown,
}

/// Rotates pairs of channels in `x[T, num_heads, head_dim]` in place,
/// starting at absolute position `start_pos`. `theta_base` is the RoPE base
/// (e.g. 10_000 or 1_000_000 for Gemma); `scale_factor` divides the
/// effective position for YARN-style linear scaling.
pub fn apply_rope_cpu_ref(
    x: &mut [f32],
    t: usize,
    num_heads: usize,
    head_dim: usize,
    start_pos: usize,
    theta_base: f64,
    scaling: RopeScalingType,
    scale_factor: f64,
) {
    let effective_scale = match scaling {
        RopeScalingType::None => 1.0,
        RopeScalingType::Linear | RopeScalingType::Unknown => scale_factor,
    };

    for pos in 0..t {
        let abs_pos = (start_pos + pos) as f64 / effective_scale;
        for head in 0..num_heads {
            let base_idx = (pos * num_heads + head) * head_dim;
            for k in 0..head_dim / 2 {
                let theta = theta_base.powf(-2.0 * k as f64 / head_dim as f64);
                let angle = abs_pos * theta;
                let (sin, cos) = angle.sin_cos();
                let i0 = base_idx + k;
                let i1 = base_idx + k + head_dim / 2;
                let a = x[i0] as f64;
                let b = x[i1] as f64;
                x[i0] = (a * cos - b * sin) as f32;
                x[i1] = (a * sin + b * cos) as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Manually rotate by the negated angle RoPE would apply at `start_pos`,
    /// to check that forward-then-backward recovers the original vector
    /// (spec property 7).
    fn rotate_by_negated_angle(x: &mut [f32], head_dim: usize, start_pos: usize, theta_base: f64) {
        for k in 0..head_dim / 2 {
            let theta = theta_base.powf(-2.0 * k as f64 / head_dim as f64);
            let angle = start_pos as f64 * theta;
            let (sin, cos) = (-angle).sin_cos();
            let a = x[k] as f64;
            let b = x[k + head_dim / 2] as f64;
            x[k] = (a * cos - b * sin) as f32;
            x[k + head_dim / 2] = (a * sin + b * cos) as f32;
        }
    }

    #[test]
    fn rotating_forward_then_backward_is_identity() {
        let head_dim = 8;
        let original: Vec<f32> = (0..head_dim).map(|i| i as f32 + 1.0).collect();
        let mut x = original.clone();

        apply_rope_cpu_ref(&mut x, 1, 1, head_dim, 5, 10_000.0, RopeScalingType::None, 1.0);
        rotate_by_negated_angle(&mut x, head_dim, 5, 10_000.0);

        for (got, want) in x.iter().zip(original.iter()) {
            assert!((got - want).abs() < 1e-4, "got {got}, want {want}");
        }
    }

    #[test]
    fn rope_preserves_vector_norm_per_pair() {
        let head_dim = 4;
        let mut x = vec![3.0, 4.0, 1.0, 0.0];
        let norm_before: f32 = x.iter().map(|v| v * v).sum();
        apply_rope_cpu_ref(&mut x, 1, 1, head_dim, 7, 10_000.0, RopeScalingType::None, 1.0);
        let norm_after: f32 = x.iter().map(|v| v * v).sum();
        assert!((norm_before - norm_after).abs() < 1e-3);
    }

    #[test]
    fn linear_scaling_divides_effective_position() {
        let head_dim = 4;
        let mut unscaled = vec![1.0, 0.0, 1.0, 0.0];
        let mut scaled = unscaled.clone();
        apply_rope_cpu_ref(&mut unscaled, 1, 1, head_dim, 8, 10_000.0, RopeScalingType::None, 1.0);
        apply_rope_cpu_ref(&mut scaled, 1, 1, head_dim, 8, 10_000.0, RopeScalingType::Linear, 2.0);
        // Scaled version rotates as if position were 4, not 8 - different
        // output for a position where rotation angle is non-trivial.
        assert_ne!(unscaled, scaled);
    }
}
