//! Matmul `C = A · B`, optionally `transposeB` (spec §4.7).
//!
//! `B` may be quantized; the CPU reference dequantizes inline the way the
//! GPU kernel is defined to, so both paths share one accepted result.

use super::quant::{dequantize_mxfp4, dequantize_q4_k_m};
use crate::package::Dtype;

/// `A[M,K] · B` where `B` is `[N,K]` if `transpose_b` else `[K,N]`.
/// Output `C[M,N]`. `b_bytes` is raw storage for `b_dtype`; quantized
/// dtypes are dequantized before multiplying (spec §4.7: "B may be
/// quantized ... and is dequantized inside the kernel").
pub fn matmul_cpu_ref(
    a: &[f32],
    m: usize,
    k: usize,
    b_bytes: &[u8],
    b_dtype: Dtype,
    n: usize,
    transpose_b: bool,
) -> Vec<f32> {
    let b: Vec<f32> = match b_dtype {
        Dtype::F32 => bytemuck::cast_slice(b_bytes).to_vec(),
        Dtype::F16 => b_bytes
            .chunks(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::Q4_K_M => dequantize_q4_k_m(b_bytes, n * k),
        Dtype::MXFP4 => dequantize_mxfp4(b_bytes, n * k),
    };

    let mut c = vec![0f32; m * n];
    for row in 0..m {
        for col in 0..n {
            let mut acc = 0f32;
            for kk in 0..k {
                let a_val = a[row * k + kk];
                let b_val = if transpose_b {
                    b[col * k + kk]
                } else {
                    b[kk * n + col]
                };
                acc += a_val * b_val;
            }
            c[row * n + col] = acc;
        }
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matrix_transpose_b_is_identity_map() {
        // A[2,2] * I[2,2] (transposeB, I is symmetric so orientation doesn't
        // matter) should return A unchanged.
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let identity: Vec<f32> = vec![1.0, 0.0, 0.0, 1.0];
        let b_bytes = bytemuck::cast_slice(&identity).to_vec();
        let c = matmul_cpu_ref(&a, 2, 2, &b_bytes, Dtype::F32, 2, true);
        assert_eq!(c, a);
    }

    #[test]
    fn non_transposed_matmul_matches_standard_orientation() {
        let a = vec![1.0, 2.0]; // [1,2]
        let b = vec![1.0, 0.0, 0.0, 1.0]; // [2,2] identity, K x N
        let b_bytes = bytemuck::cast_slice(&b).to_vec();
        let c = matmul_cpu_ref(&a, 1, 2, &b_bytes, Dtype::F32, 2, false);
        assert_eq!(c, vec![1.0, 2.0]);
    }

    #[test]
    fn f16_storage_round_trips_through_matmul() {
        let a = vec![2.0f32];
        let b_f16 = half::f16::from_f32(3.0);
        let b_bytes = b_f16.to_le_bytes().to_vec();
        let c = matmul_cpu_ref(&a, 1, 1, &b_bytes, Dtype::F16, 1, true);
        assert!((c[0] - 6.0).abs() < 1e-3);
    }
}
