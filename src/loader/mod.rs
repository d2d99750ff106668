//! Weight loader (spec §4.9): resolves tensor spans from the shard store
//! into host-resident byte buffers. GPU dispatch (`gpu::forward`) uploads
//! these per call rather than holding a separate device-resident copy, so
//! loading stops here; `expert_cache` bounds how many experts' worth of
//! these buffers stay resident between calls.

pub mod expert_cache;

use crate::error::{DopplerError, DopplerResult};
use crate::kernels::quant;
use crate::package::{Dtype, Manifest, TensorDescriptor, TensorLayout};
use crate::store::ModelStore;

/// Resolves one tensor's raw bytes by reading its shard span(s) from the
/// store. Multi-shard tensors are concatenated in span order.
fn resolve_tensor_bytes(
    store: &ModelStore,
    manifest: &Manifest,
    tensor: &TensorDescriptor,
) -> DopplerResult<Vec<u8>> {
    match &tensor.layout {
        TensorLayout::Single { shard, offset } => {
            let descriptor = manifest
                .shards
                .get(*shard)
                .ok_or_else(|| DopplerError::TensorMissing(format!("shard {shard} not in manifest")))?;
            let bytes = store.load_shard(
                *shard,
                descriptor,
                &manifest.hash_algorithm,
                crate::store::LoadOptions { verify: false },
            )?;
            let start = *offset as usize;
            let end = start + tensor.size as usize;
            if end > bytes.len() {
                return Err(DopplerError::TensorMissing(
                    "tensor span extends past shard bytes".to_string(),
                ));
            }
            Ok(bytes[start..end].to_vec())
        }
        TensorLayout::Multi { spans } => {
            let mut out = Vec::with_capacity(tensor.size as usize);
            for span in spans {
                let descriptor = manifest
                    .shards
                    .get(span.shard_index)
                    .ok_or_else(|| DopplerError::TensorMissing("span shard not in manifest".to_string()))?;
                let bytes = store.load_shard(
                    span.shard_index,
                    descriptor,
                    &manifest.hash_algorithm,
                    crate::store::LoadOptions { verify: false },
                )?;
                let start = span.offset as usize;
                let end = start + span.size as usize;
                out.extend_from_slice(&bytes[start..end]);
            }
            Ok(out)
        }
    }
}

/// Resolve a named tensor's raw bytes and dtype without touching a GPU
/// buffer pool, for the host-resident CPU-reference pipeline path.
pub fn load_tensor_raw(store: &ModelStore, manifest: &Manifest, tensor_name: &str) -> DopplerResult<(Vec<u8>, Dtype)> {
    let tensor = manifest
        .tensors
        .get(tensor_name)
        .ok_or_else(|| DopplerError::TensorMissing(tensor_name.to_string()))?;
    let bytes = resolve_tensor_bytes(store, manifest, tensor)?;
    Ok((bytes, tensor.dtype))
}

/// Dequantize a raw tensor byte buffer into a host `f32` vector (used for
/// norm weights and the embedding table, which the layer executor consumes
/// as plain host slices rather than matmul operands).
pub fn dequantize_to_f32(bytes: &[u8], dtype: Dtype, element_count: usize) -> Vec<f32> {
    match dtype {
        Dtype::F32 => bytemuck::cast_slice::<u8, f32>(bytes).to_vec(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::Q4_K_M => quant::dequantize_q4_k_m(bytes, element_count),
        Dtype::MXFP4 => quant::dequantize_mxfp4(bytes, element_count),
    }
}

/// Load and dequantize a named tensor directly to a host `f32` vector.
pub fn load_tensor_f32(store: &ModelStore, manifest: &Manifest, tensor_name: &str) -> DopplerResult<Vec<f32>> {
    let tensor = manifest
        .tensors
        .get(tensor_name)
        .ok_or_else(|| DopplerError::TensorMissing(tensor_name.to_string()))?;
    let element_count = tensor.element_count() as usize;
    let bytes = resolve_tensor_bytes(store, manifest, tensor)?;
    Ok(dequantize_to_f32(&bytes, tensor.dtype, element_count))
}
