//! Manifest parsing and validation (spec §3, §4.1).

use super::shard::ShardDescriptor;
use super::tensor::TensorDescriptor;
use crate::error::{DopplerError, DopplerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Quantization {
    Q4_K_M,
    MXFP4,
    F16,
    F32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureParams {
    pub num_layers: Option<usize>,
    pub hidden_size: Option<usize>,
    pub intermediate_size: Option<usize>,
    pub num_heads: Option<usize>,
    pub num_kv_heads: Option<usize>,
    pub head_dim: Option<usize>,
    pub vocab_size: Option<usize>,
    pub max_seq_len: Option<usize>,
    pub rope_theta: Option<f64>,
    pub rms_norm_eps: Option<f64>,
    /// Width of the sliding attention window, distinct from `max_seq_len`
    /// (the whole context length). Only consulted for architectures that
    /// mix sliding and full attention layers.
    #[serde(default)]
    pub sliding_window: Option<usize>,
    /// Per-layer attention kind, one entry per layer ("sliding_attention" or
    /// "full_attention"), as GPT-OSS configs name it.
    #[serde(default)]
    pub layer_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoeConfig {
    pub num_experts: usize,
    pub num_experts_per_token: usize,
    #[serde(default)]
    pub expert_shard_map: Option<HashMap<String, HashMap<String, String>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub model_id: String,
    pub model_type: String,
    pub architecture: String,
    pub quantization: Quantization,
    pub architecture_params: ArchitectureParams,
    #[serde(default)]
    pub moe_config: Option<MoeConfig>,
    pub shards: Vec<ShardDescriptor>,
    pub tensors: HashMap<String, TensorDescriptor>,
    pub total_size: u64,
    pub hash_algorithm: HashAlgorithm,
}

impl Manifest {
    /// spec §4.1: reject a manifest where any declared tensor references an
    /// out-of-range shard index, or whose `Σ shards[i].size != totalSize`.
    pub fn validate(&self) -> DopplerResult<()> {
        let sum: u64 = self.shards.iter().map(|s| s.size).sum();
        if sum != self.total_size {
            return Err(DopplerError::Config(format!(
                "shard sizes sum to {sum}, but total_size is {}",
                self.total_size
            )));
        }

        for s in &self.shards {
            if !s.is_well_formed() {
                return Err(DopplerError::Config(format!(
                    "shard {} is malformed: offset={}, size={}",
                    s.index, s.offset, s.size
                )));
            }
        }

        for (name, tensor) in &self.tensors {
            if !tensor.references_only_shards_below(self.shards.len()) {
                return Err(DopplerError::Config(format!(
                    "tensor '{name}' references a shard index out of range"
                )));
            }
            if !tensor.spans_cover_size() {
                return Err(DopplerError::Config(format!(
                    "tensor '{name}' spans do not cover its declared size"
                )));
            }
        }

        self.require_layer_shape_knowable()?;

        Ok(())
    }

    /// `numLayers`, `numHeads`, `headDim` must be present, or inferrable
    /// from tensor shapes per spec §4.5 — here we only check that at least
    /// one source (explicit field or a plausible q/k projection tensor)
    /// exists; the actual inference lives in `crate::arch`.
    fn require_layer_shape_knowable(&self) -> DopplerResult<()> {
        let explicit = self.architecture_params.num_layers.is_some()
            && self.architecture_params.num_heads.is_some()
            && self.architecture_params.head_dim.is_some();
        if explicit {
            return Ok(());
        }
        let has_projection = self
            .tensors
            .keys()
            .any(|k| k.contains("q_proj") || k.contains("attn_q"));
        if has_projection {
            Ok(())
        } else {
            Err(DopplerError::Config(
                "num_layers/num_heads/head_dim missing and not inferrable from tensor shapes"
                    .to_string(),
            ))
        }
    }
}

/// Parse and validate a manifest from UTF-8 JSON bytes.
pub fn parse_manifest(bytes: &[u8]) -> DopplerResult<Manifest> {
    let manifest: Manifest = serde_json::from_slice(bytes)
        .map_err(|e| DopplerError::Config(format!("invalid manifest json: {e}")))?;
    manifest.validate()?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::shard::shard_filename;

    fn sample_manifest() -> Manifest {
        Manifest {
            version: 1,
            model_id: "tiny".into(),
            model_type: "llama".into(),
            architecture: "llama".into(),
            quantization: Quantization::F32,
            architecture_params: ArchitectureParams {
                num_layers: Some(2),
                hidden_size: Some(16),
                intermediate_size: Some(32),
                num_heads: Some(2),
                num_kv_heads: Some(2),
                head_dim: Some(8),
                vocab_size: Some(32),
                max_seq_len: Some(128),
                rope_theta: Some(10000.0),
                rms_norm_eps: Some(1e-5),
                sliding_window: None,
                layer_types: None,
            },
            moe_config: None,
            shards: vec![ShardDescriptor {
                index: 0,
                filename: shard_filename(0),
                size: 100,
                hash: "deadbeef".into(),
                offset: 0,
            }],
            tensors: HashMap::new(),
            total_size: 100,
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }

    #[test]
    fn parse_manifest_round_trips_through_json() {
        let manifest = sample_manifest();
        let bytes = serde_json::to_vec(&manifest).unwrap();
        let parsed = parse_manifest(&bytes).unwrap();
        assert_eq!(parsed.model_id, "tiny");
    }

    #[test]
    fn validate_rejects_mismatched_total_size() {
        let mut manifest = sample_manifest();
        manifest.total_size = 999;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_tensor_shard() {
        use crate::package::tensor::{Dtype, TensorDescriptor, TensorLayout};
        let mut manifest = sample_manifest();
        manifest.tensors.insert(
            "model.embed_tokens.weight".to_string(),
            TensorDescriptor {
                shape: vec![32, 16],
                dtype: Dtype::F32,
                size: 2048,
                layout: TensorLayout::Single {
                    shard: 5,
                    offset: 0,
                },
            },
        );
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn validate_accepts_missing_layer_params_when_q_proj_present() {
        use crate::package::tensor::{Dtype, TensorDescriptor, TensorLayout};
        let mut manifest = sample_manifest();
        manifest.architecture_params = ArchitectureParams::default();
        manifest.tensors.insert(
            "model.layers.0.self_attn.q_proj.weight".to_string(),
            TensorDescriptor {
                shape: vec![16, 16],
                dtype: Dtype::F32,
                size: 50,
                layout: TensorLayout::Single {
                    shard: 0,
                    offset: 0,
                },
            },
        );
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_layer_params_with_no_hint() {
        let mut manifest = sample_manifest();
        manifest.architecture_params = ArchitectureParams::default();
        assert!(manifest.validate().is_err());
    }
}
