//! End-to-end `Pipeline` scenarios that a single unit test can't cover on
//! its own: a full forward pass (S1), a full decode loop against a
//! sliding-window cache (S3), and prefill/decode equivalence across the
//! KV-cache boundary (property 9).

use doppler::arch::{Activation, ArchVariant, AttentionType, InferenceConfig};
use doppler::package::shard::shard_filename;
use doppler::package::{ArchitectureParams, Dtype, HashAlgorithm, Manifest, Quantization, ShardDescriptor, TensorDescriptor, TensorLayout};
use doppler::pipeline::{Pipeline, PipelineBuilder};
use doppler::sampler::{self, SamplerOptions};
use doppler::store::ShardStore;
use std::collections::HashMap;

const DIM: usize = 4;

fn push_tensor(tensors: &mut HashMap<String, TensorDescriptor>, blob: &mut Vec<u8>, name: &str, floats: &[f32]) {
    let offset = blob.len() as u64;
    let bytes = bytemuck::cast_slice(floats);
    tensors.insert(
        name.to_string(),
        TensorDescriptor {
            shape: vec![floats.len() as u64],
            dtype: Dtype::F32,
            size: bytes.len() as u64,
            layout: TensorLayout::Single { shard: 0, offset },
        },
    );
    blob.extend_from_slice(bytes);
}

fn layer_tensors(tensors: &mut HashMap<String, TensorDescriptor>, blob: &mut Vec<u8>, norm_w: &[f32], proj_w: &[f32]) {
    push_tensor(tensors, blob, "model.layers.0.input_layernorm.weight", norm_w);
    push_tensor(tensors, blob, "model.layers.0.self_attn.q_proj.weight", proj_w);
    push_tensor(tensors, blob, "model.layers.0.self_attn.k_proj.weight", proj_w);
    push_tensor(tensors, blob, "model.layers.0.self_attn.v_proj.weight", proj_w);
    push_tensor(tensors, blob, "model.layers.0.self_attn.o_proj.weight", proj_w);
    push_tensor(tensors, blob, "model.layers.0.post_attention_layernorm.weight", norm_w);
    push_tensor(tensors, blob, "model.layers.0.mlp.gate_proj.weight", proj_w);
    push_tensor(tensors, blob, "model.layers.0.mlp.up_proj.weight", proj_w);
    push_tensor(tensors, blob, "model.layers.0.mlp.down_proj.weight", proj_w);
}

fn base_manifest(blob: &[u8], tensors: HashMap<String, TensorDescriptor>) -> Manifest {
    Manifest {
        version: 1,
        model_id: "m".into(),
        model_type: "llama".into(),
        architecture: "llama".into(),
        quantization: Quantization::F32,
        architecture_params: ArchitectureParams {
            num_layers: Some(1),
            hidden_size: Some(DIM),
            intermediate_size: Some(DIM),
            num_heads: Some(1),
            num_kv_heads: Some(1),
            head_dim: Some(DIM),
            vocab_size: Some(DIM),
            max_seq_len: Some(16),
            rope_theta: Some(10000.0),
            rms_norm_eps: Some(1e-5),
            sliding_window: None,
            layer_types: None,
        },
        moe_config: None,
        shards: vec![ShardDescriptor {
            index: 0,
            filename: shard_filename(0),
            size: blob.len() as u64,
            hash: doppler::store::hash_bytes(&HashAlgorithm::Sha256, blob),
            offset: 0,
        }],
        tensors,
        total_size: blob.len() as u64,
        hash_algorithm: HashAlgorithm::Sha256,
    }
}

fn base_config(sliding_window: Option<usize>) -> InferenceConfig {
    InferenceConfig {
        num_layers: 1,
        hidden_size: DIM,
        intermediate_size: DIM,
        num_heads: 1,
        num_kv_heads: 1,
        head_dim: DIM,
        vocab_size: DIM,
        max_seq_len: 16,
        rope_theta: 10000.0,
        rms_norm_eps: 1e-5,
        rope_scaling_factor: 1.0,
        activation: Activation::Silu,
        arch: ArchVariant::Dense,
        scale_embeddings: false,
        rms_norm_weight_offset: false,
        sliding_window,
        attention_types: vec![AttentionType::Full; 1],
        stop_tokens: Vec::new(),
        tie_word_embeddings: true,
    }
}

/// Every projection weight is the zero matrix, so every matmul in the layer
/// collapses to zero and the only surviving path through the layer is the
/// residual connection: the layer is an exact identity on its input. With
/// an identity `embed_tokens` table this makes greedy decoding return
/// whatever token was last fed in, by construction rather than by chance.
fn zero_weight_dense_pipeline() -> (tempfile::TempDir, Pipeline) {
    let norm_w = vec![1.0f32; DIM];
    let zero_proj = vec![0.0f32; DIM * DIM];
    let mut identity_embed = vec![0.0f32; DIM * DIM];
    for i in 0..DIM {
        identity_embed[i * DIM + i] = 1.0;
    }

    let mut tensors = HashMap::new();
    let mut blob = Vec::new();
    push_tensor(&mut tensors, &mut blob, "model.embed_tokens.weight", &identity_embed);
    push_tensor(&mut tensors, &mut blob, "model.norm.weight", &norm_w);
    layer_tensors(&mut tensors, &mut blob, &norm_w, &zero_proj);

    let dir = tempfile::tempdir().unwrap();
    let store = ShardStore::new(dir.path());
    let model_store = store.open("m").unwrap();
    model_store.write_shard(0, &blob, None).unwrap();

    let manifest = base_manifest(&blob, tensors);
    let config = base_config(None);
    let pipeline = PipelineBuilder::new().build(model_store, manifest, config).unwrap();
    (dir, pipeline)
}

/// Same shape as `zero_weight_dense_pipeline`, but with ordinary non-zero
/// weights, so the layer actually mixes information across positions —
/// needed to make the KV-cache equivalence and sliding-window scenarios
/// meaningful (a zero-weight model would pass them vacuously).
fn nonzero_dense_pipeline(sliding_window: Option<usize>) -> (tempfile::TempDir, Pipeline) {
    let norm_w = vec![1.0f32; DIM];
    let proj_w = vec![0.05f32; DIM * DIM];
    let embed_w: Vec<f32> = (0..DIM * DIM).map(|i| 0.02 * (i % 7) as f32 + 0.01).collect();

    let mut tensors = HashMap::new();
    let mut blob = Vec::new();
    push_tensor(&mut tensors, &mut blob, "model.embed_tokens.weight", &embed_w);
    push_tensor(&mut tensors, &mut blob, "model.norm.weight", &norm_w);
    layer_tensors(&mut tensors, &mut blob, &norm_w, &proj_w);

    let dir = tempfile::tempdir().unwrap();
    let store = ShardStore::new(dir.path());
    let model_store = store.open("m").unwrap();
    model_store.write_shard(0, &blob, None).unwrap();

    let manifest = base_manifest(&blob, tensors);
    let config = base_config(sliding_window);
    let pipeline = PipelineBuilder::new().build(model_store, manifest, config).unwrap();
    (dir, pipeline)
}

#[test]
fn s1_tiny_dense_model_greedy_decode_returns_last_input_token() {
    let (_dir, mut pipeline) = zero_weight_dense_pipeline();
    let token_a = 1u32;
    let token_b = 2u32;

    let logits = pipeline.prefill(&[token_a, token_b]).unwrap();

    let greedy = SamplerOptions { temperature: 0.0, ..SamplerOptions::default() };
    let mut rng = rand::thread_rng();
    let next = sampler::sample(&logits, &greedy, &[token_a, token_b], &mut rng);

    assert_eq!(next, token_b);
}

#[test]
fn s3_sliding_window_decode_reaches_full_length_without_overflow() {
    let (_dir, mut pipeline) = nonzero_dense_pipeline(Some(4));
    let greedy = SamplerOptions { temperature: 0.0, ..SamplerOptions::default() };
    let mut rng = rand::thread_rng();

    let logits = pipeline.prefill(&[0]).unwrap();
    assert!(logits.iter().all(|v| v.is_finite()));
    let mut last_token = sampler::sample(&logits, &greedy, &[0], &mut rng);

    for _ in 0..9 {
        last_token = pipeline.decode(last_token, &greedy, &mut rng).unwrap();
    }

    assert_eq!(pipeline.current_seq_len(), 10);
}

#[test]
fn property9_incremental_decode_matches_a_single_full_prefill() {
    let (_dir1, mut full_pipeline) = nonzero_dense_pipeline(None);
    let logits_full = full_pipeline.prefill(&[0, 1, 2]).unwrap();
    let greedy = SamplerOptions { temperature: 0.0, ..SamplerOptions::default() };
    let mut rng = rand::thread_rng();
    let expected = sampler::sample(&logits_full, &greedy, &[0, 1, 2], &mut rng);

    let (_dir2, mut split_pipeline) = nonzero_dense_pipeline(None);
    split_pipeline.prefill(&[0, 1]).unwrap();
    let actual = split_pipeline.decode(2, &greedy, &mut rng).unwrap();

    assert_eq!(actual, expected, "decoding against a cached prefix must match a single full prefill");
}
