//! Downloader resumability (property 3) and scenario S4: a prior partial
//! download is picked back up without re-fetching shards already confirmed
//! on disk, and a transient failure is retried rather than aborting the run.

use crate::support::spawn_mock_origin;
use doppler::downloader::state::{DownloadState, DownloadStatus};
use doppler::downloader::{Downloader, DownloaderConfig};
use doppler::package::shard::{shard_filename, SHARD_SIZE};
use doppler::package::{ArchitectureParams, HashAlgorithm, Manifest, Quantization, ShardDescriptor};
use doppler::store::{hash_bytes, ShardStore};
use std::collections::HashMap;
use std::sync::Arc;

fn three_shard_manifest(model_id: &str, shards: &[Vec<u8>]) -> Manifest {
    let descriptors: Vec<ShardDescriptor> = shards
        .iter()
        .enumerate()
        .map(|(index, bytes)| ShardDescriptor {
            index,
            filename: shard_filename(index),
            size: bytes.len() as u64,
            hash: hash_bytes(&HashAlgorithm::Sha256, bytes),
            offset: index as u64 * SHARD_SIZE,
        })
        .collect();
    let total_size = descriptors.iter().map(|d| d.size).sum();

    Manifest {
        version: 1,
        model_id: model_id.to_string(),
        model_type: "llama".into(),
        architecture: "llama".into(),
        quantization: Quantization::F32,
        architecture_params: ArchitectureParams {
            num_layers: Some(1),
            hidden_size: Some(8),
            intermediate_size: Some(8),
            num_heads: Some(1),
            num_kv_heads: Some(1),
            head_dim: Some(8),
            vocab_size: Some(8),
            max_seq_len: Some(8),
            rope_theta: Some(10000.0),
            rms_norm_eps: Some(1e-5),
            sliding_window: None,
            layer_types: None,
        },
        moe_config: None,
        shards: descriptors,
        tensors: HashMap::new(),
        total_size,
        hash_algorithm: HashAlgorithm::Sha256,
    }
}

#[tokio::test]
async fn resumes_only_the_shards_missing_after_a_restart() {
    let shards = vec![vec![1u8; 16], vec![2u8; 16], vec![3u8; 16]];
    let manifest = three_shard_manifest("resume-test", &shards);
    let manifest_json = serde_json::to_vec(&manifest).unwrap();

    let origin = spawn_mock_origin(manifest_json, shards.clone(), &[]).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ShardStore::new(dir.path()));
    let model_store = store.open("resume-test").unwrap();

    // Simulate a prior run that already completed shard 0: the bytes are on
    // disk, the manifest is already saved locally, and download state says
    // so.
    model_store.write_shard(0, &shards[0], None).unwrap();
    model_store.save_manifest(&manifest).unwrap();
    let prior_state = DownloadState {
        model_id: "resume-test".into(),
        completed_shards: vec![0],
        start_time: String::new(),
        status: DownloadStatus::InProgress,
    };
    model_store.save_download_state(&serde_json::to_vec(&prior_state).unwrap()).unwrap();

    let downloader = Downloader::new(store.clone(), DownloaderConfig::default());
    let completion = downloader.download_model(&origin.base_url, None, None).await.unwrap();

    assert_eq!(completion.model_id, "resume-test");
    assert_eq!(completion.shards_fetched, 2, "only the two missing shards should be fetched");
    assert_eq!(origin.fetch_count(0), 0, "shard 0 was already confirmed on disk and must not be re-fetched");
    assert_eq!(origin.fetch_count(1), 1);
    assert_eq!(origin.fetch_count(2), 1);

    let final_manifest = model_store.load_manifest().unwrap().unwrap();
    assert!(model_store.verify_integrity(&final_manifest).unwrap().is_empty());
}

#[tokio::test]
async fn transient_failure_is_retried_until_the_shard_succeeds() {
    let shards = vec![vec![9u8; 8], vec![8u8; 8]];
    let manifest = three_shard_manifest("retry-test", &shards);
    let manifest_json = serde_json::to_vec(&manifest).unwrap();

    // Shard 1's first request fails with a 500; the downloader must retry
    // rather than give up the whole run.
    let origin = spawn_mock_origin(manifest_json, shards.clone(), &[1]).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ShardStore::new(dir.path()));
    let downloader = Downloader::new(store.clone(), DownloaderConfig::default());

    let completion = downloader.download_model(&origin.base_url, None, None).await.unwrap();

    assert_eq!(completion.shards_fetched, 2);
    assert!(origin.fetch_count(1) >= 2, "shard 1 must have been retried after its first failure");

    let model_store = store.open("retry-test").unwrap();
    let final_manifest = model_store.load_manifest().unwrap().unwrap();
    assert!(model_store.verify_integrity(&final_manifest).unwrap().is_empty());
}
