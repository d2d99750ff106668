//! Resumable downloader (spec §4.3).

pub mod fetch;
pub mod progress;
pub mod state;

use crate::error::{DopplerError, DopplerResult};
use crate::package::{Manifest, parse_manifest};
use crate::store::{LoadOptions, ShardStore};
use progress::{ProgressRecord, ProgressSink, Stage};
use state::{DownloadState, DownloadStatus, ShardStateMachine};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct DownloaderConfig {
    pub concurrency: usize,
    pub max_retries_per_shard: u32,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries_per_shard: 3,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Completion {
    pub model_id: String,
    pub shards_fetched: usize,
}

/// Drives the full resumable download algorithm (spec §4.3 steps 1-8).
pub struct Downloader {
    store: Arc<ShardStore>,
    http: reqwest::Client,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(store: Arc<ShardStore>, config: DownloaderConfig) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Fetches the manifest, verifies it against any existing local copy
    /// (clearing stale state on mismatch), checks free space, reconciles
    /// prior download state, then fetches missing shards with bounded
    /// concurrency and per-shard retry.
    pub async fn download_model(
        &self,
        base_url: &str,
        model_id_override: Option<&str>,
        progress_sink: Option<&ProgressSink>,
    ) -> DopplerResult<Completion> {
        let emit = |record: ProgressRecord| {
            if let Some(sink) = progress_sink {
                sink(record);
            }
        };

        emit(ProgressRecord::new(Stage::Parsing, 0, 1));
        let manifest_url = crate::package::shard::get_manifest_url(base_url);
        let manifest_bytes = self
            .http
            .get(&manifest_url)
            .send()
            .await
            .map_err(|e| DopplerError::Network(format!("manifest fetch failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| DopplerError::Network(format!("manifest body read failed: {e}")))?;
        let manifest = parse_manifest(&manifest_bytes)?;

        let model_id = model_id_override.unwrap_or(&manifest.model_id);
        let model_store = self.store.open(model_id)?;

        // Step 1: verify agreement with any existing manifest.json.
        if let Some(existing) = model_store.load_manifest()? {
            if existing.model_id != manifest.model_id || existing.total_size != manifest.total_size {
                warn!(model_id, "manifest mismatch with local copy; clearing stale download state");
                model_store.clear_download_state()?;
            }
        }

        // Step 2: free-space check.
        let report = self.store.storage_report()?;
        if report.available_bytes < manifest.total_size {
            return Err(DopplerError::QuotaExceeded(format!(
                "need {} bytes, have {} available",
                manifest.total_size, report.available_bytes
            )));
        }

        // Step 3: load prior state, revalidate completed shards.
        let mut completed: std::collections::HashSet<usize> = self
            .reconcile_prior_state(&model_store, &manifest)?
            .into_iter()
            .collect();

        // Step 4: pending queue.
        let pending: Vec<usize> = (0..manifest.shards.len()).filter(|i| !completed.contains(i)).collect();

        emit(ProgressRecord::new(Stage::Downloading, completed.len() as u64, manifest.shards.len() as u64));

        // Step 5/6: bounded-concurrency fetch with retry.
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::new();
        for &index in &pending {
            let semaphore = semaphore.clone();
            let http = self.http.clone();
            let base_url = base_url.to_string();
            let descriptor = manifest.shards[index].clone();
            let max_retries = self.config.max_retries_per_shard;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                fetch_with_retry(&http, &base_url, index, descriptor.size, max_retries).await
            }));
        }

        let mut errors = Vec::new();
        for (index, handle) in pending.iter().zip(handles) {
            match handle.await {
                Ok(Ok(bytes)) => {
                    model_store.write_shard(*index, &bytes, Some(&manifest))?;
                    completed.insert(*index);
                    emit(ProgressRecord::new(Stage::Downloading, completed.len() as u64, manifest.shards.len() as u64).with_shard(*index));
                }
                Ok(Err(e)) => errors.push(format!("shard {index}: {e}")),
                Err(e) => errors.push(format!("shard {index}: task panicked: {e}")),
            }
        }

        if !errors.is_empty() {
            emit(ProgressRecord::new(Stage::Error, completed.len() as u64, manifest.shards.len() as u64));
            return Err(DopplerError::Network(format!(
                "download incomplete: {} shard(s) unrecovered: {}",
                errors.len(),
                errors.join("; ")
            )));
        }

        // Step 8: completion.
        model_store.save_manifest(&manifest)?;
        model_store.clear_download_state()?;
        emit(ProgressRecord::new(Stage::Complete, manifest.shards.len() as u64, manifest.shards.len() as u64));
        info!(model_id, shards = manifest.shards.len(), "download complete");

        Ok(Completion {
            model_id: model_id.to_string(),
            shards_fetched: pending.len(),
        })
    }

    /// Revalidates any shards the prior run thought were complete; drops
    /// and re-enqueues any whose hash no longer matches (spec §4.3 step 3).
    fn reconcile_prior_state(&self, model_store: &crate::store::ModelStore, manifest: &Manifest) -> DopplerResult<Vec<usize>> {
        let mut confirmed = Vec::new();
        let prior: Option<DownloadState> = model_store
            .load_download_state()?
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());

        let candidates: Vec<usize> = match prior {
            Some(state) => state.completed_shards,
            None => (0..manifest.shards.len()).filter(|&i| model_store.shard_exists(i)).collect(),
        };

        for index in candidates {
            let descriptor = &manifest.shards[index];
            let verify = model_store.load_shard(index, descriptor, &manifest.hash_algorithm, LoadOptions { verify: true });
            if verify.is_ok() {
                confirmed.push(index);
            }
        }
        Ok(confirmed)
    }

    /// Persists `status = "paused"` and stops issuing new fetches; any
    /// in-flight fetches the caller is awaiting should be cancelled by
    /// dropping their task handles (spec §4.3 step 7).
    pub fn pause(&self, model_store: &crate::store::ModelStore, model_id: &str, completed: Vec<usize>) -> DopplerResult<()> {
        let state = DownloadState {
            model_id: model_id.to_string(),
            completed_shards: completed,
            start_time: String::new(),
            status: DownloadStatus::Paused,
        };
        model_store.save_download_state(&serde_json::to_vec(&state)?)
    }
}

async fn fetch_with_retry(
    http: &reqwest::Client,
    base_url: &str,
    index: usize,
    expected_size: u64,
    max_retries: u32,
) -> DopplerResult<Vec<u8>> {
    let mut machine = ShardStateMachine::new();
    loop {
        machine.begin_fetch();
        match fetch::fetch_shard(http, base_url, index, expected_size, |_, _| {}).await {
            Ok(bytes) => {
                machine.begin_verify();
                machine.mark_done();
                return Ok(bytes);
            }
            Err(e) if e.is_fatal() => {
                return Err(e.into_inner());
            }
            Err(e) => {
                let e = e.into_inner();
                if machine.progress.attempts >= max_retries || !machine.mark_failed() {
                    return Err(e);
                }
                let delay = state::backoff_delay(machine.progress.attempts - 1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
