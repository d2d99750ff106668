//! External facade (spec §6.2, §9 "single `Engine` handle"): the one entry
//! point host code (CLI, HTTP server, or an embedding application) talks to.
//! Replaces the module-scope globals the distilled spec's pseudocode implied
//! with one struct owning the shard store and the device probe result.

use crate::arch::{self, InferenceConfig};
use crate::config::ApplicationConfig;
use crate::device::{self, Capabilities, DeviceHandle};
use crate::downloader::progress::ProgressSink;
use crate::downloader::{Completion, Downloader, DownloaderConfig};
use crate::error::{DopplerError, DopplerResult};
use crate::package::Manifest;
use crate::pipeline::{GenerateOptions, GenerateStream, Pipeline, PipelineBuilder};
use crate::store::{ShardStore, StorageReport};
use crate::tokenizer::{self, TokenizerAdapter};
use std::path::Path;
use std::sync::Arc;

pub struct LoadedModel {
    pub pipeline: Pipeline,
    pub tokenizer: Box<dyn TokenizerAdapter>,
}

/// The single handle host code constructs once per process (spec §9).
pub struct Engine {
    store: Arc<ShardStore>,
    device: Option<Arc<DeviceHandle>>,
    config: ApplicationConfig,
}

impl Engine {
    pub fn new(config: ApplicationConfig) -> Self {
        let store = Arc::new(ShardStore::new(&config.models_dir));
        Self {
            store,
            device: None,
            config,
        }
    }

    /// `initDevice() → Capabilities | Unavailable` (spec §6.2).
    pub fn init_device(&mut self) -> DopplerResult<Capabilities> {
        let handle = device::probe()?;
        let capabilities = handle.capabilities;
        self.device = Some(Arc::new(handle));
        Ok(capabilities)
    }

    /// `loadModel(modelId, {sourceUrl? | localPath?}, onProgress?) →
    /// Pipeline | Err` (spec §6.2). `localPath` is out of scope for this
    /// engine (all models live under the shard store); callers wanting a
    /// local directory layered in must first `downloadModel` from a
    /// `file://` base URL.
    pub fn load_model(&self, model_id: &str) -> DopplerResult<LoadedModel> {
        let model_store = self.store.open(model_id)?;
        let manifest: Manifest = model_store
            .load_manifest()?
            .ok_or_else(|| DopplerError::Config(format!("no manifest for model '{model_id}'")))?;

        let tokenizer_bytes = model_store.load_tokenizer()?;
        let tokenizer = tokenizer::load_tokenizer_bundle(tokenizer_bytes.as_deref());

        let q_out = layer0_proj_out(&manifest, "q_proj");
        let k_out = layer0_proj_out(&manifest, "k_proj");
        let config: InferenceConfig = arch::derive_config(
            &manifest,
            q_out,
            k_out,
            Some(tokenizer.vocab_size()),
            tokenizer.eos_token_ids(),
        )?;

        let builder = match &self.device {
            Some(device) => PipelineBuilder::new().with_device(device.clone()),
            None => PipelineBuilder::new(),
        };
        let pipeline = builder.build(model_store, manifest, config)?;

        Ok(LoadedModel { pipeline, tokenizer })
    }

    /// `pipeline.generate(...)` is exposed directly on `Pipeline`/
    /// `GenerateStream`; this convenience wraps tokenization so callers
    /// working through `Engine` don't need to reach into `tokenizer`
    /// themselves.
    pub fn generate<'a>(
        &self,
        loaded: &'a mut LoadedModel,
        prompt: &str,
        options: GenerateOptions,
    ) -> DopplerResult<GenerateStream<'a>> {
        let prompt_tokens = loaded.tokenizer.encode(prompt)?;
        GenerateStream::new(&mut loaded.pipeline, &prompt_tokens, options)
    }

    /// `downloadModel(baseUrl, onProgress, {concurrency?, modelIdOverride?})
    /// → Completion` (spec §6.2).
    pub async fn download_model(
        &self,
        base_url: &str,
        model_id_override: Option<&str>,
        concurrency: Option<usize>,
        progress_sink: Option<&ProgressSink>,
    ) -> DopplerResult<Completion> {
        let mut config = DownloaderConfig {
            concurrency: self.config.downloader.concurrency,
            max_retries_per_shard: self.config.downloader.max_retries_per_shard,
        };
        if let Some(c) = concurrency {
            config.concurrency = c;
        }
        let downloader = Downloader::new(self.store.clone(), config);
        downloader.download_model(base_url, model_id_override, progress_sink).await
    }

    /// `pauseDownload(modelId)` (spec §6.2).
    pub fn pause_download(&self, model_id: &str, completed_shards: Vec<usize>) -> DopplerResult<()> {
        let config = DownloaderConfig {
            concurrency: self.config.downloader.concurrency,
            max_retries_per_shard: self.config.downloader.max_retries_per_shard,
        };
        let downloader = Downloader::new(self.store.clone(), config);
        let model_store = self.store.open(model_id)?;
        downloader.pause(&model_store, model_id, completed_shards)
    }

    /// `resumeDownload(modelId, onProgress) → Completion` (spec §6.2): a
    /// paused download reconciles against its persisted `DownloadState` the
    /// same way a fresh call would, so resuming is just calling
    /// `downloadModel` again against the same `baseUrl`.
    pub async fn resume_download(
        &self,
        base_url: &str,
        model_id: &str,
        progress_sink: Option<&ProgressSink>,
    ) -> DopplerResult<Completion> {
        self.download_model(base_url, Some(model_id), None, progress_sink).await
    }

    /// `listModels() → [modelId]` (spec §6.2).
    pub fn list_models(&self) -> DopplerResult<Vec<String>> {
        self.store.list_models()
    }

    /// `deleteModel(modelId)` (spec §6.2).
    pub fn delete_model(&self, model_id: &str) -> DopplerResult<()> {
        self.store.open(model_id)?.delete_model()
    }

    /// `storageReport() → {used, quota}` (spec §6.2).
    pub fn storage_report(&self) -> DopplerResult<StorageReport> {
        self.store.storage_report()
    }

    pub fn models_dir(&self) -> &Path {
        &self.config.models_dir
    }
}

fn layer0_proj_out(manifest: &Manifest, proj_name: &str) -> Option<usize> {
    manifest
        .tensors
        .get(&format!("model.layers.0.self_attn.{proj_name}.weight"))
        .and_then(|t| t.shape.first())
        .map(|&d| d as usize)
}
