//! Route handlers (spec §6, ambient HTTP facade). Mirrors the teacher's
//! `endpoints.rs` style: thin `async fn`s over `State`/`Path`/`Json`
//! extractors, returning `DopplerResult<Json<T>>` or a `Response` built from
//! a prepared body.

use crate::error::{DopplerError, DopplerResult};
use crate::pipeline::{CancellationToken, GenerateOptions};
use crate::sampler::SamplerOptions;
use crate::server::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub base_url: String,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

pub async fn pull_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    Json(req): Json<PullRequest>,
) -> DopplerResult<Json<crate::downloader::Completion>> {
    let completion = state
        .engine
        .download_model(&req.base_url, Some(&model_id), req.concurrency, None)
        .await?;
    Ok(Json(completion))
}

#[derive(Debug, Serialize)]
pub struct ModelsListResponse {
    pub object: &'static str,
    pub data: Vec<String>,
}

pub async fn list_models(State(state): State<AppState>) -> DopplerResult<Json<ModelsListResponse>> {
    let data = state.engine.list_models()?;
    Ok(Json(ModelsListResponse { object: "list", data }))
}

pub async fn delete_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> DopplerResult<StatusCode> {
    state.loaded.lock().await.remove(&model_id);
    state.engine.delete_model(&model_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub model_id: String,
    pub loaded: bool,
}

pub async fn load_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> DopplerResult<Json<LoadResponse>> {
    let loaded_model = state.engine.load_model(&model_id)?;
    state.loaded.lock().await.insert(model_id.clone(), loaded_model);
    Ok(Json(LoadResponse { model_id, loaded: true }))
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub stop_tokens: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct CompletionChunk {
    model: String,
    text: String,
    done: bool,
}

/// `POST /v1/completions` → `pipeline.generate` (spec §6). `GenerateStream`
/// borrows the `Pipeline` it drives and so cannot outlive the `MutexGuard` on
/// `state.loaded`; since axum's `Sse` body must be `'static`, generation is
/// driven to completion while the guard is held and the decoded chunks are
/// collected into an owned `Vec` before the guard (and the stream) are
/// dropped, matching the teacher's own `streaming.rs`, which builds its SSE
/// event list eagerly rather than yielding from a live generator.
pub async fn completions(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> DopplerResult<impl IntoResponse> {
    let mut guard = state.loaded.lock().await;
    let loaded_model = guard
        .get_mut(&req.model)
        .ok_or_else(|| DopplerError::Config(format!("model '{}' is not loaded", req.model)))?;

    let sampler = SamplerOptions {
        temperature: req.temperature.unwrap_or(1.0),
        top_k: req.top_k.unwrap_or(40),
        top_p: req.top_p.unwrap_or(1.0),
        repetition_penalty: req.repetition_penalty.unwrap_or(1.0),
    };
    let options = GenerateOptions {
        max_tokens: req.max_tokens.unwrap_or(256),
        sampler,
        stop_tokens: req.stop_tokens,
        cancel: CancellationToken::new(),
    };

    let mut tokens = Vec::new();
    {
        use futures::StreamExt;
        let mut generated = state.engine.generate(loaded_model, &req.prompt, options)?;
        while let Some(token) = generated.next().await {
            tokens.push(token?);
        }
    }

    let num_tokens = tokens.len();
    let mut chunks = Vec::with_capacity(num_tokens);
    for (idx, token) in tokens.into_iter().enumerate() {
        let text = loaded_model.tokenizer.decode(&[token])?;
        chunks.push(CompletionChunk { model: req.model.clone(), text, done: idx + 1 == num_tokens });
    }
    drop(guard);

    let events = chunks
        .into_iter()
        .map(|chunk| Event::default().json_data(chunk).map_err(|e| e.to_string()))
        .collect::<Vec<_>>();
    Ok(Sse::new(stream::iter(events)).keep_alive(KeepAlive::default()))
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn ready() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let loaded_count = state.loaded.lock().await.len();
    format!("doppler_loaded_models {loaded_count}\n")
}
