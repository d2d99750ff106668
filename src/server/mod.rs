//! HTTP facade (spec §6, ambient): axum routes over `facade::Engine`,
//! mirroring the teacher's `server/mod.rs` router construction.

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models/:id/pull", post(handlers::pull_model))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/:id", delete(handlers::delete_model))
        .route("/v1/models/:id/load", post(handlers::load_model))
        .route("/v1/completions", post(handlers::completions))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationConfig;
    use crate::facade::Engine;
    use axum::Json;

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let config = ApplicationConfig {
            models_dir: dir.path().to_path_buf(),
            ..ApplicationConfig::default()
        };
        (dir, AppState::new(Engine::new(config)))
    }

    #[tokio::test]
    async fn list_models_on_empty_store_returns_empty_list() {
        let (_dir, state) = test_state();
        let Json(body) = handlers::list_models(axum::extract::State(state)).await.unwrap();
        assert!(body.data.is_empty());
        assert_eq!(body.object, "list");
    }

    #[tokio::test]
    async fn load_model_rejects_missing_manifest() {
        let (_dir, state) = test_state();
        let result = handlers::load_model(
            axum::extract::State(state),
            axum::extract::Path("ghost-model".to_string()),
        )
        .await;
        assert!(result.is_err());
    }
}
