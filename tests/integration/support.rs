//! Shared helpers for the integration suite: a minimal in-process HTTP
//! origin used by the downloader tests, built on `axum` since no example
//! in this workspace's corpus reaches for a dedicated HTTP-mocking crate.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use doppler::package::shard::shard_filename;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct MockOrigin {
    pub base_url: String,
    fetch_counts: Vec<Arc<AtomicU32>>,
}

impl MockOrigin {
    /// Number of GET requests the origin has served for `shard_index` so far.
    pub fn fetch_count(&self, shard_index: usize) -> u32 {
        self.fetch_counts[shard_index].load(Ordering::SeqCst)
    }
}

/// Spawns a mock origin serving `manifest_json` at `/manifest.json` and each
/// entry of `shards` at its canonical `shard_XXXXX.bin` path. Entries whose
/// index appears in `fail_first_attempt_for` return a 500 on their first
/// request and the real body on every subsequent one, to exercise the
/// downloader's retry path.
pub async fn spawn_mock_origin(manifest_json: Vec<u8>, shards: Vec<Vec<u8>>, fail_first_attempt_for: &[usize]) -> MockOrigin {
    let mut router = Router::new();
    let manifest_json = Arc::new(manifest_json);
    {
        let body = manifest_json.clone();
        router = router.route(
            "/manifest.json",
            get(move || {
                let body = body.clone();
                async move { (*body).clone() }
            }),
        );
    }

    let mut fetch_counts = Vec::with_capacity(shards.len());
    for (index, bytes) in shards.into_iter().enumerate() {
        let bytes = Arc::new(bytes);
        let attempts = Arc::new(AtomicU32::new(0));
        fetch_counts.push(attempts.clone());
        let should_fail_once = fail_first_attempt_for.contains(&index);
        let path = format!("/{}", shard_filename(index));
        router = router.route(
            &path,
            get(move || {
                let bytes = bytes.clone();
                let attempts = attempts.clone();
                async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    if should_fail_once && attempt == 0 {
                        return axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                    (*bytes).clone().into_response()
                }
            }),
        );
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock origin");
    let addr = listener.local_addr().expect("mock origin local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock origin server");
    });

    MockOrigin {
        base_url: format!("http://{addr}"),
        fetch_counts,
    }
}
