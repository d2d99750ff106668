//! Shared server state: one `Engine` plus the set of currently-loaded
//! pipelines, keyed by model id (spec §5: one task owns a `Pipeline` at a
//! time — held here behind a `tokio::sync::Mutex` per the teacher's
//! `SharedModelRegistry` pattern rather than a lock-free registry).

use crate::facade::{Engine, LoadedModel};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub loaded: Arc<Mutex<HashMap<String, LoadedModel>>>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
            loaded: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
