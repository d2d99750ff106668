/// Request and span context management.
///
/// Tracks request IDs and execution spans through download, load, and
/// generate operations.
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique request ID for tracing through the system.
pub fn generate_request_id() -> String {
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    let uuid_str = Uuid::new_v4().to_string();
    format!("{}-{}", &uuid_str[..8], counter)
}

/// Create a request span with ID and metadata.
#[macro_export]
macro_rules! request_span {
    ($request_id:expr, $($key:tt = $value:tt),*) => {
        {
            tracing::info_span!(
                "request",
                request_id = %$request_id,
                $($key = $value),*
            )
        }
    };
}

/// Create an operation span for a specific stage (download, prefill, decode).
#[macro_export]
macro_rules! operation_span {
    ($name:expr, $($key:tt = $value:tt),*) => {
        {
            tracing::debug_span!(
                $name,
                $($key = $value),*
            )
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(generate_request_id()));
        }
    }

    #[test]
    fn request_id_has_uuid_prefix() {
        let id = generate_request_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert!(parts.len() >= 2);
        assert!(!parts[0].is_empty());
    }
}
