//! Streaming shard fetch over HTTP range-GETs (spec §4.3), grounded on the
//! teacher's `reqwest` streaming usage pattern.

use crate::error::{DopplerError, DopplerResult};
use crate::package::get_shard_url;
use futures::StreamExt;

/// A failed fetch, classified by whether `fetch_with_retry` should back off
/// and try again or give up immediately (spec §4.3/§7).
pub enum ShardFetchError {
    /// Non-retriable: a 4xx status other than 429, or any error the caller
    /// has no reason to expect will succeed on retry.
    Fatal(DopplerError),
    Retriable(DopplerError),
}

impl ShardFetchError {
    pub fn into_inner(self) -> DopplerError {
        match self {
            ShardFetchError::Fatal(e) | ShardFetchError::Retriable(e) => e,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ShardFetchError::Fatal(_))
    }
}

/// Fetches one shard's bytes, accumulating chunks and reporting
/// `(bytes_so_far, total)` to `on_chunk` as they arrive.
pub async fn fetch_shard(
    client: &reqwest::Client,
    base_url: &str,
    index: usize,
    expected_size: u64,
    mut on_chunk: impl FnMut(u64, u64),
) -> Result<Vec<u8>, ShardFetchError> {
    let url = get_shard_url(base_url, index);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ShardFetchError::Retriable(DopplerError::Network(format!("fetch {url} failed: {e}"))))?;

    let status = response.status();
    if !status.is_success() {
        let message = DopplerError::Network(format!("status {status} fetching shard {index}"));
        return if is_fatal_status(status.as_u16()) {
            Err(ShardFetchError::Fatal(message))
        } else {
            Err(ShardFetchError::Retriable(message))
        };
    }

    let mut bytes = Vec::with_capacity(expected_size as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| ShardFetchError::Retriable(DopplerError::Network(format!("stream error on shard {index}: {e}"))))?;
        bytes.extend_from_slice(&chunk);
        on_chunk(bytes.len() as u64, expected_size);
    }

    Ok(bytes)
}

/// HTTP status classifies as fatal-without-retry per spec §4.3/§7:
/// any 4xx except 429.
pub fn is_fatal_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 429
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_status_excludes_429() {
        assert!(!is_fatal_status(429));
        assert!(is_fatal_status(404));
        assert!(is_fatal_status(401));
        assert!(!is_fatal_status(500));
        assert!(!is_fatal_status(200));
    }
}
