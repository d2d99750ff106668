//! Per-shard download state machine (spec §4.3, §9 "coroutine-style
//! download": Pending → Fetching → Verifying → Done | Failed, retries
//! live inside the state machine rather than a shared retry loop).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardState {
    Pending,
    Fetching,
    Verifying,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardProgress {
    pub state: ShardState,
    pub attempts: u32,
}

impl Default for ShardProgress {
    fn default() -> Self {
        Self {
            state: ShardState::Pending,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadState {
    pub model_id: String,
    pub completed_shards: Vec<usize>,
    pub start_time: String,
    pub status: DownloadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    InProgress,
    Paused,
    Complete,
}

const MAX_RETRIES_PER_SHARD: u32 = 3;
const BACKOFF_INITIAL_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 30;

/// Exponential backoff capped at 30 s (spec §4.3, §5): `1s -> 2s -> 4s ...`.
pub fn backoff_delay(attempt: u32) -> std::time::Duration {
    let secs = BACKOFF_INITIAL_SECS.saturating_mul(1u64 << attempt.min(10)).min(BACKOFF_CAP_SECS);
    std::time::Duration::from_secs(secs)
}

pub fn should_retry(progress: &ShardProgress) -> bool {
    progress.attempts < MAX_RETRIES_PER_SHARD
}

/// State machine transition for one shard fetch attempt.
pub struct ShardStateMachine {
    pub progress: ShardProgress,
}

impl ShardStateMachine {
    pub fn new() -> Self {
        Self {
            progress: ShardProgress::default(),
        }
    }

    pub fn begin_fetch(&mut self) {
        self.progress.state = ShardState::Fetching;
        self.progress.attempts += 1;
    }

    pub fn begin_verify(&mut self) {
        self.progress.state = ShardState::Verifying;
    }

    pub fn mark_done(&mut self) {
        self.progress.state = ShardState::Done;
    }

    /// Returns `true` if the shard should be retried (another attempt
    /// available), `false` if it is permanently failed.
    pub fn mark_failed(&mut self) -> bool {
        if should_retry(&self.progress) {
            self.progress.state = ShardState::Pending;
            true
        } else {
            self.progress.state = ShardState::Failed;
            false
        }
    }
}

impl Default for ShardStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(backoff_delay(0).as_secs(), 1);
        assert_eq!(backoff_delay(1).as_secs(), 2);
        assert_eq!(backoff_delay(2).as_secs(), 4);
        assert_eq!(backoff_delay(10).as_secs(), 30);
    }

    #[test]
    fn shard_retries_up_to_three_attempts_then_fails_permanently() {
        let mut machine = ShardStateMachine::new();
        machine.begin_fetch(); // attempt 1
        assert!(machine.mark_failed());
        machine.begin_fetch(); // attempt 2
        assert!(machine.mark_failed());
        machine.begin_fetch(); // attempt 3, exhausts retries
        assert!(!machine.mark_failed());
        assert_eq!(machine.progress.state, ShardState::Failed);
    }

    #[test]
    fn successful_fetch_transitions_through_verifying_to_done() {
        let mut machine = ShardStateMachine::new();
        machine.begin_fetch();
        assert_eq!(machine.progress.state, ShardState::Fetching);
        machine.begin_verify();
        assert_eq!(machine.progress.state, ShardState::Verifying);
        machine.mark_done();
        assert_eq!(machine.progress.state, ShardState::Done);
    }
}
