//! Progress records (spec §6.3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Downloading,
    Writing,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub stage: Stage,
    pub current: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_shard: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub percent: f64,
}

impl ProgressRecord {
    pub fn new(stage: Stage, current: u64, total: u64) -> Self {
        let percent = if total == 0 { 0.0 } else { (current as f64 / total as f64) * 100.0 };
        Self {
            stage,
            current,
            total,
            current_shard: None,
            speed: None,
            percent,
        }
    }

    pub fn with_shard(mut self, shard: usize) -> Self {
        self.current_shard = Some(shard);
        self
    }

    pub fn with_speed(mut self, bytes_per_sec: f64) -> Self {
        self.speed = Some(bytes_per_sec);
        self
    }
}

/// A sink that receives `ProgressRecord`s as the downloader runs. The
/// teacher's own downloader takes a plain closure for this role; we keep
/// the same shape rather than introducing a trait object hierarchy.
pub type ProgressSink = Box<dyn Fn(ProgressRecord) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_zero_when_total_is_zero() {
        let record = ProgressRecord::new(Stage::Downloading, 0, 0);
        assert_eq!(record.percent, 0.0);
    }

    #[test]
    fn percent_reflects_current_over_total() {
        let record = ProgressRecord::new(Stage::Downloading, 50, 200);
        assert!((record.percent - 25.0).abs() < 1e-9);
    }
}
