//! Shard descriptors and canonical URLs (spec §3, §4.1, §6.1).

use serde::{Deserialize, Serialize};

/// Fixed shard size: 64 MiB. The last shard of a model may be shorter.
pub const SHARD_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub index: usize,
    pub filename: String,
    pub size: u64,
    pub hash: String,
    pub offset: u64,
}

impl ShardDescriptor {
    /// True iff `offset == index * SHARD_SIZE` and `size <= SHARD_SIZE`.
    pub fn is_well_formed(&self) -> bool {
        self.offset == self.index as u64 * SHARD_SIZE && self.size <= SHARD_SIZE
    }
}

/// Canonical shard filename: `shard_00003.bin`.
pub fn shard_filename(index: usize) -> String {
    format!("shard_{index:05}.bin")
}

/// Canonical manifest filename, constant but kept as a function for symmetry
/// with `get_shard_url`.
pub fn manifest_filename() -> &'static str {
    "manifest.json"
}

/// `<baseUrl>/shard_<5-digit index>.bin`.
pub fn get_shard_url(base_url: &str, index: usize) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), shard_filename(index))
}

/// `<baseUrl>/manifest.json`.
pub fn get_manifest_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), manifest_filename())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_filename_is_zero_padded_to_five_digits() {
        assert_eq!(shard_filename(3), "shard_00003.bin");
        assert_eq!(shard_filename(123456), "shard_123456.bin");
    }

    #[test]
    fn get_shard_url_joins_base_and_filename() {
        assert_eq!(
            get_shard_url("https://example.com/models/m1", 0),
            "https://example.com/models/m1/shard_00000.bin"
        );
        assert_eq!(
            get_shard_url("https://example.com/models/m1/", 0),
            "https://example.com/models/m1/shard_00000.bin"
        );
    }

    #[test]
    fn get_manifest_url_appends_manifest_json() {
        assert_eq!(
            get_manifest_url("https://example.com/m"),
            "https://example.com/m/manifest.json"
        );
    }

    #[test]
    fn well_formed_requires_offset_alignment() {
        let good = ShardDescriptor {
            index: 1,
            filename: shard_filename(1),
            size: SHARD_SIZE,
            hash: "abc".into(),
            offset: SHARD_SIZE,
        };
        assert!(good.is_well_formed());

        let bad_offset = ShardDescriptor {
            offset: 0,
            ..good.clone()
        };
        assert!(!bad_offset.is_well_formed());

        let bad_size = ShardDescriptor {
            size: SHARD_SIZE + 1,
            ..good
        };
        assert!(!bad_size.is_well_formed());
    }
}
