//! Package format: manifest + shard + tensor descriptors (spec §3, §4.1).

pub mod manifest;
pub mod shard;
pub mod tensor;

pub use manifest::{ArchitectureParams, HashAlgorithm, Manifest, MoeConfig, Quantization, parse_manifest};
pub use shard::{SHARD_SIZE, ShardDescriptor, get_manifest_url, get_shard_url};
pub use tensor::{Dtype, ShardSpan, TensorDescriptor, TensorLayout};
