//! GPU buffer pool (spec §4.6).
//!
//! Buckets idle buffers by size class; oversize requests allocate fresh.
//! Grounded on `oxbitnet`'s `BufferPool`, which keeps a `Vec<wgpu::Buffer>`
//! per size bucket behind a single owner rather than a ref-counted map.

use super::buffer::{BufferUsage, DeviceBuffer, DtypeTag};
use crate::error::{DopplerError, DopplerResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Round a requested size up to the next power-of-two bucket, floor 256 B.
fn size_class(bytes: u64) -> u64 {
    let floor = 256u64;
    if bytes <= floor {
        return floor;
    }
    bytes.next_power_of_two()
}

struct PooledBuffer {
    buffer: wgpu::Buffer,
    dtype: DtypeTag,
    usage: BufferUsage,
}

/// Single-owner pool of GPU buffers, scoped to one pipeline (spec §5: the
/// buffer pool is a single-owner resource per pipeline).
pub struct BufferPool {
    device: Arc<wgpu::Device>,
    idle: HashMap<u64, Vec<PooledBuffer>>,
}

impl BufferPool {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            idle: HashMap::new(),
        }
    }

    /// Acquire a buffer of at least `size_bytes`. Reuses an idle buffer from
    /// the matching size class if its dtype tag matches; a released F16
    /// buffer is never handed back to an F32 request (spec §4.6).
    pub fn acquire(
        &mut self,
        size_bytes: u64,
        dtype: DtypeTag,
        usage: BufferUsage,
        label: Option<&str>,
    ) -> DopplerResult<DeviceBuffer> {
        let class = size_class(size_bytes);

        if let Some(bucket) = self.idle.get_mut(&class) {
            if let Some(pos) = bucket.iter().position(|b| b.dtype == dtype && b.usage == usage) {
                let pooled = bucket.remove(pos);
                return Ok(DeviceBuffer {
                    buffer: pooled.buffer,
                    size_bytes: class,
                    dtype,
                    usage,
                    label: label.map(str::to_string),
                });
            }
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size: class,
            usage: usage.to_wgpu(),
            mapped_at_creation: false,
        });

        Ok(DeviceBuffer {
            buffer,
            size_bytes: class,
            dtype,
            usage,
            label: label.map(str::to_string),
        })
    }

    /// Return a buffer to the pool for reuse at layer boundaries, bounding
    /// the VRAM high-water mark (spec §9).
    pub fn release(&mut self, buf: DeviceBuffer) {
        let class = size_class(buf.size_bytes);
        self.idle.entry(class).or_default().push(PooledBuffer {
            buffer: buf.buffer,
            dtype: buf.dtype,
            usage: buf.usage,
        });
    }

    /// Total bytes of idle (pooled, not currently borrowed) buffers.
    pub fn idle_bytes(&self) -> u64 {
        self.idle
            .iter()
            .map(|(class, bucket)| class * bucket.len() as u64)
            .sum()
    }
}

/// A dtype rewrite request is required before a pooled buffer of a
/// different dtype can be reused; the pool itself never performs the
/// rewrite — it only enforces that callers go through one (spec §4.6).
pub fn require_dtype_rewrite(from: DtypeTag, to: DtypeTag) -> DopplerResult<()> {
    if from == to {
        Ok(())
    } else {
        Err(DopplerError::DtypeMismatch {
            expected: format!("{to:?}"),
            actual: format!("{from:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_class_rounds_up_to_power_of_two_floor_256() {
        assert_eq!(size_class(1), 256);
        assert_eq!(size_class(256), 256);
        assert_eq!(size_class(257), 512);
        assert_eq!(size_class(1024), 1024);
        assert_eq!(size_class(1025), 2048);
    }

    #[test]
    fn dtype_rewrite_required_is_detected() {
        assert!(require_dtype_rewrite(DtypeTag::F32, DtypeTag::F32).is_ok());
        assert!(require_dtype_rewrite(DtypeTag::F16, DtypeTag::F32).is_err());
    }
}
