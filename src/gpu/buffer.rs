//! Device buffer handle (spec §3 "Device buffer").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum DtypeTag {
    F32,
    F16,
    U8Q4KM,
    U8MXFP4,
    I32,
}

impl DtypeTag {
    pub fn bytes_per_element(&self) -> usize {
        match self {
            DtypeTag::F32 | DtypeTag::I32 => 4,
            DtypeTag::F16 => 2,
            // Quantized tags are block-structured; callers needing exact
            // packed sizes should use `package::tensor::Dtype::packed_size`
            // instead. This reports the nearest whole-byte rate for pool
            // size-class bucketing only.
            DtypeTag::U8Q4KM => 1,
            DtypeTag::U8MXFP4 => 1,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const STORAGE = 0b0001;
        const COPY_SRC = 0b0010;
        const COPY_DST = 0b0100;
        const UNIFORM = 0b1000;
        const MAPPED_READ = 0b1_0000;
    }
}

impl BufferUsage {
    pub fn to_wgpu(self) -> wgpu::BufferUsages {
        let mut out = wgpu::BufferUsages::empty();
        if self.contains(BufferUsage::STORAGE) {
            out |= wgpu::BufferUsages::STORAGE;
        }
        if self.contains(BufferUsage::COPY_SRC) {
            out |= wgpu::BufferUsages::COPY_SRC;
        }
        if self.contains(BufferUsage::COPY_DST) {
            out |= wgpu::BufferUsages::COPY_DST;
        }
        if self.contains(BufferUsage::UNIFORM) {
            out |= wgpu::BufferUsages::UNIFORM;
        }
        if self.contains(BufferUsage::MAPPED_READ) {
            out |= wgpu::BufferUsages::MAP_READ;
        }
        out
    }
}

/// Opaque handle around a `wgpu::Buffer`, carrying the metadata the pool
/// and kernels need (spec §3 "Device buffer"). Owned by exactly one holder
/// at a time: the pool while idle, one consumer while borrowed.
pub struct DeviceBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub size_bytes: u64,
    pub dtype: DtypeTag,
    pub usage: BufferUsage,
    pub label: Option<String>,
}

impl DeviceBuffer {
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("size_bytes", &self.size_bytes)
            .field("dtype", &self.dtype)
            .field("usage", &self.usage)
            .field("label", &self.label)
            .finish()
    }
}
