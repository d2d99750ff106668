//! GPU buffer pool and per-kernel dispatch (spec §4.6, §5).

pub mod buffer;
pub mod forward;
pub mod pool;

pub use buffer::{BufferUsage, DeviceBuffer, DtypeTag};
pub use pool::BufferPool;
