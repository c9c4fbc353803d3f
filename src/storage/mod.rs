//! Simulated disk storage: fixed-capacity blocks owned by a disk manager

mod block;
mod disk_manager;
mod error;
mod geometry;

pub use block::Block;
pub use disk_manager::DiskManager;
pub use error::{StorageError, StorageResult};
pub use geometry::DiskGeometry;

/// Block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 200;

/// Simulated disk size in bytes (500MB)
pub const DEFAULT_DISK_SIZE: usize = 524_288_000;

/// Block ID type
pub type BlockId = usize;
