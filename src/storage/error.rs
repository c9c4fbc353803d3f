use thiserror::Error;

use super::BlockId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Block not found: block_id={0}")]
    BlockNotFound(BlockId),

    /// `block_id` is None when raised by a block, which does not know its own id
    #[error("Slot {index} is empty{}", in_block(.block_id))]
    SlotEmpty {
        block_id: Option<BlockId>,
        index: usize,
    },

    #[error("Slot {0} is already occupied")]
    SlotOccupied(usize),

    #[error("Slot {index} out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },

    #[error("Block is full: block_id={0}")]
    BlockFull(BlockId),

    #[error("Disk is full ({max_blocks} blocks allocated)")]
    DiskFull { max_blocks: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

fn in_block(block_id: &Option<BlockId>) -> String {
    match block_id {
        Some(id) => format!(" in block {}", id),
        None => String::new(),
    }
}
