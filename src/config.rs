//! Engine configuration
//!
//! Every field has a default, so a JSON file only needs to name the values
//! it overrides.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{DEFAULT_BLOCK_SIZE, DEFAULT_DISK_SIZE, DiskGeometry};

/// Bytes of a node header (key count + leaf flag, padded)
const NODE_HEADER_SIZE: usize = 8;
/// Bytes of one key in a block-sized node
///
/// A node laid out in a block stores numVotes at its record width (i32).
/// The in-memory tree widens keys to i64, which does not change the layout.
const KEY_SIZE: usize = std::mem::size_of::<i32>();
/// Bytes of one child or record pointer
const POINTER_SIZE: usize = 8;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Largest tree order whose node still fits in one block
pub fn fitted_order(block_size: usize) -> usize {
    block_size.saturating_sub(NODE_HEADER_SIZE) / (KEY_SIZE + POINTER_SIZE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Simulated disk capacity in bytes
    pub disk_size: usize,
    /// Block size in bytes
    pub block_size: usize,
    /// Maximum keys per B+ tree node
    pub tree_order: usize,
    /// Physical disk model used for access-time figures
    pub geometry: DiskGeometry,
    /// Seed for the cache-hit draw
    pub seed: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            disk_size: DEFAULT_DISK_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            tree_order: fitted_order(DEFAULT_BLOCK_SIZE),
            geometry: DiskGeometry::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl StorageConfig {
    /// Read a configuration from a JSON file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: StorageConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidArgument(
                "block_size must be positive".to_string(),
            ));
        }
        if self.disk_size < self.block_size {
            return Err(ConfigError::InvalidArgument(format!(
                "disk_size {} is smaller than block_size {}",
                self.disk_size, self.block_size
            )));
        }
        if self.tree_order < 2 {
            return Err(ConfigError::InvalidArgument(format!(
                "tree_order {} must be at least 2",
                self.tree_order
            )));
        }
        self.geometry
            .validate()
            .map_err(|e| ConfigError::InvalidArgument(e.to_string()))
    }
}
