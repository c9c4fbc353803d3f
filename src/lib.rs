pub mod btree;
pub mod config;
pub mod database;
pub mod record;
pub mod storage;

pub use btree::{BPlusKey, BPlusNode, BPlusTree, BPlusTreeError, BPlusTreeResult, SearchTrace};
pub use config::{ConfigError, StorageConfig, fitted_order};
pub use database::{
    AccessStats, Database, DatabaseError, DatabaseResult, DatabaseStats, DeleteResult,
    LoadSummary, QueryResult, load_tsv,
};
pub use record::{RECORD_SIZE, Record, RecordError, RecordId, RecordResult};
pub use storage::{Block, BlockId, DiskGeometry, DiskManager, StorageError, StorageResult};
