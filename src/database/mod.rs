//! Record-level storage facade
//!
//! `Database` places records into blocks on the simulated disk, keeps the
//! numVotes index in step with them, and answers queries either through the
//! index or by scanning every block. Both paths report what they touched so
//! their costs can be compared.

mod loader;

pub use loader::load_tsv;

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::btree::{BPlusKey, BPlusTree, BPlusTreeError, SearchTrace};
use crate::config::{ConfigError, StorageConfig};
use crate::record::{RECORD_SIZE, Record, RecordError, RecordId};
use crate::storage::{BlockId, DiskManager, StorageError};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    BPlusTree(#[from] BPlusTreeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot parse data file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot read/write file: {0}")]
    Io(#[from] std::io::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Cost of answering one request
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccessStats {
    /// Index nodes read (internal descent plus leaves scanned)
    pub index_nodes_visited: usize,
    /// Distinct data blocks read
    pub data_blocks_accessed: usize,
    /// Simulated time spent reading those blocks
    pub access_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub records: Vec<Record>,
    pub stats: AccessStats,
}

impl QueryResult {
    /// Mean averageRating of the returned records, None when nothing matched
    pub fn average_rating(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let total: f64 = self
            .records
            .iter()
            .map(|r| r.average_rating() as f64)
            .sum();
        Some(total / self.records.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    /// Number of records removed
    pub removed: usize,
    pub stats: AccessStats,
}

/// Snapshot of storage and index figures
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    /// Simulated disk capacity in bytes
    pub disk_size: usize,
    /// Blocks the disk can hold
    pub max_blocks: usize,
    /// Blocks not yet allocated
    pub free_blocks: usize,
    pub num_records: usize,
    pub record_size: usize,
    pub records_per_block: usize,
    pub blocks_used: usize,
    pub tree_order: usize,
    pub tree_height: usize,
    pub tree_nodes: usize,
    pub root_keys: Vec<BPlusKey>,
}

/// Outcome of a load that keeps going past records that do not fit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    /// Records dropped because the disk was full
    pub skipped: usize,
}

pub struct Database {
    disk: DiskManager,
    index: BPlusTree,
    /// Blocks with at least one free slot, and how many they have
    free_slots: BTreeMap<BlockId, usize>,
}

impl Database {
    pub fn new(config: &StorageConfig) -> DatabaseResult<Self> {
        config.validate()?;

        let disk = DiskManager::new(
            config.disk_size,
            config.block_size,
            config.geometry.clone(),
            config.seed,
        )?;
        let index = BPlusTree::new(config.tree_order)?;

        Ok(Self {
            disk,
            index,
            free_slots: BTreeMap::new(),
        })
    }

    pub fn index(&self) -> &BPlusTree {
        &self.index
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Store a record in the first block with room and index it
    pub fn insert_record(&mut self, record: Record) -> DatabaseResult<RecordId> {
        let block_id = match self.free_slots.keys().next().copied() {
            Some(block_id) => block_id,
            None => {
                let block_id = self.disk.create_block()?;
                self.free_slots
                    .insert(block_id, self.disk.records_per_block());
                block_id
            }
        };

        let mut block = self.disk.read_block(block_id)?.clone();
        let offset = block
            .first_free_index()
            .ok_or(StorageError::BlockFull(block_id))?;
        let key = record.key();
        block.insert(record, offset)?;
        self.disk.write_block(block_id, block)?;

        if let Some(free) = self.free_slots.get_mut(&block_id) {
            *free -= 1;
            if *free == 0 {
                self.free_slots.remove(&block_id);
            }
        }

        let rid = RecordId::new(block_id, offset);
        self.index.insert(key, rid)?;
        Ok(rid)
    }

    /// Insert records in bulk, returning how many were stored
    ///
    /// Stops at the first failure; a full disk is reported as `DiskFull`.
    pub fn load_records<I>(&mut self, records: I) -> DatabaseResult<usize>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut loaded = 0;
        for record in records {
            if let Err(e) = self.insert_record(record) {
                if matches!(e, DatabaseError::Storage(StorageError::DiskFull { .. })) {
                    warn!("disk full after {} records", loaded);
                }
                return Err(e);
            }
            loaded += 1;
        }

        info!(
            "stored {} records in {} blocks",
            loaded,
            self.disk.num_blocks_used()
        );
        Ok(loaded)
    }

    /// Insert records in bulk, skipping those that find the disk full
    ///
    /// Any other failure is returned as-is.
    pub fn load_available<I>(&mut self, records: I) -> DatabaseResult<LoadSummary>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut summary = LoadSummary::default();
        for record in records {
            match self.insert_record(record) {
                Ok(_) => summary.loaded += 1,
                Err(DatabaseError::Storage(StorageError::DiskFull { max_blocks })) => {
                    if summary.skipped == 0 {
                        warn!(
                            "disk full ({} blocks) after {} records, skipping the rest",
                            max_blocks, summary.loaded
                        );
                    }
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "stored {} records in {} blocks ({} skipped)",
            summary.loaded,
            self.disk.num_blocks_used(),
            summary.skipped
        );
        Ok(summary)
    }

    // ========== Queries ==========

    /// Equality lookup through the index
    pub fn retrieve_by_index(&mut self, value: BPlusKey) -> DatabaseResult<QueryResult> {
        let (rids, trace) = self.index.exact_search_traced(value);
        self.fetch(&rids, trace)
    }

    /// Equality lookup by reading every block
    pub fn retrieve_by_linear_scan(&mut self, value: BPlusKey) -> DatabaseResult<QueryResult> {
        self.scan(|key| key == value)
    }

    /// Inclusive range lookup through the index
    pub fn retrieve_range_by_index(
        &mut self,
        lower: BPlusKey,
        upper: BPlusKey,
    ) -> DatabaseResult<QueryResult> {
        let (rids, trace) = self.index.range_search_traced(lower, upper);
        self.fetch(&rids, trace)
    }

    /// Inclusive range lookup by reading every block
    pub fn retrieve_range_by_linear_scan(
        &mut self,
        lower: BPlusKey,
        upper: BPlusKey,
    ) -> DatabaseResult<QueryResult> {
        self.scan(|key| lower <= key && key <= upper)
    }

    /// Read the records behind index hits, charging each block once
    fn fetch(&mut self, rids: &[RecordId], trace: SearchTrace) -> DatabaseResult<QueryResult> {
        let mut records = Vec::with_capacity(rids.len());
        let mut stats = AccessStats {
            index_nodes_visited: trace.total(),
            ..AccessStats::default()
        };
        let mut seen = HashSet::new();

        for rid in rids {
            if seen.insert(rid.block_id) {
                stats.data_blocks_accessed += 1;
                stats.access_time += self.disk.simulate_access_time(rid.block_id);
            }

            let record = self
                .disk
                .read_block(rid.block_id)?
                .record(rid.offset)
                .ok_or(StorageError::SlotEmpty {
                    block_id: Some(rid.block_id),
                    index: rid.offset,
                })?;
            records.push(record.clone());
        }

        Ok(QueryResult { records, stats })
    }

    fn scan<F>(&mut self, matches: F) -> DatabaseResult<QueryResult>
    where
        F: Fn(BPlusKey) -> bool,
    {
        let mut records = Vec::new();
        let mut stats = AccessStats::default();

        for block_id in self.disk.all_block_ids() {
            stats.data_blocks_accessed += 1;
            stats.access_time += self.disk.simulate_access_time(block_id);

            let block = self.disk.read_block(block_id)?;
            records.extend(
                block
                    .all_records()
                    .filter(|(_, record)| matches(record.key()))
                    .map(|(_, record)| record.clone()),
            );
        }

        Ok(QueryResult { records, stats })
    }

    // ========== Deletes ==========

    /// Remove every record with the key, locating them through the index
    pub fn delete_by_index(&mut self, value: BPlusKey) -> DatabaseResult<DeleteResult> {
        let (rids, trace) = self.index.exact_search_traced(value);
        let mut stats = AccessStats {
            index_nodes_visited: trace.total(),
            ..AccessStats::default()
        };

        // Group by block so each block is read and written once
        let mut by_block: BTreeMap<BlockId, Vec<RecordId>> = BTreeMap::new();
        for rid in &rids {
            by_block.entry(rid.block_id).or_default().push(*rid);
        }

        for (block_id, block_rids) in by_block {
            stats.data_blocks_accessed += 1;
            stats.access_time += self.disk.simulate_access_time(block_id);

            let mut block = self.disk.read_block(block_id)?.clone();
            for rid in &block_rids {
                block.delete(rid.offset)?;
            }
            self.disk.write_block(block_id, block)?;
            *self.free_slots.entry(block_id).or_insert(0) += block_rids.len();

            for rid in block_rids {
                self.index.delete_entry(value, rid)?;
            }
        }

        Ok(DeleteResult {
            removed: rids.len(),
            stats,
        })
    }

    /// Remove every record with the key by reading every block
    ///
    /// The matching index entries are dropped as well.
    pub fn delete_by_linear_scan(&mut self, value: BPlusKey) -> DatabaseResult<DeleteResult> {
        let mut stats = AccessStats::default();
        let mut removed = 0;

        for block_id in self.disk.all_block_ids() {
            stats.data_blocks_accessed += 1;
            stats.access_time += self.disk.simulate_access_time(block_id);

            let block = self.disk.read_block(block_id)?;
            let offsets: Vec<_> = block
                .all_records()
                .filter(|(_, record)| record.key() == value)
                .map(|(offset, _)| offset)
                .collect();
            if offsets.is_empty() {
                continue;
            }

            let mut block = block.clone();
            for &offset in &offsets {
                block.delete(offset)?;
            }
            self.disk.write_block(block_id, block)?;
            *self.free_slots.entry(block_id).or_insert(0) += offsets.len();

            for offset in offsets {
                self.index
                    .delete_entry(value, RecordId::new(block_id, offset))?;
                removed += 1;
            }
        }

        Ok(DeleteResult { removed, stats })
    }

    // ========== Statistics ==========

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            disk_size: self.disk.disk_size(),
            max_blocks: self.disk.max_blocks(),
            free_blocks: self.disk.max_blocks() - self.disk.num_blocks_used(),
            num_records: self.disk.num_records_stored(),
            record_size: RECORD_SIZE,
            records_per_block: self.disk.records_per_block(),
            blocks_used: self.disk.num_blocks_used(),
            tree_order: self.index.order(),
            tree_height: self.index.height(),
            tree_nodes: self.index.total_node_count(),
            root_keys: self
                .index
                .root_node_id()
                .and_then(|id| self.index.get_node(id))
                .map(|node| node.keys().to_vec())
                .unwrap_or_default(),
        }
    }
}
