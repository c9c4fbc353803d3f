use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::block::Block;
use super::error::{StorageError, StorageResult};
use super::geometry::DiskGeometry;
use super::BlockId;
use crate::record::RECORD_SIZE;

/// Owns every block of the simulated disk
///
/// Block ids are handed out sequentially and are never reused within a run,
/// even after the block is deleted.
#[derive(Debug)]
pub struct DiskManager {
    /// Map from block IDs to blocks
    blocks: BTreeMap<BlockId, Block>,
    /// Next block ID to assign
    next_block_id: BlockId,
    /// Disk size in bytes
    disk_size: usize,
    /// Block size in bytes
    block_size: usize,
    /// Physical parameters for the access-time model
    geometry: DiskGeometry,
    /// Track the simulated head currently sits on
    head_position: usize,
    /// Source of cache hits, seeded for reproducible runs
    rng: StdRng,
}

impl DiskManager {
    /// Create a new disk manager
    ///
    /// # Arguments
    /// * `disk_size` - Total simulated disk size in bytes
    /// * `block_size` - Size of each block in bytes (must hold at least one record)
    /// * `geometry` - Physical disk parameters for access-time simulation
    /// * `seed` - Seed for the cache-hit draw
    pub fn new(
        disk_size: usize,
        block_size: usize,
        geometry: DiskGeometry,
        seed: u64,
    ) -> StorageResult<Self> {
        if block_size == 0 {
            return Err(StorageError::InvalidArgument(
                "block size must be positive".to_string(),
            ));
        }
        if block_size < RECORD_SIZE {
            return Err(StorageError::InvalidArgument(format!(
                "record size {} exceeds block size {}",
                RECORD_SIZE, block_size
            )));
        }
        if disk_size < block_size {
            return Err(StorageError::InvalidArgument(format!(
                "disk size {} is smaller than one block ({} bytes)",
                disk_size, block_size
            )));
        }
        geometry.validate()?;

        Ok(Self {
            blocks: BTreeMap::new(),
            next_block_id: 0,
            disk_size,
            block_size,
            geometry,
            head_position: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Create a disk manager with the default geometry
    pub fn with_default_geometry(disk_size: usize, block_size: usize) -> StorageResult<Self> {
        Self::new(disk_size, block_size, DiskGeometry::default(), 0)
    }

    pub fn disk_size(&self) -> usize {
        self.disk_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    /// Maximum number of blocks the disk can hold
    pub fn max_blocks(&self) -> usize {
        self.disk_size / self.block_size
    }

    /// Number of record slots in each block
    pub fn records_per_block(&self) -> usize {
        self.block_size / RECORD_SIZE
    }

    /// Allocate a new empty block, returning its ID
    pub fn create_block(&mut self) -> StorageResult<BlockId> {
        if self.blocks.len() >= self.max_blocks() {
            return Err(StorageError::DiskFull {
                max_blocks: self.max_blocks(),
            });
        }

        let block_id = self.next_block_id;
        self.next_block_id += 1;
        self.blocks
            .insert(block_id, Block::new(self.records_per_block()));

        debug!("created block {}", block_id);
        Ok(block_id)
    }

    /// Get a block by ID
    pub fn read_block(&self, block_id: BlockId) -> StorageResult<&Block> {
        self.blocks
            .get(&block_id)
            .ok_or(StorageError::BlockNotFound(block_id))
    }

    /// Replace a block wholesale (the block must have been created first)
    pub fn write_block(&mut self, block_id: BlockId, block: Block) -> StorageResult<()> {
        let slot = self
            .blocks
            .get_mut(&block_id)
            .ok_or(StorageError::BlockNotFound(block_id))?;
        *slot = block;
        Ok(())
    }

    /// Remove a block from the disk; its ID is not reused
    pub fn delete_block(&mut self, block_id: BlockId) -> StorageResult<()> {
        self.blocks
            .remove(&block_id)
            .ok_or(StorageError::BlockNotFound(block_id))?;
        debug!("deleted block {}", block_id);
        Ok(())
    }

    /// IDs of all allocated blocks in ascending order
    pub fn all_block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    /// Iterate over all allocated blocks in ID order
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        self.blocks.iter().map(|(&id, block)| (id, block))
    }

    /// Total records stored across all blocks
    pub fn num_records_stored(&self) -> usize {
        self.blocks.values().map(|b| b.num_records()).sum()
    }

    /// Number of allocated blocks
    pub fn num_blocks_used(&self) -> usize {
        self.blocks.len()
    }

    /// Simulate the latency of fetching a block
    ///
    /// A cache hit costs a flat amount; a miss pays seek + rotational delay +
    /// transfer and moves the head to the block's track.
    pub fn simulate_access_time(&mut self, block_id: BlockId) -> Duration {
        if self.rng.random_bool(self.geometry.cache_hit_rate) {
            return duration_from_ms(self.geometry.cache_access_ms);
        }

        let tracks = self.geometry.tracks(self.disk_size, self.block_size);
        let target_track = self.geometry.track_of(block_id, tracks);

        let distance = self.head_position.abs_diff(target_track);
        let seek = self.geometry.seek_time_ms(distance, tracks);
        let rotation = self
            .geometry
            .rotational_delay_ms(block_id, self.max_blocks(), tracks);
        let transfer = self.geometry.transfer_time_ms(self.block_size);

        self.head_position = target_track;

        duration_from_ms(seek + rotation + transfer)
    }

    /// Current track of the simulated head
    pub fn head_position(&self) -> usize {
        self.head_position
    }
}

fn duration_from_ms(ms: f64) -> Duration {
    Duration::from_secs_f64(ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn no_cache() -> DiskGeometry {
        DiskGeometry {
            cache_hit_rate: 0.0,
            ..DiskGeometry::default()
        }
    }

    #[test]
    fn test_create_until_full() {
        let mut disk = DiskManager::with_default_geometry(400, 200).unwrap();
        assert_eq!(disk.max_blocks(), 2);

        assert_eq!(disk.create_block().unwrap(), 0);
        assert_eq!(disk.create_block().unwrap(), 1);
        assert_eq!(
            disk.create_block(),
            Err(StorageError::DiskFull { max_blocks: 2 })
        );
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(DiskManager::with_default_geometry(400, 0).is_err());
        assert!(DiskManager::with_default_geometry(400, RECORD_SIZE - 1).is_err());
        assert!(DiskManager::with_default_geometry(100, 200).is_err());
    }

    #[test]
    fn test_block_capacity_from_sizes() {
        let mut disk = DiskManager::with_default_geometry(2000, 200).unwrap();
        let id = disk.create_block().unwrap();
        assert_eq!(disk.records_per_block(), 200 / RECORD_SIZE);
        assert_eq!(disk.read_block(id).unwrap().capacity(), 200 / RECORD_SIZE);
    }

    #[test]
    fn test_read_write_block() {
        let mut disk = DiskManager::with_default_geometry(2000, 200).unwrap();
        let id = disk.create_block().unwrap();

        let mut block = disk.read_block(id).unwrap().clone();
        block
            .insert(Record::new("tt0000001", 5.6, 1645).unwrap(), 0)
            .unwrap();
        disk.write_block(id, block).unwrap();

        assert_eq!(disk.read_block(id).unwrap().num_records(), 1);
        assert_eq!(disk.num_records_stored(), 1);
    }

    #[test]
    fn test_unknown_block() {
        let mut disk = DiskManager::with_default_geometry(2000, 200).unwrap();
        assert_eq!(
            disk.read_block(3).unwrap_err(),
            StorageError::BlockNotFound(3)
        );
        assert!(disk.write_block(3, Block::new(1)).is_err());
        assert!(disk.delete_block(3).is_err());
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut disk = DiskManager::with_default_geometry(400, 200).unwrap();
        let a = disk.create_block().unwrap();
        let b = disk.create_block().unwrap();
        disk.delete_block(a).unwrap();

        // Space is freed but the id keeps counting
        let c = disk.create_block().unwrap();
        assert_eq!(c, b + 1);
        assert_eq!(disk.all_block_ids(), vec![b, c]);
        assert_eq!(disk.num_blocks_used(), 2);
    }

    #[test]
    fn test_access_time_is_deterministic_for_seed() {
        let mut a = DiskManager::new(524_288_000, 200, DiskGeometry::default(), 7).unwrap();
        let mut b = DiskManager::new(524_288_000, 200, DiskGeometry::default(), 7).unwrap();

        for id in [0, 500, 17, 9000, 3] {
            assert_eq!(a.simulate_access_time(id), b.simulate_access_time(id));
        }
    }

    #[test]
    fn test_access_moves_head() {
        let mut disk = DiskManager::new(524_288_000, 200, no_cache(), 1).unwrap();
        let tracks = disk.geometry().tracks(524_288_000, 200);

        disk.simulate_access_time(tracks + 12);
        assert_eq!(disk.head_position(), 12);
    }

    #[test]
    fn test_cache_hit_costs_flat_amount() {
        let geometry = DiskGeometry {
            cache_hit_rate: 1.0,
            ..DiskGeometry::default()
        };
        let mut disk = DiskManager::new(524_288_000, 200, geometry, 1).unwrap();
        let t = disk.simulate_access_time(4242);
        assert_eq!(t, Duration::from_secs_f64(0.001 / 1000.0));
        assert_eq!(disk.head_position(), 0);
    }

    #[test]
    fn test_far_seek_costs_more() {
        let mut disk = DiskManager::new(524_288_000, 200, no_cache(), 1).unwrap();
        // Same sector position, different distance from the head
        let near = disk.simulate_access_time(0);
        let far = disk.simulate_access_time(5000);
        assert!(far > near);
    }
}
