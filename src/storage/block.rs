use super::error::{StorageError, StorageResult};
use crate::record::{Record, SlotId};

/// Fixed-capacity slotted container of records
///
/// Slots are addressed by offset and never move: deleting a record leaves a
/// hole that a later insert can reuse, so offsets held by the index stay valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Record slots (None = free)
    slots: Vec<Option<Record>>,
    /// Occupancy bitmap, one bit per slot
    bitmap: Vec<u8>,
    /// Number of occupied slots
    used: usize,
}

impl Block {
    /// Create an empty block with the given number of slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            bitmap: vec![0u8; capacity.div_ceil(8)],
            used: 0,
        }
    }

    /// Number of slots in this block
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn num_records(&self) -> usize {
        self.used
    }

    /// Number of free slots
    pub fn free_slot_count(&self) -> usize {
        self.capacity() - self.used
    }

    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Check if a slot is used
    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        let byte_idx = slot_id / 8;
        let bit_idx = slot_id % 8;
        if byte_idx >= self.bitmap.len() || slot_id >= self.capacity() {
            return false;
        }
        (self.bitmap[byte_idx] & (1 << bit_idx)) != 0
    }

    fn check_range(&self, slot_id: SlotId) -> StorageResult<()> {
        if slot_id >= self.capacity() {
            return Err(StorageError::SlotOutOfRange {
                index: slot_id,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn set_bit(&mut self, slot_id: SlotId) {
        self.bitmap[slot_id / 8] |= 1 << (slot_id % 8);
    }

    fn clear_bit(&mut self, slot_id: SlotId) {
        self.bitmap[slot_id / 8] &= !(1 << (slot_id % 8));
    }

    /// Store a record in an empty slot
    pub fn insert(&mut self, record: Record, slot_id: SlotId) -> StorageResult<()> {
        self.check_range(slot_id)?;
        if self.is_slot_used(slot_id) {
            return Err(StorageError::SlotOccupied(slot_id));
        }

        self.slots[slot_id] = Some(record);
        self.set_bit(slot_id);
        self.used += 1;
        Ok(())
    }

    /// Clear an occupied slot, returning the record it held
    pub fn delete(&mut self, slot_id: SlotId) -> StorageResult<Record> {
        self.check_range(slot_id)?;
        if !self.is_slot_used(slot_id) {
            return Err(StorageError::SlotEmpty {
                block_id: None,
                index: slot_id,
            });
        }

        let record = self.slots[slot_id]
            .take()
            .ok_or(StorageError::SlotEmpty {
                block_id: None,
                index: slot_id,
            })?;
        self.clear_bit(slot_id);
        self.used -= 1;
        Ok(record)
    }

    /// Overwrite an occupied slot in place
    pub fn update(&mut self, slot_id: SlotId, record: Record) -> StorageResult<()> {
        self.check_range(slot_id)?;
        if !self.is_slot_used(slot_id) {
            return Err(StorageError::SlotEmpty {
                block_id: None,
                index: slot_id,
            });
        }

        self.slots[slot_id] = Some(record);
        Ok(())
    }

    /// Find the lowest free slot, returns None if the block is full
    pub fn first_free_index(&self) -> Option<SlotId> {
        if self.is_full() {
            return None;
        }

        (0..self.capacity()).find(|&slot_id| !self.is_slot_used(slot_id))
    }

    /// Get the record in a slot
    pub fn record(&self, slot_id: SlotId) -> Option<&Record> {
        self.slots.get(slot_id).and_then(|r| r.as_ref())
    }

    /// All occupied slots in slot order
    pub fn all_records(&self) -> impl Iterator<Item = (SlotId, &Record)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot_id, slot)| slot.as_ref().map(|r| (slot_id, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: i32) -> Record {
        Record::new(format!("tt{:07}", i), 5.0, i).unwrap()
    }

    #[test]
    fn test_block_creation() {
        let block = Block::new(10);
        assert_eq!(block.capacity(), 10);
        assert_eq!(block.num_records(), 0);
        assert!(block.is_empty());
        assert!(!block.is_full());
        assert_eq!(block.first_free_index(), Some(0));
    }

    #[test]
    fn test_fill_block_and_overflow() {
        let mut block = Block::new(10);

        for i in 0..10 {
            block.insert(record(i as i32), i).unwrap();
        }

        assert!(block.is_full());
        assert_eq!(block.first_free_index(), None);

        // 11th insert at index 10 is out of bounds
        assert_eq!(
            block.insert(record(10), 10),
            Err(StorageError::SlotOutOfRange {
                index: 10,
                capacity: 10
            })
        );
    }

    #[test]
    fn test_delete_leaves_hole() {
        let mut block = Block::new(10);
        for i in 0..10 {
            block.insert(record(i as i32), i).unwrap();
        }

        let removed = block.delete(3).unwrap();
        assert_eq!(removed.num_votes(), 3);
        assert_eq!(block.first_free_index(), Some(3));
        assert_eq!(block.num_records(), 9);

        // Other offsets are untouched
        assert_eq!(block.record(4).map(|r| r.num_votes()), Some(4));
        assert!(block.record(3).is_none());
    }

    #[test]
    fn test_insert_occupied_slot() {
        let mut block = Block::new(4);
        block.insert(record(1), 2).unwrap();
        assert_eq!(
            block.insert(record(2), 2),
            Err(StorageError::SlotOccupied(2))
        );
        assert_eq!(block.record(2).map(|r| r.num_votes()), Some(1));
    }

    #[test]
    fn test_delete_empty_slot() {
        let mut block = Block::new(4);
        assert_eq!(
            block.delete(1),
            Err(StorageError::SlotEmpty {
                block_id: None,
                index: 1
            })
        );
        assert!(block.delete(9).is_err());
    }

    #[test]
    fn test_update() {
        let mut block = Block::new(4);
        assert!(block.update(0, record(1)).is_err());

        block.insert(record(1), 0).unwrap();
        block.update(0, record(7)).unwrap();
        assert_eq!(block.record(0).map(|r| r.num_votes()), Some(7));
        assert_eq!(block.num_records(), 1);
    }

    #[test]
    fn test_all_records_in_slot_order() {
        let mut block = Block::new(12);
        block.insert(record(9), 9).unwrap();
        block.insert(record(1), 1).unwrap();
        block.insert(record(10), 10).unwrap();

        let offsets: Vec<_> = block.all_records().map(|(slot, _)| slot).collect();
        assert_eq!(offsets, vec![1, 9, 10]);
    }
}
