use super::error::{RecordError, RecordResult};
use crate::storage::BlockId;

/// Offset of a record slot within a block
pub type SlotId = usize;

/// Fixed width of the tconst field in bytes
pub const TCONST_SIZE: usize = 10;

/// Serialized size of a record: tconst + averageRating (f32) + numVotes (i32)
pub const RECORD_SIZE: usize = TCONST_SIZE + 4 + 4;

/// Physical address of a record (block + slot offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub block_id: BlockId,
    pub offset: SlotId,
}

impl RecordId {
    pub fn new(block_id: BlockId, offset: SlotId) -> Self {
        Self { block_id, offset }
    }
}

/// A single movie rating row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    tconst: String,
    average_rating: f32,
    num_votes: i32,
}

impl Record {
    /// Create a new record, validating that the tconst fits its fixed-width field
    pub fn new(tconst: impl Into<String>, average_rating: f32, num_votes: i32) -> RecordResult<Self> {
        let tconst = tconst.into();

        if tconst.is_empty() {
            return Err(RecordError::InvalidArgument("tconst is empty".to_string()));
        }
        if !tconst.is_ascii() {
            return Err(RecordError::InvalidArgument(format!(
                "tconst {:?} is not ASCII",
                tconst
            )));
        }
        if tconst.len() > TCONST_SIZE {
            return Err(RecordError::InvalidArgument(format!(
                "tconst {:?} is {} bytes, at most {} allowed",
                tconst,
                tconst.len(),
                TCONST_SIZE
            )));
        }

        Ok(Self {
            tconst,
            average_rating,
            num_votes,
        })
    }

    pub fn tconst(&self) -> &str {
        &self.tconst
    }

    pub fn average_rating(&self) -> f32 {
        self.average_rating
    }

    pub fn num_votes(&self) -> i32 {
        self.num_votes
    }

    /// Indexed attribute (numVotes widened to the tree key type)
    pub fn key(&self) -> i64 {
        self.num_votes as i64
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{:.1}\t{}",
            self.tconst, self.average_rating, self.num_votes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let record = Record::new("tt0000001", 5.6, 1645).unwrap();
        assert_eq!(record.tconst(), "tt0000001");
        assert_eq!(record.average_rating(), 5.6);
        assert_eq!(record.num_votes(), 1645);
        assert_eq!(record.key(), 1645);
    }

    #[test]
    fn test_record_tconst_validation() {
        assert!(Record::new("", 1.0, 1).is_err());
        assert!(Record::new("tt00000000001", 1.0, 1).is_err());
        assert!(Record::new("tt00ä", 1.0, 1).is_err());
        // Exactly the field width is fine
        assert!(Record::new("tt12345678", 1.0, 1).is_ok());
    }

    #[test]
    fn test_record_display() {
        let record = Record::new("tt0000002", 6.1, 198).unwrap();
        assert_eq!(record.to_string(), "tt0000002\t6.1\t198");
    }

    #[test]
    fn test_record_id_ordering() {
        assert!(RecordId::new(0, 5) < RecordId::new(1, 0));
        assert!(RecordId::new(1, 0) < RecordId::new(1, 1));
    }
}
