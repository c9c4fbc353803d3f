mod error;
mod record;

pub use error::{RecordError, RecordResult};
pub use record::{RECORD_SIZE, Record, RecordId, SlotId, TCONST_SIZE};
