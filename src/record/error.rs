use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RecordError {
    #[error("Invalid record: {0}")]
    InvalidArgument(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
