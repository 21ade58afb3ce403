use crate::logstream::ValueType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("{value_type} value at position {position} can't be decoded")]
    InvalidValue {
        position: i64,
        value_type: ValueType,
        #[source]
        source: serde_json::Error,
    },

    #[error("timestamp {timestamp} of entry at position {position} is out of range")]
    InvalidTimestamp { position: i64, timestamp: i64 },
}
