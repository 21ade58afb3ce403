use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogStreamError {
    #[error("entry at position {actual} does not follow the log tail, expected {expected}")]
    NonContiguousAppend { expected: i64, actual: i64 },

    #[error("can't truncate at {position}, entries up to {commit_position} are committed")]
    TruncateCommitted { position: i64, commit_position: i64 },

    #[error("malformed log entry: {0}")]
    MalformedEntry(&'static str),

    #[error("unsupported log entry format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown {field} code {code}")]
    UnknownCode { field: &'static str, code: u8 },
}
