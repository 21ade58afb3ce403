use crate::logstream::LogStreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("log stream error")]
    LogStream(#[from] LogStreamError),

    #[error("only the leader can {0}")]
    NotLeader(&'static str),

    #[error("configuration entry can't be serialized")]
    Configuration(#[from] serde_json::Error),
}
