use crate::logstream::{RecordType, ValueType};
use crate::record::intent::Intent;
use crate::record::value::RecordValue;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    InvalidArgument,
    NotApplicable,
    ProcessingError,
    Unknown,
}

impl RejectionType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RejectionType::InvalidArgument,
            1 => RejectionType::NotApplicable,
            2 => RejectionType::ProcessingError,
            _ => RejectionType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

/// The stable, external view of a log entry handed to exporters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedRecord {
    pub position: i64,
    /// Position of the entry this one was caused by, -1 if none.
    pub source_record_position: i64,
    pub key: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub producer_id: i32,
    pub partition_id: u16,
    pub raft_term: i32,
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    pub rejection: Option<Rejection>,
    pub value: RecordValue,
}

impl ExportedRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
