use crate::logstream::LogStreamError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Event,
    Command,
    CommandRejection,
}

impl RecordType {
    pub fn code(&self) -> u8 {
        match self {
            RecordType::Event => 0,
            RecordType::Command => 1,
            RecordType::CommandRejection => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, LogStreamError> {
        match code {
            0 => Ok(RecordType::Event),
            1 => Ok(RecordType::Command),
            2 => Ok(RecordType::CommandRejection),
            code => Err(LogStreamError::UnknownCode {
                field: "record_type",
                code,
            }),
        }
    }
}

/// Discriminates what the entry's value bytes contain. Codes the log writer knows but this
/// reader doesn't are kept as `Unknown` instead of failing the read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Job,
    Raft,
    Deployment,
    WorkflowInstance,
    Incident,
    Noop,
    Message,
    MessageSubscription,
    WorkflowInstanceSubscription,
    Exporter,
    JobBatch,
    Timer,
    Unknown(u8),
}

impl ValueType {
    pub fn code(&self) -> u8 {
        match self {
            ValueType::Job => 0,
            ValueType::Raft => 1,
            ValueType::Deployment => 4,
            ValueType::WorkflowInstance => 5,
            ValueType::Incident => 6,
            ValueType::Noop => 7,
            ValueType::Message => 10,
            ValueType::MessageSubscription => 11,
            ValueType::WorkflowInstanceSubscription => 12,
            ValueType::Exporter => 13,
            ValueType::JobBatch => 14,
            ValueType::Timer => 15,
            ValueType::Unknown(code) => *code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ValueType::Job,
            1 => ValueType::Raft,
            4 => ValueType::Deployment,
            5 => ValueType::WorkflowInstance,
            6 => ValueType::Incident,
            7 => ValueType::Noop,
            10 => ValueType::Message,
            11 => ValueType::MessageSubscription,
            12 => ValueType::WorkflowInstanceSubscription,
            13 => ValueType::Exporter,
            14 => ValueType::JobBatch,
            15 => ValueType::Timer,
            code => ValueType::Unknown(code),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Job => "JOB",
            ValueType::Raft => "RAFT",
            ValueType::Deployment => "DEPLOYMENT",
            ValueType::WorkflowInstance => "WORKFLOW_INSTANCE",
            ValueType::Incident => "INCIDENT",
            ValueType::Noop => "NOOP",
            ValueType::Message => "MESSAGE",
            ValueType::MessageSubscription => "MESSAGE_SUBSCRIPTION",
            ValueType::WorkflowInstanceSubscription => "WORKFLOW_INSTANCE_SUBSCRIPTION",
            ValueType::Exporter => "EXPORTER",
            ValueType::JobBatch => "JOB_BATCH",
            ValueType::Timer => "TIMER",
            ValueType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Unknown(code) => write!(f, "UNKNOWN({})", code),
            known => f.write_str(known.name()),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

pub const REJECTION_TYPE_NULL: u8 = u8::MAX;

/// Everything about an entry except its value: what kind of record it is, which value type
/// the bytes hold, and why a command was rejected if it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: u8,
    pub rejection_type: u8,
    pub rejection_reason: String,
}

impl RecordMetadata {
    pub fn event(value_type: ValueType, intent: u8) -> Self {
        RecordMetadata {
            record_type: RecordType::Event,
            value_type,
            intent,
            rejection_type: REJECTION_TYPE_NULL,
            rejection_reason: String::new(),
        }
    }

    pub fn command(value_type: ValueType, intent: u8) -> Self {
        RecordMetadata {
            record_type: RecordType::Command,
            ..RecordMetadata::event(value_type, intent)
        }
    }

    pub fn rejection(value_type: ValueType, intent: u8, rejection_type: u8, reason: impl Into<String>) -> Self {
        RecordMetadata {
            record_type: RecordType::CommandRejection,
            value_type,
            intent,
            rejection_type,
            rejection_reason: reason.into(),
        }
    }

    /// record_type u8 | value_type u8 | intent u8 | rejection_type u8 | reason_length u16 | reason
    pub(crate) fn encoded_length(&self) -> usize {
        4 + 2 + self.rejection_reason.len()
    }
}
