use crate::logstream::ValueType;
use serde::{Serialize, Serializer};
use std::fmt;

const JOB: &[&str] = &[
    "CREATE",
    "CREATED",
    "ACTIVATED",
    "COMPLETE",
    "COMPLETED",
    "TIME_OUT",
    "TIMED_OUT",
    "FAIL",
    "FAILED",
    "UPDATE_RETRIES",
    "RETRIES_UPDATED",
    "CANCEL",
    "CANCELED",
];
const RAFT: &[&str] = &["MEMBER_ADDED", "MEMBER_REMOVED"];
const DEPLOYMENT: &[&str] = &["CREATE", "CREATED", "DISTRIBUTE", "DISTRIBUTED"];
const WORKFLOW_INSTANCE: &[&str] = &[
    "CREATE",
    "ELEMENT_READY",
    "ELEMENT_ACTIVATED",
    "ELEMENT_COMPLETING",
    "ELEMENT_COMPLETED",
    "ELEMENT_TERMINATING",
    "ELEMENT_TERMINATED",
    "EVENT_TRIGGERING",
    "EVENT_TRIGGERED",
    "EVENT_ACTIVATING",
    "EVENT_ACTIVATED",
    "GATEWAY_ACTIVATED",
    "CANCEL",
    "UPDATE_PAYLOAD",
    "PAYLOAD_UPDATED",
];
const INCIDENT: &[&str] = &["CREATE", "CREATED", "RESOLVE", "RESOLVED", "DELETE", "DELETED"];
const MESSAGE: &[&str] = &["PUBLISH", "PUBLISHED", "DELETE", "DELETED"];
const SUBSCRIPTION: &[&str] = &["OPEN", "OPENED", "CORRELATE", "CORRELATED", "CLOSE", "CLOSED"];
const JOB_BATCH: &[&str] = &["ACTIVATE", "ACTIVATED"];
const TIMER: &[&str] = &["CREATE", "CREATED", "TRIGGER", "TRIGGERED", "CANCEL", "CANCELED"];
const EXPORTER: &[&str] = &["EXPORTED"];

/// Intent codes are only meaningful together with the value type they belong to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Intent {
    pub value_type: ValueType,
    pub code: u8,
}

impl Intent {
    pub fn new(value_type: ValueType, code: u8) -> Self {
        Intent { value_type, code }
    }

    pub fn name(&self) -> &'static str {
        let names: &[&str] = match self.value_type {
            ValueType::Job => JOB,
            ValueType::Raft => RAFT,
            ValueType::Deployment => DEPLOYMENT,
            ValueType::WorkflowInstance => WORKFLOW_INSTANCE,
            ValueType::Incident => INCIDENT,
            ValueType::Message => MESSAGE,
            ValueType::MessageSubscription | ValueType::WorkflowInstanceSubscription => SUBSCRIPTION,
            ValueType::JobBatch => JOB_BATCH,
            ValueType::Timer => TIMER,
            ValueType::Exporter => EXPORTER,
            ValueType::Noop | ValueType::Unknown(_) => &[],
        };
        names.get(self.code as usize).copied().unwrap_or("UNKNOWN")
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Intent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Intent codes used by the members of this crate that write entries themselves.
pub mod raft_intent {
    pub const MEMBER_ADDED: u8 = 0;
    pub const MEMBER_REMOVED: u8 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_depend_on_value_type() {
        assert_eq!(Intent::new(ValueType::Job, 4).name(), "COMPLETED");
        assert_eq!(Intent::new(ValueType::Timer, 4).name(), "CANCEL");
        assert_eq!(Intent::new(ValueType::Raft, raft_intent::MEMBER_REMOVED).name(), "MEMBER_REMOVED");
        assert_eq!(Intent::new(ValueType::Job, 200).name(), "UNKNOWN");
        assert_eq!(Intent::new(ValueType::Unknown(99), 0).name(), "UNKNOWN");
    }
}
