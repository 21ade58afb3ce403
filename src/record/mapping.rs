use crate::logstream::{LoggedEvent, RecordType, ValueType};
use crate::record::error::MappingError;
use crate::record::intent::Intent;
use crate::record::exported::{ExportedRecord, Rejection, RejectionType};
use crate::record::value::RecordValue;
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;

/// Maps a log entry to the record exporters see, dispatching on its value type.
///
/// `Ok(None)` means the value type is not exported at all. That is filtering, not failure. Pure,
/// so calling it again for a retry gives the same answer.
pub fn map_record(partition_id: u16, event: &LoggedEvent) -> Result<Option<ExportedRecord>, MappingError> {
    let value_type = event.metadata.value_type;
    let value = match value_type {
        ValueType::Deployment => RecordValue::Deployment(decode(event)?),
        ValueType::Incident => RecordValue::Incident(decode(event)?),
        ValueType::Job => RecordValue::Job(decode(event)?),
        ValueType::Message => RecordValue::Message(decode(event)?),
        ValueType::MessageSubscription => RecordValue::MessageSubscription(decode(event)?),
        ValueType::Raft => RecordValue::Raft(decode(event)?),
        ValueType::WorkflowInstance => RecordValue::WorkflowInstance(decode(event)?),
        ValueType::WorkflowInstanceSubscription => RecordValue::WorkflowInstanceSubscription(decode(event)?),
        ValueType::JobBatch => RecordValue::JobBatch(decode(event)?),
        ValueType::Timer => RecordValue::Timer(decode(event)?),
        ValueType::Noop | ValueType::Exporter | ValueType::Unknown(_) => return Ok(None),
    };

    let timestamp = Utc
        .timestamp_millis_opt(event.timestamp)
        .single()
        .ok_or(MappingError::InvalidTimestamp {
            position: event.position,
            timestamp: event.timestamp,
        })?;

    let rejection = match event.metadata.record_type {
        RecordType::CommandRejection => Some(Rejection {
            rejection_type: RejectionType::from_code(event.metadata.rejection_type),
            reason: event.metadata.rejection_reason.clone(),
        }),
        RecordType::Event | RecordType::Command => None,
    };

    Ok(Some(ExportedRecord {
        position: event.position,
        source_record_position: event.source_event_position,
        key: event.key,
        timestamp,
        producer_id: event.producer_id,
        partition_id,
        raft_term: event.raft_term,
        record_type: event.metadata.record_type,
        value_type,
        intent: Intent::new(value_type, event.metadata.intent),
        rejection,
        value,
    }))
}

fn decode<T: DeserializeOwned + Default>(event: &LoggedEvent) -> Result<T, MappingError> {
    if event.value.is_empty() {
        return Ok(T::default());
    }

    serde_json::from_slice(&event.value).map_err(|source| MappingError::InvalidValue {
        position: event.position,
        value_type: event.metadata.value_type,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logstream::RecordMetadata;
    use crate::protocol::Member;
    use crate::record::value::RaftRecordValue;
    use bytes::Bytes;
    use serde_json::json;

    fn event(value_type: ValueType, intent: u8, value: serde_json::Value) -> LoggedEvent {
        let mut event = LoggedEvent::new(
            RecordMetadata::event(value_type, intent),
            Bytes::from(serde_json::to_vec(&value).unwrap()),
        )
        .with_key(42)
        .with_timestamp(1_546_300_800_000);
        event.position = 7;
        event.raft_term = 2;
        event
    }

    #[test]
    fn job_value_with_nested_headers() {
        let entry = event(
            ValueType::Job,
            1,
            json!({
                "type": "payment",
                "retries": 3,
                "headers": { "bpmnProcessId": "order-process", "workflowInstanceKey": 11 },
                "customHeaders": { "region": "eu" },
                "payload": { "amount": 12 }
            }),
        );

        let record = map_record(1, &entry).unwrap().unwrap();
        assert_eq!(record.position, 7);
        assert_eq!(record.partition_id, 1);
        assert_eq!(record.key, Some(42));
        assert_eq!(record.intent.name(), "CREATED");
        assert_eq!(record.timestamp.timestamp_millis(), 1_546_300_800_000);
        match record.value {
            RecordValue::Job(job) => {
                assert_eq!(job.job_type, "payment");
                assert_eq!(job.retries, 3);
                assert_eq!(job.headers.bpmn_process_id, "order-process");
                assert_eq!(job.headers.workflow_instance_key, 11);
                assert_eq!(job.custom_headers.get("region"), Some(&json!("eu")));
                assert_eq!(job.payload, json!({ "amount": 12 }));
            }
            other => panic!("expected job value, got {:?}", other),
        }
    }

    #[test]
    fn raft_value_carries_member_list() {
        let members = RaftRecordValue {
            members: vec![Member::new("broker-1", 26501, 1), Member::new("broker-2", 26502, 2)],
        };
        let entry = event(ValueType::Raft, 0, serde_json::to_value(&members).unwrap());

        let record = map_record(0, &entry).unwrap().unwrap();
        assert_eq!(record.value, RecordValue::Raft(members));
        assert_eq!(record.intent.name(), "MEMBER_ADDED");
    }

    #[test]
    fn unknown_and_internal_value_types_are_not_exported() {
        assert!(map_record(0, &event(ValueType::Unknown(77), 0, json!({}))).unwrap().is_none());
        assert!(map_record(0, &event(ValueType::Noop, 0, json!({}))).unwrap().is_none());
    }

    #[test]
    fn rejection_details_are_mapped() {
        let mut entry = event(ValueType::Incident, 2, json!({ "errorType": "IO_MAPPING_ERROR" }));
        entry.metadata = RecordMetadata::rejection(ValueType::Incident, 2, 1, "incident already resolved");

        let record = map_record(0, &entry).unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::CommandRejection);
        assert_eq!(
            record.rejection,
            Some(Rejection {
                rejection_type: RejectionType::NotApplicable,
                reason: String::from("incident already resolved"),
            })
        );
    }

    #[test]
    fn malformed_value_is_an_error_every_time() {
        let mut entry = event(ValueType::Timer, 0, json!({}));
        entry.value = Bytes::from_static(b"{not json");

        assert!(matches!(map_record(0, &entry), Err(MappingError::InvalidValue { .. })));
        assert!(matches!(map_record(0, &entry), Err(MappingError::InvalidValue { .. })));
    }

    #[test]
    fn record_renders_as_json() {
        let record = map_record(3, &event(ValueType::Message, 1, json!({ "name": "order-paid" })))
            .unwrap()
            .unwrap();
        let rendered: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert_eq!(rendered["valueType"], json!("MESSAGE"));
        assert_eq!(rendered["intent"], json!("PUBLISHED"));
        assert_eq!(rendered["value"]["name"], json!("order-paid"));
    }
}
