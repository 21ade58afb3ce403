use crate::logstream::metadata::{RecordMetadata, RecordType, ValueType};
use crate::logstream::LogStreamError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;

pub const POSITION_NOT_SET: i64 = -1;
const KEY_NULL: i64 = i64::MIN;
const LOGGED_EVENT_FORMAT_VERSION: u8 = 1;
const HEADER_LENGTH: usize = 1 + 8 + 4 + 8 + 8 + 4 + 8 + 2;

/// An immutable, position-addressed entry of the replicated log.
///
/// Byte representation, little endian:
///
/// ```text
/// +-----+----------+-----------+--------+-----------+-------------+----------------+---------+----------+-------+
/// | Vrs | Position | Raft term |  Key   | Timestamp | Producer id | Source event   | Meta    | Metadata | Value |
/// | u8  |   i64    |    i32    |  i64   |    i64    |     i32     | position i64   | len u16 |   ...    |  ...  |
/// +-----+----------+-----------+--------+-----------+-------------+----------------+---------+----------+-------+
/// ```
///
/// * `Key` - `i64::MIN` when the entry has no key
/// * `Timestamp` - epoch millis at which the leader wrote the entry
/// * `Metadata` - record type, value type, intent, rejection type, then the u16-prefixed
///   rejection reason
/// * `Value` - value-type specific payload, up to the end of the entry
///
/// This is exactly what an `AppendRequest` carries as its trailing payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub position: i64,
    pub raft_term: i32,
    pub key: Option<i64>,
    pub timestamp: i64,
    pub producer_id: i32,
    pub source_event_position: i64,
    pub metadata: RecordMetadata,
    pub value: Bytes,
}

impl LoggedEvent {
    /// An entry that has not been appended yet. The log assigns position and term.
    pub fn new(metadata: RecordMetadata, value: impl Into<Bytes>) -> Self {
        LoggedEvent {
            position: POSITION_NOT_SET,
            raft_term: 0,
            key: None,
            timestamp: 0,
            producer_id: -1,
            source_event_position: POSITION_NOT_SET,
            metadata,
            value: value.into(),
        }
    }

    pub fn with_key(mut self, key: i64) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_timestamp(mut self, timestamp_millis: i64) -> Self {
        self.timestamp = timestamp_millis;
        self
    }

    pub fn with_source_event_position(mut self, position: i64) -> Self {
        self.source_event_position = position;
        self
    }

    pub fn encoded_length(&self) -> usize {
        HEADER_LENGTH + self.metadata.encoded_length() + self.value.len()
    }

    pub fn encode(&self) -> Result<Bytes, LogStreamError> {
        let metadata_length = self.metadata.encoded_length();
        if metadata_length > u16::MAX as usize {
            return Err(LogStreamError::MalformedEntry("rejection reason too long"));
        }

        let mut buf = BytesMut::with_capacity(self.encoded_length());
        buf.put_u8(LOGGED_EVENT_FORMAT_VERSION);
        buf.put_i64_le(self.position);
        buf.put_i32_le(self.raft_term);
        buf.put_i64_le(self.key.unwrap_or(KEY_NULL));
        buf.put_i64_le(self.timestamp);
        buf.put_i32_le(self.producer_id);
        buf.put_i64_le(self.source_event_position);

        buf.put_u16_le(metadata_length as u16);
        buf.put_u8(self.metadata.record_type.code());
        buf.put_u8(self.metadata.value_type.code());
        buf.put_u8(self.metadata.intent);
        buf.put_u8(self.metadata.rejection_type);
        buf.put_u16_le(self.metadata.rejection_reason.len() as u16);
        buf.put_slice(self.metadata.rejection_reason.as_bytes());

        buf.put_slice(&self.value);
        Ok(buf.freeze())
    }
}

impl TryFrom<&[u8]> for LoggedEvent {
    type Error = LogStreamError;

    fn try_from(mut bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.remaining() < HEADER_LENGTH {
            return Err(LogStreamError::MalformedEntry("shorter than entry header"));
        }

        let version = bytes.get_u8();
        if version != LOGGED_EVENT_FORMAT_VERSION {
            return Err(LogStreamError::UnsupportedVersion(version));
        }

        let position = bytes.get_i64_le();
        let raft_term = bytes.get_i32_le();
        let key = match bytes.get_i64_le() {
            KEY_NULL => None,
            key => Some(key),
        };
        let timestamp = bytes.get_i64_le();
        let producer_id = bytes.get_i32_le();
        let source_event_position = bytes.get_i64_le();

        let metadata_length = bytes.get_u16_le() as usize;
        if bytes.remaining() < metadata_length || metadata_length < 6 {
            return Err(LogStreamError::MalformedEntry("metadata length out of bounds"));
        }
        let (mut metadata_bytes, value) = bytes.split_at(metadata_length);
        let metadata = read_metadata(&mut metadata_bytes)?;

        Ok(LoggedEvent {
            position,
            raft_term,
            key,
            timestamp,
            producer_id,
            source_event_position,
            metadata,
            value: Bytes::copy_from_slice(value),
        })
    }
}

fn read_metadata(bytes: &mut &[u8]) -> Result<RecordMetadata, LogStreamError> {
    let record_type = RecordType::from_code(bytes.get_u8())?;
    let value_type = ValueType::from_code(bytes.get_u8());
    let intent = bytes.get_u8();
    let rejection_type = bytes.get_u8();

    let reason_length = bytes.get_u16_le() as usize;
    if bytes.remaining() < reason_length {
        return Err(LogStreamError::MalformedEntry("rejection reason out of bounds"));
    }
    let rejection_reason = String::from_utf8(bytes[..reason_length].to_vec())
        .map_err(|_| LogStreamError::MalformedEntry("rejection reason is not UTF-8"))?;

    Ok(RecordMetadata {
        record_type,
        value_type,
        intent,
        rejection_type,
        rejection_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_survives_the_wire_format() {
        let event = LoggedEvent {
            position: 17,
            raft_term: 3,
            key: Some(2251799813685249),
            timestamp: 1_546_300_800_000,
            producer_id: 1,
            source_event_position: 16,
            metadata: RecordMetadata::rejection(ValueType::Job, 3, 2, "job is not activated"),
            value: Bytes::from_static(br#"{"type":"payment"}"#),
        };
        let bytes = event.encode().unwrap();

        assert_eq!(bytes.len(), event.encoded_length());
        assert_eq!(LoggedEvent::try_from(&bytes[..]).unwrap(), event);
    }

    #[test]
    fn absent_key_and_unknown_value_type() {
        let event = LoggedEvent::new(RecordMetadata::event(ValueType::Unknown(42), 0), Bytes::new());
        let decoded = LoggedEvent::try_from(&event.encode().unwrap()[..]).unwrap();

        assert_eq!(decoded.key, None);
        assert_eq!(decoded.metadata.value_type, ValueType::Unknown(42));
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn rejects_foreign_versions_and_short_input() {
        let mut bytes = LoggedEvent::new(RecordMetadata::event(ValueType::Noop, 0), Bytes::new())
            .encode()
            .unwrap()
            .to_vec();

        assert_eq!(
            LoggedEvent::try_from(&bytes[..10]),
            Err(LogStreamError::MalformedEntry("shorter than entry header"))
        );

        bytes[0] = 9;
        assert_eq!(LoggedEvent::try_from(&bytes[..]), Err(LogStreamError::UnsupportedVersion(9)));
    }
}
