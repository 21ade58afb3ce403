use crate::protocol::codec::var_data_length;
use crate::protocol::error::CodecError;
use crate::protocol::member::{host_bytes, host_length, read_member_fixed, write_member_fixed, Member, MEMBER_FIXED_LENGTH};
use crate::protocol::message::{
    begin_read, begin_write, fixed_length, RaftMessage, APPEND_REQUEST_TEMPLATE_ID, APPEND_RESPONSE_TEMPLATE_ID,
    PARTITION_ID_NULL, POSITION_NULL, TERM_NULL,
};
use bytes::Bytes;

/// Replicates at most one log entry from the leader. Without an entry it is a heartbeat, which
/// still carries the leader's commit position.
///
/// ```text
/// fixed:  partition_id u16 | term i32 | previous_entry_position i64 | previous_entry_term i32
///         | commit_position i64 | leader.port u16 | leader.node_id i32 | leader.type u8
/// var:    topic_name | leader.host
/// tail:   serialized log entry, up to the end of the frame
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest {
    pub partition_id: u16,
    pub term: i32,
    pub previous_entry_position: i64,
    pub previous_entry_term: i32,
    pub commit_position: i64,
    pub topic_name: String,
    pub leader: Option<Member>,
    pub entry: Option<Bytes>,
}

impl AppendRequest {
    pub fn is_heartbeat(&self) -> bool {
        self.entry.is_none()
    }
}

impl Default for AppendRequest {
    fn default() -> Self {
        AppendRequest {
            partition_id: PARTITION_ID_NULL,
            term: TERM_NULL,
            previous_entry_position: POSITION_NULL,
            previous_entry_term: TERM_NULL,
            commit_position: POSITION_NULL,
            topic_name: String::new(),
            leader: None,
            entry: None,
        }
    }
}

impl RaftMessage for AppendRequest {
    const TEMPLATE_ID: u16 = APPEND_REQUEST_TEMPLATE_ID;
    const BLOCK_LENGTH: u16 = 2 + 4 + 8 + 4 + 8 + MEMBER_FIXED_LENGTH;

    fn encoded_length(&self) -> usize {
        fixed_length::<Self>()
            + 2
            + self.topic_name.len()
            + 2
            + host_bytes(self.leader.as_ref()).len()
            + self.entry.as_ref().map(|e| e.len()).unwrap_or(0)
    }

    fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
        var_data_length("topic_name", self.topic_name.as_bytes())?;
        host_length(self.leader.as_ref())?;

        let mut writer = begin_write(self, buffer, offset)?;
        writer.put_u16(self.partition_id);
        writer.put_i32(self.term);
        writer.put_i64(self.previous_entry_position);
        writer.put_i32(self.previous_entry_term);
        writer.put_i64(self.commit_position);
        write_member_fixed(&mut writer, self.leader.as_ref());

        writer.put_var_data(self.topic_name.as_bytes());
        writer.put_var_data(host_bytes(self.leader.as_ref()));
        if let Some(entry) = &self.entry {
            writer.put_raw(entry);
        }

        Ok(writer.written())
    }

    fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
        self.reset();
        let (mut block, mut reader) = begin_read::<Self>(buffer, offset, length)?;

        self.partition_id = block.u16("partition_id")?;
        self.term = block.i32("term")?;
        self.previous_entry_position = block.i64("previous_entry_position")?;
        self.previous_entry_term = block.i32("previous_entry_term")?;
        self.commit_position = block.i64("commit_position")?;
        let leader = read_member_fixed(&mut block)?;

        self.topic_name.push_str(&reader.var_string("topic_name")?);
        self.leader = leader.with_host(reader.var_string("leader.host")?)?;

        let entry = reader.rest();
        if !entry.is_empty() {
            self.entry = Some(Bytes::copy_from_slice(entry));
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.partition_id = PARTITION_ID_NULL;
        self.term = TERM_NULL;
        self.previous_entry_position = POSITION_NULL;
        self.previous_entry_term = TERM_NULL;
        self.commit_position = POSITION_NULL;
        self.topic_name.clear();
        self.leader = None;
        self.entry = None;
    }
}

/// A follower's answer to an `AppendRequest`. On success `entry_position` is the last position
/// the follower now shares with the leader; on failure it is the follower's log tail, which the
/// leader uses to back off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResponse {
    pub partition_id: u16,
    pub term: i32,
    pub succeeded: bool,
    pub entry_position: i64,
    pub topic_name: String,
    pub member: Option<Member>,
}

impl Default for AppendResponse {
    fn default() -> Self {
        AppendResponse {
            partition_id: PARTITION_ID_NULL,
            term: TERM_NULL,
            succeeded: false,
            entry_position: POSITION_NULL,
            topic_name: String::new(),
            member: None,
        }
    }
}

impl RaftMessage for AppendResponse {
    const TEMPLATE_ID: u16 = APPEND_RESPONSE_TEMPLATE_ID;
    const BLOCK_LENGTH: u16 = 2 + 4 + 1 + 8 + MEMBER_FIXED_LENGTH;

    fn encoded_length(&self) -> usize {
        fixed_length::<Self>() + 2 + self.topic_name.len() + 2 + host_bytes(self.member.as_ref()).len()
    }

    fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
        var_data_length("topic_name", self.topic_name.as_bytes())?;
        host_length(self.member.as_ref())?;

        let mut writer = begin_write(self, buffer, offset)?;
        writer.put_u16(self.partition_id);
        writer.put_i32(self.term);
        writer.put_bool(self.succeeded);
        writer.put_i64(self.entry_position);
        write_member_fixed(&mut writer, self.member.as_ref());

        writer.put_var_data(self.topic_name.as_bytes());
        writer.put_var_data(host_bytes(self.member.as_ref()));

        Ok(writer.written())
    }

    fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
        self.reset();
        let (mut block, mut reader) = begin_read::<Self>(buffer, offset, length)?;

        self.partition_id = block.u16("partition_id")?;
        self.term = block.i32("term")?;
        self.succeeded = block.bool("succeeded")?;
        self.entry_position = block.i64("entry_position")?;
        let member = read_member_fixed(&mut block)?;

        self.topic_name.push_str(&reader.var_string("topic_name")?);
        self.member = member.with_host(reader.var_string("member.host")?)?;

        reader.finish(length)
    }

    fn reset(&mut self) {
        self.partition_id = PARTITION_ID_NULL;
        self.term = TERM_NULL;
        self.succeeded = false;
        self.entry_position = POSITION_NULL;
        self.topic_name.clear();
        self.member = None;
    }
}
