use crate::protocol::codec::{var_data_length, FrameReader, FrameWriter};
use crate::protocol::error::CodecError;
use crate::protocol::member::{host_bytes, host_length, read_member_fixed, write_member_fixed, Member, MEMBER_FIXED_LENGTH};
use crate::protocol::message::{
    begin_read, begin_write, fixed_length, RaftMessage, PARTITION_ID_NULL, POLL_REQUEST_TEMPLATE_ID,
    POLL_RESPONSE_TEMPLATE_ID, POSITION_NULL, TERM_NULL, VOTE_REQUEST_TEMPLATE_ID, VOTE_RESPONSE_TEMPLATE_ID,
};

// Vote and poll share one layout:
//
// fixed:  partition_id u16 | term i32 | last_entry_position i64 | last_entry_term i32
//         | candidate.port u16 | candidate.node_id i32 | candidate.type u8
// var:    topic_name | candidate.host
const CANDIDATE_BLOCK_LENGTH: u16 = 2 + 4 + 8 + 4 + MEMBER_FIXED_LENGTH;

// fixed: term i32 | granted u8
const GRANT_BLOCK_LENGTH: u16 = 4 + 1;

/// Asks for a binding vote in `term`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub partition_id: u16,
    pub term: i32,
    pub last_entry_position: i64,
    pub last_entry_term: i32,
    pub topic_name: String,
    pub candidate: Option<Member>,
}

/// Pre-vote. Same payload as `VoteRequest` but granting it changes nothing on the receiver, so a
/// partitioned member can find out whether it could win before bumping its term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub partition_id: u16,
    pub term: i32,
    pub last_entry_position: i64,
    pub last_entry_term: i32,
    pub topic_name: String,
    pub candidate: Option<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteResponse {
    pub term: i32,
    pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    pub term: i32,
    pub granted: bool,
}

struct CandidateFields<'a> {
    partition_id: &'a mut u16,
    term: &'a mut i32,
    last_entry_position: &'a mut i64,
    last_entry_term: &'a mut i32,
    topic_name: &'a mut String,
    candidate: &'a mut Option<Member>,
}

impl CandidateFields<'_> {
    fn reset(self) {
        *self.partition_id = PARTITION_ID_NULL;
        *self.term = TERM_NULL;
        *self.last_entry_position = POSITION_NULL;
        *self.last_entry_term = TERM_NULL;
        self.topic_name.clear();
        *self.candidate = None;
    }

    fn read(self, mut block: FrameReader<'_>, mut reader: FrameReader<'_>, length: usize) -> Result<(), CodecError> {
        *self.partition_id = block.u16("partition_id")?;
        *self.term = block.i32("term")?;
        *self.last_entry_position = block.i64("last_entry_position")?;
        *self.last_entry_term = block.i32("last_entry_term")?;
        let candidate = read_member_fixed(&mut block)?;

        self.topic_name.push_str(&reader.var_string("topic_name")?);
        *self.candidate = candidate.with_host(reader.var_string("candidate.host")?)?;

        reader.finish(length)
    }
}

fn candidate_length(topic_name: &str, candidate: Option<&Member>) -> usize {
    2 + topic_name.len() + 2 + host_bytes(candidate).len()
}

fn write_candidate(
    writer: &mut FrameWriter<'_>,
    partition_id: u16,
    term: i32,
    last_entry_position: i64,
    last_entry_term: i32,
    topic_name: &str,
    candidate: Option<&Member>,
) {
    writer.put_u16(partition_id);
    writer.put_i32(term);
    writer.put_i64(last_entry_position);
    writer.put_i32(last_entry_term);
    write_member_fixed(writer, candidate);

    writer.put_var_data(topic_name.as_bytes());
    writer.put_var_data(host_bytes(candidate));
}

macro_rules! candidate_message {
    ($name:ident, $template:expr) => {
        impl Default for $name {
            fn default() -> Self {
                $name {
                    partition_id: PARTITION_ID_NULL,
                    term: TERM_NULL,
                    last_entry_position: POSITION_NULL,
                    last_entry_term: TERM_NULL,
                    topic_name: String::new(),
                    candidate: None,
                }
            }
        }

        impl $name {
            fn fields(&mut self) -> CandidateFields<'_> {
                CandidateFields {
                    partition_id: &mut self.partition_id,
                    term: &mut self.term,
                    last_entry_position: &mut self.last_entry_position,
                    last_entry_term: &mut self.last_entry_term,
                    topic_name: &mut self.topic_name,
                    candidate: &mut self.candidate,
                }
            }
        }

        impl RaftMessage for $name {
            const TEMPLATE_ID: u16 = $template;
            const BLOCK_LENGTH: u16 = CANDIDATE_BLOCK_LENGTH;

            fn encoded_length(&self) -> usize {
                fixed_length::<Self>() + candidate_length(&self.topic_name, self.candidate.as_ref())
            }

            fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
                var_data_length("topic_name", self.topic_name.as_bytes())?;
                host_length(self.candidate.as_ref())?;

                let mut writer = begin_write(self, buffer, offset)?;
                write_candidate(
                    &mut writer,
                    self.partition_id,
                    self.term,
                    self.last_entry_position,
                    self.last_entry_term,
                    &self.topic_name,
                    self.candidate.as_ref(),
                );
                Ok(writer.written())
            }

            fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
                self.reset();
                let (block, reader) = begin_read::<Self>(buffer, offset, length)?;
                self.fields().read(block, reader, length)
            }

            fn reset(&mut self) {
                self.fields().reset();
            }
        }
    };
}

macro_rules! grant_message {
    ($name:ident, $template:expr) => {
        impl Default for $name {
            fn default() -> Self {
                $name {
                    term: TERM_NULL,
                    granted: false,
                }
            }
        }

        impl RaftMessage for $name {
            const TEMPLATE_ID: u16 = $template;
            const BLOCK_LENGTH: u16 = GRANT_BLOCK_LENGTH;

            fn encoded_length(&self) -> usize {
                fixed_length::<Self>()
            }

            fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
                let mut writer = begin_write(self, buffer, offset)?;
                writer.put_i32(self.term);
                writer.put_bool(self.granted);
                Ok(writer.written())
            }

            fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
                self.reset();
                let (mut block, reader) = begin_read::<Self>(buffer, offset, length)?;
                self.term = block.i32("term")?;
                self.granted = block.bool("granted")?;
                reader.finish(length)
            }

            fn reset(&mut self) {
                self.term = TERM_NULL;
                self.granted = false;
            }
        }
    };
}

candidate_message!(VoteRequest, VOTE_REQUEST_TEMPLATE_ID);
candidate_message!(PollRequest, POLL_REQUEST_TEMPLATE_ID);
grant_message!(VoteResponse, VOTE_RESPONSE_TEMPLATE_ID);
grant_message!(PollResponse, POLL_RESPONSE_TEMPLATE_ID);
