use crate::protocol::codec::var_data_length;
use crate::protocol::error::CodecError;
use crate::protocol::member::{
    host_bytes, host_length, members_group_length, read_member_fixed, read_members_group, write_member_fixed,
    write_members_group, Member, MEMBER_FIXED_LENGTH,
};
use crate::protocol::message::{
    begin_read, begin_write, fixed_length, RaftMessage, CONFIGURE_REQUEST_TEMPLATE_ID, CONFIGURE_RESPONSE_TEMPLATE_ID,
    JOIN_REQUEST_TEMPLATE_ID, JOIN_RESPONSE_TEMPLATE_ID, LEAVE_REQUEST_TEMPLATE_ID, LEAVE_RESPONSE_TEMPLATE_ID,
    PARTITION_ID_NULL, POSITION_NULL, TERM_NULL,
};

// Join and leave requests:
//
// fixed:  partition_id u16 | term i32 | member.port u16 | member.node_id i32 | member.type u8
// var:    topic_name | member.host
const MEMBER_REQUEST_BLOCK_LENGTH: u16 = 2 + 4 + MEMBER_FIXED_LENGTH;

// Join and leave responses:
//
// fixed:  term i32 | succeeded u8 | configuration_entry_position i64 | configuration_entry_term i32
// group:  members
const MEMBERSHIP_RESPONSE_BLOCK_LENGTH: u16 = 4 + 1 + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub partition_id: u16,
    pub term: i32,
    pub topic_name: String,
    pub member: Option<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    pub partition_id: u16,
    pub term: i32,
    pub topic_name: String,
    pub member: Option<Member>,
}

/// The leader's view of the configuration after handling a join. `members` is the complete list,
/// and the configuration entry fields say where in the log it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResponse {
    pub term: i32,
    pub succeeded: bool,
    pub configuration_entry_position: i64,
    pub configuration_entry_term: i32,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveResponse {
    pub term: i32,
    pub succeeded: bool,
    pub configuration_entry_position: i64,
    pub configuration_entry_term: i32,
    pub members: Vec<Member>,
}

macro_rules! member_request {
    ($name:ident, $template:expr) => {
        impl Default for $name {
            fn default() -> Self {
                $name {
                    partition_id: PARTITION_ID_NULL,
                    term: TERM_NULL,
                    topic_name: String::new(),
                    member: None,
                }
            }
        }

        impl RaftMessage for $name {
            const TEMPLATE_ID: u16 = $template;
            const BLOCK_LENGTH: u16 = MEMBER_REQUEST_BLOCK_LENGTH;

            fn encoded_length(&self) -> usize {
                fixed_length::<Self>() + 2 + self.topic_name.len() + 2 + host_bytes(self.member.as_ref()).len()
            }

            fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
                var_data_length("topic_name", self.topic_name.as_bytes())?;
                host_length(self.member.as_ref())?;

                let mut writer = begin_write(self, buffer, offset)?;
                writer.put_u16(self.partition_id);
                writer.put_i32(self.term);
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
                let member = read_member_fixed(&mut block)?;

                self.topic_name.push_str(&reader.var_string("topic_name")?);
                self.member = member.with_host(reader.var_string("member.host")?)?;
                reader.finish(length)
            }

            fn reset(&mut self) {
                self.partition_id = PARTITION_ID_NULL;
                self.term = TERM_NULL;
                self.topic_name.clear();
                self.member = None;
            }
        }
    };
}

macro_rules! membership_response {
    ($name:ident, $template:expr) => {
        impl Default for $name {
            fn default() -> Self {
                $name {
                    term: TERM_NULL,
                    succeeded: false,
                    configuration_entry_position: POSITION_NULL,
                    configuration_entry_term: TERM_NULL,
                    members: Vec::new(),
                }
            }
        }

        impl RaftMessage for $name {
            const TEMPLATE_ID: u16 = $template;
            const BLOCK_LENGTH: u16 = MEMBERSHIP_RESPONSE_BLOCK_LENGTH;

            fn encoded_length(&self) -> usize {
                fixed_length::<Self>() + group_length_unchecked(&self.members)
            }

            fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
                members_group_length(&self.members)?;

                let mut writer = begin_write(self, buffer, offset)?;
                writer.put_i32(self.term);
                writer.put_bool(self.succeeded);
                writer.put_i64(self.configuration_entry_position);
                writer.put_i32(self.configuration_entry_term);
                write_members_group(&mut writer, &self.members);
                Ok(writer.written())
            }

            fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
                self.reset();
                let (mut block, mut reader) = begin_read::<Self>(buffer, offset, length)?;

                self.term = block.i32("term")?;
                self.succeeded = block.bool("succeeded")?;
                self.configuration_entry_position = block.i64("configuration_entry_position")?;
                self.configuration_entry_term = block.i32("configuration_entry_term")?;
                read_members_group(&mut reader, &mut self.members)?;
                reader.finish(length)
            }

            fn reset(&mut self) {
                self.term = TERM_NULL;
                self.succeeded = false;
                self.configuration_entry_position = POSITION_NULL;
                self.configuration_entry_term = TERM_NULL;
                self.members.clear();
            }
        }
    };
}

member_request!(JoinRequest, JOIN_REQUEST_TEMPLATE_ID);
member_request!(LeaveRequest, LEAVE_REQUEST_TEMPLATE_ID);
membership_response!(JoinResponse, JOIN_RESPONSE_TEMPLATE_ID);
membership_response!(LeaveResponse, LEAVE_RESPONSE_TEMPLATE_ID);

fn group_length_unchecked(members: &[Member]) -> usize {
    super::codec::GROUP_HEADER_LENGTH
        + members
            .iter()
            .map(|m| MEMBER_FIXED_LENGTH as usize + 2 + m.host.len())
            .sum::<usize>()
}

/// Pushes the authoritative member list to a member, together with the position and term of the
/// log entry that introduced it so the receiver can tell whether it is newer than its own.
///
/// ```text
/// fixed:  partition_id u16 | term i32 | configuration_entry_position i64 | configuration_entry_term i32
/// group:  members
/// var:    topic_name
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureRequest {
    pub partition_id: u16,
    pub term: i32,
    pub configuration_entry_position: i64,
    pub configuration_entry_term: i32,
    pub members: Vec<Member>,
    pub topic_name: String,
}

impl Default for ConfigureRequest {
    fn default() -> Self {
        ConfigureRequest {
            partition_id: PARTITION_ID_NULL,
            term: TERM_NULL,
            configuration_entry_position: POSITION_NULL,
            configuration_entry_term: TERM_NULL,
            members: Vec::new(),
            topic_name: String::new(),
        }
    }
}

impl RaftMessage for ConfigureRequest {
    const TEMPLATE_ID: u16 = CONFIGURE_REQUEST_TEMPLATE_ID;
    const BLOCK_LENGTH: u16 = 2 + 4 + 8 + 4;

    fn encoded_length(&self) -> usize {
        fixed_length::<Self>() + group_length_unchecked(&self.members) + 2 + self.topic_name.len()
    }

    fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
        members_group_length(&self.members)?;
        var_data_length("topic_name", self.topic_name.as_bytes())?;

        let mut writer = begin_write(self, buffer, offset)?;
        writer.put_u16(self.partition_id);
        writer.put_i32(self.term);
        writer.put_i64(self.configuration_entry_position);
        writer.put_i32(self.configuration_entry_term);
        write_members_group(&mut writer, &self.members);
        writer.put_var_data(self.topic_name.as_bytes());
        Ok(writer.written())
    }

    fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
        self.reset();
        let (mut block, mut reader) = begin_read::<Self>(buffer, offset, length)?;

        self.partition_id = block.u16("partition_id")?;
        self.term = block.i32("term")?;
        self.configuration_entry_position = block.i64("configuration_entry_position")?;
        self.configuration_entry_term = block.i32("configuration_entry_term")?;
        read_members_group(&mut reader, &mut self.members)?;
        self.topic_name.push_str(&reader.var_string("topic_name")?);
        reader.finish(length)
    }

    fn reset(&mut self) {
        self.partition_id = PARTITION_ID_NULL;
        self.term = TERM_NULL;
        self.configuration_entry_position = POSITION_NULL;
        self.configuration_entry_term = TERM_NULL;
        self.members.clear();
        self.topic_name.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureResponse {
    pub term: i32,
}

impl Default for ConfigureResponse {
    fn default() -> Self {
        ConfigureResponse { term: TERM_NULL }
    }
}

impl RaftMessage for ConfigureResponse {
    const TEMPLATE_ID: u16 = CONFIGURE_RESPONSE_TEMPLATE_ID;
    const BLOCK_LENGTH: u16 = 4;

    fn encoded_length(&self) -> usize {
        fixed_length::<Self>()
    }

    fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError> {
        let mut writer = begin_write(self, buffer, offset)?;
        writer.put_i32(self.term);
        Ok(writer.written())
    }

    fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError> {
        self.reset();
        let (mut block, reader) = begin_read::<Self>(buffer, offset, length)?;
        self.term = block.i32("term")?;
        reader.finish(length)
    }

    fn reset(&mut self) {
        self.term = TERM_NULL;
    }
}
