use crate::protocol::append::{AppendRequest, AppendResponse};
use crate::protocol::codec::{FrameReader, FrameWriter};
use crate::protocol::error::CodecError;
use crate::protocol::header::MessageHeader;
use crate::protocol::membership::{
    ConfigureRequest, ConfigureResponse, JoinRequest, JoinResponse, LeaveRequest, LeaveResponse,
};
use crate::protocol::vote::{PollRequest, PollResponse, VoteRequest, VoteResponse};
use bytes::Bytes;

pub const PARTITION_ID_NULL: u16 = u16::MAX;
pub const TERM_NULL: i32 = i32::MIN;
pub const POSITION_NULL: i64 = i64::MIN;

pub(crate) const APPEND_REQUEST_TEMPLATE_ID: u16 = 10;
pub(crate) const APPEND_RESPONSE_TEMPLATE_ID: u16 = 11;
pub(crate) const VOTE_REQUEST_TEMPLATE_ID: u16 = 12;
pub(crate) const VOTE_RESPONSE_TEMPLATE_ID: u16 = 13;
pub(crate) const POLL_REQUEST_TEMPLATE_ID: u16 = 14;
pub(crate) const POLL_RESPONSE_TEMPLATE_ID: u16 = 15;
pub(crate) const JOIN_REQUEST_TEMPLATE_ID: u16 = 16;
pub(crate) const JOIN_RESPONSE_TEMPLATE_ID: u16 = 17;
pub(crate) const LEAVE_REQUEST_TEMPLATE_ID: u16 = 18;
pub(crate) const LEAVE_RESPONSE_TEMPLATE_ID: u16 = 19;
pub(crate) const CONFIGURE_REQUEST_TEMPLATE_ID: u16 = 20;
pub(crate) const CONFIGURE_RESPONSE_TEMPLATE_ID: u16 = 21;

/// A fixed-schema Raft RPC.
///
/// Objects are meant to be reused: `reset()` returns every field to its null value without
/// giving back allocated capacity, and `read_from()` overwrites in place.
pub trait RaftMessage: Default {
    const TEMPLATE_ID: u16;
    /// Length of the fixed block this version writes, and the minimum it accepts.
    const BLOCK_LENGTH: u16;

    /// Exact number of bytes `write_to` will write.
    fn encoded_length(&self) -> usize;

    /// Writes the whole frame at `offset` and returns the number of bytes written.
    fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CodecError>;

    /// Decodes the frame `buffer[offset..offset + length]`. Every byte of the frame must belong to
    /// the message.
    fn read_from(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<(), CodecError>;

    fn reset(&mut self);

    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buffer = vec![0u8; self.encoded_length()];
        self.write_to(&mut buffer, 0)?;
        Ok(Bytes::from(buffer))
    }

    fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut message = Self::default();
        message.read_from(frame, 0, frame.len())?;
        Ok(message)
    }
}

pub(crate) fn fixed_length<M: RaftMessage>() -> usize {
    MessageHeader::ENCODED_LENGTH + M::BLOCK_LENGTH as usize
}

/// Opens a writer sized to the message and writes its header.
pub(crate) fn begin_write<'a, M: RaftMessage>(
    message: &M,
    buffer: &'a mut [u8],
    offset: usize,
) -> Result<FrameWriter<'a>, CodecError> {
    let mut writer = FrameWriter::new(buffer, offset, message.encoded_length())?;
    MessageHeader::new(M::BLOCK_LENGTH, M::TEMPLATE_ID).write(&mut writer);
    Ok(writer)
}

/// Validates the header and returns readers over (fixed block, everything after it).
pub(crate) fn begin_read<'a, M: RaftMessage>(
    buffer: &'a [u8],
    offset: usize,
    length: usize,
) -> Result<(FrameReader<'a>, FrameReader<'a>), CodecError> {
    let mut reader = FrameReader::for_frame(buffer, offset, length)?;
    let header = MessageHeader::read(&mut reader)?;
    header.expect(M::TEMPLATE_ID, M::BLOCK_LENGTH)?;
    let block = reader.block("block", header.block_length as usize)?;

    Ok((block, reader))
}

/// Any decoded RPC, for transports that receive frames without knowing their type up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaftRpc {
    AppendRequest(AppendRequest),
    AppendResponse(AppendResponse),
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    PollRequest(PollRequest),
    PollResponse(PollResponse),
    JoinRequest(JoinRequest),
    JoinResponse(JoinResponse),
    LeaveRequest(LeaveRequest),
    LeaveResponse(LeaveResponse),
    ConfigureRequest(ConfigureRequest),
    ConfigureResponse(ConfigureResponse),
}

impl RaftRpc {
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let rpc = match MessageHeader::peek_template_id(frame, 0)? {
            APPEND_REQUEST_TEMPLATE_ID => RaftRpc::AppendRequest(AppendRequest::decode(frame)?),
            APPEND_RESPONSE_TEMPLATE_ID => RaftRpc::AppendResponse(AppendResponse::decode(frame)?),
            VOTE_REQUEST_TEMPLATE_ID => RaftRpc::VoteRequest(VoteRequest::decode(frame)?),
            VOTE_RESPONSE_TEMPLATE_ID => RaftRpc::VoteResponse(VoteResponse::decode(frame)?),
            POLL_REQUEST_TEMPLATE_ID => RaftRpc::PollRequest(PollRequest::decode(frame)?),
            POLL_RESPONSE_TEMPLATE_ID => RaftRpc::PollResponse(PollResponse::decode(frame)?),
            JOIN_REQUEST_TEMPLATE_ID => RaftRpc::JoinRequest(JoinRequest::decode(frame)?),
            JOIN_RESPONSE_TEMPLATE_ID => RaftRpc::JoinResponse(JoinResponse::decode(frame)?),
            LEAVE_REQUEST_TEMPLATE_ID => RaftRpc::LeaveRequest(LeaveRequest::decode(frame)?),
            LEAVE_RESPONSE_TEMPLATE_ID => RaftRpc::LeaveResponse(LeaveResponse::decode(frame)?),
            CONFIGURE_REQUEST_TEMPLATE_ID => RaftRpc::ConfigureRequest(ConfigureRequest::decode(frame)?),
            CONFIGURE_RESPONSE_TEMPLATE_ID => RaftRpc::ConfigureResponse(ConfigureResponse::decode(frame)?),
            unknown => return Err(CodecError::UnknownTemplate(unknown)),
        };

        Ok(rpc)
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        match self {
            RaftRpc::AppendRequest(m) => m.encode(),
            RaftRpc::AppendResponse(m) => m.encode(),
            RaftRpc::VoteRequest(m) => m.encode(),
            RaftRpc::VoteResponse(m) => m.encode(),
            RaftRpc::PollRequest(m) => m.encode(),
            RaftRpc::PollResponse(m) => m.encode(),
            RaftRpc::JoinRequest(m) => m.encode(),
            RaftRpc::JoinResponse(m) => m.encode(),
            RaftRpc::LeaveRequest(m) => m.encode(),
            RaftRpc::LeaveResponse(m) => m.encode(),
            RaftRpc::ConfigureRequest(m) => m.encode(),
            RaftRpc::ConfigureResponse(m) => m.encode(),
        }
    }
}
