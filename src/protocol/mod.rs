mod append;
mod codec;
mod error;
mod header;
mod member;
mod membership;
mod message;
mod vote;

pub use append::{AppendRequest, AppendResponse};
pub use error::CodecError;
pub use header::{MessageHeader, SCHEMA_ID, SCHEMA_VERSION};
pub use member::{Member, MemberType, NODE_ID_NULL, PORT_NULL};
pub use membership::{ConfigureRequest, ConfigureResponse, JoinRequest, JoinResponse, LeaveRequest, LeaveResponse};
pub use message::{RaftMessage, RaftRpc, PARTITION_ID_NULL, POSITION_NULL, TERM_NULL};
pub use vote::{PollRequest, PollResponse, VoteRequest, VoteResponse};
