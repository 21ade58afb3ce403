mod exporter;
mod logging;
mod logstream;
mod protocol;
mod raft;
mod record;
mod time;

pub use exporter::{
    DirectorClosed, DirectorHandle, DirectorStartError, DirectorState, EventFilter, Exporter, ExporterConfiguration,
    ExporterContext, ExporterController, ExporterDescriptor, ExporterDirector, ExporterDirectorContext,
    ExporterDirectorOptions, ExporterError, ExporterFactory, ExporterMetrics, ExportersState, RecordFilter,
    ScheduledTaskHandle, SkipPositionsFilter, SnapshotError, StateError, StateSnapshotController,
    WeakDirectorClient, POSITION_NONE,
};
pub use logging::{discard_logger, stdout_root_logger};
pub use logstream::{
    CommitListener, CommitListenerId, InMemoryLogStream, LogStream, LogStreamError, LogStreamReader, LoggedEvent,
    RecordMetadata, RecordType, ValueType, POSITION_NOT_SET, REJECTION_TYPE_NULL,
};
pub use protocol::{
    AppendRequest, AppendResponse, CodecError, ConfigureRequest, ConfigureResponse, JoinRequest, JoinResponse,
    LeaveRequest, LeaveResponse, Member, MemberType, MessageHeader, PollRequest, PollResponse, RaftMessage, RaftRpc,
    VoteRequest, VoteResponse, NODE_ID_NULL, PARTITION_ID_NULL, PORT_NULL, POSITION_NULL, SCHEMA_ID,
    SCHEMA_VERSION, TERM_NULL,
};
pub use raft::{
    Configuration, PersistentLocalState, RaftRole, Replica, ReplicaConfig, ReplicaError, Term, VolatileLocalState,
};
pub use record::{
    map_record, raft_intent, DeployedWorkflow, DeploymentRecordValue, DeploymentResource, ExportedRecord,
    IncidentRecordValue, Intent, JobBatchRecordValue, JobHeaders, JobRecordValue, MappingError, MessageRecordValue,
    MessageSubscriptionRecordValue, RaftRecordValue, RecordValue, Rejection, RejectionType, TimerRecordValue,
    WorkflowInstanceRecordValue, WorkflowInstanceSubscriptionRecordValue,
};
pub use time::{mocked_clock, Clock, MockClock, MockClockController, RealClock, SharedClock};

// Root modules only declare `mod` and re-export with `pub use`. No `mod` is `pub`, so the public
// surface is exactly the list above and module internals can move freely.
