mod error;
mod exported;
mod intent;
mod mapping;
mod value;

pub use error::MappingError;
pub use intent::{raft_intent, Intent};
pub use exported::{ExportedRecord, Rejection, RejectionType};
pub use mapping::map_record;
pub use value::{
    DeployedWorkflow, DeploymentRecordValue, DeploymentResource, IncidentRecordValue, JobBatchRecordValue, JobHeaders,
    JobRecordValue, MessageRecordValue, MessageSubscriptionRecordValue, RaftRecordValue, RecordValue,
    TimerRecordValue, WorkflowInstanceRecordValue, WorkflowInstanceSubscriptionRecordValue,
};
