//! Typed views of entry values. Values are written to the log as JSON maps; field names follow
//! the engine's camelCase. Missing fields take their defaults so older writers stay readable.

use crate::protocol::Member;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentResource {
    pub resource_name: String,
    pub resource_type: String,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployedWorkflow {
    pub bpmn_process_id: String,
    pub version: i32,
    pub workflow_key: i64,
    pub resource_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentRecordValue {
    pub resources: Vec<DeploymentResource>,
    pub deployed_workflows: Vec<DeployedWorkflow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncidentRecordValue {
    pub error_type: String,
    pub error_message: String,
    pub bpmn_process_id: String,
    pub workflow_instance_key: i64,
    pub element_id: String,
    pub element_instance_key: i64,
    pub job_key: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobHeaders {
    pub workflow_instance_key: i64,
    pub bpmn_process_id: String,
    pub workflow_definition_version: i32,
    pub workflow_key: i64,
    pub element_id: String,
    pub element_instance_key: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRecordValue {
    #[serde(rename = "type")]
    pub job_type: String,
    pub headers: JobHeaders,
    pub custom_headers: Map<String, Value>,
    pub worker: String,
    pub retries: i32,
    pub deadline: Option<i64>,
    pub error_message: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRecordValue {
    pub name: String,
    pub correlation_key: String,
    pub message_id: String,
    pub time_to_live: i64,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageSubscriptionRecordValue {
    pub workflow_instance_key: i64,
    pub element_instance_key: i64,
    pub message_name: String,
    pub correlation_key: String,
}

/// Cluster configuration carried by RAFT entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RaftRecordValue {
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowInstanceRecordValue {
    pub bpmn_process_id: String,
    pub version: i32,
    pub workflow_key: i64,
    pub workflow_instance_key: i64,
    pub element_id: String,
    pub flow_scope_key: i64,
    pub bpmn_element_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowInstanceSubscriptionRecordValue {
    pub workflow_instance_key: i64,
    pub element_instance_key: i64,
    pub message_name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobBatchRecordValue {
    #[serde(rename = "type")]
    pub job_type: String,
    pub worker: String,
    pub timeout: i64,
    pub amount: i32,
    pub job_keys: Vec<i64>,
    pub jobs: Vec<JobRecordValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerRecordValue {
    pub element_instance_key: i64,
    pub due_date: i64,
    pub handler_flow_node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    Deployment(DeploymentRecordValue),
    Incident(IncidentRecordValue),
    Job(JobRecordValue),
    Message(MessageRecordValue),
    MessageSubscription(MessageSubscriptionRecordValue),
    Raft(RaftRecordValue),
    WorkflowInstance(WorkflowInstanceRecordValue),
    WorkflowInstanceSubscription(WorkflowInstanceSubscriptionRecordValue),
    JobBatch(JobBatchRecordValue),
    Timer(TimerRecordValue),
}
