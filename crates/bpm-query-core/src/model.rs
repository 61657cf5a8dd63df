// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read model records.
//!
//! One record per table. Status columns are stored as their upper-case names
//! and decoded through `TryFrom<String>`; JSON values are stored as text.

use std::fmt;
use std::str::FromStr;

use bpm_query_events::CloudRuntimeEvent;
use chrono::{DateTime, Utc};

/// Maximum stored length of an integration error message, in characters.
pub const MAX_ERROR_MESSAGE_LEN: usize = 255;

/// A status name that does not map to any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownStatus {
    /// Status enum being decoded.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Stored name of this status.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownStatus;

            fn try_from(value: String) -> Result<Self, UnknownStatus> {
                value.parse()
            }
        }
    };
}

status_enum! {
    /// Lifecycle status of a process instance.
    ///
    /// Resumption maps back to `Running`; deletion removes the row.
    ProcessInstanceStatus ("process instance status") {
        /// Created but not started.
        Created => "CREATED",
        /// Executing.
        Running => "RUNNING",
        /// Suspended by an operator.
        Suspended => "SUSPENDED",
        /// Finished normally.
        Completed => "COMPLETED",
        /// Cancelled before completion.
        Cancelled => "CANCELLED",
    }
}

impl ProcessInstanceStatus {
    /// True for `COMPLETED` and `CANCELLED`.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

status_enum! {
    /// Lifecycle status of a task.
    TaskStatus ("task status") {
        /// Created and unassigned.
        Created => "CREATED",
        /// Claimed by an assignee.
        Assigned => "ASSIGNED",
        /// Suspended with its process.
        Suspended => "SUSPENDED",
        /// Completed by a user.
        Completed => "COMPLETED",
        /// Cancelled before completion.
        Cancelled => "CANCELLED",
    }
}

impl TaskStatus {
    /// True for `COMPLETED` and `CANCELLED`.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

status_enum! {
    /// Status of one BPMN activity execution.
    BpmnActivityStatus ("activity status") {
        /// Entered.
        Started => "STARTED",
        /// Left normally.
        Completed => "COMPLETED",
        /// Interrupted.
        Cancelled => "CANCELLED",
        /// Failed in an integration call.
        Error => "ERROR",
    }
}

status_enum! {
    /// Status of a service task integration call.
    IntegrationContextStatus ("integration context status") {
        /// Request sent to the connector.
        IntegrationRequested => "INTEGRATION_REQUESTED",
        /// Connector returned a result.
        IntegrationResultReceived => "INTEGRATION_RESULT_RECEIVED",
        /// Connector reported an error.
        IntegrationErrorReceived => "INTEGRATION_ERROR_RECEIVED",
    }
}

/// Service and application metadata copied from the event envelope onto every
/// record it creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ServiceMetadata {
    /// Emitting service name.
    pub service_name: Option<String>,
    /// Emitting service full name.
    pub service_full_name: Option<String>,
    /// Emitting service version.
    pub service_version: Option<String>,
    /// Application name.
    pub app_name: Option<String>,
    /// Application version.
    pub app_version: Option<String>,
}

impl ServiceMetadata {
    /// Copy the metadata of `event`.
    pub fn from_event(event: &CloudRuntimeEvent) -> Self {
        Self {
            service_name: event.service_name.clone(),
            service_full_name: event.service_full_name.clone(),
            service_version: event.service_version.clone(),
            app_name: event.app_name.clone(),
            app_version: event.app_version.clone(),
        }
    }
}

/// A process instance.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProcessInstanceRecord {
    /// Process instance id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Lifecycle status.
    #[sqlx(try_from = "String")]
    pub status: ProcessInstanceStatus,
    /// Business key.
    pub business_key: Option<String>,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition key.
    pub process_definition_key: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Process definition name.
    pub process_definition_name: Option<String>,
    /// User that started the instance.
    pub initiator: Option<String>,
    /// Parent instance for call activities.
    pub parent_id: Option<String>,
    /// When the instance started running.
    pub start_date: Option<DateTime<Utc>>,
    /// When the instance completed or was cancelled.
    pub completed_date: Option<DateTime<Utc>>,
    /// When the instance was last suspended.
    pub suspended_date: Option<DateTime<Utc>>,
    /// Timestamp of the last applied event.
    pub last_modified: Option<DateTime<Utc>>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

/// A user task.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskRecord {
    /// Task id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Current assignee.
    pub assignee: Option<String>,
    /// Owner.
    pub owner: Option<String>,
    /// Priority.
    pub priority: Option<i32>,
    /// Lifecycle status.
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    /// Creation date.
    pub created_date: Option<DateTime<Utc>>,
    /// Due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Claim date.
    pub claimed_date: Option<DateTime<Utc>>,
    /// Completion date.
    pub completed_date: Option<DateTime<Utc>>,
    /// User that completed the task.
    pub completed_by: Option<String>,
    /// Milliseconds between creation and completion.
    pub duration: Option<i64>,
    /// Timestamp of the last applied event.
    pub last_modified: Option<DateTime<Utc>>,
    /// Owning process instance; `None` for standalone tasks.
    pub process_instance_id: Option<String>,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Business key.
    pub business_key: Option<String>,
    /// Task definition key.
    pub task_definition_key: Option<String>,
    /// Parent task id.
    pub parent_task_id: Option<String>,
    /// Form key.
    pub form_key: Option<String>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

/// A variable scoped to a process instance.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProcessVariableRecord {
    /// Generated id.
    pub id: String,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Name, unique per process instance.
    pub name: String,
    /// Declared type.
    pub var_type: Option<String>,
    /// JSON-encoded value.
    pub value: Option<String>,
    /// Creation time.
    pub create_time: Option<DateTime<Utc>>,
    /// Last update time.
    pub last_updated_time: Option<DateTime<Utc>>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

impl ProcessVariableRecord {
    /// Decoded value; `Null` when unset.
    pub fn value_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        decode_value(self.value.as_deref())
    }
}

/// A variable scoped to a task.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskVariableRecord {
    /// Generated id.
    pub id: String,
    /// Owning task.
    pub task_id: String,
    /// Process instance of the owning task.
    pub process_instance_id: Option<String>,
    /// Name, unique per task.
    pub name: String,
    /// Declared type.
    pub var_type: Option<String>,
    /// JSON-encoded value.
    pub value: Option<String>,
    /// Creation time.
    pub create_time: Option<DateTime<Utc>>,
    /// Last update time.
    pub last_updated_time: Option<DateTime<Utc>>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

impl TaskVariableRecord {
    /// Decoded value; `Null` when unset.
    pub fn value_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        decode_value(self.value.as_deref())
    }
}

fn decode_value(raw: Option<&str>) -> Result<serde_json::Value, serde_json::Error> {
    match raw {
        Some(text) => serde_json::from_str(text),
        None => Ok(serde_json::Value::Null),
    }
}

/// Encode a variable value for storage.
pub fn encode_value(value: &serde_json::Value) -> Result<Option<String>, serde_json::Error> {
    if value.is_null() {
        Ok(None)
    } else {
        serde_json::to_string(value).map(Some)
    }
}

/// One execution of a BPMN activity.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BpmnActivityRecord {
    /// `{processInstanceId}:{elementId}:{executionId}`.
    pub id: String,
    /// BPMN element id.
    pub element_id: String,
    /// Activity name.
    pub activity_name: Option<String>,
    /// BPMN activity type.
    pub activity_type: Option<String>,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition key.
    pub process_definition_key: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Business key.
    pub business_key: Option<String>,
    /// Execution id.
    pub execution_id: Option<String>,
    /// Execution status.
    #[sqlx(try_from = "String")]
    pub status: BpmnActivityStatus,
    /// When the activity was entered.
    pub started_date: Option<DateTime<Utc>>,
    /// When the activity completed.
    pub completed_date: Option<DateTime<Utc>>,
    /// When the activity was cancelled.
    pub cancelled_date: Option<DateTime<Utc>>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

/// A taken sequence flow. Append-only, deduplicated by event id.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BpmnSequenceFlowRecord {
    /// Generated id.
    pub id: String,
    /// Id of the event that recorded this transition.
    pub event_id: Option<String>,
    /// Sequence flow element id.
    pub element_id: Option<String>,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition key.
    pub process_definition_key: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Business key.
    pub business_key: Option<String>,
    /// Source activity element id.
    pub source_activity_element_id: Option<String>,
    /// Source activity name.
    pub source_activity_name: Option<String>,
    /// Source activity type.
    pub source_activity_type: Option<String>,
    /// Target activity element id.
    pub target_activity_element_id: Option<String>,
    /// Target activity name.
    pub target_activity_name: Option<String>,
    /// Target activity type.
    pub target_activity_type: Option<String>,
    /// When the flow was taken.
    pub date: Option<DateTime<Utc>>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

/// One service task integration call.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct IntegrationContextRecord {
    /// `{processInstanceId}:{clientId}:{executionId}`.
    pub id: String,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Root process instance.
    pub root_process_instance_id: Option<String>,
    /// Parent process instance.
    pub parent_process_instance_id: Option<String>,
    /// Execution id.
    pub execution_id: Option<String>,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition key.
    pub process_definition_key: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Business key.
    pub business_key: Option<String>,
    /// Service task element id.
    pub client_id: String,
    /// Service task name.
    pub client_name: Option<String>,
    /// Service task type.
    pub client_type: Option<String>,
    /// Connector type.
    pub connector_type: Option<String>,
    /// Linked service task activity, if known.
    pub activity_id: Option<String>,
    /// Call status.
    #[sqlx(try_from = "String")]
    pub status: IntegrationContextStatus,
    /// When the request was sent.
    pub request_date: Option<DateTime<Utc>>,
    /// When the result arrived.
    pub result_date: Option<DateTime<Utc>>,
    /// When the error arrived.
    pub error_date: Option<DateTime<Utc>>,
    /// Connector error code.
    pub error_code: Option<String>,
    /// Connector error message, at most [`MAX_ERROR_MESSAGE_LEN`] characters.
    pub error_message: Option<String>,
    /// Connector error class.
    pub error_class_name: Option<String>,
    /// JSON-encoded stack trace elements.
    pub stack_trace_elements: Option<String>,
    /// JSON-encoded inbound variables.
    pub in_bound_variables: Option<String>,
    /// JSON-encoded outbound variables.
    pub out_bound_variables: Option<String>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

/// Truncate an error message to [`MAX_ERROR_MESSAGE_LEN`] characters.
pub fn truncate_error_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// A deployed process definition.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProcessDefinitionRecord {
    /// Process definition id.
    pub id: String,
    /// Definition key.
    pub process_definition_key: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Version.
    pub version: Option<i32>,
    /// Start form key.
    pub form_key: Option<String>,
    /// Category.
    pub category: Option<String>,
    /// Service metadata.
    #[sqlx(flatten)]
    pub service: ServiceMetadata,
}

/// BPMN model content of a process definition.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProcessModelRecord {
    /// Process definition id.
    pub process_definition_id: String,
    /// BPMN XML.
    pub process_model_content: String,
}

/// A deployed application.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ApplicationRecord {
    /// Deployment id.
    pub id: String,
    /// Application name.
    pub name: Option<String>,
    /// Application version.
    pub version: Option<String>,
}

/// A candidate user of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct TaskCandidateUserRecord {
    /// Task id.
    pub task_id: String,
    /// User id.
    pub user_id: String,
}

/// A candidate group of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct TaskCandidateGroupRecord {
    /// Task id.
    pub task_id: String,
    /// Group id.
    pub group_id: String,
}

/// A user allowed to start a process definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct ProcessCandidateStarterUserRecord {
    /// Process definition id.
    pub process_definition_id: String,
    /// User id.
    pub user_id: String,
}

/// A group allowed to start a process definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct ProcessCandidateStarterGroupRecord {
    /// Process definition id.
    pub process_definition_id: String,
    /// Group id.
    pub group_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ProcessInstanceStatus::Created,
            ProcessInstanceStatus::Running,
            ProcessInstanceStatus::Suspended,
            ProcessInstanceStatus::Completed,
            ProcessInstanceStatus::Cancelled,
        ] {
            let parsed: ProcessInstanceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }

        let parsed = IntegrationContextStatus::try_from("INTEGRATION_ERROR_RECEIVED".to_string());
        assert_eq!(parsed, Ok(IntegrationContextStatus::IntegrationErrorReceived));

        let parsed = BpmnActivityStatus::try_from("ERROR".to_string());
        assert_eq!(parsed, Ok(BpmnActivityStatus::Error));
        assert!(BpmnActivityStatus::try_from("FAILED".to_string()).is_err());
    }

    #[test]
    fn test_unknown_status() {
        let err = "PAUSED".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown task status 'PAUSED'");
    }

    #[test]
    fn test_final_states() {
        assert!(ProcessInstanceStatus::Completed.is_final());
        assert!(ProcessInstanceStatus::Cancelled.is_final());
        assert!(!ProcessInstanceStatus::Suspended.is_final());
        assert!(TaskStatus::Cancelled.is_final());
        assert!(!TaskStatus::Assigned.is_final());
    }

    #[test]
    fn test_value_encoding() {
        assert_eq!(encode_value(&json!(null)).unwrap(), None);
        assert_eq!(encode_value(&json!({"a": 1})).unwrap().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(decode_value(None).unwrap(), json!(null));
        assert_eq!(decode_value(Some("[1,2]")).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_truncate_error_message_counts_chars() {
        let long = "é".repeat(300);
        let truncated = truncate_error_message(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_MESSAGE_LEN);

        assert_eq!(truncate_error_message("short"), "short");
    }
}
