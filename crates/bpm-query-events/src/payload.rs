// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed entity payloads.
//!
//! Each event type carries one of these inside the envelope's `entity` field.
//! Identity fields are required; everything else is optional so that partial
//! entities from older engines still decode. Dates are accepted either as
//! epoch milliseconds or as RFC 3339 strings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Date (de)serialization accepting both epoch millis and RFC 3339.
mod flexible_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_i64(date.timestamp_millis()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(Raw::Millis(millis)) => DateTime::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("date out of range: {millis}"))),
            Some(Raw::Text(text)) => DateTime::parse_from_rfc3339(&text)
                .map(|date| Some(date.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A process instance as carried by `PROCESS_*` lifecycle events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstancePayload {
    /// Process instance id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
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
    /// Business key.
    pub business_key: Option<String>,
    /// Engine-side status name.
    pub status: Option<String>,
    /// Parent process instance id (call activities).
    pub parent_id: Option<String>,
    /// Start date.
    #[serde(default, with = "flexible_date")]
    pub start_date: Option<DateTime<Utc>>,
    /// Completion date.
    #[serde(default, with = "flexible_date")]
    pub completed_date: Option<DateTime<Utc>>,
}

/// A user task as carried by `TASK_*` events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
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
    /// Engine-side status name.
    pub status: Option<String>,
    /// Creation date.
    #[serde(default, with = "flexible_date")]
    pub created_date: Option<DateTime<Utc>>,
    /// Due date.
    #[serde(default, with = "flexible_date")]
    pub due_date: Option<DateTime<Utc>>,
    /// Claim date.
    #[serde(default, with = "flexible_date")]
    pub claimed_date: Option<DateTime<Utc>>,
    /// Completion date.
    #[serde(default, with = "flexible_date")]
    pub completed_date: Option<DateTime<Utc>>,
    /// User that completed the task.
    pub completed_by: Option<String>,
    /// Owning process instance; `None` for standalone tasks.
    pub process_instance_id: Option<String>,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Business key of the owning process.
    pub business_key: Option<String>,
    /// Task definition key (BPMN element id).
    pub task_definition_key: Option<String>,
    /// Parent task for subtasks.
    pub parent_task_id: Option<String>,
    /// Form key.
    pub form_key: Option<String>,
}

/// A process or task variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablePayload {
    /// Variable name, unique per owner.
    pub name: String,
    /// Declared type (`string`, `integer`, `json`, ...).
    #[serde(rename = "type")]
    pub var_type: Option<String>,
    /// Variable value.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Owning process instance.
    pub process_instance_id: Option<String>,
    /// Owning task, for task-scoped variables.
    pub task_id: Option<String>,
    /// Whether the variable is scoped to a task rather than the process.
    #[serde(default)]
    pub task_variable: bool,
}

impl VariablePayload {
    /// True when this variable belongs to a task.
    pub fn is_task_variable(&self) -> bool {
        self.task_variable && self.task_id.is_some()
    }
}

/// One execution of a BPMN activity node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmnActivityPayload {
    /// BPMN element id.
    pub element_id: String,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Execution the activity ran in.
    pub execution_id: Option<String>,
    /// Activity display name.
    pub activity_name: Option<String>,
    /// BPMN activity type (`userTask`, `serviceTask`, ...).
    pub activity_type: Option<String>,
    /// Process definition id.
    pub process_definition_id: Option<String>,
}

impl BpmnActivityPayload {
    /// Natural key of this activity execution.
    pub fn activity_id(&self) -> String {
        activity_key(
            &self.process_instance_id,
            &self.element_id,
            self.execution_id.as_deref(),
        )
    }
}

/// Natural key `{processInstanceId}:{elementId}:{executionId}` of an activity
/// execution.
pub fn activity_key(process_instance_id: &str, element_id: &str, execution_id: Option<&str>) -> String {
    format!(
        "{}:{}:{}",
        process_instance_id,
        element_id,
        execution_id.unwrap_or_default()
    )
}

/// A transition along a BPMN sequence flow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceFlowPayload {
    /// Sequence flow element id.
    pub element_id: Option<String>,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Process definition id.
    pub process_definition_id: Option<String>,
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
}

/// A service task integration call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationContextPayload {
    /// Engine-side integration context id.
    pub id: Option<String>,
    /// Owning process instance.
    pub process_instance_id: String,
    /// Root process instance.
    pub root_process_instance_id: Option<String>,
    /// Parent process instance.
    pub parent_process_instance_id: Option<String>,
    /// Execution the service task ran in.
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
    /// Service task BPMN type.
    pub client_type: Option<String>,
    /// Connector implementation handling the call.
    pub connector_type: Option<String>,
    /// Variables sent to the connector.
    #[serde(default)]
    pub in_bound_variables: HashMap<String, serde_json::Value>,
    /// Variables returned by the connector.
    #[serde(default)]
    pub out_bound_variables: HashMap<String, serde_json::Value>,
    /// Error code reported by the connector.
    pub error_code: Option<String>,
    /// Error message reported by the connector.
    pub error_message: Option<String>,
    /// Error class reported by the connector.
    pub error_class_name: Option<String>,
    /// Stack trace elements reported by the connector.
    #[serde(default)]
    pub stack_trace_elements: Vec<serde_json::Value>,
}

impl IntegrationContextPayload {
    /// Natural key `{processInstanceId}:{clientId}:{executionId}`.
    pub fn context_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.process_instance_id,
            self.client_id,
            self.execution_id.as_deref().unwrap_or_default()
        )
    }

    /// Key of the service task activity this call belongs to.
    pub fn activity_id(&self) -> String {
        activity_key(
            &self.process_instance_id,
            &self.client_id,
            self.execution_id.as_deref(),
        )
    }
}

/// A deployed process definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinitionPayload {
    /// Process definition id.
    pub id: String,
    /// Process definition key.
    pub key: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Definition version.
    pub version: Option<i32>,
    /// Start form key.
    pub form_key: Option<String>,
    /// Category.
    pub category: Option<String>,
    /// Application version that shipped the definition.
    pub app_version: Option<String>,
    /// BPMN XML of the definition.
    pub process_model_content: Option<String>,
}

/// A deployed application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPayload {
    /// Deployment id.
    pub id: String,
    /// Application name.
    pub name: Option<String>,
    /// Application version.
    pub version: Option<String>,
}

/// A candidate user added to or removed from a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCandidateUserPayload {
    /// Task id.
    pub task_id: String,
    /// Candidate user id.
    pub user_id: String,
}

/// A candidate group added to or removed from a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCandidateGroupPayload {
    /// Task id.
    pub task_id: String,
    /// Candidate group id.
    pub group_id: String,
}

/// A user allowed to start a process definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCandidateStarterUserPayload {
    /// Process definition id.
    pub process_definition_id: String,
    /// Candidate starter user id.
    pub user_id: String,
}

/// A group allowed to start a process definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCandidateStarterGroupPayload {
    /// Process definition id.
    pub process_definition_id: String,
    /// Candidate starter group id.
    pub group_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dates_accept_millis_and_rfc3339() {
        let task: TaskPayload = serde_json::from_value(json!({
            "id": "t1",
            "createdDate": 1_000,
            "completedDate": "1970-01-01T00:00:03Z"
        }))
        .unwrap();

        assert_eq!(task.created_date.unwrap().timestamp_millis(), 1_000);
        assert_eq!(task.completed_date.unwrap().timestamp_millis(), 3_000);
        assert!(task.due_date.is_none());
    }

    #[test]
    fn test_dates_accept_null() {
        let task: TaskPayload =
            serde_json::from_value(json!({ "id": "t1", "dueDate": null })).unwrap();
        assert!(task.due_date.is_none());
    }

    #[test]
    fn test_variable_scope() {
        let var: VariablePayload = serde_json::from_value(json!({
            "name": "amount",
            "type": "integer",
            "value": 42,
            "processInstanceId": "pi-1",
            "taskId": "t1",
            "taskVariable": true
        }))
        .unwrap();
        assert!(var.is_task_variable());
        assert_eq!(var.var_type.as_deref(), Some("integer"));

        let var: VariablePayload = serde_json::from_value(json!({
            "name": "amount",
            "processInstanceId": "pi-1",
            "taskId": "t1"
        }))
        .unwrap();
        assert!(!var.is_task_variable());
        assert!(var.value.is_null());
    }

    #[test]
    fn test_activity_and_integration_keys() {
        let activity = BpmnActivityPayload {
            element_id: "serviceTask1".into(),
            process_instance_id: "pi-1".into(),
            execution_id: Some("ex-1".into()),
            ..Default::default()
        };
        assert_eq!(activity.activity_id(), "pi-1:serviceTask1:ex-1");

        let context = IntegrationContextPayload {
            process_instance_id: "pi-1".into(),
            client_id: "serviceTask1".into(),
            execution_id: Some("ex-1".into()),
            ..Default::default()
        };
        assert_eq!(context.context_id(), "pi-1:serviceTask1:ex-1");
        assert_eq!(context.activity_id(), activity.activity_id());
    }

    #[test]
    fn test_integration_variables_default_empty() {
        let context: IntegrationContextPayload = serde_json::from_value(json!({
            "processInstanceId": "pi-1",
            "clientId": "st1"
        }))
        .unwrap();
        assert!(context.in_bound_variables.is_empty());
        assert!(context.stack_trace_elements.is_empty());
    }
}
