// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task lifecycle handlers.

use std::collections::HashSet;

use async_trait::async_trait;
use bpm_query_events::payload::TaskPayload;
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::debug;

use super::QueryEventHandler;
use super::support;
use crate::error::Result;
use crate::finder::EntityFinder;
use crate::model::{ServiceMetadata, TaskRecord, TaskStatus};
use crate::store::UnitOfWork;

/// Inserts a task on `TASK_CREATED` and links it to the current process
/// variables of its instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCreatedHandler;

#[async_trait]
impl QueryEventHandler for TaskCreatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCreated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;

        if uow.find_task(&payload.id).await?.is_some() {
            debug!(task_id = %payload.id, "Task already exists, skipping");
            return Ok(());
        }

        let at = event.timestamp_utc();
        let status = payload
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(TaskStatus::Created);
        let process_instance_id =
            support::process_instance_id(event, payload.process_instance_id.as_deref());

        let task = TaskRecord {
            id: payload.id,
            name: payload.name,
            description: payload.description,
            assignee: payload.assignee,
            owner: payload.owner,
            priority: payload.priority,
            status,
            created_date: Some(payload.created_date.unwrap_or(at)),
            due_date: payload.due_date,
            claimed_date: payload.claimed_date,
            completed_date: None,
            completed_by: None,
            duration: None,
            last_modified: Some(at),
            process_instance_id,
            process_definition_id: payload
                .process_definition_id
                .or_else(|| event.process_definition_id.clone()),
            process_definition_version: payload
                .process_definition_version
                .or(event.process_definition_version),
            business_key: payload.business_key.or_else(|| event.business_key.clone()),
            task_definition_key: payload.task_definition_key,
            parent_task_id: payload.parent_task_id,
            form_key: payload.form_key,
            service: ServiceMetadata::from_event(event),
        };
        uow.save_task(&task).await?;

        if let Some(pi) = &task.process_instance_id {
            let mut linked: HashSet<String> = uow
                .list_task_process_variables(&task.id)
                .await?
                .into_iter()
                .map(|v| v.name)
                .collect();

            for variable in uow.list_process_variables(pi).await? {
                if linked.insert(variable.name.clone()) {
                    uow.link_task_process_variable(&task.id, &variable.id)
                        .await?;
                }
            }
        }

        Ok(())
    }
}

/// Records the assignee on `TASK_ASSIGNED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskAssignedHandler;

#[async_trait]
impl QueryEventHandler for TaskAssignedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskAssigned
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;
        let mut task = uow.require_task(&payload.id).await?;

        if task.status.is_final() {
            debug!(task_id = %task.id, status = %task.status, "Task already finished, ignoring assignment");
            return Ok(());
        }

        let at = event.timestamp_utc();
        task.assignee = payload.assignee;
        task.status = TaskStatus::Assigned;
        task.claimed_date = Some(payload.claimed_date.unwrap_or(at));
        task.last_modified = Some(at);

        uow.save_task(&task).await
    }
}

/// Re-activates a task on `TASK_ACTIVATED`: `ASSIGNED` when it already has
/// an assignee, otherwise `CREATED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskActivatedHandler;

#[async_trait]
impl QueryEventHandler for TaskActivatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskActivated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;
        let mut task = uow.require_task(&payload.id).await?;

        if task.status.is_final() {
            debug!(task_id = %task.id, "Task already finished, ignoring activation");
            return Ok(());
        }

        let assigned = task.assignee.as_deref().is_some_and(|a| !a.is_empty());
        task.status = if assigned {
            TaskStatus::Assigned
        } else {
            TaskStatus::Created
        };
        task.last_modified = Some(event.timestamp_utc());

        uow.save_task(&task).await
    }
}

/// Moves a task to `SUSPENDED` on `TASK_SUSPENDED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskSuspendedHandler;

#[async_trait]
impl QueryEventHandler for TaskSuspendedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskSuspended
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;
        let mut task = uow.require_task(&payload.id).await?;

        if task.status.is_final() {
            debug!(task_id = %task.id, "Task already finished, ignoring suspend");
            return Ok(());
        }

        task.status = TaskStatus::Suspended;
        task.last_modified = Some(event.timestamp_utc());

        uow.save_task(&task).await
    }
}

/// Copies the editable task fields on `TASK_UPDATED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskUpdatedHandler;

#[async_trait]
impl QueryEventHandler for TaskUpdatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskUpdated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;
        let mut task = uow.require_task(&payload.id).await?;

        task.name = payload.name;
        task.description = payload.description;
        task.priority = payload.priority;
        task.due_date = payload.due_date;
        task.form_key = payload.form_key;
        task.parent_task_id = payload.parent_task_id;
        task.assignee = payload.assignee;
        task.last_modified = Some(event.timestamp_utc());

        uow.save_task(&task).await
    }
}

/// Completes a task and records how long it was open.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCompletedHandler;

#[async_trait]
impl QueryEventHandler for TaskCompletedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCompleted
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;
        let mut task = uow.require_task(&payload.id).await?;

        let completed_at = event.timestamp_utc();
        task.status = TaskStatus::Completed;
        task.completed_date = Some(completed_at);
        task.completed_by = payload.completed_by.or_else(|| task.assignee.clone());
        task.duration = task
            .created_date
            .map(|created| (completed_at - created).num_milliseconds());
        task.last_modified = Some(completed_at);

        uow.save_task(&task).await
    }
}

/// Moves a task to `CANCELLED` on `TASK_CANCELLED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCancelledHandler;

#[async_trait]
impl QueryEventHandler for TaskCancelledHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCancelled
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskPayload = event.entity_as()?;
        let mut task = uow.require_task(&payload.id).await?;

        if task.status.is_final() {
            debug!(task_id = %task.id, status = %task.status, "Task already finished, ignoring cancellation");
            return Ok(());
        }

        task.status = TaskStatus::Cancelled;
        task.last_modified = Some(event.timestamp_utc());

        uow.save_task(&task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::support::testing::memory_store;
    use crate::store::ReadModelStore;
    use serde_json::json;

    fn event(event_type: EventType, entity: serde_json::Value, timestamp: i64) -> CloudRuntimeEvent {
        CloudRuntimeEvent::new(event_type, entity).with_timestamp(timestamp)
    }

    #[tokio::test]
    async fn test_created_uses_payload_status() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(
                uow.as_mut(),
                &event(
                    EventType::TaskCreated,
                    json!({"id": "t1", "status": "ASSIGNED", "assignee": "jane"}),
                    1_000,
                ),
            )
            .await
            .unwrap();

        let task = uow.find_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.process_instance_id, None);
        assert_eq!(task.created_date.map(|d| d.timestamp_millis()), Some(1_000));
    }

    #[tokio::test]
    async fn test_assigned_on_missing_task_is_not_found() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        let err = TaskAssignedHandler
            .handle(
                uow.as_mut(),
                &event(EventType::TaskAssigned, json!({"id": "t1", "assignee": "jane"}), 1),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_update_copies_fields() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(
                uow.as_mut(),
                &event(EventType::TaskCreated, json!({"id": "t1", "name": "old", "priority": 10}), 1),
            )
            .await
            .unwrap();
        TaskUpdatedHandler
            .handle(
                uow.as_mut(),
                &event(
                    EventType::TaskUpdated,
                    json!({"id": "t1", "name": "new", "priority": 80, "formKey": "approve"}),
                    2,
                ),
            )
            .await
            .unwrap();

        let task = uow.find_task("t1").await.unwrap().unwrap();
        assert_eq!(task.name.as_deref(), Some("new"));
        assert_eq!(task.priority, Some(80));
        assert_eq!(task.form_key.as_deref(), Some("approve"));
        assert_eq!(task.status, TaskStatus::Created);
    }

    #[tokio::test]
    async fn test_cancel_is_ignored_after_completion() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(uow.as_mut(), &event(EventType::TaskCreated, json!({"id": "t1"}), 1))
            .await
            .unwrap();
        TaskCompletedHandler
            .handle(uow.as_mut(), &event(EventType::TaskCompleted, json!({"id": "t1"}), 5))
            .await
            .unwrap();
        TaskCancelledHandler
            .handle(uow.as_mut(), &event(EventType::TaskCancelled, json!({"id": "t1"}), 9))
            .await
            .unwrap();

        let task = uow.find_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.duration, Some(4));
    }

    #[tokio::test]
    async fn test_suspend_open_task() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(uow.as_mut(), &event(EventType::TaskCreated, json!({"id": "t1"}), 1))
            .await
            .unwrap();
        TaskSuspendedHandler
            .handle(uow.as_mut(), &event(EventType::TaskSuspended, json!({"id": "t1"}), 7))
            .await
            .unwrap();

        let task = uow.find_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Suspended);
        assert_eq!(task.last_modified.map(|d| d.timestamp_millis()), Some(7));
    }

    #[tokio::test]
    async fn test_completion_without_created_date_has_no_duration() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(uow.as_mut(), &event(EventType::TaskCreated, json!({"id": "t1"}), 1))
            .await
            .unwrap();
        let mut task = uow.find_task("t1").await.unwrap().unwrap();
        task.created_date = None;
        uow.save_task(&task).await.unwrap();

        TaskCompletedHandler
            .handle(
                uow.as_mut(),
                &event(EventType::TaskCompleted, json!({"id": "t1", "completedBy": "bob"}), 5),
            )
            .await
            .unwrap();

        let task = uow.find_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_date.map(|d| d.timestamp_millis()), Some(5));
        assert_eq!(task.completed_by.as_deref(), Some("bob"));
        assert_eq!(task.duration, None);
    }
}
