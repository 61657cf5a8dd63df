// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task candidate and process candidate starter handlers.
//!
//! Adds are existence-checked inserts and removes delete only when the row is
//! present, so redelivered events change nothing. Task candidates of a
//! finished task are left alone.

use async_trait::async_trait;
use bpm_query_events::payload::{
    ProcessCandidateStarterGroupPayload, ProcessCandidateStarterUserPayload,
    TaskCandidateGroupPayload, TaskCandidateUserPayload,
};
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::{debug, warn};

use super::QueryEventHandler;
use crate::error::Result;
use crate::finder::EntityFinder;
use crate::model::{
    ProcessCandidateStarterGroupRecord, ProcessCandidateStarterUserRecord,
    TaskCandidateGroupRecord, TaskCandidateUserRecord,
};
use crate::store::UnitOfWork;

/// Loads the task and reports whether its candidates may still change.
async fn task_is_open(uow: &mut dyn UnitOfWork, task_id: &str, event: &CloudRuntimeEvent) -> Result<bool> {
    let task = uow.require_task(task_id).await?;
    if task.status.is_final() {
        warn!(
            task_id,
            status = %task.status,
            event_type = %event.event_type,
            "Ignoring candidate change on finished task"
        );
        return Ok(false);
    }
    Ok(true)
}

/// `TASK_CANDIDATE_USER_ADDED`
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCandidateUserAddedHandler;

#[async_trait]
impl QueryEventHandler for TaskCandidateUserAddedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCandidateUserAdded
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskCandidateUserPayload = event.entity_as()?;
        if !task_is_open(uow, &payload.task_id, event).await? {
            return Ok(());
        }

        let record = TaskCandidateUserRecord {
            task_id: payload.task_id,
            user_id: payload.user_id,
        };
        if uow.task_candidate_user_exists(&record).await? {
            debug!(task_id = %record.task_id, user_id = %record.user_id, "Candidate user already present");
            return Ok(());
        }

        uow.save_task_candidate_user(&record).await
    }
}

/// `TASK_CANDIDATE_USER_REMOVED`
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCandidateUserRemovedHandler;

#[async_trait]
impl QueryEventHandler for TaskCandidateUserRemovedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCandidateUserRemoved
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskCandidateUserPayload = event.entity_as()?;
        if !task_is_open(uow, &payload.task_id, event).await? {
            return Ok(());
        }

        let record = TaskCandidateUserRecord {
            task_id: payload.task_id,
            user_id: payload.user_id,
        };
        if !uow.task_candidate_user_exists(&record).await? {
            debug!(task_id = %record.task_id, user_id = %record.user_id, "Candidate user not present");
            return Ok(());
        }

        uow.delete_task_candidate_user(&record).await
    }
}

/// `TASK_CANDIDATE_GROUP_ADDED`
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCandidateGroupAddedHandler;

#[async_trait]
impl QueryEventHandler for TaskCandidateGroupAddedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCandidateGroupAdded
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskCandidateGroupPayload = event.entity_as()?;
        if !task_is_open(uow, &payload.task_id, event).await? {
            return Ok(());
        }

        let record = TaskCandidateGroupRecord {
            task_id: payload.task_id,
            group_id: payload.group_id,
        };
        if uow.task_candidate_group_exists(&record).await? {
            debug!(task_id = %record.task_id, group_id = %record.group_id, "Candidate group already present");
            return Ok(());
        }

        uow.save_task_candidate_group(&record).await
    }
}

/// `TASK_CANDIDATE_GROUP_REMOVED`
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskCandidateGroupRemovedHandler;

#[async_trait]
impl QueryEventHandler for TaskCandidateGroupRemovedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::TaskCandidateGroupRemoved
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: TaskCandidateGroupPayload = event.entity_as()?;
        if !task_is_open(uow, &payload.task_id, event).await? {
            return Ok(());
        }

        let record = TaskCandidateGroupRecord {
            task_id: payload.task_id,
            group_id: payload.group_id,
        };
        if !uow.task_candidate_group_exists(&record).await? {
            debug!(task_id = %record.task_id, group_id = %record.group_id, "Candidate group not present");
            return Ok(());
        }

        uow.delete_task_candidate_group(&record).await
    }
}

/// `PROCESS_CANDIDATE_STARTER_USER_ADDED`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCandidateStarterUserAddedHandler;

#[async_trait]
impl QueryEventHandler for ProcessCandidateStarterUserAddedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCandidateStarterUserAdded
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessCandidateStarterUserPayload = event.entity_as()?;
        let record = ProcessCandidateStarterUserRecord {
            process_definition_id: payload.process_definition_id,
            user_id: payload.user_id,
        };

        if uow.process_candidate_starter_user_exists(&record).await? {
            debug!(
                process_definition_id = %record.process_definition_id,
                user_id = %record.user_id,
                "Candidate starter user already present"
            );
            return Ok(());
        }

        uow.save_process_candidate_starter_user(&record).await
    }
}

/// `PROCESS_CANDIDATE_STARTER_USER_REMOVED`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCandidateStarterUserRemovedHandler;

#[async_trait]
impl QueryEventHandler for ProcessCandidateStarterUserRemovedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCandidateStarterUserRemoved
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessCandidateStarterUserPayload = event.entity_as()?;
        let record = ProcessCandidateStarterUserRecord {
            process_definition_id: payload.process_definition_id,
            user_id: payload.user_id,
        };

        if uow.process_candidate_starter_user_exists(&record).await? {
            uow.delete_process_candidate_starter_user(&record).await?;
        }

        Ok(())
    }
}

/// `PROCESS_CANDIDATE_STARTER_GROUP_ADDED`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCandidateStarterGroupAddedHandler;

#[async_trait]
impl QueryEventHandler for ProcessCandidateStarterGroupAddedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCandidateStarterGroupAdded
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessCandidateStarterGroupPayload = event.entity_as()?;
        let record = ProcessCandidateStarterGroupRecord {
            process_definition_id: payload.process_definition_id,
            group_id: payload.group_id,
        };

        if uow.process_candidate_starter_group_exists(&record).await? {
            debug!(
                process_definition_id = %record.process_definition_id,
                group_id = %record.group_id,
                "Candidate starter group already present"
            );
            return Ok(());
        }

        uow.save_process_candidate_starter_group(&record).await
    }
}

/// `PROCESS_CANDIDATE_STARTER_GROUP_REMOVED`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCandidateStarterGroupRemovedHandler;

#[async_trait]
impl QueryEventHandler for ProcessCandidateStarterGroupRemovedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCandidateStarterGroupRemoved
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessCandidateStarterGroupPayload = event.entity_as()?;
        let record = ProcessCandidateStarterGroupRecord {
            process_definition_id: payload.process_definition_id,
            group_id: payload.group_id,
        };

        if uow.process_candidate_starter_group_exists(&record).await? {
            uow.delete_process_candidate_starter_group(&record).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::support::testing::memory_store;
    use crate::handlers::task::{TaskCompletedHandler, TaskCreatedHandler};
    use crate::store::ReadModelStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_twice_then_remove() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(EventType::TaskCreated, json!({"id": "t1"})),
            )
            .await
            .unwrap();

        let added = CloudRuntimeEvent::new(
            EventType::TaskCandidateGroupAdded,
            json!({"taskId": "t1", "groupId": "finance"}),
        );
        TaskCandidateGroupAddedHandler
            .handle(uow.as_mut(), &added)
            .await
            .unwrap();
        TaskCandidateGroupAddedHandler
            .handle(uow.as_mut(), &added)
            .await
            .unwrap();

        let found = uow.task_with_candidates("t1").await.unwrap().unwrap();
        assert_eq!(found.groups, vec!["finance"]);

        TaskCandidateGroupRemovedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(
                    EventType::TaskCandidateGroupRemoved,
                    json!({"taskId": "t1", "groupId": "finance"}),
                ),
            )
            .await
            .unwrap();

        let found = uow.task_with_candidates("t1").await.unwrap().unwrap();
        assert!(found.groups.is_empty());
    }

    #[tokio::test]
    async fn test_finished_task_keeps_candidates() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        TaskCreatedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(EventType::TaskCreated, json!({"id": "t1"})),
            )
            .await
            .unwrap();
        TaskCompletedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(EventType::TaskCompleted, json!({"id": "t1"})),
            )
            .await
            .unwrap();
        TaskCandidateUserAddedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(
                    EventType::TaskCandidateUserAdded,
                    json!({"taskId": "t1", "userId": "bob"}),
                ),
            )
            .await
            .unwrap();

        assert!(uow.list_task_candidate_users("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_candidate_on_missing_task_is_not_found() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        let err = TaskCandidateUserAddedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(
                    EventType::TaskCandidateUserAdded,
                    json!({"taskId": "ghost", "userId": "bob"}),
                ),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_process_candidate_starters() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        let added = CloudRuntimeEvent::new(
            EventType::ProcessCandidateStarterUserAdded,
            json!({"processDefinitionId": "invoice:1", "userId": "jane"}),
        );
        ProcessCandidateStarterUserAddedHandler
            .handle(uow.as_mut(), &added)
            .await
            .unwrap();
        ProcessCandidateStarterUserAddedHandler
            .handle(uow.as_mut(), &added)
            .await
            .unwrap();

        let record = ProcessCandidateStarterUserRecord {
            process_definition_id: "invoice:1".to_string(),
            user_id: "jane".to_string(),
        };
        assert!(uow.process_candidate_starter_user_exists(&record).await.unwrap());

        ProcessCandidateStarterUserRemovedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(
                    EventType::ProcessCandidateStarterUserRemoved,
                    json!({"processDefinitionId": "invoice:1", "userId": "jane"}),
                ),
            )
            .await
            .unwrap();
        assert!(!uow.process_candidate_starter_user_exists(&record).await.unwrap());
    }
}
