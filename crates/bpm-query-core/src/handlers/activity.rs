// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! BPMN activity handlers.

use async_trait::async_trait;
use bpm_query_events::payload::BpmnActivityPayload;
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::debug;

use super::QueryEventHandler;
use super::support::{self, ActivitySeed};
use crate::error::Result;
use crate::model::BpmnActivityStatus;
use crate::store::UnitOfWork;

/// Tracks one BPMN activity execution through `ACTIVITY_STARTED`,
/// `ACTIVITY_COMPLETED` and `ACTIVITY_CANCELLED`.
///
/// Events may arrive for an activity that was never seen started, so every
/// variant creates the row when it is missing.
#[derive(Debug, Clone, Copy)]
pub struct BpmnActivityHandler {
    event_type: EventType,
    status: BpmnActivityStatus,
}

impl BpmnActivityHandler {
    /// Handler for `ACTIVITY_STARTED`.
    pub fn started() -> Self {
        Self {
            event_type: EventType::ActivityStarted,
            status: BpmnActivityStatus::Started,
        }
    }

    /// Handler for `ACTIVITY_COMPLETED`.
    pub fn completed() -> Self {
        Self {
            event_type: EventType::ActivityCompleted,
            status: BpmnActivityStatus::Completed,
        }
    }

    /// Handler for `ACTIVITY_CANCELLED`.
    pub fn cancelled() -> Self {
        Self {
            event_type: EventType::ActivityCancelled,
            status: BpmnActivityStatus::Cancelled,
        }
    }
}

#[async_trait]
impl QueryEventHandler for BpmnActivityHandler {
    fn handled_event_type(&self) -> EventType {
        self.event_type
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: BpmnActivityPayload = event.entity_as()?;

        let seed = ActivitySeed {
            id: payload.activity_id(),
            element_id: &payload.element_id,
            process_instance_id: &payload.process_instance_id,
            execution_id: payload.execution_id.as_deref(),
            activity_name: payload.activity_name.as_deref(),
            activity_type: payload.activity_type.as_deref(),
            process_definition_id: payload.process_definition_id.as_deref(),
        };
        let mut activity = support::find_or_create_activity(uow, event, seed).await?;

        support::apply_activity_status(&mut activity, self.status, event.timestamp_utc());
        debug!(activity_id = %activity.id, status = %activity.status, "Activity transition");

        uow.save_activity(&activity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::support::testing::memory_store;
    use crate::store::ReadModelStore;
    use serde_json::json;

    fn activity_event(event_type: EventType, timestamp: i64) -> CloudRuntimeEvent {
        CloudRuntimeEvent::new(
            event_type,
            json!({
                "elementId": "review",
                "processInstanceId": "pi-1",
                "executionId": "ex-1",
                "activityName": "Review",
                "activityType": "userTask"
            }),
        )
        .with_timestamp(timestamp)
    }

    #[tokio::test]
    async fn test_started_then_completed() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        BpmnActivityHandler::started()
            .handle(uow.as_mut(), &activity_event(EventType::ActivityStarted, 1_000))
            .await
            .unwrap();
        BpmnActivityHandler::completed()
            .handle(uow.as_mut(), &activity_event(EventType::ActivityCompleted, 2_000))
            .await
            .unwrap();

        let activity = uow.find_activity("pi-1:review:ex-1").await.unwrap().unwrap();
        assert_eq!(activity.status, BpmnActivityStatus::Completed);
        assert_eq!(activity.started_date.map(|d| d.timestamp_millis()), Some(1_000));
        assert_eq!(activity.completed_date.map(|d| d.timestamp_millis()), Some(2_000));
        assert_eq!(activity.activity_type.as_deref(), Some("userTask"));
    }

    #[tokio::test]
    async fn test_cancel_without_start_creates_row() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        BpmnActivityHandler::cancelled()
            .handle(uow.as_mut(), &activity_event(EventType::ActivityCancelled, 3_000))
            .await
            .unwrap();

        let activities = uow.list_activities("pi-1").await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].status, BpmnActivityStatus::Cancelled);
        assert_eq!(activities[0].cancelled_date.map(|d| d.timestamp_millis()), Some(3_000));
    }
}
