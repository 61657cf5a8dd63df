// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sequence flow handler.

use async_trait::async_trait;
use bpm_query_events::payload::SequenceFlowPayload;
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::debug;
use uuid::Uuid;

use super::QueryEventHandler;
use crate::error::Result;
use crate::model::{BpmnSequenceFlowRecord, ServiceMetadata};
use crate::store::UnitOfWork;

/// Appends a row per `SEQUENCE_FLOW_TAKEN`, once per event id.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceFlowTakenHandler;

#[async_trait]
impl QueryEventHandler for SequenceFlowTakenHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::SequenceFlowTaken
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: SequenceFlowPayload = event.entity_as()?;

        if let Some(event_id) = &event.id
            && uow.sequence_flow_exists(event_id).await?
        {
            debug!(event_id = %event_id, "Sequence flow already recorded, skipping");
            return Ok(());
        }

        let record = BpmnSequenceFlowRecord {
            id: Uuid::new_v4().to_string(),
            event_id: event.id.clone(),
            element_id: payload.element_id,
            process_instance_id: payload.process_instance_id,
            process_definition_id: payload
                .process_definition_id
                .or_else(|| event.process_definition_id.clone()),
            process_definition_key: event.process_definition_key.clone(),
            process_definition_version: event.process_definition_version,
            business_key: event.business_key.clone(),
            source_activity_element_id: payload.source_activity_element_id,
            source_activity_name: payload.source_activity_name,
            source_activity_type: payload.source_activity_type,
            target_activity_element_id: payload.target_activity_element_id,
            target_activity_name: payload.target_activity_name,
            target_activity_type: payload.target_activity_type,
            date: Some(event.timestamp_utc()),
            service: ServiceMetadata::from_event(event),
        };

        uow.save_sequence_flow(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::support::testing::memory_store;
    use crate::store::ReadModelStore;
    use serde_json::json;

    fn flow() -> serde_json::Value {
        json!({
            "elementId": "flow1",
            "processInstanceId": "pi-1",
            "sourceActivityElementId": "start",
            "targetActivityElementId": "review"
        })
    }

    #[tokio::test]
    async fn test_redelivery_is_recorded_once() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        let event = CloudRuntimeEvent::new(EventType::SequenceFlowTaken, flow()).with_id("evt-1");
        SequenceFlowTakenHandler.handle(uow.as_mut(), &event).await.unwrap();
        SequenceFlowTakenHandler.handle(uow.as_mut(), &event).await.unwrap();

        let flows = uow.list_sequence_flows("pi-1").await.unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].event_id.as_deref(), Some("evt-1"));
        assert_eq!(flows[0].target_activity_element_id.as_deref(), Some("review"));
    }

    #[tokio::test]
    async fn test_events_without_id_are_not_deduplicated() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        let event = CloudRuntimeEvent::new(EventType::SequenceFlowTaken, flow());
        SequenceFlowTakenHandler.handle(uow.as_mut(), &event).await.unwrap();
        SequenceFlowTakenHandler.handle(uow.as_mut(), &event).await.unwrap();

        assert_eq!(uow.list_sequence_flows("pi-1").await.unwrap().len(), 2);
    }
}
