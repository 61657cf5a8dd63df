// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service task integration handlers.
//!
//! Every integration event finds or creates the context keyed by
//! `{processInstanceId}:{clientId}:{executionId}` and mirrors the outcome onto
//! the service task activity with the same execution.

use async_trait::async_trait;
use bpm_query_events::payload::IntegrationContextPayload;
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::{debug, warn};

use super::QueryEventHandler;
use super::support::{self, ActivitySeed};
use crate::error::Result;
use crate::model::{
    BpmnActivityRecord, BpmnActivityStatus, IntegrationContextRecord, IntegrationContextStatus,
    ServiceMetadata, truncate_error_message,
};
use crate::store::UnitOfWork;

const DEFAULT_ACTIVITY_TYPE: &str = "serviceTask";

async fn find_or_create_context(
    uow: &mut dyn UnitOfWork,
    event: &CloudRuntimeEvent,
    payload: &IntegrationContextPayload,
) -> Result<IntegrationContextRecord> {
    let id = payload.context_id();
    if let Some(existing) = uow.find_integration_context(&id).await? {
        return Ok(existing);
    }

    debug!(context_id = %id, "Integration context not found, creating it");

    Ok(IntegrationContextRecord {
        id,
        process_instance_id: payload.process_instance_id.clone(),
        root_process_instance_id: payload.root_process_instance_id.clone(),
        parent_process_instance_id: payload
            .parent_process_instance_id
            .clone()
            .or_else(|| event.parent_process_instance_id.clone()),
        execution_id: payload.execution_id.clone(),
        process_definition_id: payload
            .process_definition_id
            .clone()
            .or_else(|| event.process_definition_id.clone()),
        process_definition_key: payload
            .process_definition_key
            .clone()
            .or_else(|| event.process_definition_key.clone()),
        process_definition_version: payload
            .process_definition_version
            .or(event.process_definition_version),
        business_key: payload
            .business_key
            .clone()
            .or_else(|| event.business_key.clone()),
        client_id: payload.client_id.clone(),
        client_name: payload.client_name.clone(),
        client_type: payload.client_type.clone(),
        connector_type: payload.connector_type.clone(),
        activity_id: None,
        status: IntegrationContextStatus::IntegrationRequested,
        request_date: None,
        result_date: None,
        error_date: None,
        error_code: None,
        error_message: None,
        error_class_name: None,
        stack_trace_elements: None,
        in_bound_variables: None,
        out_bound_variables: None,
        service: ServiceMetadata::from_event(event),
    })
}

/// The service task activity of this call, created `STARTED` if unseen.
async fn service_task_activity(
    uow: &mut dyn UnitOfWork,
    event: &CloudRuntimeEvent,
    payload: &IntegrationContextPayload,
) -> Result<BpmnActivityRecord> {
    let seed = ActivitySeed {
        id: payload.activity_id(),
        element_id: &payload.client_id,
        process_instance_id: &payload.process_instance_id,
        execution_id: payload.execution_id.as_deref(),
        activity_name: payload.client_name.as_deref(),
        activity_type: Some(
            payload
                .client_type
                .as_deref()
                .unwrap_or(DEFAULT_ACTIVITY_TYPE),
        ),
        process_definition_id: payload.process_definition_id.as_deref(),
    };
    support::find_or_create_activity(uow, event, seed).await
}

/// Records the outbound call on `INTEGRATION_REQUESTED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrationRequestedHandler;

#[async_trait]
impl QueryEventHandler for IntegrationRequestedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::IntegrationRequested
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: IntegrationContextPayload = event.entity_as()?;

        let activity = service_task_activity(uow, event, &payload).await?;
        uow.save_activity(&activity).await?;

        let mut context = find_or_create_context(uow, event, &payload).await?;
        context.status = IntegrationContextStatus::IntegrationRequested;
        context.request_date = Some(event.timestamp_utc());
        context.in_bound_variables = Some(serde_json::to_string(&payload.in_bound_variables)?);
        context.activity_id = Some(activity.id);

        uow.save_integration_context(&context).await
    }
}

/// Records the connector result on `INTEGRATION_RESULT_RECEIVED` and
/// completes the service task activity.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrationResultReceivedHandler;

#[async_trait]
impl QueryEventHandler for IntegrationResultReceivedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::IntegrationResultReceived
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: IntegrationContextPayload = event.entity_as()?;
        let at = event.timestamp_utc();

        let mut activity = service_task_activity(uow, event, &payload).await?;
        support::apply_activity_status(&mut activity, BpmnActivityStatus::Completed, at);
        uow.save_activity(&activity).await?;

        let mut context = find_or_create_context(uow, event, &payload).await?;
        context.status = IntegrationContextStatus::IntegrationResultReceived;
        context.result_date = Some(at);
        context.out_bound_variables = Some(serde_json::to_string(&payload.out_bound_variables)?);
        context.activity_id = Some(activity.id);

        uow.save_integration_context(&context).await
    }
}

/// Records the connector failure on `INTEGRATION_ERROR_RECEIVED` and marks
/// the service task activity as failed.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrationErrorReceivedHandler;

#[async_trait]
impl QueryEventHandler for IntegrationErrorReceivedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::IntegrationErrorReceived
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: IntegrationContextPayload = event.entity_as()?;
        let at = event.timestamp_utc();

        let mut activity = service_task_activity(uow, event, &payload).await?;
        support::apply_activity_status(&mut activity, BpmnActivityStatus::Error, at);
        uow.save_activity(&activity).await?;

        let mut context = find_or_create_context(uow, event, &payload).await?;
        context.status = IntegrationContextStatus::IntegrationErrorReceived;
        context.error_date = Some(at);
        context.error_code = payload.error_code;
        context.error_message = payload.error_message.as_deref().map(truncate_error_message);
        context.error_class_name = payload.error_class_name;
        context.stack_trace_elements = Some(serde_json::to_string(&payload.stack_trace_elements)?);
        context.activity_id = Some(activity.id);

        warn!(
            context_id = %context.id,
            error_code = context.error_code.as_deref().unwrap_or("-"),
            "Integration error received"
        );

        uow.save_integration_context(&context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::support::testing::memory_store;
    use crate::store::ReadModelStore;
    use serde_json::json;

    fn integration_event(event_type: EventType, extra: serde_json::Value) -> CloudRuntimeEvent {
        let mut entity = json!({
            "processInstanceId": "pi-1",
            "executionId": "ex-1",
            "clientId": "charge",
            "clientName": "Charge card",
            "connectorType": "payments"
        });
        if let (Some(target), Some(source)) = (entity.as_object_mut(), extra.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        CloudRuntimeEvent::new(event_type, entity)
    }

    #[tokio::test]
    async fn test_request_then_result() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        IntegrationRequestedHandler
            .handle(
                uow.as_mut(),
                &integration_event(
                    EventType::IntegrationRequested,
                    json!({"inBoundVariables": {"amount": 10}}),
                ),
            )
            .await
            .unwrap();

        let activity = uow.find_activity("pi-1:charge:ex-1").await.unwrap().unwrap();
        assert_eq!(activity.status, BpmnActivityStatus::Started);
        assert_eq!(activity.activity_type.as_deref(), Some("serviceTask"));

        IntegrationResultReceivedHandler
            .handle(
                uow.as_mut(),
                &integration_event(
                    EventType::IntegrationResultReceived,
                    json!({"outBoundVariables": {"receipt": "r-1"}}),
                ),
            )
            .await
            .unwrap();

        let context = uow
            .find_integration_context("pi-1:charge:ex-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.status, IntegrationContextStatus::IntegrationResultReceived);
        assert_eq!(context.activity_id.as_deref(), Some("pi-1:charge:ex-1"));
        assert!(context.request_date.is_some());

        let inbound: serde_json::Value =
            serde_json::from_str(context.in_bound_variables.as_deref().unwrap()).unwrap();
        assert_eq!(inbound, json!({"amount": 10}));
        let outbound: serde_json::Value =
            serde_json::from_str(context.out_bound_variables.as_deref().unwrap()).unwrap();
        assert_eq!(outbound, json!({"receipt": "r-1"}));

        let activity = uow.find_activity("pi-1:charge:ex-1").await.unwrap().unwrap();
        assert_eq!(activity.status, BpmnActivityStatus::Completed);
    }

    #[tokio::test]
    async fn test_error_without_request_truncates_message() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        IntegrationErrorReceivedHandler
            .handle(
                uow.as_mut(),
                &integration_event(
                    EventType::IntegrationErrorReceived,
                    json!({
                        "errorCode": "DECLINED",
                        "errorMessage": "x".repeat(400),
                        "errorClassName": "CardDeclined",
                        "stackTraceElements": [{"methodName": "charge"}]
                    }),
                ),
            )
            .await
            .unwrap();

        let context = uow
            .find_integration_context("pi-1:charge:ex-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.status, IntegrationContextStatus::IntegrationErrorReceived);
        assert_eq!(context.error_code.as_deref(), Some("DECLINED"));
        assert_eq!(context.error_message.map(|m| m.len()), Some(255));
        assert!(context.request_date.is_none());

        let activity = uow.find_activity("pi-1:charge:ex-1").await.unwrap().unwrap();
        assert_eq!(activity.status, BpmnActivityStatus::Error);
    }
}
