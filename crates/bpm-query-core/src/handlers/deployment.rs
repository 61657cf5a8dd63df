// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment handlers.
//!
//! Deployments are replayed on every engine restart, so both handlers merge
//! into the stored row instead of skipping or failing on an existing one.

use async_trait::async_trait;
use bpm_query_events::payload::{ApplicationPayload, ProcessDefinitionPayload};
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::info;

use super::QueryEventHandler;
use crate::error::Result;
use crate::model::{ApplicationRecord, ProcessDefinitionRecord, ProcessModelRecord, ServiceMetadata};
use crate::store::UnitOfWork;

/// Stores the definition and its BPMN model on `PROCESS_DEPLOYED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessDeployedHandler;

#[async_trait]
impl QueryEventHandler for ProcessDeployedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessDeployed
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessDefinitionPayload = event.entity_as()?;

        let mut service = ServiceMetadata::from_event(event);
        if payload.app_version.is_some() {
            service.app_version = payload.app_version.clone();
        }

        let mut definition = uow
            .find_process_definition(&payload.id)
            .await?
            .unwrap_or_else(|| ProcessDefinitionRecord {
                id: payload.id.clone(),
                process_definition_key: None,
                name: None,
                description: None,
                version: None,
                form_key: None,
                category: None,
                service: ServiceMetadata::default(),
            });

        definition.process_definition_key = payload.key.or(definition.process_definition_key);
        definition.name = payload.name.or(definition.name);
        definition.description = payload.description.or(definition.description);
        definition.version = payload.version.or(definition.version);
        definition.form_key = payload.form_key.or(definition.form_key);
        definition.category = payload.category.or(definition.category);
        definition.service = service;
        uow.save_process_definition(&definition).await?;

        if let Some(content) = payload.process_model_content {
            uow.save_process_model(&ProcessModelRecord {
                process_definition_id: definition.id.clone(),
                process_model_content: content,
            })
            .await?;
        }

        info!(
            process_definition_id = %definition.id,
            version = definition.version.unwrap_or_default(),
            "Process definition deployed"
        );
        Ok(())
    }
}

/// Stores the application on `APPLICATION_DEPLOYED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplicationDeployedHandler;

#[async_trait]
impl QueryEventHandler for ApplicationDeployedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ApplicationDeployed
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ApplicationPayload = event.entity_as()?;
        let existing = uow.find_application(&payload.id).await?;

        let application = ApplicationRecord {
            name: payload
                .name
                .or_else(|| existing.as_ref().and_then(|a| a.name.clone()))
                .or_else(|| event.app_name.clone()),
            version: payload
                .version
                .or_else(|| existing.as_ref().and_then(|a| a.version.clone()))
                .or_else(|| event.app_version.clone()),
            id: payload.id,
        };

        uow.save_application(&application).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::support::testing::memory_store;
    use crate::store::ReadModelStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_redeploy_merges_definition() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        ProcessDeployedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(
                    EventType::ProcessDeployed,
                    json!({
                        "id": "invoice:1",
                        "key": "invoice",
                        "name": "Invoice",
                        "version": 1,
                        "processModelContent": "<definitions/>"
                    }),
                )
                .with_app("billing", "1.0.0"),
            )
            .await
            .unwrap();
        ProcessDeployedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(
                    EventType::ProcessDeployed,
                    json!({"id": "invoice:1", "category": "finance", "appVersion": "1.0.1"}),
                )
                .with_app("billing", "1.0.0"),
            )
            .await
            .unwrap();

        let definition = uow.find_process_definition("invoice:1").await.unwrap().unwrap();
        assert_eq!(definition.name.as_deref(), Some("Invoice"));
        assert_eq!(definition.category.as_deref(), Some("finance"));
        assert_eq!(definition.service.app_version.as_deref(), Some("1.0.1"));

        let model = uow.find_process_model("invoice:1").await.unwrap().unwrap();
        assert_eq!(model.process_model_content, "<definitions/>");
    }

    #[tokio::test]
    async fn test_application_falls_back_to_envelope() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();

        ApplicationDeployedHandler
            .handle(
                uow.as_mut(),
                &CloudRuntimeEvent::new(EventType::ApplicationDeployed, json!({"id": "dep-1"}))
                    .with_app("billing", "2.1.0"),
            )
            .await
            .unwrap();

        let application = uow.find_application("dep-1").await.unwrap().unwrap();
        assert_eq!(application.name.as_deref(), Some("billing"));
        assert_eq!(application.version.as_deref(), Some("2.1.0"));
    }
}
