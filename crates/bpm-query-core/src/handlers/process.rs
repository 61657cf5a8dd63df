// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process instance lifecycle handlers.

use async_trait::async_trait;
use bpm_query_events::payload::ProcessInstancePayload;
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::{debug, info};

use super::QueryEventHandler;
use super::support;
use crate::error::{QueryError, Result};
use crate::finder::EntityFinder;
use crate::model::{ProcessInstanceRecord, ProcessInstanceStatus, ServiceMetadata};
use crate::store::UnitOfWork;

/// Inserts a `CREATED` process instance on `PROCESS_CREATED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCreatedHandler;

#[async_trait]
impl QueryEventHandler for ProcessCreatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCreated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;

        if uow.find_process_instance(&payload.id).await?.is_some() {
            debug!(process_instance_id = %payload.id, "Process instance already exists, skipping");
            return Ok(());
        }

        let record = ProcessInstanceRecord {
            id: payload.id,
            name: payload.name,
            status: ProcessInstanceStatus::Created,
            business_key: payload.business_key.or_else(|| event.business_key.clone()),
            process_definition_id: payload
                .process_definition_id
                .or_else(|| event.process_definition_id.clone()),
            process_definition_key: payload
                .process_definition_key
                .or_else(|| event.process_definition_key.clone()),
            process_definition_version: payload
                .process_definition_version
                .or(event.process_definition_version),
            process_definition_name: payload.process_definition_name,
            initiator: payload.initiator,
            parent_id: payload
                .parent_id
                .or_else(|| event.parent_process_instance_id.clone()),
            start_date: None,
            completed_date: None,
            suspended_date: None,
            last_modified: Some(event.timestamp_utc()),
            service: ServiceMetadata::from_event(event),
        };

        uow.save_process_instance(&record).await
    }
}

/// Moves a process instance to `RUNNING` on `PROCESS_STARTED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessStartedHandler;

#[async_trait]
impl QueryEventHandler for ProcessStartedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessStarted
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let mut instance = uow.require_process_instance(&payload.id).await?;

        if instance.status.is_final() {
            debug!(
                process_instance_id = %instance.id,
                status = %instance.status,
                "Process instance already finished, ignoring start"
            );
            return Ok(());
        }

        instance.status = ProcessInstanceStatus::Running;
        instance.start_date = Some(payload.start_date.unwrap_or_else(|| event.timestamp_utc()));
        instance.last_modified = Some(event.timestamp_utc());
        if payload.name.is_some() {
            instance.name = payload.name;
        }
        if payload.business_key.is_some() {
            instance.business_key = payload.business_key;
        }

        uow.save_process_instance(&instance).await
    }
}

/// Copies name and business key on `PROCESS_UPDATED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessUpdatedHandler;

#[async_trait]
impl QueryEventHandler for ProcessUpdatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessUpdated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let mut instance = uow.require_process_instance(&payload.id).await?;

        instance.name = payload.name;
        instance.business_key = payload.business_key;
        instance.last_modified = Some(event.timestamp_utc());

        uow.save_process_instance(&instance).await
    }
}

/// Moves a process instance to `SUSPENDED` on `PROCESS_SUSPENDED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSuspendedHandler;

#[async_trait]
impl QueryEventHandler for ProcessSuspendedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessSuspended
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let mut instance = uow.require_process_instance(&payload.id).await?;

        if instance.status.is_final() {
            debug!(process_instance_id = %instance.id, "Process instance already finished, ignoring suspend");
            return Ok(());
        }

        instance.status = ProcessInstanceStatus::Suspended;
        instance.suspended_date = Some(event.timestamp_utc());
        instance.last_modified = Some(event.timestamp_utc());

        uow.save_process_instance(&instance).await
    }
}

/// Moves a suspended process instance back to `RUNNING` on `PROCESS_RESUMED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessResumedHandler;

#[async_trait]
impl QueryEventHandler for ProcessResumedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessResumed
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let mut instance = uow.require_process_instance(&payload.id).await?;

        if instance.status.is_final() {
            debug!(process_instance_id = %instance.id, "Process instance already finished, ignoring resume");
            return Ok(());
        }

        instance.status = ProcessInstanceStatus::Running;
        instance.last_modified = Some(event.timestamp_utc());

        uow.save_process_instance(&instance).await
    }
}

/// Completes a process instance and cancels its open tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCompletedHandler;

#[async_trait]
impl QueryEventHandler for ProcessCompletedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCompleted
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let mut instance = uow.require_process_instance(&payload.id).await?;

        if instance.status.is_final() {
            debug!(
                process_instance_id = %instance.id,
                status = %instance.status,
                "Process instance already finished, ignoring completion"
            );
            return Ok(());
        }

        let at = event.timestamp_utc();
        instance.status = ProcessInstanceStatus::Completed;
        instance.completed_date = Some(payload.completed_date.unwrap_or(at));
        instance.last_modified = Some(at);
        uow.save_process_instance(&instance).await?;

        let cancelled = support::cancel_open_tasks(uow, &instance.id, at).await?;
        if cancelled > 0 {
            debug!(process_instance_id = %instance.id, cancelled, "Cancelled open tasks of completed process");
        }

        Ok(())
    }
}

/// Moves a process instance to `CANCELLED` on `PROCESS_CANCELLED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCancelledHandler;

#[async_trait]
impl QueryEventHandler for ProcessCancelledHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessCancelled
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let mut instance = uow.require_process_instance(&payload.id).await?;

        if instance.status == ProcessInstanceStatus::Cancelled {
            debug!(process_instance_id = %instance.id, "Process instance already cancelled");
            return Ok(());
        }

        let at = event.timestamp_utc();
        instance.status = ProcessInstanceStatus::Cancelled;
        instance.completed_date = Some(at);
        instance.last_modified = Some(at);

        uow.save_process_instance(&instance).await
    }
}

/// Removes a finished process instance and everything it owns.
///
/// Deletion order: for each task its candidates, variables, snapshot links
/// and the task itself; then process variables (links first), integration
/// contexts, activities, sequence flows and finally the instance row.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessDeletedHandler;

#[async_trait]
impl QueryEventHandler for ProcessDeletedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::ProcessDeleted
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: ProcessInstancePayload = event.entity_as()?;
        let instance = uow.require_process_instance(&payload.id).await?;

        if !instance.status.is_final() {
            return Err(QueryError::illegal_state(format!(
                "process instance '{}' cannot be deleted in status {}",
                instance.id, instance.status
            )));
        }

        let tasks = uow.list_tasks_by_process_instance(&instance.id).await?;
        for task in &tasks {
            uow.delete_task_candidates(&task.id).await?;
            for variable in uow.list_task_variables(&task.id).await? {
                uow.delete_task_variable(&variable.id).await?;
            }
            uow.delete_task_process_variable_links(&task.id).await?;
            uow.delete_task(&task.id).await?;
        }

        let variables = uow.list_process_variables(&instance.id).await?;
        for variable in &variables {
            uow.delete_process_variable_links(&variable.id).await?;
            uow.delete_process_variable(&variable.id).await?;
        }

        uow.delete_integration_contexts_by_process_instance(&instance.id)
            .await?;
        uow.delete_activities_by_process_instance(&instance.id)
            .await?;
        uow.delete_sequence_flows_by_process_instance(&instance.id)
            .await?;
        uow.delete_process_instance(&instance.id).await?;

        info!(
            process_instance_id = %instance.id,
            tasks = tasks.len(),
            variables = variables.len(),
            "Deleted process instance"
        );

        Ok(())
    }
}
