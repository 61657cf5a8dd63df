// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process and task variable handlers.
//!
//! A variable belongs to a task when the payload flags it as task-scoped and
//! names the task; otherwise it belongs to the process instance. New process
//! variables are also linked into the snapshot of every open task of the
//! instance, replacing an older link with the same name.

use async_trait::async_trait;
use bpm_query_events::payload::VariablePayload;
use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::{debug, warn};
use uuid::Uuid;

use super::QueryEventHandler;
use super::support;
use crate::error::{QueryError, Result};
use crate::finder::EntityFinder;
use crate::model::{ProcessVariableRecord, ServiceMetadata, TaskVariableRecord, encode_value};
use crate::store::UnitOfWork;

/// Owning process instance of a process variable event.
fn owning_process_instance(event: &CloudRuntimeEvent, payload: &VariablePayload) -> Result<String> {
    support::process_instance_id(event, payload.process_instance_id.as_deref())
        .ok_or_else(|| support::missing_field(event, "processInstanceId"))
}

/// Owning task of a task variable event.
fn owning_task<'a>(event: &CloudRuntimeEvent, payload: &'a VariablePayload) -> Result<&'a str> {
    payload
        .task_id
        .as_deref()
        .ok_or_else(|| support::missing_field(event, "taskId"))
}

/// Inserts a variable on `VARIABLE_CREATED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableCreatedHandler;

impl VariableCreatedHandler {
    async fn create_task_variable(
        uow: &mut dyn UnitOfWork,
        event: &CloudRuntimeEvent,
        payload: VariablePayload,
    ) -> Result<()> {
        let task_id = owning_task(event, &payload)?.to_string();
        let task = uow.require_task(&task_id).await?;

        if uow.find_task_variable(&task_id, &payload.name).await?.is_some() {
            debug!(task_id = %task_id, name = %payload.name, "Task variable already exists, skipping");
            return Ok(());
        }

        let at = event.timestamp_utc();
        let record = TaskVariableRecord {
            id: Uuid::new_v4().to_string(),
            task_id,
            process_instance_id: payload
                .process_instance_id
                .or(task.process_instance_id),
            name: payload.name,
            var_type: payload.var_type,
            value: encode_value(&payload.value)?,
            create_time: Some(at),
            last_updated_time: Some(at),
            service: ServiceMetadata::from_event(event),
        };

        uow.save_task_variable(&record).await
    }

    async fn create_process_variable(
        uow: &mut dyn UnitOfWork,
        event: &CloudRuntimeEvent,
        payload: VariablePayload,
    ) -> Result<()> {
        let process_instance_id = owning_process_instance(event, &payload)?;
        uow.require_process_instance(&process_instance_id).await?;

        if uow
            .find_process_variable(&process_instance_id, &payload.name)
            .await?
            .is_some()
        {
            debug!(
                process_instance_id = %process_instance_id,
                name = %payload.name,
                "Process variable already exists, skipping"
            );
            return Ok(());
        }

        let at = event.timestamp_utc();
        let record = ProcessVariableRecord {
            id: Uuid::new_v4().to_string(),
            process_instance_id,
            name: payload.name,
            var_type: payload.var_type,
            value: encode_value(&payload.value)?,
            create_time: Some(at),
            last_updated_time: Some(at),
            service: ServiceMetadata::from_event(event),
        };
        uow.save_process_variable(&record).await?;

        let linked = link_to_tasks(uow, &record).await?;
        debug!(
            variable_id = %record.id,
            name = %record.name,
            tasks = linked,
            "Linked process variable to open tasks"
        );

        Ok(())
    }
}

/// Link `variable` into the task snapshots of its instance.
///
/// Open tasks always get the link. Finished tasks only get it in place of a
/// snapshot entry with the same name.
async fn link_to_tasks(uow: &mut dyn UnitOfWork, variable: &ProcessVariableRecord) -> Result<usize> {
    let mut linked = 0;
    for task in uow
        .list_tasks_by_process_instance(&variable.process_instance_id)
        .await?
    {
        let stale: Vec<String> = uow
            .list_task_process_variables(&task.id)
            .await?
            .into_iter()
            .filter(|v| v.name == variable.name && v.id != variable.id)
            .map(|v| v.id)
            .collect();

        if task.status.is_final() && stale.is_empty() {
            continue;
        }

        for stale_id in &stale {
            uow.unlink_task_process_variable(&task.id, stale_id).await?;
        }
        uow.link_task_process_variable(&task.id, &variable.id)
            .await?;
        linked += 1;
    }
    Ok(linked)
}

#[async_trait]
impl QueryEventHandler for VariableCreatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::VariableCreated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: VariablePayload = event.entity_as()?;

        if payload.is_task_variable() {
            Self::create_task_variable(uow, event, payload).await
        } else {
            Self::create_process_variable(uow, event, payload).await
        }
    }
}

/// Applies a new value to an existing variable.
///
/// Variables of a finished owner are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableUpdater;

impl VariableUpdater {
    /// Update the process variable named in `payload`.
    pub async fn update_process_variable(
        &self,
        uow: &mut dyn UnitOfWork,
        event: &CloudRuntimeEvent,
        payload: &VariablePayload,
    ) -> Result<()> {
        let process_instance_id = owning_process_instance(event, payload)?;
        let instance = uow.require_process_instance(&process_instance_id).await?;

        if instance.status.is_final() {
            warn!(
                process_instance_id = %process_instance_id,
                name = %payload.name,
                status = %instance.status,
                "Ignoring variable update on finished process instance"
            );
            return Ok(());
        }

        let mut variable = uow
            .find_process_variable(&process_instance_id, &payload.name)
            .await?
            .ok_or_else(|| {
                QueryError::not_found(
                    "process variable",
                    format!("{}:{}", process_instance_id, payload.name),
                )
            })?;

        if let Some(var_type) = &payload.var_type {
            variable.var_type = Some(var_type.clone());
        }
        variable.value = encode_value(&payload.value)?;
        variable.last_updated_time = Some(event.timestamp_utc());

        uow.save_process_variable(&variable).await
    }

    /// Update the task variable named in `payload`.
    pub async fn update_task_variable(
        &self,
        uow: &mut dyn UnitOfWork,
        event: &CloudRuntimeEvent,
        payload: &VariablePayload,
    ) -> Result<()> {
        let task_id = owning_task(event, payload)?;
        let task = uow.require_task(task_id).await?;

        if task.status.is_final() {
            warn!(
                task_id,
                name = %payload.name,
                status = %task.status,
                "Ignoring variable update on finished task"
            );
            return Ok(());
        }

        let mut variable = uow
            .find_task_variable(task_id, &payload.name)
            .await?
            .ok_or_else(|| {
                QueryError::not_found("task variable", format!("{}:{}", task_id, payload.name))
            })?;

        if let Some(var_type) = &payload.var_type {
            variable.var_type = Some(var_type.clone());
        }
        variable.value = encode_value(&payload.value)?;
        variable.last_updated_time = Some(event.timestamp_utc());

        uow.save_task_variable(&variable).await
    }
}

/// Updates a variable value on `VARIABLE_UPDATED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableUpdatedHandler {
    updater: VariableUpdater,
}

impl VariableUpdatedHandler {
    /// Handler delegating to `updater`.
    pub fn new(updater: VariableUpdater) -> Self {
        Self { updater }
    }
}

#[async_trait]
impl QueryEventHandler for VariableUpdatedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::VariableUpdated
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: VariablePayload = event.entity_as()?;

        if payload.is_task_variable() {
            self.updater.update_task_variable(uow, event, &payload).await
        } else {
            self.updater
                .update_process_variable(uow, event, &payload)
                .await
        }
    }
}

/// Removes a variable on `VARIABLE_DELETED`.
///
/// Deleting something that is already gone is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableDeletedHandler;

impl VariableDeletedHandler {
    async fn delete_task_variable(
        uow: &mut dyn UnitOfWork,
        event: &CloudRuntimeEvent,
        payload: &VariablePayload,
    ) -> Result<()> {
        let task_id = owning_task(event, payload)?;
        let Some(task) = uow.find_task(task_id).await? else {
            debug!(task_id, name = %payload.name, "Task gone, nothing to delete");
            return Ok(());
        };
        if task.status.is_final() {
            warn!(task_id, name = %payload.name, "Ignoring variable delete on finished task");
            return Ok(());
        }

        match uow.find_task_variable(task_id, &payload.name).await? {
            Some(variable) => uow.delete_task_variable(&variable.id).await,
            None => {
                debug!(task_id, name = %payload.name, "Task variable not present");
                Ok(())
            }
        }
    }

    async fn delete_process_variable(
        uow: &mut dyn UnitOfWork,
        event: &CloudRuntimeEvent,
        payload: &VariablePayload,
    ) -> Result<()> {
        let process_instance_id = owning_process_instance(event, payload)?;
        let Some(instance) = uow.find_process_instance(&process_instance_id).await? else {
            debug!(process_instance_id = %process_instance_id, "Process instance gone, nothing to delete");
            return Ok(());
        };
        if instance.status.is_final() {
            warn!(
                process_instance_id = %process_instance_id,
                name = %payload.name,
                status = %instance.status,
                "Ignoring variable delete on finished process instance"
            );
            return Ok(());
        }

        let Some(variable) = uow
            .find_process_variable(&process_instance_id, &payload.name)
            .await?
        else {
            debug!(process_instance_id = %process_instance_id, name = %payload.name, "Process variable not present");
            return Ok(());
        };

        uow.delete_process_variable_links(&variable.id).await?;
        uow.delete_process_variable(&variable.id).await
    }
}

#[async_trait]
impl QueryEventHandler for VariableDeletedHandler {
    fn handled_event_type(&self) -> EventType {
        EventType::VariableDeleted
    }

    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()> {
        let payload: VariablePayload = event.entity_as()?;

        if payload.is_task_variable() {
            Self::delete_task_variable(uow, event, &payload).await
        } else {
            Self::delete_process_variable(uow, event, &payload).await
        }
    }
}
