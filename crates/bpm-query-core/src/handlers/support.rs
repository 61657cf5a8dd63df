// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers shared by the event handlers.

use bpm_query_events::{CloudRuntimeEvent, EventError};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::model::{BpmnActivityRecord, BpmnActivityStatus, ServiceMetadata, TaskStatus};
use crate::store::UnitOfWork;

/// Error for a payload that decoded but lacks a field the handler needs.
pub(crate) fn missing_field(event: &CloudRuntimeEvent, field: &str) -> QueryError {
    QueryError::MalformedEvent(EventError::MalformedPayload {
        event_type: event.event_type.clone(),
        details: format!("missing {}", field),
    })
}

/// Process instance id from the payload, then the envelope.
pub(crate) fn process_instance_id(
    event: &CloudRuntimeEvent,
    from_payload: Option<&str>,
) -> Option<String> {
    from_payload
        .map(str::to_string)
        .or_else(|| event.process_instance_id.clone())
}

/// Seed values for an activity created on first sight.
pub(crate) struct ActivitySeed<'a> {
    pub id: String,
    pub element_id: &'a str,
    pub process_instance_id: &'a str,
    pub execution_id: Option<&'a str>,
    pub activity_name: Option<&'a str>,
    pub activity_type: Option<&'a str>,
    pub process_definition_id: Option<&'a str>,
}

/// Load the activity, or build a new `STARTED` one from `seed`.
///
/// A new activity is not saved here; the caller applies its transition and
/// saves once. Name and type are refreshed on existing rows when the event
/// carries them.
pub(crate) async fn find_or_create_activity(
    uow: &mut dyn UnitOfWork,
    event: &CloudRuntimeEvent,
    seed: ActivitySeed<'_>,
) -> Result<BpmnActivityRecord> {
    if let Some(mut existing) = uow.find_activity(&seed.id).await? {
        if let Some(name) = seed.activity_name {
            existing.activity_name = Some(name.to_string());
        }
        if let Some(activity_type) = seed.activity_type {
            existing.activity_type = Some(activity_type.to_string());
        }
        return Ok(existing);
    }

    debug!(activity_id = %seed.id, "Activity not found, creating it");

    Ok(BpmnActivityRecord {
        id: seed.id,
        element_id: seed.element_id.to_string(),
        activity_name: seed.activity_name.map(str::to_string),
        activity_type: seed.activity_type.map(str::to_string),
        process_instance_id: seed.process_instance_id.to_string(),
        process_definition_id: seed
            .process_definition_id
            .map(str::to_string)
            .or_else(|| event.process_definition_id.clone()),
        process_definition_key: event.process_definition_key.clone(),
        process_definition_version: event.process_definition_version,
        business_key: event.business_key.clone(),
        execution_id: seed.execution_id.map(str::to_string),
        status: BpmnActivityStatus::Started,
        started_date: Some(event.timestamp_utc()),
        completed_date: None,
        cancelled_date: None,
        service: ServiceMetadata::from_event(event),
    })
}

/// Set the activity status and the date column that goes with it.
pub(crate) fn apply_activity_status(
    activity: &mut BpmnActivityRecord,
    status: BpmnActivityStatus,
    at: DateTime<Utc>,
) {
    activity.status = status;
    match status {
        BpmnActivityStatus::Started => activity.started_date = Some(at),
        BpmnActivityStatus::Completed => activity.completed_date = Some(at),
        BpmnActivityStatus::Cancelled => activity.cancelled_date = Some(at),
        BpmnActivityStatus::Error => {}
    }
}

/// Cancel every task of the instance that is not already final.
pub(crate) async fn cancel_open_tasks(
    uow: &mut dyn UnitOfWork,
    process_instance_id: &str,
    at: DateTime<Utc>,
) -> Result<usize> {
    let mut cancelled = 0;
    for mut task in uow
        .list_tasks_by_process_instance(process_instance_id)
        .await?
    {
        if task.status.is_final() {
            continue;
        }
        task.status = TaskStatus::Cancelled;
        task.last_modified = Some(at);
        uow.save_task(&task).await?;
        cancelled += 1;
    }
    Ok(cancelled)
}
