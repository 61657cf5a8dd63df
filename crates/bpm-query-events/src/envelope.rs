// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The runtime event envelope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::event_type::EventType;

/// A runtime event as published by a process engine.
///
/// The envelope fields are shared by every event type. The domain entity stays
/// raw JSON until a handler asks for it with [`CloudRuntimeEvent::entity_as`],
/// so an event of an unknown type can still be parsed, logged, and skipped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRuntimeEvent {
    /// Unique event id, used for redelivery detection.
    pub id: Option<String>,
    /// Event type wire name (e.g. `PROCESS_STARTED`).
    pub event_type: String,
    /// When the event occurred, in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Id of the entity carried in `entity`.
    pub entity_id: Option<String>,
    /// Name of the emitting service.
    pub service_name: Option<String>,
    /// Fully-qualified name of the emitting service.
    pub service_full_name: Option<String>,
    /// Version of the emitting service.
    pub service_version: Option<String>,
    /// Application the service belongs to.
    pub app_name: Option<String>,
    /// Application version.
    pub app_version: Option<String>,
    /// Process instance the event belongs to, if any.
    pub process_instance_id: Option<String>,
    /// Parent process instance for call activities.
    pub parent_process_instance_id: Option<String>,
    /// Process definition id.
    pub process_definition_id: Option<String>,
    /// Process definition key.
    pub process_definition_key: Option<String>,
    /// Process definition version.
    pub process_definition_version: Option<i32>,
    /// Business key of the process instance.
    pub business_key: Option<String>,
    /// The domain entity (process instance, task, variable, ...).
    #[serde(default)]
    pub entity: serde_json::Value,
}

impl CloudRuntimeEvent {
    /// Create an event of the given type carrying `entity`.
    ///
    /// The timestamp defaults to now; use the `with_*` builders to fill in the
    /// rest of the envelope.
    pub fn new(event_type: EventType, entity: serde_json::Value) -> Self {
        Self {
            event_type: event_type.as_str().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            entity,
            ..Default::default()
        }
    }

    /// Set the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the event timestamp (epoch milliseconds).
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the owning process instance id.
    pub fn with_process_instance_id(mut self, process_instance_id: impl Into<String>) -> Self {
        self.process_instance_id = Some(process_instance_id.into());
        self
    }

    /// Set the application name and version.
    pub fn with_app(mut self, app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self.app_version = Some(app_version.into());
        self
    }

    /// Set the emitting service metadata.
    pub fn with_service(
        mut self,
        service_name: impl Into<String>,
        service_full_name: impl Into<String>,
        service_version: impl Into<String>,
    ) -> Self {
        self.service_name = Some(service_name.into());
        self.service_full_name = Some(service_full_name.into());
        self.service_version = Some(service_version.into());
        self
    }

    /// Resolve the wire name into a known [`EventType`].
    ///
    /// Returns `None` for names outside the contract.
    pub fn event_type(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Decode the nested entity into a typed payload.
    pub fn entity_as<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        T::deserialize(&self.entity).map_err(|e| EventError::MalformedPayload {
            event_type: self.event_type.clone(),
            details: e.to_string(),
        })
    }

    /// Event timestamp as a UTC date-time.
    ///
    /// Out-of-range values fall back to the Unix epoch.
    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Process instance id from the envelope, falling back to the entity's
    /// `processInstanceId` field.
    pub fn resolve_process_instance_id(&self) -> Option<String> {
        self.process_instance_id.clone().or_else(|| {
            self.entity
                .get("processInstanceId")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
    }
}

impl fmt::Display for CloudRuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[id={}, entityId={}, processInstanceId={}, timestamp={}]",
            self.event_type,
            self.id.as_deref().unwrap_or("-"),
            self.entity_id.as_deref().unwrap_or("-"),
            self.process_instance_id.as_deref().unwrap_or("-"),
            self.timestamp
        )
    }
}
