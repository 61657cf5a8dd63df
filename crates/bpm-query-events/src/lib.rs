// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime event contract consumed by the bpm-query read model.
//!
//! Process engines publish a stream of runtime events (process started, task
//! assigned, variable updated, ...). Every event travels in the same JSON
//! envelope, [`CloudRuntimeEvent`], which carries the service/app metadata, the
//! event type name, the timestamp, and the domain entity as a nested JSON
//! object.
//!
//! ```text
//! {
//!   "id": "7c0e...",
//!   "eventType": "TASK_ASSIGNED",
//!   "timestamp": 1735689600000,
//!   "appName": "billing",
//!   "processInstanceId": "pi-1",
//!   "entity": { "id": "task-1", "assignee": "jane", ... }
//! }
//! ```
//!
//! Consumers route on [`CloudRuntimeEvent::event_type`], which maps the wire
//! name to an [`EventType`], and decode the entity with
//! [`CloudRuntimeEvent::entity_as`] into one of the typed payloads in
//! [`payload`].

#![deny(missing_docs)]

/// The event envelope shared by every runtime event.
pub mod envelope;

/// Error types for event decoding.
pub mod error;

/// Event type identifiers and their families.
pub mod event_type;

/// Typed entity payloads carried inside the envelope.
pub mod payload;

pub use envelope::CloudRuntimeEvent;
pub use error::EventError;
pub use event_type::{EventFamily, EventType};
