// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bpm-query-events.

use thiserror::Error;

/// Errors raised while interpreting an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EventError {
    /// The event type name is not part of the contract.
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    /// The nested entity could not be decoded into the expected payload.
    #[error("malformed {event_type} payload: {details}")]
    MalformedPayload {
        /// Wire name of the event whose payload failed to decode.
        event_type: String,
        /// Decoder error details.
        details: String,
    },
}
