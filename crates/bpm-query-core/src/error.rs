// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bpm-query-core.
//!
//! A single error type is shared by the store, the handlers, and the
//! dispatcher. Duplicate deliveries and mutations of finalized records are not
//! errors; handlers log and return `Ok(())` for those.

use bpm_query_events::{EventError, EventType};
use thiserror::Error;

/// Result type using QueryError
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while projecting events into the read model.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// A transition event referenced a record that does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Id that was looked up.
        id: String,
    },

    /// The record is in a state that forbids the requested change.
    #[error("illegal state: {message}")]
    IllegalState {
        /// What was attempted and why it was refused.
        message: String,
    },

    /// The event envelope or its payload could not be interpreted.
    #[error(transparent)]
    MalformedEvent(#[from] EventError),

    /// Store operation failed.
    #[error("database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A stored JSON value could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two handlers were registered for the same event type.
    #[error("more than one handler registered for {0}")]
    DuplicateHandler(EventType),

    /// A handler failed; carries the description of the offending event.
    #[error("error handling event {event}: {source}")]
    EventHandling {
        /// Display text of the event being processed.
        event: String,
        /// Underlying failure.
        #[source]
        source: Box<QueryError>,
    },
}

impl QueryError {
    /// Shorthand for [`QueryError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for [`QueryError::IllegalState`].
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::IllegalState { .. } => "ILLEGAL_STATE",
            Self::MalformedEvent(_) => "MALFORMED_EVENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::DuplicateHandler(_) => "DUPLICATE_HANDLER",
            Self::EventHandling { .. } => "EVENT_HANDLING_ERROR",
        }
    }

    /// The innermost error, looking through [`QueryError::EventHandling`].
    pub fn root_cause(&self) -> &QueryError {
        match self {
            Self::EventHandling { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        QueryError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for QueryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        QueryError::Database {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}
