// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event dispatch.
//!
//! [`QueryEventHandlerContext`] maps each [`EventType`] to exactly one
//! handler and applies a batch of events through a unit of work in input
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use bpm_query_events::{CloudRuntimeEvent, EventType};
use tracing::{debug, info, instrument};

use crate::error::{QueryError, Result};
use crate::handlers::{self, QueryEventHandler};
use crate::store::UnitOfWork;

/// Counts reported for one dispatched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Events applied by a handler.
    pub handled: usize,
    /// Events with an unknown or unregistered type.
    pub skipped: usize,
}

/// Routes events to their handlers.
pub struct QueryEventHandlerContext {
    handlers: HashMap<EventType, Arc<dyn QueryEventHandler>>,
}

impl std::fmt::Debug for QueryEventHandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("QueryEventHandlerContext")
            .field("handlers", &types)
            .finish()
    }
}

impl QueryEventHandlerContext {
    /// Build a context from `handlers`.
    ///
    /// Fails with [`QueryError::DuplicateHandler`] when two handlers claim the
    /// same event type.
    pub fn new(handlers: Vec<Arc<dyn QueryEventHandler>>) -> Result<Self> {
        let mut map: HashMap<EventType, Arc<dyn QueryEventHandler>> =
            HashMap::with_capacity(handlers.len());

        for handler in handlers {
            let event_type = handler.handled_event_type();
            if map.insert(event_type, handler).is_some() {
                return Err(QueryError::DuplicateHandler(event_type));
            }
        }

        Ok(Self { handlers: map })
    }

    /// Context with every built-in handler registered.
    pub fn with_default_handlers() -> Result<Self> {
        Self::new(handlers::default_handlers())
    }

    /// Handler registered for `event_type`, if any.
    pub fn handler_for(&self, event_type: EventType) -> Option<&Arc<dyn QueryEventHandler>> {
        self.handlers.get(&event_type)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Apply `events` in order through `uow`.
    ///
    /// Stops at the first failing event and returns it wrapped in
    /// [`QueryError::EventHandling`]; the caller is expected to roll back.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn handle(
        &self,
        uow: &mut dyn UnitOfWork,
        events: &[CloudRuntimeEvent],
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for event in events {
            let Some(handler) = event.event_type().and_then(|t| self.handlers.get(&t)) else {
                info!(event_type = %event.event_type, "No handler for event type, skipping");
                outcome.skipped += 1;
                continue;
            };

            debug!(event = %event, "Dispatching event");
            handler
                .handle(uow, event)
                .await
                .map_err(|source| QueryError::EventHandling {
                    event: event.to_string(),
                    source: Box::new(source),
                })?;
            outcome.handled += 1;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ProcessCreatedHandler;
    use crate::handlers::support::testing::memory_store;
    use crate::store::ReadModelStore;
    use serde_json::json;

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let err = QueryEventHandlerContext::new(vec![
            Arc::new(ProcessCreatedHandler),
            Arc::new(ProcessCreatedHandler),
        ])
        .unwrap_err();

        assert!(matches!(err, QueryError::DuplicateHandler(EventType::ProcessCreated)));
    }

    #[test]
    fn test_default_context_registers_everything() {
        let context = QueryEventHandlerContext::with_default_handlers().unwrap();
        assert_eq!(context.len(), EventType::ALL.len());
        assert!(context.handler_for(EventType::SequenceFlowTaken).is_some());
    }

    #[tokio::test]
    async fn test_failure_carries_event_description() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();
        let context = QueryEventHandlerContext::with_default_handlers().unwrap();

        let event = CloudRuntimeEvent::new(EventType::ProcessStarted, json!({"id": "pi-1"}))
            .with_id("evt-7");
        let err = context
            .handle(uow.as_mut(), std::slice::from_ref(&event))
            .await
            .unwrap_err();

        match &err {
            QueryError::EventHandling { event: text, .. } => {
                assert!(text.starts_with("PROCESS_STARTED[id=evt-7"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.root_cause().error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unregistered_types_are_counted_as_skipped() {
        let store = memory_store().await;
        let mut uow = store.begin().await.unwrap();
        let context = QueryEventHandlerContext::new(vec![Arc::new(ProcessCreatedHandler)]).unwrap();

        let events = vec![
            CloudRuntimeEvent::new(EventType::ProcessCreated, json!({"id": "pi-1"})),
            CloudRuntimeEvent::new(EventType::TaskCreated, json!({"id": "t1"})),
            CloudRuntimeEvent {
                event_type: "SIGNAL_RECEIVED".to_string(),
                ..Default::default()
            },
        ];
        let outcome = context.handle(uow.as_mut(), &events).await.unwrap();

        assert_eq!(outcome, BatchOutcome { handled: 1, skipped: 2 });
        assert!(uow.find_task("t1").await.unwrap().is_none());
    }
}
