// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for bpm-query-core integration tests.
//!
//! Provides TestContext for setting up a store and a consumer, plus builders
//! for the events the tests feed through it.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;

use bpm_query_core::store::UnitOfWork;
use bpm_query_core::{
    BatchOutcome, PostgresStore, QueryConsumer, QueryEventHandlerContext, ReadModelStore,
    SqliteStore,
};
use bpm_query_events::{CloudRuntimeEvent, EventType};

/// Test context that owns a store and a consumer wired to it.
pub struct TestContext {
    pub store: Arc<dyn ReadModelStore>,
    pub consumer: QueryConsumer,
}

impl TestContext {
    /// Context backed by a fresh in-memory SQLite database.
    pub async fn sqlite() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create SQLite pool");
        bpm_query_core::migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run SQLite migrations");

        Self::with_store(Arc::new(SqliteStore::new(pool)))
    }

    /// Context backed by the database at TEST_DATABASE_URL, if set.
    pub async fn postgres() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .ok()?;
        bpm_query_core::migrations::run_postgres(&pool).await.ok()?;

        Some(Self::with_store(Arc::new(PostgresStore::new(pool))))
    }

    fn with_store(store: Arc<dyn ReadModelStore>) -> Self {
        let context = QueryEventHandlerContext::with_default_handlers()
            .expect("Default handlers must register");
        let consumer = QueryConsumer::new(store.clone(), context);
        Self { store, consumer }
    }

    /// Consume `events` as one batch, panicking on failure.
    pub async fn apply(&self, events: Vec<CloudRuntimeEvent>) -> BatchOutcome {
        self.consumer
            .consume(&events)
            .await
            .expect("Batch should be projected")
    }

    /// Open a unit of work for inspecting committed state.
    pub async fn read(&self) -> Box<dyn UnitOfWork> {
        self.store.begin().await.expect("Failed to open unit of work")
    }
}

/// Skip a test unless TEST_DATABASE_URL is set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

// ============================================================================
// Event Builders
// ============================================================================

/// Event of `event_type` at `timestamp` carrying `entity`.
pub fn event(event_type: EventType, entity: Value, timestamp: i64) -> CloudRuntimeEvent {
    CloudRuntimeEvent::new(event_type, entity)
        .with_timestamp(timestamp)
        .with_app("billing", "1.0.0")
        .with_service("query-it", "bpm.query-it", "1")
}

pub fn process_created(pi: &str) -> CloudRuntimeEvent {
    event(
        EventType::ProcessCreated,
        json!({"id": pi, "name": "Invoice", "processDefinitionId": "invoice:1", "processDefinitionKey": "invoice"}),
        1_000,
    )
    .with_process_instance_id(pi)
}

pub fn process_event(event_type: EventType, pi: &str, timestamp: i64) -> CloudRuntimeEvent {
    event(event_type, json!({"id": pi}), timestamp).with_process_instance_id(pi)
}

pub fn task_created(task_id: &str, pi: &str, timestamp: i64) -> CloudRuntimeEvent {
    event(
        EventType::TaskCreated,
        json!({"id": task_id, "name": "Approve", "processInstanceId": pi, "createdDate": timestamp}),
        timestamp,
    )
    .with_process_instance_id(pi)
}

pub fn task_event(event_type: EventType, entity: Value, timestamp: i64) -> CloudRuntimeEvent {
    event(event_type, entity, timestamp)
}

pub fn process_variable(event_type: EventType, pi: &str, name: &str, value: Value) -> CloudRuntimeEvent {
    event(
        event_type,
        json!({"name": name, "type": "json", "value": value, "processInstanceId": pi}),
        2_000,
    )
    .with_process_instance_id(pi)
}

pub fn task_variable(event_type: EventType, task_id: &str, name: &str, value: Value) -> CloudRuntimeEvent {
    event(
        event_type,
        json!({"name": name, "value": value, "taskId": task_id, "taskVariable": true}),
        2_000,
    )
}

pub fn sequence_flow(pi: &str, event_id: &str) -> CloudRuntimeEvent {
    event(
        EventType::SequenceFlowTaken,
        json!({
            "elementId": "flow1",
            "processInstanceId": pi,
            "sourceActivityElementId": "start",
            "targetActivityElementId": "approve"
        }),
        1_500,
    )
    .with_id(event_id)
    .with_process_instance_id(pi)
}

pub fn activity(event_type: EventType, pi: &str, element_id: &str, timestamp: i64) -> CloudRuntimeEvent {
    event(
        event_type,
        json!({"elementId": element_id, "processInstanceId": pi, "executionId": "ex-1", "activityType": "serviceTask"}),
        timestamp,
    )
    .with_process_instance_id(pi)
}

pub fn integration(event_type: EventType, pi: &str, client_id: &str, extra: Value) -> CloudRuntimeEvent {
    let mut entity = json!({"processInstanceId": pi, "clientId": client_id, "executionId": "ex-1"});
    if let (Some(target), Some(source)) = (entity.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    event(event_type, entity, 3_000).with_process_instance_id(pi)
}

/// A full set of child rows under `pi`: a task with a candidate and a task
/// variable, a process variable, an activity, a sequence flow and an
/// integration call.
pub fn populated_process(pi: &str, task_id: &str) -> Vec<CloudRuntimeEvent> {
    vec![
        process_created(pi),
        process_event(EventType::ProcessStarted, pi, 1_100),
        process_variable(EventType::VariableCreated, pi, "amount", json!(100)),
        task_created(task_id, pi, 1_200),
        task_event(
            EventType::TaskCandidateUserAdded,
            json!({"taskId": task_id, "userId": "jane"}),
            1_300,
        ),
        task_variable(EventType::VariableCreated, task_id, "approved", json!(false)),
        activity(EventType::ActivityStarted, pi, "charge", 1_400),
        sequence_flow(pi, &format!("{}-flow-1", pi)),
        integration(EventType::IntegrationRequested, pi, "charge", json!({})),
    ]
}
