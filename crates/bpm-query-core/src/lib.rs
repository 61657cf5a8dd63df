// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! BPM Query Core - Read Model Projector
//!
//! This crate projects BPM runtime events (process, task, variable, activity,
//! sequence flow, and integration events) onto a relational read model that
//! query services can serve without touching the engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Message consumption layer                            │
//! │              (broker binding, stdin NDJSON in the binary)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ batch of CloudRuntimeEvent
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          QueryConsumer                                   │
//! │        begin → prefetch(FetchPlan) → dispatch → commit / rollback        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌──────────────────────────┐       ┌──────────────────────────────────────┐
//! │ QueryEventHandlerContext │──────►│ one QueryEventHandler per EventType  │
//! └──────────────────────────┘       └──────────────────────────────────────┘
//!                                    │ &mut dyn UnitOfWork
//!                                    ▼
//! ┌──────────────────────────┐       ┌──────────────────────────────────────┐
//! │    CachingUnitOfWork     │──────►│  SQLite / PostgreSQL transaction     │
//! └──────────────────────────┘       └──────────────────────────────────────┘
//! ```
//!
//! # Event Handling
//!
//! Events are applied strictly in input order. Each event type has exactly one
//! handler, registered explicitly at startup.
//!
//! | Family | Events | Behavior |
//! |--------|--------|----------|
//! | Deployment | `PROCESS_DEPLOYED`, `APPLICATION_DEPLOYED` | Merge into existing rows |
//! | Process | `PROCESS_CREATED` .. `PROCESS_DELETED` | Lifecycle transitions, guarded cascade delete |
//! | Task | `TASK_CREATED` .. `TASK_CANCELLED` | Lifecycle transitions, variable snapshot on create |
//! | Candidate | `TASK_CANDIDATE_*`, `PROCESS_CANDIDATE_STARTER_*` | Idempotent add/remove |
//! | Variable | `VARIABLE_CREATED`, `VARIABLE_UPDATED`, `VARIABLE_DELETED` | Fan-out to task snapshots, final-owner guard |
//! | Activity | `ACTIVITY_STARTED`, `ACTIVITY_COMPLETED`, `ACTIVITY_CANCELLED` | Find-or-create |
//! | Sequence flow | `SEQUENCE_FLOW_TAKEN` | Append once per event id |
//! | Integration | `INTEGRATION_*` | Find-or-create context, mirrored onto the activity |
//!
//! Unknown event types are logged and skipped. Duplicate deliveries and late
//! events against finished records are skipped without error.
//!
//! # Process Instance Status State Machine
//!
//! ```text
//!     ┌─────────┐  started   ┌─────────┐  completed  ┌───────────┐
//!     │ CREATED │───────────►│ RUNNING │────────────►│ COMPLETED │
//!     └─────────┘            └────┬────┘             └───────────┘
//!                          suspend│  ▲ resume
//!                                 ▼  │
//!                            ┌───────────┐  cancelled ┌───────────┐
//!                            │ SUSPENDED │───────────►│ CANCELLED │
//!                            └───────────┘            └───────────┘
//! ```
//!
//! `PROCESS_DELETED` is only accepted for `COMPLETED` or `CANCELLED`
//! instances and removes the instance with everything it owns.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `BPM_QUERY_DATABASE_URL` | Yes | - | `sqlite:` or `postgres://` connection string |
//! | `BPM_QUERY_MAX_CONNECTIONS` | No | `10` | Connection pool size |
//! | `BPM_QUERY_BATCH_SIZE` | No | `100` | Events grouped per transaction by the binary |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`consumer`]: Transactional batch entry point
//! - [`context`]: Event type to handler dispatch
//! - [`error`]: Error types with error code mapping
//! - [`finder`]: Fetch plans, the caching unit of work, and lookup helpers
//! - [`handlers`]: One projection handler per event type
//! - [`model`]: Read model records
//! - [`store`]: Store traits with SQLite and PostgreSQL backends

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Transactional batch consumer.
pub mod consumer;

/// Event type to handler dispatch.
pub mod context;

/// Error types with error code mapping.
pub mod error;

/// Fetch plans, caching unit of work, and entity lookups.
pub mod finder;

/// Per-event projection handlers.
pub mod handlers;

/// Embedded schema migrations.
pub mod migrations;

/// Read model records.
pub mod model;

/// Store traits and database backends.
pub mod store;

pub use consumer::QueryConsumer;
pub use context::{BatchOutcome, QueryEventHandlerContext};
pub use error::{QueryError, Result};
pub use store::{PostgresStore, ReadModelStore, SqliteStore, UnitOfWork};
