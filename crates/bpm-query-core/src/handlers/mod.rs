// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-event projection handlers.
//!
//! Each handler owns one [`EventType`] and turns the event into mutations of
//! the read model through the unit of work it is given. Handlers come in two
//! shapes:
//!
//! - **create on first event** (`PROCESS_CREATED`, `TASK_CREATED`,
//!   `SEQUENCE_FLOW_TAKEN`, deployments): build the record from the payload,
//!   skip when the natural key already exists, save.
//! - **find then mutate** (every other lifecycle event): load the target,
//!   fail with [`QueryError::NotFound`](crate::error::QueryError::NotFound)
//!   for transitions that assume prior existence, or create it when the event
//!   may arrive first (activities, integration calls), then apply a fixed
//!   field update and save.
//!
//! Redeliveries and late events against finalized records are logged and
//! skipped, never reported as errors.

use std::sync::Arc;

use async_trait::async_trait;
use bpm_query_events::{CloudRuntimeEvent, EventType};

use crate::error::Result;
use crate::store::UnitOfWork;

pub mod activity;
pub mod candidate;
pub mod deployment;
pub mod integration;
pub mod process;
pub mod sequence_flow;
pub(crate) mod support;
pub mod task;
pub mod variable;

pub use activity::BpmnActivityHandler;
pub use candidate::{
    ProcessCandidateStarterGroupAddedHandler, ProcessCandidateStarterGroupRemovedHandler,
    ProcessCandidateStarterUserAddedHandler, ProcessCandidateStarterUserRemovedHandler,
    TaskCandidateGroupAddedHandler, TaskCandidateGroupRemovedHandler,
    TaskCandidateUserAddedHandler, TaskCandidateUserRemovedHandler,
};
pub use deployment::{ApplicationDeployedHandler, ProcessDeployedHandler};
pub use integration::{
    IntegrationErrorReceivedHandler, IntegrationRequestedHandler,
    IntegrationResultReceivedHandler,
};
pub use process::{
    ProcessCancelledHandler, ProcessCompletedHandler, ProcessCreatedHandler,
    ProcessDeletedHandler, ProcessResumedHandler, ProcessStartedHandler,
    ProcessSuspendedHandler, ProcessUpdatedHandler,
};
pub use sequence_flow::SequenceFlowTakenHandler;
pub use task::{
    TaskActivatedHandler, TaskAssignedHandler, TaskCancelledHandler, TaskCompletedHandler,
    TaskCreatedHandler, TaskSuspendedHandler, TaskUpdatedHandler,
};
pub use variable::{
    VariableCreatedHandler, VariableDeletedHandler, VariableUpdatedHandler, VariableUpdater,
};

/// Projects one event type into the read model.
#[async_trait]
pub trait QueryEventHandler: Send + Sync {
    /// The event type this handler consumes.
    fn handled_event_type(&self) -> EventType;

    /// Apply `event` through `uow`.
    ///
    /// Errors abort the batch; the caller rolls the unit of work back.
    async fn handle(&self, uow: &mut dyn UnitOfWork, event: &CloudRuntimeEvent) -> Result<()>;
}

/// One handler for every event type the read model projects.
pub fn default_handlers() -> Vec<Arc<dyn QueryEventHandler>> {
    vec![
        Arc::new(ProcessDeployedHandler),
        Arc::new(ApplicationDeployedHandler),
        Arc::new(ProcessCreatedHandler),
        Arc::new(ProcessStartedHandler),
        Arc::new(ProcessUpdatedHandler),
        Arc::new(ProcessSuspendedHandler),
        Arc::new(ProcessResumedHandler),
        Arc::new(ProcessCompletedHandler),
        Arc::new(ProcessCancelledHandler),
        Arc::new(ProcessDeletedHandler),
        Arc::new(TaskCreatedHandler),
        Arc::new(TaskAssignedHandler),
        Arc::new(TaskActivatedHandler),
        Arc::new(TaskSuspendedHandler),
        Arc::new(TaskUpdatedHandler),
        Arc::new(TaskCompletedHandler),
        Arc::new(TaskCancelledHandler),
        Arc::new(TaskCandidateUserAddedHandler),
        Arc::new(TaskCandidateUserRemovedHandler),
        Arc::new(TaskCandidateGroupAddedHandler),
        Arc::new(TaskCandidateGroupRemovedHandler),
        Arc::new(ProcessCandidateStarterUserAddedHandler),
        Arc::new(ProcessCandidateStarterUserRemovedHandler),
        Arc::new(ProcessCandidateStarterGroupAddedHandler),
        Arc::new(ProcessCandidateStarterGroupRemovedHandler),
        Arc::new(VariableCreatedHandler),
        Arc::new(VariableUpdatedHandler::default()),
        Arc::new(VariableDeletedHandler),
        Arc::new(BpmnActivityHandler::started()),
        Arc::new(BpmnActivityHandler::completed()),
        Arc::new(BpmnActivityHandler::cancelled()),
        Arc::new(SequenceFlowTakenHandler),
        Arc::new(IntegrationRequestedHandler),
        Arc::new(IntegrationResultReceivedHandler),
        Arc::new(IntegrationErrorReceivedHandler),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_handlers_cover_every_event_type_once() {
        let handlers = default_handlers();
        let types: HashSet<EventType> = handlers.iter().map(|h| h.handled_event_type()).collect();

        assert_eq!(handlers.len(), types.len());
        for event_type in EventType::ALL {
            assert!(types.contains(event_type), "no handler for {}", event_type);
        }
    }
}
