// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch consumer.
//!
//! One call to [`QueryConsumer::consume`] is one transaction: the batch is
//! either projected completely or not at all.

use std::sync::Arc;

use bpm_query_events::CloudRuntimeEvent;
use tracing::{debug, error, instrument};

use crate::context::{BatchOutcome, QueryEventHandlerContext};
use crate::error::Result;
use crate::finder::{CachingUnitOfWork, FetchPlan};
use crate::store::{ReadModelStore, UnitOfWork};

/// Entry point for the message consumption layer.
pub struct QueryConsumer {
    store: Arc<dyn ReadModelStore>,
    context: QueryEventHandlerContext,
}

impl QueryConsumer {
    /// Consumer projecting through `context` into `store`.
    pub fn new(store: Arc<dyn ReadModelStore>, context: QueryEventHandlerContext) -> Self {
        Self { store, context }
    }

    /// The dispatch context.
    pub fn context(&self) -> &QueryEventHandlerContext {
        &self.context
    }

    /// Project one batch of events in a single unit of work.
    ///
    /// Any handler or store failure rolls the whole batch back.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn consume(&self, events: &[CloudRuntimeEvent]) -> Result<BatchOutcome> {
        if events.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let plan = FetchPlan::from_events(events);
        let mut uow = CachingUnitOfWork::new(self.store.begin().await?);

        if let Err(e) = uow.prefetch(&plan).await {
            rollback(uow).await;
            return Err(e);
        }

        match self.context.handle(&mut uow, events).await {
            Ok(outcome) => {
                let stats = uow.stats();
                Box::new(uow).commit().await?;
                debug!(
                    handled = outcome.handled,
                    skipped = outcome.skipped,
                    cache_hits = stats.hits,
                    cache_misses = stats.misses,
                    "Batch committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Batch failed, rolling back");
                rollback(uow).await;
                Err(e)
            }
        }
    }
}

/// Roll back after a failure; the failure that caused it is what the caller
/// reports, so a rollback error is only logged.
async fn rollback(uow: CachingUnitOfWork) {
    if let Err(e) = Box::new(uow).rollback().await {
        error!(error = %e, "Rollback failed");
    }
}
