// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! BPM Query Core - Read Model Projector
//!
//! Reads newline-delimited JSON events from stdin and projects them into the
//! configured read model database. A line holds either one event or a JSON
//! array of events; an array is always one transaction, while consecutive
//! single events are grouped up to the configured batch size.

use anyhow::Result;
use bpm_query_events::CloudRuntimeEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use bpm_query_core::config::Config;
use bpm_query_core::{QueryConsumer, QueryEventHandlerContext, store};

/// One parsed input line.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Line {
    Batch(Vec<CloudRuntimeEvent>),
    Single(Box<CloudRuntimeEvent>),
}

async fn flush(consumer: &QueryConsumer, pending: &mut Vec<CloudRuntimeEvent>) {
    if pending.is_empty() {
        return;
    }

    match consumer.consume(pending.as_slice()).await {
        Ok(outcome) => info!(
            handled = outcome.handled,
            skipped = outcome.skipped,
            "Batch projected"
        ),
        Err(e) => error!(
            error = %e,
            code = e.root_cause().error_code(),
            events = pending.len(),
            "Batch rejected"
        ),
    }
    pending.clear();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bpm_query_core=info".parse()?),
        )
        .init();

    info!("Starting BPM Query Core");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        backend = ?config.backend,
        max_connections = config.max_connections,
        batch_size = config.batch_size,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let store = store::connect(&config).await?;
    store.health_check().await?;
    info!("Database ready, migrations applied");

    let context = QueryEventHandlerContext::with_default_handlers()?;
    info!(handlers = context.len(), "Handlers registered");
    let consumer = QueryConsumer::new(store, context);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Vec<CloudRuntimeEvent> = Vec::with_capacity(config.batch_size);
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Line>(trimmed) {
            Ok(Line::Single(event)) => {
                pending.push(*event);
                if pending.len() >= config.batch_size {
                    flush(&consumer, &mut pending).await;
                }
            }
            Ok(Line::Batch(mut events)) => {
                flush(&consumer, &mut pending).await;
                flush(&consumer, &mut events).await;
            }
            Err(e) => warn!(line = line_no, error = %e, "Skipping unparseable line"),
        }
    }

    flush(&consumer, &mut pending).await;
    info!("Input exhausted, shutdown complete");

    Ok(())
}
