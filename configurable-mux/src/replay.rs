/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! In-process connector and JSON-lines event replay.

use crate::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use socket_mux::{
    Credential, EventEnvelope, EventHandler, EventKind, SocketConnection, SocketConnector,
    TransportError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

const COMPONENT: &str = "replay";

/// Stands in for a Socket Mode session: events are pushed in by [`replay`].
#[derive(Default)]
pub(crate) struct ReplayConnection {
    handlers: Mutex<HashMap<EventKind, Arc<dyn EventHandler>>>,
    running: AtomicBool,
}

impl ReplayConnection {
    fn handler(&self, kind: EventKind) -> Option<Arc<dyn EventHandler>> {
        if !self.running.load(Ordering::SeqCst) {
            return None;
        }
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }
}

#[async_trait]
impl SocketConnection for ReplayConnection {
    async fn register_handler(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), TransportError> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, handler);
        Ok(())
    }

    async fn start(&self) -> Result<(), TransportError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one [`ReplayConnection`] per connect call, remembering the latest per
/// bot token.
#[derive(Default)]
pub(crate) struct ReplayConnector {
    connections: Mutex<HashMap<String, Arc<ReplayConnection>>>,
}

impl ReplayConnector {
    fn handler(&self, credential: &Credential, kind: EventKind) -> Option<Arc<dyn EventHandler>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(credential.bot_token().expose())
            .and_then(|connection| connection.handler(kind))
    }
}

#[async_trait]
impl SocketConnector for ReplayConnector {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn SocketConnection>, TransportError> {
        let connection = Arc::new(ReplayConnection::default());
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                credential.bot_token().expose().to_string(),
                connection.clone(),
            );
        Ok(connection)
    }
}

/// One recorded inbound event.
#[derive(Debug, Deserialize)]
pub(crate) struct EventRecord {
    /// Name of a configured credential.
    pub(crate) credential: String,
    pub(crate) kind: EventKind,
    #[serde(flatten)]
    pub(crate) envelope: EventEnvelope,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) dispatched: usize,
    pub(crate) skipped: usize,
}

/// Feeds every JSON line of `input` to the running connection of its credential.
///
/// Blank lines are ignored. Undecodable lines, unknown credentials and records
/// without a running connection are logged and skipped.
pub(crate) async fn replay<R>(
    input: R,
    config: &Config,
    connector: &ReplayConnector,
) -> anyhow::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut summary = ReplaySummary::default();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: EventRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    component = COMPONENT,
                    line_number,
                    err = %err,
                    "skipping undecodable record"
                );
                summary.skipped += 1;
                continue;
            }
        };

        let Some(credential) = config.credential(&record.credential) else {
            warn!(
                component = COMPONENT,
                line_number,
                credential = record.credential.as_str(),
                "skipping record for unknown credential"
            );
            summary.skipped += 1;
            continue;
        };

        let Some(handler) = connector.handler(credential, record.kind) else {
            warn!(
                component = COMPONENT,
                line_number,
                credential = record.credential.as_str(),
                kind = %record.kind,
                "no running connection for record"
            );
            summary.skipped += 1;
            continue;
        };

        debug!(component = COMPONENT, line_number, kind = %record.kind, "replaying record");
        handler.on_event(record.envelope).await;
        summary.dispatched += 1;
    }

    info!(
        component = COMPONENT,
        dispatched = summary.dispatched,
        skipped = summary.skipped,
        "replay finished"
    );
    Ok(summary)
}
