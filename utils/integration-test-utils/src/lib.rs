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

//! Shared test doubles for exercising `socket-mux` without a Slack workspace.

use async_trait::async_trait;
use serde_json::{json, Value};
use socket_mux::{
    Credential, EmitError, EmitSink, ErrorSink, EventEnvelope, EventHandler, EventKind,
    EventPayload, MuxError, SocketConnection, SocketConnector, TransportError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Installs a test-writer `tracing` subscriber once per test binary, honoring `RUST_LOG`.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn credential(bot_token: &str) -> Credential {
    Credential::new("signing-secret", bot_token, "xapp-1-test")
}

/// Socket connection that records lifecycle calls and keeps its handlers so tests
/// can push events through them.
#[derive(Default)]
pub struct RecordingConnection {
    handlers: Mutex<HashMap<EventKind, Arc<dyn EventHandler>>>,
    started: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    fail_start: bool,
    fail_stop: bool,
}

impl RecordingConnection {
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn handled_kinds(&self) -> HashSet<EventKind> {
        self.handlers
            .lock()
            .expect("lock handlers")
            .keys()
            .copied()
            .collect()
    }

    /// Invokes the handler registered for `kind`, as the Socket Mode client would.
    pub async fn deliver(&self, kind: EventKind, envelope: EventEnvelope) -> bool {
        let handler = self
            .handlers
            .lock()
            .expect("lock handlers")
            .get(&kind)
            .cloned();
        match handler {
            Some(handler) if self.is_running() => {
                handler.on_event(envelope).await;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SocketConnection for RecordingConnection {
    async fn register_handler(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), TransportError> {
        self.handlers
            .lock()
            .expect("lock handlers")
            .insert(kind, handler);
        Ok(())
    }

    async fn start(&self) -> Result<(), TransportError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(TransportError::Authentication("invalid_auth".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        if self.fail_stop {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

/// Connector handing out [`RecordingConnection`]s, keyed by raw bot token.
#[derive(Default)]
pub struct RecordingConnector {
    failing_start: HashSet<String>,
    failing_stop: HashSet<String>,
    connections: Mutex<HashMap<String, Vec<Arc<RecordingConnection>>>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start_for(mut self, bot_token: &str) -> Self {
        self.failing_start.insert(bot_token.to_string());
        self
    }

    pub fn fail_stop_for(mut self, bot_token: &str) -> Self {
        self.failing_stop.insert(bot_token.to_string());
        self
    }

    /// Every connection opened for `bot_token`, oldest first.
    pub fn connections(&self, bot_token: &str) -> Vec<Arc<RecordingConnection>> {
        self.connections
            .lock()
            .expect("lock connections")
            .get(bot_token)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connect_calls(&self, bot_token: &str) -> usize {
        self.connections(bot_token).len()
    }

    pub fn running(&self, bot_token: &str) -> Option<Arc<RecordingConnection>> {
        self.connections(bot_token)
            .into_iter()
            .rev()
            .find(|connection| connection.is_running())
    }

    /// Delivers an event on the running connection for `bot_token`, if any.
    pub async fn deliver(&self, bot_token: &str, kind: EventKind, envelope: EventEnvelope) -> bool {
        match self.running(bot_token) {
            Some(connection) => connection.deliver(kind, envelope).await,
            None => false,
        }
    }
}

#[async_trait]
impl SocketConnector for RecordingConnector {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn SocketConnection>, TransportError> {
        let bot_token = credential.bot_token().expose().to_string();
        let connection = Arc::new(RecordingConnection {
            fail_start: self.failing_start.contains(&bot_token),
            fail_stop: self.failing_stop.contains(&bot_token),
            ..Default::default()
        });
        self.connections
            .lock()
            .expect("lock connections")
            .entry(bot_token)
            .or_default()
            .push(connection.clone());
        Ok(connection)
    }
}

/// Sink that keeps every payload it receives.
#[derive(Default)]
pub struct CollectingSink {
    received: Mutex<Vec<EventPayload>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn payloads(&self) -> Vec<EventPayload> {
        self.received.lock().expect("lock received").clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().expect("lock received").len()
    }
}

#[async_trait]
impl EmitSink for CollectingSink {
    async fn emit(&self, payload: EventPayload) -> Result<(), EmitError> {
        self.received.lock().expect("lock received").push(payload);
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl EmitSink for FailingSink {
    async fn emit(&self, _payload: EventPayload) -> Result<(), EmitError> {
        Err(EmitError::new("downstream rejected payload"))
    }
}

pub struct PanickingSink;

#[async_trait]
impl EmitSink for PanickingSink {
    async fn emit(&self, _payload: EventPayload) -> Result<(), EmitError> {
        panic!("downstream sink panicked");
    }
}

/// Error sink recording `message: error` lines.
#[derive(Default)]
pub struct CollectingErrorSink {
    reports: Mutex<Vec<String>>,
}

impl CollectingErrorSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().expect("lock reports").clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.reports()
            .iter()
            .filter(|report| report.contains(needle))
            .count()
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, message: &str, error: &MuxError) {
        self.reports
            .lock()
            .expect("lock reports")
            .push(format!("{message}: {error}"));
    }
}

fn envelope_with_event(event: Value) -> EventEnvelope {
    EventEnvelope {
        body: json!({"type": "event_callback", "event": event.clone()}),
        event,
        ..Default::default()
    }
}

pub fn message_envelope(channel: &str, text: &str) -> EventEnvelope {
    envelope_with_event(json!({"type": "message", "channel": channel, "text": text}))
}

pub fn subtyped_message_envelope(channel: &str, text: &str, subtype: &str) -> EventEnvelope {
    envelope_with_event(json!({
        "type": "message",
        "channel": channel,
        "text": text,
        "subtype": subtype,
    }))
}

pub fn mention_envelope(channel: &str, text: &str) -> EventEnvelope {
    envelope_with_event(json!({"type": "app_mention", "channel": channel, "text": text}))
}

pub fn reaction_envelope(item_channel: &str, reaction: &str) -> EventEnvelope {
    envelope_with_event(json!({
        "type": "reaction_added",
        "reaction": reaction,
        "item": {"type": "message", "channel": item_channel, "ts": "1700000000.000100"},
    }))
}

pub fn action_envelope(channel: &str, action_type: &str, action_id: &str) -> EventEnvelope {
    let action = json!({"type": action_type, "action_id": action_id});
    EventEnvelope {
        body: json!({
            "type": "block_actions",
            "channel": {"id": channel},
            "actions": [action.clone()],
        }),
        payload: action.clone(),
        context: json!({"botUserId": "U0BOT"}),
        event: action,
    }
}
