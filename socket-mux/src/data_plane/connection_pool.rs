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

//! Bot-token keyed pool of started upstream connections.

use crate::control_plane::subscriber_registry::SubscriberRegistry;
use crate::credential::{BotToken, Credential};
use crate::data_plane::connection_listener::ConnectionListener;
use crate::error::MuxError;
use crate::error_sink::ErrorSink;
use crate::event::EventKind;
use crate::observability::events;
use crate::routing::event_router::EventRouter;
use crate::routing::pattern_cache::PatternCache;
use crate::transport::{SocketConnection, SocketConnector};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "connection_pool";

struct PooledConnection {
    connection_id: Uuid,
    connection: Arc<dyn SocketConnection>,
}

/// Diagnostic view of one pooled connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Redacted bot token fingerprint.
    pub bot: String,
    pub connection_id: Uuid,
    /// Registered subscribers currently bound to this bot token.
    pub subscribers: usize,
}

/// Outcome of one [`ConnectionPool::reconcile`] pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Connections removed and stopped cleanly.
    pub stopped: Vec<BotToken>,
    /// Connections removed whose stop call failed.
    pub failures: Vec<MuxError>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.stopped.is_empty() && self.failures.is_empty()
    }
}

type PooledConnectionsContainer = Mutex<HashMap<BotToken, PooledConnection>>;

/// At most one started connection per bot token.
///
/// All pool mutations hold the pool lock for their whole duration, start and stop
/// calls included. Two activations racing on the same unseen bot token therefore
/// produce a single connection.
pub struct ConnectionPool {
    connector: Arc<dyn SocketConnector>,
    registry: Arc<SubscriberRegistry>,
    patterns: Arc<PatternCache>,
    error_sink: Arc<dyn ErrorSink>,
    connections: PooledConnectionsContainer,
}

impl ConnectionPool {
    pub fn new(
        connector: Arc<dyn SocketConnector>,
        registry: Arc<SubscriberRegistry>,
        patterns: Arc<PatternCache>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            connector,
            registry,
            patterns,
            error_sink,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Makes sure a started connection exists for the credential's bot token.
    ///
    /// Returns `true` when this call opened the connection and `false` when an
    /// existing one was reused. A failed start leaves no entry behind, so a later
    /// call retries from scratch.
    pub async fn ensure_started(&self, credential: &Credential) -> Result<bool, MuxError> {
        let bot_token = credential.bot_token();
        let mut connections = self.connections.lock().await;

        if let Some(pooled) = connections.get(bot_token) {
            debug!(
                event = events::POOL_CONNECTION_REUSE,
                component = COMPONENT,
                bot = %bot_token,
                connection_id = %pooled.connection_id,
                "reusing pooled connection"
            );
            return Ok(false);
        }

        let connection_id = Uuid::new_v4();
        info!(
            event = events::POOL_CONNECTION_START,
            component = COMPONENT,
            bot = %bot_token,
            connection_id = %connection_id,
            "starting socket connection"
        );

        let connection = match self.open(credential).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(
                    event = events::POOL_CONNECTION_START_FAILED,
                    component = COMPONENT,
                    bot = %bot_token,
                    connection_id = %connection_id,
                    err = %err,
                    "unable to start socket connection"
                );
                self.error_sink
                    .report("Error starting Slack socket connection", &err);
                return Err(err);
            }
        };

        connections.insert(
            bot_token.clone(),
            PooledConnection {
                connection_id,
                connection,
            },
        );

        info!(
            event = events::POOL_CONNECTION_START_OK,
            component = COMPONENT,
            bot = %bot_token,
            connection_id = %connection_id,
            pooled = connections.len(),
            "socket connection started"
        );
        Ok(true)
    }

    /// Connects, attaches one listener per event kind and starts the connection.
    async fn open(&self, credential: &Credential) -> Result<Arc<dyn SocketConnection>, MuxError> {
        let bot_token = credential.bot_token();

        let connection = self
            .connector
            .connect(credential)
            .await
            .map_err(|source| MuxError::ConnectionStart {
                bot: bot_token.fingerprint(),
                source,
            })?;

        if let Err(err) = self.attach_and_start(bot_token, connection.as_ref()).await {
            self.discard(bot_token, connection.as_ref()).await;
            return Err(err);
        }

        Ok(connection)
    }

    async fn attach_and_start(
        &self,
        bot_token: &BotToken,
        connection: &dyn SocketConnection,
    ) -> Result<(), MuxError> {
        let router = Arc::new(EventRouter::new(
            bot_token.clone(),
            self.registry.clone(),
            self.patterns.clone(),
            self.error_sink.clone(),
        ));

        for kind in EventKind::ALL {
            let listener = Arc::new(ConnectionListener::new(kind, router.clone()));
            connection
                .register_handler(kind, listener)
                .await
                .map_err(|source| MuxError::HandlerRegistration {
                    bot: bot_token.fingerprint(),
                    kind,
                    source,
                })?;
        }

        connection
            .start()
            .await
            .map_err(|source| MuxError::ConnectionStart {
                bot: bot_token.fingerprint(),
                source,
            })
    }

    /// Best-effort stop of a connection that never made it into the pool.
    async fn discard(&self, bot_token: &BotToken, connection: &dyn SocketConnection) {
        let Err(source) = connection.stop().await else {
            return;
        };
        let err = MuxError::ConnectionStop {
            bot: bot_token.fingerprint(),
            source,
        };
        warn!(
            event = events::POOL_CONNECTION_STOP_FAILED,
            component = COMPONENT,
            bot = %bot_token,
            err = %err,
            "unable to stop socket connection after failed start"
        );
        self.error_sink
            .report("Error stopping Slack socket connection", &err);
    }

    /// Removes and stops the connection for `bot_token`.
    ///
    /// The entry is dropped before the stop call, so a failing stop never leaves a
    /// half-closed connection in the pool. Returns whether a connection existed.
    pub async fn stop(&self, bot_token: &BotToken) -> Result<bool, MuxError> {
        let mut connections = self.connections.lock().await;
        let Some(pooled) = connections.remove(bot_token) else {
            debug!(
                event = events::POOL_CONNECTION_STOP_MISSING,
                component = COMPONENT,
                bot = %bot_token,
                "no pooled connection to stop"
            );
            return Ok(false);
        };

        self.stop_pooled(bot_token, pooled).await.map(|_| true)
    }

    async fn stop_pooled(
        &self,
        bot_token: &BotToken,
        pooled: PooledConnection,
    ) -> Result<(), MuxError> {
        info!(
            event = events::POOL_CONNECTION_STOP,
            component = COMPONENT,
            bot = %bot_token,
            connection_id = %pooled.connection_id,
            "stopping socket connection"
        );

        pooled
            .connection
            .stop()
            .await
            .map_err(|source| MuxError::ConnectionStop {
                bot: bot_token.fingerprint(),
                source,
            })
            .inspect_err(|err| {
                warn!(
                    event = events::POOL_CONNECTION_STOP_FAILED,
                    component = COMPONENT,
                    bot = %bot_token,
                    connection_id = %pooled.connection_id,
                    err = %err,
                    "unable to stop socket connection"
                );
            })
    }

    /// Stops every pooled connection whose bot token no registered subscriber
    /// references any more.
    ///
    /// The registry is read after the pool lock is taken, so an activation that
    /// registered before this pass keeps its connection. A failing stop is
    /// reported and does not prevent the remaining connections from stopping.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut connections = self.connections.lock().await;
        let active = self.registry.active_bot_tokens();

        let orphaned: Vec<BotToken> = connections
            .keys()
            .filter(|bot_token| !active.contains(*bot_token))
            .cloned()
            .collect();

        let mut report = ReconcileReport::default();
        for bot_token in orphaned {
            let Some(pooled) = connections.remove(&bot_token) else {
                continue;
            };
            match self.stop_pooled(&bot_token, pooled).await {
                Ok(()) => report.stopped.push(bot_token),
                Err(err) => {
                    self.error_sink
                        .report("Error stopping Slack socket connection", &err);
                    report.failures.push(err);
                }
            }
        }

        debug!(
            event = events::POOL_RECONCILE,
            component = COMPONENT,
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            pooled = connections.len(),
            "reconciled connection pool"
        );
        report
    }

    pub async fn contains(&self, bot_token: &BotToken) -> bool {
        self.connections.lock().await.contains_key(bot_token)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn active_connections(&self) -> Vec<ConnectionStatus> {
        let connections = self.connections.lock().await;
        let mut statuses: Vec<ConnectionStatus> = connections
            .iter()
            .map(|(bot_token, pooled)| ConnectionStatus {
                bot: bot_token.fingerprint(),
                connection_id: pooled.connection_id,
                subscribers: self.registry.list_by_bot_token(bot_token).len(),
            })
            .collect();
        statuses.sort_by(|a, b| a.bot.cmp(&b.bot));
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionPool;
    use crate::control_plane::subscriber_registry::SubscriberRegistry;
    use crate::credential::{BotToken, Credential};
    use crate::error::{EmitError, MuxError, TransportError};
    use crate::error_sink::ErrorSink;
    use crate::event::{EventEnvelope, EventKind, EventPayload};
    use crate::routing::pattern_cache::PatternCache;
    use crate::subscription::{EmitSink, SubscriptionDescriptor};
    use crate::transport::{EventHandler, SocketConnection, SocketConnector};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct RecordingConnection {
        handlers: StdMutex<Vec<(EventKind, Arc<dyn EventHandler>)>>,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        fail_start: bool,
        fail_stop: bool,
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
                .push((kind, handler));
            Ok(())
        }

        async fn start(&self) -> Result<(), TransportError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(TransportError::Authentication("invalid_auth".to_string()));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), TransportError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(TransportError::Closed);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        failing_start: HashSet<String>,
        failing_stop: HashSet<String>,
        opened: StdMutex<HashMap<String, Vec<Arc<RecordingConnection>>>>,
    }

    impl RecordingConnector {
        fn opened(&self, bot: &str) -> Vec<Arc<RecordingConnection>> {
            self.opened
                .lock()
                .expect("lock opened")
                .get(bot)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SocketConnector for RecordingConnector {
        async fn connect(
            &self,
            credential: &Credential,
        ) -> Result<Arc<dyn SocketConnection>, TransportError> {
            let bot = credential.bot_token().expose().to_string();
            let connection = Arc::new(RecordingConnection {
                fail_start: self.failing_start.contains(&bot),
                fail_stop: self.failing_stop.contains(&bot),
                ..Default::default()
            });
            self.opened
                .lock()
                .expect("lock opened")
                .entry(bot)
                .or_default()
                .push(connection.clone());
            Ok(connection)
        }
    }

    #[derive(Default)]
    struct RecordingErrorSink {
        messages: StdMutex<Vec<String>>,
    }

    impl ErrorSink for RecordingErrorSink {
        fn report(&self, message: &str, _error: &MuxError) {
            self.messages
                .lock()
                .expect("lock messages")
                .push(message.to_string());
        }
    }

    #[derive(Default)]
    struct CountingSink {
        received: AtomicUsize,
    }

    #[async_trait]
    impl EmitSink for CountingSink {
        async fn emit(&self, _payload: EventPayload) -> Result<(), EmitError> {
            self.received.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        connector: Arc<RecordingConnector>,
        registry: Arc<SubscriberRegistry>,
        errors: Arc<RecordingErrorSink>,
        pool: ConnectionPool,
    }

    fn fixture(connector: RecordingConnector) -> Fixture {
        let connector = Arc::new(connector);
        let registry = Arc::new(SubscriberRegistry::new());
        let errors = Arc::new(RecordingErrorSink::default());
        let patterns = Arc::new(PatternCache::new(16, errors.clone()));
        let pool = ConnectionPool::new(
            connector.clone(),
            registry.clone(),
            patterns,
            errors.clone(),
        );
        Fixture {
            connector,
            registry,
            errors,
            pool,
        }
    }

    fn credential(bot: &str) -> Credential {
        Credential::new("secret", bot, "xapp-1")
    }

    fn subscribe(registry: &SubscriberRegistry, id: &str, bot: &str, sink: Arc<dyn EmitSink>) {
        registry.register(
            SubscriptionDescriptor::builder(id, BotToken::new(bot), sink)
                .event_kind(EventKind::AppMention)
                .build()
                .expect("valid descriptor"),
        );
    }

    #[tokio::test]
    async fn second_ensure_reuses_started_connection() {
        let fixture = fixture(RecordingConnector::default());

        assert!(fixture.pool.ensure_started(&credential("xoxb-a")).await.expect("started"));
        assert!(!fixture.pool.ensure_started(&credential("xoxb-a")).await.expect("reused"));

        let opened = fixture.connector.opened("xoxb-a");
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            opened[0].handlers.lock().expect("lock handlers").len(),
            EventKind::ALL.len()
        );
        assert_eq!(fixture.pool.len().await, 1);
    }

    #[tokio::test]
    async fn failed_start_leaves_no_entry_and_is_reported() {
        let fixture = fixture(RecordingConnector {
            failing_start: HashSet::from(["xoxb-bad".to_string()]),
            ..Default::default()
        });

        let err = fixture
            .pool
            .ensure_started(&credential("xoxb-bad"))
            .await
            .expect_err("start must fail");
        assert!(matches!(err, MuxError::ConnectionStart { .. }));
        assert!(fixture.pool.is_empty().await);

        fixture
            .pool
            .ensure_started(&credential("xoxb-bad"))
            .await
            .expect_err("retry must fail again");
        assert_eq!(fixture.connector.opened("xoxb-bad").len(), 2);
        assert_eq!(fixture.errors.messages.lock().expect("lock messages").len(), 2);
    }

    #[tokio::test]
    async fn connection_that_fails_to_start_is_stopped() {
        let fixture = fixture(RecordingConnector {
            failing_start: HashSet::from(["xoxb-bad".to_string()]),
            ..Default::default()
        });

        fixture
            .pool
            .ensure_started(&credential("xoxb-bad"))
            .await
            .expect_err("start must fail");

        let opened = fixture.connector.opened("xoxb-bad");
        assert_eq!(opened[0].stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            fixture.errors.messages.lock().expect("lock messages").as_slice(),
            ["Error starting Slack socket connection"]
        );
    }

    #[tokio::test]
    async fn failed_cleanup_after_failed_start_is_reported() {
        let fixture = fixture(RecordingConnector {
            failing_start: HashSet::from(["xoxb-bad".to_string()]),
            failing_stop: HashSet::from(["xoxb-bad".to_string()]),
            ..Default::default()
        });

        let err = fixture
            .pool
            .ensure_started(&credential("xoxb-bad"))
            .await
            .expect_err("start must fail");

        assert!(matches!(err, MuxError::ConnectionStart { .. }));
        assert!(fixture.pool.is_empty().await);
        assert_eq!(
            fixture.errors.messages.lock().expect("lock messages").as_slice(),
            [
                "Error stopping Slack socket connection",
                "Error starting Slack socket connection"
            ]
        );
    }

    #[tokio::test]
    async fn reconcile_stops_only_orphaned_connections_once() {
        let fixture = fixture(RecordingConnector::default());
        subscribe(
            &fixture.registry,
            "node-1",
            "xoxb-a",
            Arc::new(CountingSink::default()),
        );

        fixture.pool.ensure_started(&credential("xoxb-a")).await.expect("started");
        fixture.pool.ensure_started(&credential("xoxb-y")).await.expect("started");

        let first = fixture.pool.reconcile().await;
        assert_eq!(first.stopped, vec![BotToken::new("xoxb-y")]);
        let second = fixture.pool.reconcile().await;
        assert!(second.is_noop());

        assert_eq!(fixture.connector.opened("xoxb-y")[0].stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.connector.opened("xoxb-a")[0].stop_calls.load(Ordering::SeqCst), 0);
        assert!(fixture.pool.contains(&BotToken::new("xoxb-a")).await);
    }

    #[tokio::test]
    async fn failing_stop_does_not_block_other_orphans() {
        let fixture = fixture(RecordingConnector {
            failing_stop: HashSet::from(["xoxb-stuck".to_string()]),
            ..Default::default()
        });

        fixture.pool.ensure_started(&credential("xoxb-stuck")).await.expect("started");
        fixture.pool.ensure_started(&credential("xoxb-ok")).await.expect("started");

        let report = fixture.pool.reconcile().await;

        assert_eq!(report.stopped, vec![BotToken::new("xoxb-ok")]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], MuxError::ConnectionStop { .. }));
        assert!(fixture.pool.is_empty().await);
        assert_eq!(
            fixture.errors.messages.lock().expect("lock messages").as_slice(),
            ["Error stopping Slack socket connection"]
        );
    }

    #[tokio::test]
    async fn stop_removes_entry_even_when_stop_fails() {
        let fixture = fixture(RecordingConnector {
            failing_stop: HashSet::from(["xoxb-stuck".to_string()]),
            ..Default::default()
        });
        let bot = BotToken::new("xoxb-stuck");

        fixture.pool.ensure_started(&credential("xoxb-stuck")).await.expect("started");
        assert!(fixture.pool.stop(&bot).await.is_err());
        assert!(!fixture.pool.stop(&bot).await.expect("nothing left to stop"));
        assert!(!fixture.pool.contains(&bot).await);
    }

    #[tokio::test]
    async fn subscribers_added_after_start_receive_events() {
        let fixture = fixture(RecordingConnector::default());
        fixture.pool.ensure_started(&credential("xoxb-a")).await.expect("started");

        let sink = Arc::new(CountingSink::default());
        subscribe(&fixture.registry, "late", "xoxb-a", sink.clone());

        let connection = fixture.connector.opened("xoxb-a").remove(0);
        let handler = connection
            .handlers
            .lock()
            .expect("lock handlers")
            .iter()
            .find(|(kind, _)| *kind == EventKind::AppMention)
            .map(|(_, handler)| handler.clone())
            .expect("app_mention handler");

        handler
            .on_event(EventEnvelope {
                event: json!({"type": "app_mention", "channel": "C1"}),
                ..Default::default()
            })
            .await;

        assert_eq!(sink.received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn active_connections_report_subscriber_counts_without_raw_tokens() {
        let fixture = fixture(RecordingConnector::default());
        subscribe(&fixture.registry, "n1", "xoxb-a", Arc::new(CountingSink::default()));
        subscribe(&fixture.registry, "n2", "xoxb-a", Arc::new(CountingSink::default()));
        fixture.pool.ensure_started(&credential("xoxb-a")).await.expect("started");

        let statuses = fixture.pool.active_connections().await;

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].subscribers, 2);
        assert_eq!(statuses[0].bot, BotToken::new("xoxb-a").fingerprint());
        assert!(!statuses[0].bot.contains("xoxb"));
    }
}
