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

//! Outward activation surface.

use crate::config::MuxConfig;
use crate::control_plane::subscriber_registry::SubscriberRegistry;
use crate::credential::Credential;
use crate::data_plane::connection_pool::{ConnectionPool, ConnectionStatus, ReconcileReport};
use crate::error::MuxError;
use crate::error_sink::{ErrorSink, TracingErrorSink};
use crate::observability::{events, fields};
use crate::routing::pattern_cache::PatternCache;
use crate::subscription::{SubscriberId, SubscriptionDescriptor};
use crate::transport::{ChannelDirectory, ChannelInfo, SocketConnector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "socket_mux";

const UNKNOWN_CHANNEL_NAME: &str = "unknown";

/// When an activation opens its connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Start (or reuse) the connection before `activate` returns.
    #[default]
    Trigger,
    /// Only register; [`Activation::start`] opens the connection later.
    Manual,
}

/// One entry of a channel picker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOption {
    pub name: String,
    pub value: String,
}

impl From<ChannelInfo> for ChannelOption {
    fn from(channel: ChannelInfo) -> Self {
        Self {
            name: format!(
                "#{}",
                channel.name.as_deref().unwrap_or(UNKNOWN_CHANNEL_NAME)
            ),
            value: channel.id.unwrap_or_default(),
        }
    }
}

/// Multiplexes subscribers over one pooled connection per bot token.
///
/// Cloning is cheap; clones share the registry and the pool.
#[derive(Clone)]
pub struct SocketMux {
    name: Arc<str>,
    config: Arc<MuxConfig>,
    registry: Arc<SubscriberRegistry>,
    pool: Arc<ConnectionPool>,
    directory: Option<Arc<dyn ChannelDirectory>>,
    error_sink: Arc<dyn ErrorSink>,
}

pub struct SocketMuxBuilder {
    name: String,
    connector: Arc<dyn SocketConnector>,
    config: MuxConfig,
    directory: Option<Arc<dyn ChannelDirectory>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl SocketMuxBuilder {
    pub fn config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`TracingErrorSink`].
    pub fn error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(error_sink);
        self
    }

    pub fn channel_directory(mut self, directory: Arc<dyn ChannelDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn build(self) -> SocketMux {
        let error_sink: Arc<dyn ErrorSink> = match self.error_sink {
            Some(error_sink) => error_sink,
            None => Arc::new(TracingErrorSink),
        };
        let registry = Arc::new(SubscriberRegistry::new());
        let patterns = Arc::new(PatternCache::new(
            self.config.pattern_cache_capacity,
            error_sink.clone(),
        ));
        let pool = Arc::new(ConnectionPool::new(
            self.connector,
            registry.clone(),
            patterns,
            error_sink.clone(),
        ));

        debug!(
            component = COMPONENT,
            mux = self.name.as_str(),
            pattern_cache_capacity = self.config.pattern_cache_capacity,
            "built socket multiplexer"
        );

        SocketMux {
            name: Arc::from(self.name),
            config: Arc::new(self.config),
            registry,
            pool,
            directory: self.directory,
            error_sink,
        }
    }
}

impl SocketMux {
    pub fn builder(
        name: impl Into<String>,
        connector: Arc<dyn SocketConnector>,
    ) -> SocketMuxBuilder {
        SocketMuxBuilder {
            name: name.into(),
            connector,
            config: MuxConfig::default(),
            directory: None,
            error_sink: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Registers `descriptor` and, in [`ActivationMode::Trigger`], makes sure the
    /// connection for its bot token is started.
    ///
    /// Activating an identity that is already registered keeps the existing
    /// descriptor. If the start fails, the registration made by this call is
    /// undone before the error is returned.
    pub async fn activate(
        &self,
        credential: &Credential,
        descriptor: SubscriptionDescriptor,
        mode: ActivationMode,
    ) -> Result<Activation, MuxError> {
        credential.validate()?;
        if descriptor.bot_token() != credential.bot_token() {
            return Err(MuxError::CredentialMismatch {
                subscriber: descriptor.subscriber_id().clone(),
                descriptor_bot: descriptor.bot_token().fingerprint(),
                credential_bot: credential.bot_token().fingerprint(),
            });
        }

        let subscriber_id = descriptor.subscriber_id().clone();
        let kinds = fields::format_kinds(descriptor.event_kinds());
        let inserted = self.registry.register(descriptor);

        info!(
            event = events::ACTIVATION_REGISTER,
            component = COMPONENT,
            mux = %self.name,
            subscriber = %subscriber_id,
            bot = %credential.bot_token(),
            kinds = %kinds,
            mode = ?mode,
            inserted,
            "activating subscriber"
        );

        let activation = Activation {
            mux: self.clone(),
            credential: credential.clone(),
            subscriber_id,
        };

        if mode == ActivationMode::Trigger {
            if let Err(err) = activation.start().await {
                if inserted {
                    warn!(
                        event = events::ACTIVATION_ROLLBACK,
                        component = COMPONENT,
                        mux = %self.name,
                        subscriber = %activation.subscriber_id,
                        err = %err,
                        "connection start failed, rolling back registration"
                    );
                    self.registry.unregister(&activation.subscriber_id);
                }
                return Err(err);
            }
        }

        Ok(activation)
    }

    /// Unregisters `subscriber_id` and stops every connection left without
    /// subscribers. Unknown identities are a no-op apart from the reconcile pass.
    pub async fn deactivate(&self, subscriber_id: &SubscriberId) -> ReconcileReport {
        let removed = self.registry.unregister(subscriber_id).is_some();

        info!(
            event = events::DEACTIVATION,
            component = COMPONENT,
            mux = %self.name,
            subscriber = %subscriber_id,
            removed,
            "deactivating subscriber"
        );

        self.pool.reconcile().await
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        self.pool.reconcile().await
    }

    pub async fn active_connections(&self) -> Vec<ConnectionStatus> {
        self.pool.active_connections().await
    }

    /// Channels visible to the credential, shaped for a configuration picker.
    ///
    /// Listing failures are reported and yield an empty list.
    pub async fn channel_options(&self, credential: &Credential) -> Vec<ChannelOption> {
        let Some(directory) = &self.directory else {
            debug!(
                component = COMPONENT,
                mux = %self.name,
                "no channel directory configured"
            );
            return Vec::new();
        };

        match directory
            .list_channels(credential, &self.config.channel_query())
            .await
        {
            Ok(channels) => channels.into_iter().map(ChannelOption::from).collect(),
            Err(source) => {
                warn!(
                    event = events::CHANNEL_LIST_FAILED,
                    component = COMPONENT,
                    mux = %self.name,
                    bot = %credential.bot_token(),
                    "unable to list channels"
                );
                self.error_sink
                    .report("Error listing Slack channels", &MuxError::ChannelListing(source));
                Vec::new()
            }
        }
    }
}

/// Handle for one activated subscriber.
pub struct Activation {
    mux: SocketMux,
    credential: Credential,
    subscriber_id: SubscriberId,
}

impl Activation {
    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    /// Starts (or reuses) the connection for this subscriber's bot token.
    pub async fn start(&self) -> Result<(), MuxError> {
        self.mux
            .pool
            .ensure_started(&self.credential)
            .await
            .map(|_| ())
    }

    /// Deactivates the subscriber.
    pub async fn close(self) -> ReconcileReport {
        self.mux.deactivate(&self.subscriber_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivationMode, ChannelOption, SocketMux};
    use crate::credential::{BotToken, Credential};
    use crate::error::{EmitError, MuxError, TransportError};
    use crate::event::{EventKind, EventPayload};
    use crate::subscription::{EmitSink, SubscriberId, SubscriptionDescriptor};
    use crate::transport::{
        ChannelDirectory, ChannelInfo, ChannelQuery, EventHandler, SocketConnection,
        SocketConnector,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    struct IdleConnection;

    #[async_trait]
    impl SocketConnection for IdleConnection {
        async fn register_handler(
            &self,
            _kind: EventKind,
            _handler: Arc<dyn EventHandler>,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn start(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl SocketConnector for CountingConnector {
        async fn connect(
            &self,
            _credential: &Credential,
        ) -> Result<Arc<dyn SocketConnection>, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(TransportError::Authentication("invalid_auth".to_string()));
            }
            Ok(Arc::new(IdleConnection))
        }
    }

    struct NoopSink;

    #[async_trait]
    impl EmitSink for NoopSink {
        async fn emit(&self, _payload: EventPayload) -> Result<(), EmitError> {
            Ok(())
        }
    }

    struct StaticDirectory {
        result: StdMutex<Option<Result<Vec<ChannelInfo>, TransportError>>>,
        seen_query: StdMutex<Option<ChannelQuery>>,
    }

    #[async_trait]
    impl ChannelDirectory for StaticDirectory {
        async fn list_channels(
            &self,
            _credential: &Credential,
            query: &ChannelQuery,
        ) -> Result<Vec<ChannelInfo>, TransportError> {
            *self.seen_query.lock().expect("lock seen_query") = Some(query.clone());
            self.result
                .lock()
                .expect("lock result")
                .take()
                .unwrap_or(Ok(Vec::new()))
        }
    }

    fn credential(bot: &str) -> Credential {
        Credential::new("secret", bot, "xapp-1")
    }

    fn descriptor(id: &str, bot: &str) -> SubscriptionDescriptor {
        SubscriptionDescriptor::builder(id, BotToken::new(bot), Arc::new(NoopSink))
            .event_kind(EventKind::Message)
            .build()
            .expect("valid descriptor")
    }

    #[tokio::test]
    async fn subscribers_on_one_token_share_a_connection() {
        let connector = Arc::new(CountingConnector::default());
        let mux = SocketMux::builder("share", connector.clone()).build();

        let first = mux
            .activate(&credential("xoxb-x"), descriptor("a", "xoxb-x"), ActivationMode::Trigger)
            .await
            .expect("activated");
        let second = mux
            .activate(&credential("xoxb-x"), descriptor("b", "xoxb-x"), ActivationMode::Trigger)
            .await
            .expect("activated");

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(mux.active_connections().await[0].subscribers, 2);

        assert!(first.close().await.is_noop());
        assert_eq!(mux.active_connections().await.len(), 1);

        let report = second.close().await;
        assert_eq!(report.stopped, vec![BotToken::new("xoxb-x")]);
        assert!(mux.active_connections().await.is_empty());
    }

    #[tokio::test]
    async fn manual_mode_defers_start() {
        let connector = Arc::new(CountingConnector::default());
        let mux = SocketMux::builder("manual", connector.clone()).build();

        let activation = mux
            .activate(&credential("xoxb-x"), descriptor("a", "xoxb-x"), ActivationMode::Manual)
            .await
            .expect("activated");
        assert!(mux.registry().contains(&SubscriberId::new("a")));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);

        activation.start().await.expect("started");
        assert_eq!(mux.active_connections().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_start_rolls_back_registration() {
        let connector = Arc::new(CountingConnector {
            reject: true,
            ..Default::default()
        });
        let mux = SocketMux::builder("rollback", connector).build();

        let err = mux
            .activate(&credential("xoxb-x"), descriptor("a", "xoxb-x"), ActivationMode::Trigger)
            .await
            .err()
            .expect("activation must fail");

        assert!(matches!(err, MuxError::ConnectionStart { .. }));
        assert!(mux.registry().is_empty());
        assert!(mux.active_connections().await.is_empty());
    }

    #[tokio::test]
    async fn configuration_errors_fail_before_registering() {
        let mux = SocketMux::builder("config", Arc::new(CountingConnector::default())).build();

        let empty_secret = Credential::new("", "xoxb-x", "xapp-1");
        let err = mux
            .activate(&empty_secret, descriptor("a", "xoxb-x"), ActivationMode::Trigger)
            .await
            .err()
            .expect("empty secret rejected");
        assert!(matches!(err, MuxError::InvalidCredential(_)));

        let err = mux
            .activate(&credential("xoxb-y"), descriptor("a", "xoxb-x"), ActivationMode::Trigger)
            .await
            .err()
            .expect("mismatched token rejected");
        assert!(matches!(err, MuxError::CredentialMismatch { .. }));

        assert!(mux.registry().is_empty());
    }

    #[tokio::test]
    async fn deactivating_unknown_subscriber_is_a_noop() {
        let mux = SocketMux::builder("noop", Arc::new(CountingConnector::default())).build();
        assert!(mux.deactivate(&SubscriberId::new("ghost")).await.is_noop());
    }

    #[tokio::test]
    async fn channel_options_are_shaped_for_pickers() {
        let directory = Arc::new(StaticDirectory {
            result: StdMutex::new(Some(Ok(vec![
                ChannelInfo {
                    id: Some("C1".to_string()),
                    name: Some("general".to_string()),
                },
                ChannelInfo {
                    id: None,
                    name: None,
                },
            ]))),
            seen_query: StdMutex::new(None),
        });
        let mux = SocketMux::builder("channels", Arc::new(CountingConnector::default()))
            .channel_directory(directory.clone())
            .build();

        let options = mux.channel_options(&credential("xoxb-x")).await;

        assert_eq!(
            options,
            vec![
                ChannelOption {
                    name: "#general".to_string(),
                    value: "C1".to_string(),
                },
                ChannelOption {
                    name: "#unknown".to_string(),
                    value: String::new(),
                },
            ]
        );
        let query = directory
            .seen_query
            .lock()
            .expect("lock seen_query")
            .clone()
            .expect("query recorded");
        assert_eq!(query.limit, 200);
        assert_eq!(query.types, vec!["public_channel", "private_channel"]);
    }

    #[tokio::test]
    async fn channel_listing_failure_yields_empty_options() {
        let directory = Arc::new(StaticDirectory {
            result: StdMutex::new(Some(Err(TransportError::Request("ratelimited".to_string())))),
            seen_query: StdMutex::new(None),
        });
        let mux = SocketMux::builder("channels", Arc::new(CountingConnector::default()))
            .channel_directory(directory)
            .build();

        assert!(mux.channel_options(&credential("xoxb-x")).await.is_empty());
    }
}
