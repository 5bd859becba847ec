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

//! # socket-mux
//!
//! `socket-mux` multiplexes many workflow-trigger subscribers over one persistent
//! Socket Mode connection per bot token.
//!
//! Typical usage is centered on [`SocketMux`]: build it around a [`SocketConnector`],
//! activate one [`SubscriptionDescriptor`] per trigger and close the returned
//! [`Activation`] when the trigger is torn down.
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use socket_mux::{
//!     ActivationMode, BotToken, Credential, EmitError, EmitSink, EventEnvelope, EventHandler,
//!     EventKind, EventPayload, SocketConnection, SocketConnector, SocketMux,
//!     SubscriptionDescriptor, TransportError,
//! };
//!
//! struct IdleConnection;
//!
//! #[async_trait]
//! impl SocketConnection for IdleConnection {
//!     async fn register_handler(
//!         &self,
//!         _kind: EventKind,
//!         _handler: Arc<dyn EventHandler>,
//!     ) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!     async fn start(&self) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!     async fn stop(&self) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! struct IdleConnector;
//!
//! #[async_trait]
//! impl SocketConnector for IdleConnector {
//!     async fn connect(
//!         &self,
//!         _credential: &Credential,
//!     ) -> Result<Arc<dyn SocketConnection>, TransportError> {
//!         Ok(Arc::new(IdleConnection))
//!     }
//! }
//!
//! struct PrintSink;
//!
//! #[async_trait]
//! impl EmitSink for PrintSink {
//!     async fn emit(&self, payload: EventPayload) -> Result<(), EmitError> {
//!         println!("{}", payload.to_json());
//!         Ok(())
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mux = SocketMux::builder("quick-start", Arc::new(IdleConnector)).build();
//! let credential = Credential::new("signing-secret", "xoxb-bot", "xapp-app");
//!
//! let descriptor = SubscriptionDescriptor::builder(
//!     "node-1",
//!     credential.bot_token().clone(),
//!     Arc::new(PrintSink),
//! )
//! .event_kind(EventKind::Message)
//! .message_filter("deploy")
//! .build()
//! .unwrap();
//!
//! let activation = mux
//!     .activate(&credential, descriptor, ActivationMode::Trigger)
//!     .await
//!     .unwrap();
//! assert_eq!(mux.active_connections().await.len(), 1);
//!
//! activation.close().await;
//! assert!(mux.active_connections().await.is_empty());
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Facade: [`SocketMux`] and [`Activation`], the outward activation surface
//! - Control plane: the subscriber registry and its snapshot discipline
//! - Routing: pattern cache, filter predicates and the per-connection event router
//! - Data plane: the connection pool and the listeners attached to pooled connections
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events. Every event carries a stable
//! `event = <name>` field from the `observability` module.
//! Library code emits events/spans and does not unconditionally initialize a global
//! subscriber. Binaries and tests are responsible for one-time
//! `tracing_subscriber` initialization at process boundaries.
//! Bot tokens are only ever logged as a redacted fingerprint.

mod config;
pub use config::MuxConfig;

mod control_plane;
pub use control_plane::subscriber_registry::SubscriberRegistry;

mod credential;
pub use credential::{BotToken, Credential};

mod data_plane;
pub use data_plane::connection_pool::{ConnectionPool, ConnectionStatus, ReconcileReport};

mod error;
pub use error::{EmitError, MuxError, TransportError};

mod error_sink;
pub use error_sink::{ErrorSink, TracingErrorSink};

mod event;
pub use event::{EventEnvelope, EventKind, EventPayload};

#[doc(hidden)]
pub mod observability;

mod routing;
pub use routing::event_router::{DispatchReport, EventRouter};
pub use routing::pattern_cache::{CompiledPattern, PatternCache};

mod subscription;
pub use subscription::{
    EmitSink, SubscriberId, SubscriptionDescriptor, SubscriptionDescriptorBuilder,
};

mod transport;
pub use transport::{
    ChannelDirectory, ChannelInfo, ChannelQuery, EventHandler, SocketConnection,
    SocketConnector,
};

mod multiplexer;
pub use multiplexer::{Activation, ActivationMode, ChannelOption, SocketMux, SocketMuxBuilder};
