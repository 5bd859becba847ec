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

//! Boundary traits towards the Socket Mode client and the Web API client.
//!
//! The multiplexer never speaks the wire protocol itself. A [`SocketConnector`]
//! opens authenticated [`SocketConnection`]s, which deliver typed event callbacks to
//! the [`EventHandler`]s registered on them.

use crate::credential::Credential;
use crate::error::TransportError;
use crate::event::{EventEnvelope, EventKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback surface a connection invokes once per inbound event of one kind.
///
/// A connection delivers events to a handler one at a time.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, envelope: EventEnvelope);
}

/// One upstream Socket Mode session.
#[async_trait]
pub trait SocketConnection: Send + Sync {
    /// Attaches `handler` to every inbound event of `kind`. Called before `start`.
    async fn register_handler(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), TransportError>;

    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;
}

/// Opens connections authenticated with all three secrets of a [`Credential`].
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn SocketConnection>, TransportError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelQuery {
    pub types: Vec<String>,
    pub limit: u32,
}

/// Request/response (non-socket) access used to populate channel pickers.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_channels(
        &self,
        credential: &Credential,
        query: &ChannelQuery,
    ) -> Result<Vec<ChannelInfo>, TransportError>;
}
