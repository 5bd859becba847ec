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

//! Error types shared by the activation surface, the pool and the router.

use crate::event::EventKind;
use crate::subscription::SubscriberId;
use thiserror::Error;

/// Errors surfaced by the multiplexer.
///
/// Configuration and connection lifecycle errors are returned to the activating
/// caller. Per-event errors (`InvalidPattern`, `MalformedEvent`, `Emit`) never leave
/// the router; they are handed to the [`crate::ErrorSink`] instead.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The descriptor selects no event kind.
    #[error("a trigger event must be selected")]
    NoEventKinds,

    #[error("unknown event kind `{0}`")]
    UnknownEventKind(String),

    /// A credential field is empty.
    #[error("invalid credential: {0} must not be empty")]
    InvalidCredential(&'static str),

    /// The descriptor was built for a different bot token than the credential.
    #[error("subscriber {subscriber} is bound to {descriptor_bot}, not {credential_bot}")]
    CredentialMismatch {
        subscriber: SubscriberId,
        descriptor_bot: String,
        credential_bot: String,
    },

    #[error("unable to start connection for {bot}: {source}")]
    ConnectionStart {
        bot: String,
        #[source]
        source: TransportError,
    },

    #[error("unable to register {kind} handler on connection for {bot}: {source}")]
    HandlerRegistration {
        bot: String,
        kind: EventKind,
        #[source]
        source: TransportError,
    },

    #[error("unable to stop connection for {bot}: {source}")]
    ConnectionStop {
        bot: String,
        #[source]
        source: TransportError,
    },

    #[error("invalid message filter pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed {kind} event: {source}")]
    MalformedEvent {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("subscriber {subscriber} failed to accept {kind} event: {source}")]
    Emit {
        subscriber: SubscriberId,
        kind: EventKind,
        #[source]
        source: EmitError,
    },

    #[error("unable to list channels: {0}")]
    ChannelListing(#[source] TransportError),
}

/// Errors reported by a [`crate::SocketConnector`], [`crate::SocketConnection`] or
/// [`crate::ChannelDirectory`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("transport closed")]
    Closed,
}

/// Failure returned by an [`crate::EmitSink`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EmitError(String);

impl EmitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
