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

//! Subscription descriptors and the emit-sink seam towards the workflow host.

use crate::credential::BotToken;
use crate::error::{EmitError, MuxError};
use crate::event::{EventKind, EventPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

/// Identity of one subscriber, stable for its whole lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubscriberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Receives every event routed to one subscriber.
///
/// A sink that blocks stalls delivery to the subscribers after it for the same
/// event; it does not affect other connections.
#[async_trait]
pub trait EmitSink: Send + Sync {
    async fn emit(&self, payload: EventPayload) -> Result<(), EmitError>;
}

/// One subscriber's filter criteria and sink.
#[derive(Clone)]
pub struct SubscriptionDescriptor {
    subscriber_id: SubscriberId,
    flow_id: Option<String>,
    bot_token: BotToken,
    event_kinds: BTreeSet<EventKind>,
    watched_channels: HashSet<String>,
    message_filter: Option<String>,
    allow_bot_messages: bool,
    action_id: Option<String>,
    sink: Arc<dyn EmitSink>,
}

impl SubscriptionDescriptor {
    pub fn builder(
        subscriber_id: impl Into<SubscriberId>,
        bot_token: BotToken,
        sink: Arc<dyn EmitSink>,
    ) -> SubscriptionDescriptorBuilder {
        SubscriptionDescriptorBuilder {
            subscriber_id: subscriber_id.into(),
            flow_id: None,
            bot_token,
            event_kinds: BTreeSet::new(),
            watched_channels: HashSet::new(),
            message_filter: None,
            allow_bot_messages: false,
            action_id: None,
            sink,
        }
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    pub fn flow_id(&self) -> Option<&str> {
        self.flow_id.as_deref()
    }

    pub fn bot_token(&self) -> &BotToken {
        &self.bot_token
    }

    pub fn event_kinds(&self) -> &BTreeSet<EventKind> {
        &self.event_kinds
    }

    pub fn watched_channels(&self) -> &HashSet<String> {
        &self.watched_channels
    }

    pub fn message_filter(&self) -> Option<&str> {
        self.message_filter.as_deref()
    }

    pub fn allows_bot_messages(&self) -> bool {
        self.allow_bot_messages
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn sink(&self) -> &Arc<dyn EmitSink> {
        &self.sink
    }

    pub fn subscribes_to(&self, kind: EventKind) -> bool {
        self.event_kinds.contains(&kind)
    }

    /// An empty watch set means every channel, including events without one.
    pub fn watches(&self, channel: Option<&str>) -> bool {
        if self.watched_channels.is_empty() {
            return true;
        }
        channel.is_some_and(|channel| self.watched_channels.contains(channel))
    }
}

impl Debug for SubscriptionDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionDescriptor")
            .field("subscriber_id", &self.subscriber_id)
            .field("flow_id", &self.flow_id)
            .field("bot_token", &self.bot_token)
            .field("event_kinds", &self.event_kinds)
            .field("watched_channels", &self.watched_channels)
            .field("message_filter", &self.message_filter)
            .field("allow_bot_messages", &self.allow_bot_messages)
            .field("action_id", &self.action_id)
            .finish_non_exhaustive()
    }
}

pub struct SubscriptionDescriptorBuilder {
    subscriber_id: SubscriberId,
    flow_id: Option<String>,
    bot_token: BotToken,
    event_kinds: BTreeSet<EventKind>,
    watched_channels: HashSet<String>,
    message_filter: Option<String>,
    allow_bot_messages: bool,
    action_id: Option<String>,
    sink: Arc<dyn EmitSink>,
}

impl SubscriptionDescriptorBuilder {
    pub fn flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    pub fn event_kind(mut self, kind: EventKind) -> Self {
        self.event_kinds.insert(kind);
        self
    }

    pub fn event_kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.event_kinds.extend(kinds);
        self
    }

    pub fn watched_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watched_channels
            .extend(channels.into_iter().map(Into::into));
        self
    }

    /// Regex applied to message text. An empty pattern means no filter.
    pub fn message_filter(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.message_filter = (!pattern.is_empty()).then_some(pattern);
        self
    }

    pub fn allow_bot_messages(mut self, allow: bool) -> Self {
        self.allow_bot_messages = allow;
        self
    }

    /// Exact action type to accept. A blank value means every action.
    pub fn action_id(mut self, action_id: impl Into<String>) -> Self {
        let action_id = action_id.into();
        self.action_id = (!action_id.trim().is_empty()).then_some(action_id);
        self
    }

    pub fn build(self) -> Result<SubscriptionDescriptor, MuxError> {
        if self.event_kinds.is_empty() {
            return Err(MuxError::NoEventKinds);
        }

        Ok(SubscriptionDescriptor {
            subscriber_id: self.subscriber_id,
            flow_id: self.flow_id,
            bot_token: self.bot_token,
            event_kinds: self.event_kinds,
            watched_channels: self.watched_channels,
            message_filter: self.message_filter,
            allow_bot_messages: self.allow_bot_messages,
            action_id: self.action_id,
            sink: self.sink,
        })
    }
}
