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

//! Event kinds, raw envelopes and the typed views the filter pipeline reads.

use crate::error::MuxError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

const BOT_MESSAGE_SUBTYPE: &str = "bot_message";
const MESSAGE_CHANGED_SUBTYPE: &str = "message_changed";

/// The closed set of event kinds a subscriber can select.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    AppMention,
    ReactionAdded,
    Action,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Message,
        EventKind::AppMention,
        EventKind::ReactionAdded,
        EventKind::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::AppMention => "app_mention",
            EventKind::ReactionAdded => "reaction_added",
            EventKind::Action => "action",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MuxError::UnknownEventKind(s.to_string()))
    }
}

/// An inbound event exactly as the transport delivered it.
///
/// `event` is the kind-specific object: the message, mention or reaction event,
/// or the triggered action for [`EventKind::Action`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub event: Value,
}

/// What a subscriber's [`crate::EmitSink`] receives.
///
/// The envelope is shared between all recipients of one event and is never
/// projected or rewritten.
#[derive(Clone, Debug, PartialEq)]
pub struct EventPayload {
    kind: EventKind,
    envelope: Arc<EventEnvelope>,
}

impl EventPayload {
    pub fn new(kind: EventKind, envelope: EventEnvelope) -> Self {
        Self {
            kind,
            envelope: Arc::new(envelope),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }

    /// Key under which the kind-specific object is exposed.
    fn event_key(&self) -> &'static str {
        match self.kind {
            EventKind::Action => "action",
            _ => "event",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(4);
        object.insert("body".to_string(), self.envelope.body.clone());
        object.insert("payload".to_string(), self.envelope.payload.clone());
        object.insert("context".to_string(), self.envelope.context.clone());
        object.insert(self.event_key().to_string(), self.envelope.event.clone());
        Value::Object(object)
    }
}

impl Serialize for EventPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("body", &self.envelope.body)?;
        map.serialize_entry("payload", &self.envelope.payload)?;
        map.serialize_entry("context", &self.envelope.context)?;
        map.serialize_entry(self.event_key(), &self.envelope.event)?;
        map.end()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageEvent {
    pub(crate) channel: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) subtype: Option<String>,
}

impl MessageEvent {
    /// Messages posted by bots and edits of earlier messages.
    pub(crate) fn is_bot_originated(&self) -> bool {
        matches!(
            self.subtype.as_deref(),
            Some(BOT_MESSAGE_SUBTYPE) | Some(MESSAGE_CHANGED_SUBTYPE)
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MentionEvent {
    pub(crate) channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReactionItem {
    pub(crate) channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReactionEvent {
    #[serde(alias = "reactionItem")]
    pub(crate) item: Option<ReactionItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelRef {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionBody {
    channel: Option<ChannelRef>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionDetail {
    #[serde(rename = "type")]
    action_type: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct ActionEvent {
    pub(crate) channel: Option<String>,
    pub(crate) action_type: Option<String>,
}

/// Absent sections decode as empty views; anything else must have the right shape.
fn view<'a, T: Deserialize<'a> + Default>(value: &'a Value) -> Result<T, serde_json::Error> {
    if value.is_null() {
        return Ok(T::default());
    }
    T::deserialize(value)
}

/// Typed view over an [`EventEnvelope`], carrying only what filtering needs.
#[derive(Debug)]
pub(crate) enum InboundEvent {
    Message(MessageEvent),
    AppMention(MentionEvent),
    ReactionAdded(ReactionEvent),
    Action(ActionEvent),
}

impl InboundEvent {
    pub(crate) fn decode(kind: EventKind, envelope: &EventEnvelope) -> Result<Self, MuxError> {
        let malformed = |source| MuxError::MalformedEvent { kind, source };

        let event = match kind {
            EventKind::Message => {
                InboundEvent::Message(view::<MessageEvent>(&envelope.event).map_err(malformed)?)
            }
            EventKind::AppMention => InboundEvent::AppMention(
                view::<MentionEvent>(&envelope.event).map_err(malformed)?,
            ),
            EventKind::ReactionAdded => InboundEvent::ReactionAdded(
                view::<ReactionEvent>(&envelope.event).map_err(malformed)?,
            ),
            EventKind::Action => {
                let body = view::<ActionBody>(&envelope.body).map_err(malformed)?;
                let detail = view::<ActionDetail>(&envelope.event).map_err(malformed)?;
                InboundEvent::Action(ActionEvent {
                    channel: body.channel.and_then(|channel| channel.id),
                    action_type: detail.action_type,
                })
            }
        };
        Ok(event)
    }

    pub(crate) fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Message(_) => EventKind::Message,
            InboundEvent::AppMention(_) => EventKind::AppMention,
            InboundEvent::ReactionAdded(_) => EventKind::ReactionAdded,
            InboundEvent::Action(_) => EventKind::Action,
        }
    }

    /// Channel the channel filter is evaluated against.
    ///
    /// For reactions this is the channel of the reacted-to item, never a top-level
    /// channel field.
    pub(crate) fn target_channel(&self) -> Option<&str> {
        match self {
            InboundEvent::Message(message) => message.channel.as_deref(),
            InboundEvent::AppMention(mention) => mention.channel.as_deref(),
            InboundEvent::ReactionAdded(reaction) => reaction
                .item
                .as_ref()
                .and_then(|item| item.channel.as_deref()),
            InboundEvent::Action(action) => action.channel.as_deref(),
        }
    }
}
