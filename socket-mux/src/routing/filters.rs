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

//! Per-subscriber filter predicates, cheapest first.
//!
//! Text pattern matching is not here: the router evaluates it once per distinct
//! pattern, see [`crate::routing::event_router`].

use crate::event::{ActionEvent, InboundEvent, MessageEvent};
use crate::subscription::SubscriptionDescriptor;

/// Message stages that run per subscriber: bot origin, then channel.
pub(crate) fn message_prefilter(
    descriptor: &SubscriptionDescriptor,
    message: &MessageEvent,
) -> bool {
    if !descriptor.allows_bot_messages() && message.is_bot_originated() {
        return false;
    }
    descriptor.watches(message.channel.as_deref())
}

/// Exact match on the action type; no filter configured accepts every action.
pub(crate) fn action_matches(descriptor: &SubscriptionDescriptor, action: &ActionEvent) -> bool {
    match descriptor.action_id() {
        None => true,
        Some(wanted) => action.action_type.as_deref() == Some(wanted),
    }
}

/// Full pipeline for every kind except `message`.
///
/// Kind membership is already guaranteed by the registry snapshot the router
/// selects from.
pub(crate) fn non_message_matches(
    descriptor: &SubscriptionDescriptor,
    event: &InboundEvent,
) -> bool {
    if !descriptor.subscribes_to(event.kind()) {
        return false;
    }
    if !descriptor.watches(event.target_channel()) {
        return false;
    }
    match event {
        InboundEvent::Action(action) => action_matches(descriptor, action),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{action_matches, message_prefilter, non_message_matches};
    use crate::credential::BotToken;
    use crate::error::EmitError;
    use crate::event::{
        ActionEvent, EventKind, EventPayload, InboundEvent, MentionEvent, MessageEvent,
        ReactionEvent, ReactionItem,
    };
    use crate::subscription::{EmitSink, SubscriptionDescriptor, SubscriptionDescriptorBuilder};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopSink;

    #[async_trait]
    impl EmitSink for NoopSink {
        async fn emit(&self, _payload: EventPayload) -> Result<(), EmitError> {
            Ok(())
        }
    }

    fn builder() -> SubscriptionDescriptorBuilder {
        SubscriptionDescriptor::builder("node-1", BotToken::new("xoxb-1"), Arc::new(NoopSink))
    }

    fn message(channel: Option<&str>, subtype: Option<&str>) -> MessageEvent {
        MessageEvent {
            channel: channel.map(String::from),
            text: Some("hello".to_string()),
            subtype: subtype.map(String::from),
        }
    }

    #[test]
    fn bot_messages_and_edits_need_opt_in() {
        let strict = builder()
            .event_kind(EventKind::Message)
            .build()
            .expect("valid descriptor");
        let permissive = builder()
            .event_kind(EventKind::Message)
            .allow_bot_messages(true)
            .build()
            .expect("valid descriptor");

        for subtype in ["bot_message", "message_changed"] {
            assert!(!message_prefilter(&strict, &message(Some("C1"), Some(subtype))));
            assert!(message_prefilter(&permissive, &message(Some("C1"), Some(subtype))));
        }
        assert!(message_prefilter(&strict, &message(Some("C1"), Some("file_share"))));
    }

    #[test]
    fn message_without_channel_fails_non_empty_channel_filter() {
        let descriptor = builder()
            .event_kind(EventKind::Message)
            .watched_channels(["C1"])
            .build()
            .expect("valid descriptor");

        assert!(!message_prefilter(&descriptor, &message(None, None)));
        assert!(message_prefilter(&descriptor, &message(Some("C1"), None)));
    }

    #[test]
    fn reaction_filter_uses_item_channel() {
        let descriptor = builder()
            .event_kind(EventKind::ReactionAdded)
            .watched_channels(["C-item"])
            .build()
            .expect("valid descriptor");

        let on_item = InboundEvent::ReactionAdded(ReactionEvent {
            item: Some(ReactionItem {
                channel: Some("C-item".to_string()),
            }),
        });
        let without_item = InboundEvent::ReactionAdded(ReactionEvent { item: None });

        assert!(non_message_matches(&descriptor, &on_item));
        assert!(!non_message_matches(&descriptor, &without_item));
    }

    #[test]
    fn kind_membership_is_checked() {
        let descriptor = builder()
            .event_kind(EventKind::ReactionAdded)
            .build()
            .expect("valid descriptor");
        let mention = InboundEvent::AppMention(MentionEvent {
            channel: Some("C1".to_string()),
        });

        assert!(!non_message_matches(&descriptor, &mention));
    }

    #[test]
    fn action_filter_is_exact() {
        let filtered = builder()
            .event_kind(EventKind::Action)
            .action_id("button")
            .build()
            .expect("valid descriptor");
        let unfiltered = builder()
            .event_kind(EventKind::Action)
            .build()
            .expect("valid descriptor");

        let button = ActionEvent {
            channel: Some("C1".to_string()),
            action_type: Some("button".to_string()),
        };
        let select = ActionEvent {
            channel: Some("C1".to_string()),
            action_type: Some("Button".to_string()),
        };
        let untyped = ActionEvent {
            channel: Some("C1".to_string()),
            action_type: None,
        };

        assert!(action_matches(&filtered, &button));
        assert!(!action_matches(&filtered, &select));
        assert!(!action_matches(&filtered, &untyped));
        assert!(action_matches(&unfiltered, &untyped));
        assert!(non_message_matches(&filtered, &InboundEvent::Action(button)));
    }
}
