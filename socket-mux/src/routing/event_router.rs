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

//! Per-connection event router: filter pipeline plus isolated fan-out.

use crate::control_plane::subscriber_registry::SubscriberRegistry;
use crate::credential::BotToken;
use crate::error::{EmitError, MuxError};
use crate::error_sink::ErrorSink;
use crate::event::{EventEnvelope, EventKind, EventPayload, InboundEvent, MessageEvent};
use crate::observability::{events, fields};
use crate::routing::filters::{message_prefilter, non_message_matches};
use crate::routing::pattern_cache::PatternCache;
use crate::subscription::{SubscriberId, SubscriptionDescriptor};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "event_router";

/// Subscribers without a message filter share this group key.
const NO_PATTERN: &str = "";

/// Outcome of routing one event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<SubscriberId>,
    pub failed: Vec<SubscriberId>,
}

impl DispatchReport {
    pub fn recipients(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Routes events arriving on the connection for one bot token.
///
/// Holds no subscriber state: every event re-reads a registry snapshot.
pub struct EventRouter {
    bot_token: BotToken,
    registry: Arc<SubscriberRegistry>,
    patterns: Arc<PatternCache>,
    error_sink: Arc<dyn ErrorSink>,
}

impl EventRouter {
    pub fn new(
        bot_token: BotToken,
        registry: Arc<SubscriberRegistry>,
        patterns: Arc<PatternCache>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            bot_token,
            registry,
            patterns,
            error_sink,
        }
    }

    pub fn bot_token(&self) -> &BotToken {
        &self.bot_token
    }

    /// Delivers one event to every matching subscriber on this connection.
    ///
    /// Never fails: undecodable events and sink failures go to the error sink and
    /// only affect the event or subscriber concerned.
    pub async fn route(&self, kind: EventKind, envelope: EventEnvelope) -> DispatchReport {
        let event = match InboundEvent::decode(kind, &envelope) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    event = events::ROUTER_DECODE_FAILED,
                    component = COMPONENT,
                    bot = %self.bot_token,
                    kind = %kind,
                    "dropping undecodable event"
                );
                self.error_sink
                    .report(&format!("Error handling Slack {kind} event"), &err);
                return DispatchReport::default();
            }
        };

        let candidates = self.registry.subscribers_for(&self.bot_token, kind);
        if candidates.is_empty() {
            return DispatchReport::default();
        }

        let recipients = match &event {
            InboundEvent::Message(message) => self.select_message_recipients(message, &candidates),
            other => candidates
                .iter()
                .filter(|descriptor| non_message_matches(descriptor, other))
                .collect(),
        };

        debug!(
            component = COMPONENT,
            bot = %self.bot_token,
            kind = %kind,
            channel = fields::format_channel(event.target_channel()),
            candidates = candidates.len(),
            recipients = recipients.len(),
            "filtered subscribers"
        );

        self.fan_out(EventPayload::new(kind, envelope), recipients)
            .await
    }

    /// Message pipeline with subscribers grouped by exact pattern, so each distinct
    /// pattern is evaluated at most once per event and only if some member of its
    /// group passed the cheaper per-subscriber stages.
    fn select_message_recipients<'a>(
        &self,
        message: &MessageEvent,
        candidates: &'a [Arc<SubscriptionDescriptor>],
    ) -> Vec<&'a Arc<SubscriptionDescriptor>> {
        let mut groups: BTreeMap<&str, Vec<&'a Arc<SubscriptionDescriptor>>> = BTreeMap::new();
        for descriptor in candidates {
            groups
                .entry(descriptor.message_filter().unwrap_or(NO_PATTERN))
                .or_default()
                .push(descriptor);
        }

        let text = message.text.as_deref().unwrap_or_default();
        let mut recipients = Vec::new();

        for (pattern, members) in groups {
            let mut pattern_matched: Option<bool> = None;

            for descriptor in members {
                if !message_prefilter(descriptor, message) {
                    continue;
                }
                if pattern != NO_PATTERN {
                    let matched = *pattern_matched
                        .get_or_insert_with(|| self.patterns.is_match(pattern, text));
                    if !matched {
                        continue;
                    }
                }
                recipients.push(descriptor);
            }
        }
        recipients
    }

    async fn fan_out(
        &self,
        payload: EventPayload,
        recipients: Vec<&Arc<SubscriptionDescriptor>>,
    ) -> DispatchReport {
        let kind = payload.kind();
        let mut report = DispatchReport::default();

        for descriptor in recipients {
            let subscriber = descriptor.subscriber_id();
            // `emit` itself runs inside the guard: a sink may panic before returning
            // its future.
            let sink = descriptor.sink();
            let outcome = AssertUnwindSafe(async { sink.emit(payload.clone()).await })
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(panic) => Some(EmitError::new(panic_reason(panic.as_ref()))),
            };

            match failure {
                None => {
                    debug!(
                        event = events::ROUTER_DELIVER_OK,
                        component = COMPONENT,
                        subscriber = %subscriber,
                        kind = %kind,
                        "delivered event"
                    );
                    report.delivered.push(subscriber.clone());
                }
                Some(source) => {
                    warn!(
                        event = events::ROUTER_DELIVER_FAILED,
                        component = COMPONENT,
                        subscriber = %subscriber,
                        kind = %kind,
                        "subscriber sink failed, continuing fan-out"
                    );
                    self.error_sink.report(
                        &format!("Error emitting {kind} event to subscriber"),
                        &MuxError::Emit {
                            subscriber: subscriber.clone(),
                            kind,
                            source,
                        },
                    );
                    report.failed.push(subscriber.clone());
                }
            }
        }
        report
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        format!("sink panicked: {reason}")
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        format!("sink panicked: {reason}")
    } else {
        "sink panicked".to_string()
    }
}
