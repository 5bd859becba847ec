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

//! Process-lifetime registry of subscription descriptors.

use crate::credential::BotToken;
use crate::event::EventKind;
use crate::observability::{events, fields};
use crate::subscription::{SubscriberId, SubscriptionDescriptor};
use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const COMPONENT: &str = "subscriber_registry";

type SubscriberSnapshot = HashMap<SubscriberId, Arc<SubscriptionDescriptor>>;

/// Mapping of subscriber identity to descriptor.
///
/// Readers load an immutable snapshot without locking, so routing never holds a
/// lock across emit calls. Writers are serialized and publish a new snapshot; an
/// event already dispatching against the previous snapshot may still reach a
/// subscriber that was just removed.
pub struct SubscriberRegistry {
    subscribers: ArcSwap<SubscriberSnapshot>,
    writer: Mutex<()>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Inserts `descriptor` unless its subscriber identity is already present.
    ///
    /// Returns whether an insert happened. Re-registration keeps the original
    /// descriptor untouched.
    pub fn register(&self, descriptor: SubscriptionDescriptor) -> bool {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.subscribers.load_full();
        if current.contains_key(descriptor.subscriber_id()) {
            debug!(
                event = events::REGISTRY_REGISTER_DUPLICATE,
                component = COMPONENT,
                subscriber = %descriptor.subscriber_id(),
                "subscriber already registered, keeping existing descriptor"
            );
            return false;
        }

        info!(
            event = events::REGISTRY_REGISTER,
            component = COMPONENT,
            subscriber = %descriptor.subscriber_id(),
            flow = descriptor.flow_id().unwrap_or_default(),
            bot = %descriptor.bot_token(),
            kinds = %fields::format_kinds(descriptor.event_kinds()),
            "registered subscriber"
        );

        let mut next = SubscriberSnapshot::clone(&current);
        next.insert(descriptor.subscriber_id().clone(), Arc::new(descriptor));
        self.subscribers.store(Arc::new(next));
        true
    }

    /// Removes the descriptor for `subscriber_id`. Absence is not an error.
    pub fn unregister(&self, subscriber_id: &SubscriberId) -> Option<Arc<SubscriptionDescriptor>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.subscribers.load_full();
        if !current.contains_key(subscriber_id) {
            debug!(
                event = events::REGISTRY_UNREGISTER_MISSING,
                component = COMPONENT,
                subscriber = %subscriber_id,
                "no such subscriber to unregister"
            );
            return None;
        }

        let mut next = SubscriberSnapshot::clone(&current);
        let removed = next.remove(subscriber_id);
        self.subscribers.store(Arc::new(next));

        info!(
            event = events::REGISTRY_UNREGISTER,
            component = COMPONENT,
            subscriber = %subscriber_id,
            "unregistered subscriber"
        );
        removed
    }

    pub fn contains(&self, subscriber_id: &SubscriberId) -> bool {
        self.subscribers.load().contains_key(subscriber_id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.load().is_empty()
    }

    pub fn list_all(&self) -> Vec<Arc<SubscriptionDescriptor>> {
        self.subscribers.load().values().cloned().collect()
    }

    pub fn list_by_bot_token(&self, bot_token: &BotToken) -> Vec<Arc<SubscriptionDescriptor>> {
        self.subscribers
            .load()
            .values()
            .filter(|descriptor| descriptor.bot_token() == bot_token)
            .cloned()
            .collect()
    }

    /// Descriptors on `bot_token` that selected `kind`.
    pub(crate) fn subscribers_for(
        &self,
        bot_token: &BotToken,
        kind: EventKind,
    ) -> Vec<Arc<SubscriptionDescriptor>> {
        self.subscribers
            .load()
            .values()
            .filter(|descriptor| {
                descriptor.bot_token() == bot_token && descriptor.subscribes_to(kind)
            })
            .cloned()
            .collect()
    }

    /// Bot tokens referenced by at least one live descriptor.
    pub fn active_bot_tokens(&self) -> HashSet<BotToken> {
        self.subscribers
            .load()
            .values()
            .map(|descriptor| descriptor.bot_token().clone())
            .collect()
    }
}
