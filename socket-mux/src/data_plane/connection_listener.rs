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

//! Handler adapter that feeds one event kind of a pooled connection into its router.

use crate::event::{EventEnvelope, EventKind};
use crate::observability::events;
use crate::routing::event_router::EventRouter;
use crate::transport::EventHandler;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "connection_listener";

pub(crate) struct ConnectionListener {
    kind: EventKind,
    router: Arc<EventRouter>,
}

impl ConnectionListener {
    pub(crate) fn new(kind: EventKind, router: Arc<EventRouter>) -> Self {
        Self { kind, router }
    }
}

#[async_trait]
impl EventHandler for ConnectionListener {
    async fn on_event(&self, envelope: EventEnvelope) {
        let bot = self.router.bot_token();

        debug!(
            event = events::LISTENER_RECEIVE,
            component = COMPONENT,
            bot = %bot,
            kind = %self.kind,
            "received socket event"
        );

        let report = self.router.route(self.kind, envelope).await;

        debug!(
            event = events::LISTENER_DISPATCH_DONE,
            component = COMPONENT,
            bot = %bot,
            kind = %self.kind,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "dispatched socket event"
        );
    }
}
