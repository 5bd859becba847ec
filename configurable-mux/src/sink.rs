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

//! Emit sink that writes every delivered payload as one JSON line.

use async_trait::async_trait;
use serde::Serialize;
use socket_mux::{EmitError, EmitSink, EventPayload, SubscriberId};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) type SharedWriter = Arc<Mutex<dyn Write + Send>>;

#[derive(Serialize)]
struct EmittedLine<'a> {
    subscriber: &'a SubscriberId,
    #[serde(skip_serializing_if = "Option::is_none")]
    flow: Option<&'a str>,
    payload: &'a EventPayload,
}

pub(crate) struct JsonLineSink {
    subscriber: SubscriberId,
    flow: Option<String>,
    out: SharedWriter,
}

impl JsonLineSink {
    pub(crate) fn new(subscriber: SubscriberId, flow: Option<String>, out: SharedWriter) -> Self {
        Self {
            subscriber,
            flow,
            out,
        }
    }
}

#[async_trait]
impl EmitSink for JsonLineSink {
    async fn emit(&self, payload: EventPayload) -> Result<(), EmitError> {
        let line = serde_json::to_string(&EmittedLine {
            subscriber: &self.subscriber,
            flow: self.flow.as_deref(),
            payload: &payload,
        })
        .map_err(|err| EmitError::new(format!("unable to encode payload: {err}")))?;

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")
            .and_then(|_| out.flush())
            .map_err(|err| EmitError::new(format!("unable to write payload: {err}")))
    }
}
