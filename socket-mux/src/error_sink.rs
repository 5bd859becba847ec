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

use crate::error::MuxError;
use crate::observability::events;
use tracing::error;

const COMPONENT: &str = "error_sink";

/// Destination for failures that are isolated rather than returned: invalid
/// patterns, sink failures, undecodable events and connection start/stop errors.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str, error: &MuxError);
}

/// Default sink: one `tracing` error event per report.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, message: &str, err: &MuxError) {
        error!(
            event = events::ERROR_REPORTED,
            component = COMPONENT,
            err = %err,
            "{message}"
        );
    }
}
