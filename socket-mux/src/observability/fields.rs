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

use crate::event::EventKind;
use std::collections::BTreeSet;

const NO_CHANNEL: &str = "<none>";

pub fn format_channel(channel: Option<&str>) -> &str {
    channel.unwrap_or(NO_CHANNEL)
}

pub fn format_kinds(kinds: &BTreeSet<EventKind>) -> String {
    kinds
        .iter()
        .map(EventKind::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
