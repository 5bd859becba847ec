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

//! Routing layer.
//!
//! Turns one inbound event into the set of subscribers that should receive it:
//! decode, select descriptors for the connection and kind, run the ordered filter
//! pipeline, then fan out with per-subscriber failure isolation.

pub(crate) mod event_router;
pub(crate) mod filters;
pub(crate) mod pattern_cache;
