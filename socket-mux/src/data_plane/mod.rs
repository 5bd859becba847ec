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

//! Data-plane layer.
//!
//! Owns the pooled upstream connections, at most one per bot token, and the
//! listeners attached to them. Every listener on a connection feeds the same
//! [`crate::EventRouter`], so subscribers added after a connection started are
//! seen by the very next event without touching the connection.

pub(crate) mod connection_listener;
pub(crate) mod connection_pool;
