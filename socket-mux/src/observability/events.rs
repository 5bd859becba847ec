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

pub const CREDENTIAL_UNEXPECTED_PREFIX: &str = "credential_unexpected_prefix";

pub const ERROR_REPORTED: &str = "error_reported";

pub const REGISTRY_REGISTER: &str = "registry_register";
pub const REGISTRY_REGISTER_DUPLICATE: &str = "registry_register_duplicate";
pub const REGISTRY_UNREGISTER: &str = "registry_unregister";
pub const REGISTRY_UNREGISTER_MISSING: &str = "registry_unregister_missing";

pub const PATTERN_COMPILE: &str = "pattern_compile";
pub const PATTERN_COMPILE_FAILED: &str = "pattern_compile_failed";

pub const POOL_CONNECTION_REUSE: &str = "pool_connection_reuse";
pub const POOL_CONNECTION_START: &str = "pool_connection_start";
pub const POOL_CONNECTION_START_OK: &str = "pool_connection_start_ok";
pub const POOL_CONNECTION_START_FAILED: &str = "pool_connection_start_failed";
pub const POOL_CONNECTION_STOP: &str = "pool_connection_stop";
pub const POOL_CONNECTION_STOP_FAILED: &str = "pool_connection_stop_failed";
pub const POOL_CONNECTION_STOP_MISSING: &str = "pool_connection_stop_missing";
pub const POOL_RECONCILE: &str = "pool_reconcile";

pub const LISTENER_RECEIVE: &str = "listener_receive";
pub const LISTENER_DISPATCH_DONE: &str = "listener_dispatch_done";

pub const ROUTER_DECODE_FAILED: &str = "router_decode_failed";
pub const ROUTER_DELIVER_OK: &str = "router_deliver_ok";
pub const ROUTER_DELIVER_FAILED: &str = "router_deliver_failed";

pub const ACTIVATION_REGISTER: &str = "activation_register";
pub const ACTIVATION_ROLLBACK: &str = "activation_rollback";
pub const DEACTIVATION: &str = "deactivation";

pub const CHANNEL_LIST_FAILED: &str = "channel_list_failed";
