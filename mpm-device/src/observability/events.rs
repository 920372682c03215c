/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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

//! Canonical structured event names used across `mpm-device`.

// Discovery events.
pub const DISCOVERY_REQUEST_SENT: &str = "discovery_request_sent";
pub const DISCOVERY_REPLY_ACCEPTED: &str = "discovery_reply_accepted";
pub const DISCOVERY_REPLY_FOREIGN: &str = "discovery_reply_foreign";
pub const DISCOVERY_REPLY_SELF_ECHO: &str = "discovery_reply_self_echo";
pub const DISCOVERY_REPLY_MALFORMED: &str = "discovery_reply_malformed";
pub const DISCOVERY_BURST_DONE: &str = "discovery_burst_done";
pub const DISCOVERY_RECV_FAILED: &str = "discovery_recv_failed";
pub const DISCOVERY_INTERFACE_FAILED: &str = "discovery_interface_failed";
pub const DISCOVERY_HINT_AMBIGUOUS: &str = "discovery_hint_ambiguous";
pub const DISCOVERY_HINT_UNRESOLVED: &str = "discovery_hint_unresolved";

// Claim session lifecycle events.
pub const SESSION_CONNECT_START: &str = "session_connect_start";
pub const SESSION_CONNECT_FAILED: &str = "session_connect_failed";
pub const SESSION_CLAIM_OK: &str = "session_claim_ok";
pub const SESSION_CLAIM_DENIED: &str = "session_claim_denied";
pub const SESSION_CALL_REJECTED: &str = "session_call_rejected";
pub const SESSION_CLOSE: &str = "session_close";

// Keepalive events.
pub const KEEPALIVE_START: &str = "keepalive_start";
pub const KEEPALIVE_RECLAIM_OK: &str = "keepalive_reclaim_ok";
pub const KEEPALIVE_FAILED: &str = "keepalive_failed";
pub const KEEPALIVE_STOPPED: &str = "keepalive_stopped";

// Transport negotiation events.
pub const XPORT_ENDPOINT_BOUND: &str = "xport_endpoint_bound";
pub const XPORT_SID_ALLOCATED: &str = "xport_sid_allocated";
pub const XPORT_READY: &str = "xport_ready";
pub const XPORT_NEGOTIATION_FAILED: &str = "xport_negotiation_failed";
pub const XPORT_BUFFER_RESIZE_FAILED: &str = "xport_buffer_resize_failed";

// Device orchestration events.
pub const DEVICE_OPEN_START: &str = "device_open_start";
pub const DEVICE_OPEN_FAILED: &str = "device_open_failed";
pub const DEVICE_MBOARD_READY: &str = "device_mboard_ready";
pub const DEVICE_CLOSE: &str = "device_close";
pub const REGISTRY_FAMILY_REGISTERED: &str = "registry_family_registered";
pub const REGISTRY_FIND_FAILED: &str = "registry_find_failed";
