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

//! Canonical `reason` values and field formatting helpers.

pub const REASON_MISSING_MAGIC: &str = "missing_magic";
pub const REASON_SELF_ECHO: &str = "self_echo";
pub const REASON_RECLAIM_DENIED: &str = "reclaim_denied";
pub const REASON_CONNECTION_LOST: &str = "connection_lost";
pub const REASON_SHUTDOWN: &str = "shutdown";

/// Longest reply excerpt carried in a log field.
pub const REPLY_PREVIEW_MAX_LEN: usize = 64;

/// Renders a reply payload for logs: lossy UTF-8, NULs stripped, truncated.
pub fn format_reply_preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim_end_matches('\0');
    if text.chars().count() <= REPLY_PREVIEW_MAX_LEN {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(REPLY_PREVIEW_MAX_LEN).collect();
        format!("{truncated}...")
    }
}
