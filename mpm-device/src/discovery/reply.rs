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

//! Parsing and filtering of discovery replies.

use crate::device_addr::DeviceAddr;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};

/// First field of every reply sent by an MPM daemon.
pub const MPM_DISCOVERY_MAGIC: &str = "USRP-MPM";
/// Device family tag given to every discovered descriptor unless the reply names one.
pub const MPM_DEVICE_TYPE: &str = "mpmd";

const FIELD_DELIMITER: u8 = b';';

/// A reply that carried the magic but could not be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum MalformedReply {
    NotText { field: usize },
    MissingKeyValueDelimiter { field: String },
    EmptyKey { field: String },
}

impl Display for MalformedReply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReply::NotText { field } => write!(f, "field {field} is not valid UTF-8"),
            MalformedReply::MissingKeyValueDelimiter { field } => {
                write!(f, "field {field:?} is not a key=value pair")
            }
            MalformedReply::EmptyKey { field } => write!(f, "field {field:?} has an empty key"),
        }
    }
}

/// Outcome of inspecting one datagram of a reply burst.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ReplyVerdict {
    Accepted(DeviceAddr),
    /// Some other protocol answered on the discovery port.
    Foreign,
    /// A daemon on this very host answering through one of its external interfaces.
    SelfEcho,
    Malformed(MalformedReply),
}

/// Parses the `key=value` fields following the magic.
///
/// Returns `Ok(None)` when the payload does not start with [`MPM_DISCOVERY_MAGIC`].
/// Payloads are treated as C strings: anything after the first NUL is ignored, and empty
/// fields are skipped.
pub(crate) fn parse_reply(payload: &[u8]) -> Result<Option<DeviceAddr>, MalformedReply> {
    let payload = payload
        .iter()
        .position(|byte| *byte == 0)
        .map_or(payload, |nul| &payload[..nul]);
    let mut fields = payload
        .split(|byte| *byte == FIELD_DELIMITER)
        .filter(|field| !field.is_empty());

    if fields.next() != Some(MPM_DISCOVERY_MAGIC.as_bytes()) {
        return Ok(None);
    }

    let mut descriptor = DeviceAddr::new();
    for (index, field) in fields.enumerate() {
        let field = std::str::from_utf8(field)
            .map_err(|_| MalformedReply::NotText { field: index + 1 })?;
        let (key, value) =
            field
                .split_once('=')
                .ok_or_else(|| MalformedReply::MissingKeyValueDelimiter {
                    field: field.to_string(),
                })?;
        if key.is_empty() {
            return Err(MalformedReply::EmptyKey {
                field: field.to_string(),
            });
        }
        descriptor.insert(key, value);
    }
    Ok(Some(descriptor))
}

/// A reply from one of our own non-loopback addresses means we are running on the device
/// itself; only its loopback answer is kept.
pub(crate) fn is_self_echo(source: IpAddr, local_addrs: &[Ipv4Addr]) -> bool {
    match source {
        IpAddr::V4(source) => !source.is_loopback() && local_addrs.contains(&source),
        IpAddr::V6(_) => false,
    }
}

/// Runs one datagram through parsing and filtering and builds the final descriptor.
///
/// Accepted descriptors always carry `addr` set to the reply's source address; `type`
/// defaults to [`MPM_DEVICE_TYPE`] when the reply does not provide one.
pub(crate) fn classify_reply(
    payload: &[u8],
    source: IpAddr,
    local_addrs: &[Ipv4Addr],
) -> ReplyVerdict {
    let mut descriptor = match parse_reply(payload) {
        Ok(Some(descriptor)) => descriptor,
        Ok(None) => return ReplyVerdict::Foreign,
        Err(malformed) => return ReplyVerdict::Malformed(malformed),
    };

    if is_self_echo(source, local_addrs) {
        return ReplyVerdict::SelfEcho;
    }

    descriptor.insert("addr", source.to_string());
    if !descriptor.has_key("type") {
        descriptor.insert("type", MPM_DEVICE_TYPE);
    }
    ReplyVerdict::Accepted(descriptor)
}
