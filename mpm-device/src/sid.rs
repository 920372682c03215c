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

//! Stream identifiers used to address crossbar endpoints.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const SRC_ADDR_SHIFT: u32 = 24;
const SRC_ENDPOINT_SHIFT: u32 = 16;
const DST_ADDR_SHIFT: u32 = 8;
const DST_ENDPOINT_SHIFT: u32 = 0;

///
/// [`Sid`] is a 32-bit route address made of four 8-bit fields:
///
/// ```text
///  31      24 23      16 15       8 7        0
/// +----------+----------+----------+----------+
/// | src addr | src ep   | dst addr | dst ep   |
/// +----------+----------+----------+----------+
/// ```
///
/// The upper half identifies the sender, the lower half the receiver. A SID is both the
/// identity of a transport and the key the on-device crossbar routes on.
///
/// # Examples
///
/// ```
/// use mpm_device::Sid;
///
/// let sid = Sid::new(0x02, 0x00, 0x00, 0x01);
/// assert_eq!(sid.get(), 0x0200_0001);
/// assert_eq!(sid.reversed(), Sid::new(0x00, 0x01, 0x02, 0x00));
/// assert_eq!(sid.to_string(), "02:00>00:01");
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Sid(u32);

impl Sid {
    pub const fn new(src_addr: u8, src_endpoint: u8, dst_addr: u8, dst_endpoint: u8) -> Self {
        Self(
            (src_addr as u32) << SRC_ADDR_SHIFT
                | (src_endpoint as u32) << SRC_ENDPOINT_SHIFT
                | (dst_addr as u32) << DST_ADDR_SHIFT
                | (dst_endpoint as u32) << DST_ENDPOINT_SHIFT,
        )
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-bit value as carried on the wire.
    pub const fn get(&self) -> u32 {
        self.0
    }

    pub const fn src_addr(&self) -> u8 {
        (self.0 >> SRC_ADDR_SHIFT) as u8
    }

    pub const fn src_endpoint(&self) -> u8 {
        (self.0 >> SRC_ENDPOINT_SHIFT) as u8
    }

    pub const fn dst_addr(&self) -> u8 {
        (self.0 >> DST_ADDR_SHIFT) as u8
    }

    pub const fn dst_endpoint(&self) -> u8 {
        (self.0 >> DST_ENDPOINT_SHIFT) as u8
    }

    /// Upper 16 bits: source address and endpoint.
    pub const fn src(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Lower 16 bits: destination address and endpoint.
    pub const fn dst(&self) -> u16 {
        self.0 as u16
    }

    /// Returns a new SID with source and destination swapped.
    pub const fn reversed(&self) -> Self {
        Self(self.0.rotate_left(16))
    }
}

impl From<u32> for Sid {
    fn from(raw: u32) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Sid> for u32 {
    fn from(sid: Sid) -> Self {
        sid.get()
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}>{:02x}:{:02x}",
            self.src_addr(),
            self.src_endpoint(),
            self.dst_addr(),
            self.dst_endpoint()
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseSidError {
    input: String,
}

impl Display for ParseSidError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid SID: {:?}", self.input)
    }
}

impl Error for ParseSidError {}

impl FromStr for Sid {
    type Err = ParseSidError;

    /// Accepts the `SS:se>DD:de` form produced by [`Display`] or a hexadecimal raw value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let err = || ParseSidError {
            input: s.to_string(),
        };

        if let Some((src, dst)) = input.split_once('>') {
            let parse_half = |half: &str| -> Option<(u8, u8)> {
                let (addr, endpoint) = half.split_once(':')?;
                Some((
                    u8::from_str_radix(addr, 16).ok()?,
                    u8::from_str_radix(endpoint, 16).ok()?,
                ))
            };
            let (src_addr, src_endpoint) = parse_half(src).ok_or_else(err)?;
            let (dst_addr, dst_endpoint) = parse_half(dst).ok_or_else(err)?;
            return Ok(Self::new(src_addr, src_endpoint, dst_addr, dst_endpoint));
        }

        let digits = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input);
        u32::from_str_radix(digits, 16)
            .map(Self::from_raw)
            .map_err(|_| err())
    }
}
