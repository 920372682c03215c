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

//! Key/value device addresses: user hints and discovered device descriptors.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const PAIR_DELIMITER: char = ',';
const KEY_VALUE_DELIMITER: char = '=';
const ADDR_KEY: &str = "addr";

/// Upper bound on the motherboard index a `key<N>` may carry.
pub const MAX_MBOARDS: usize = 16;

/// A key in a composite hint that is neither `stem` nor `stem<N>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidKeyError {
    pub key: String,
}

impl Display for InvalidKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown key format: {:?}", self.key)
    }
}

impl Error for InvalidKeyError {}

///
/// [`DeviceAddr`] maps string keys to string values.
///
/// It is used both for user supplied hints (`"addr=192.168.10.2,type=mpmd"`) and for the
/// device descriptors produced by discovery. Keys with a numeric suffix address one
/// motherboard of a multi-motherboard device, see [`DeviceAddr::separate`].
///
/// # Examples
///
/// ```
/// use mpm_device::DeviceAddr;
///
/// let hint: DeviceAddr = "addr0=10.0.0.2, addr1=10.0.0.3, type=mpmd".parse().unwrap();
/// let mboards = hint.separate().unwrap();
///
/// assert_eq!(mboards.len(), 2);
/// assert_eq!(mboards[1].get("addr"), Some("10.0.0.3"));
/// assert_eq!(mboards[1].get("type"), Some("mpmd"));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceAddr {
    entries: BTreeMap<String, String>,
}

impl DeviceAddr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splits a composite address into one address per motherboard.
    ///
    /// `key<N>` lands in entry `N` as `key`; keys without a numeric suffix are copied into
    /// every entry. The result always holds at least one entry. A space separated `addr`
    /// list is first expanded into `addr0`, `addr1`, ...
    pub fn separate(&self) -> Result<Vec<DeviceAddr>, InvalidKeyError> {
        if let Some(addrs) = self.get(ADDR_KEY) {
            let addrs: Vec<&str> = addrs.split_whitespace().collect();
            if addrs.len() > 1 {
                let mut expanded = self.clone();
                expanded.remove(ADDR_KEY);
                for (index, addr) in addrs.iter().enumerate() {
                    expanded.insert(format!("{ADDR_KEY}{index}"), *addr);
                }
                return expanded.separate();
            }
        }

        let mut separated = vec![DeviceAddr::new()];
        let mut global_keys = Vec::new();
        for (key, value) in self.iter() {
            let (stem, index) = split_indexed_key(key)?;
            match index {
                None => global_keys.push((key, value)),
                Some(index) => {
                    if separated.len() <= index {
                        separated.resize_with(index + 1, DeviceAddr::new);
                    }
                    separated[index].insert(stem, value);
                }
            }
        }

        for addr in separated.iter_mut() {
            for (key, value) in &global_keys {
                addr.insert(*key, *value);
            }
        }
        Ok(separated)
    }

    /// Inverse of [`DeviceAddr::separate`]: every key of entry `N` becomes `key<N>`.
    pub fn combine(addrs: &[DeviceAddr]) -> DeviceAddr {
        let mut combined = DeviceAddr::new();
        for (index, addr) in addrs.iter().enumerate() {
            for (key, value) in addr.iter() {
                combined.insert(format!("{key}{index}"), value);
            }
        }
        combined
    }
}

/// Splits `stem<digits>` into its stem and index. Keys must match `^\D+\d*$` and the
/// index must stay below [`MAX_MBOARDS`].
fn split_indexed_key(key: &str) -> Result<(&str, Option<usize>), InvalidKeyError> {
    let invalid = || InvalidKeyError {
        key: key.to_string(),
    };

    let digits_start = key
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(pos, _)| pos)
        .unwrap_or(key.len());
    let (stem, digits) = key.split_at(digits_start);

    if stem.is_empty() || stem.chars().any(|ch| ch.is_ascii_digit()) {
        return Err(invalid());
    }
    if digits.is_empty() {
        return Ok((stem, None));
    }
    match digits.parse::<usize>() {
        Ok(index) if index < MAX_MBOARDS => Ok((stem, Some(index))),
        _ => Err(invalid()),
    }
}

impl FromStr for DeviceAddr {
    type Err = InvalidKeyError;

    /// Parses `key=value` pairs separated by commas. A bare key maps to an empty value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = DeviceAddr::new();
        for pair in s.split(PAIR_DELIMITER) {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once(KEY_VALUE_DELIMITER).unwrap_or((pair, ""));
            let key = key.trim();
            if key.is_empty() {
                return Err(InvalidKeyError {
                    key: pair.to_string(),
                });
            }
            addr.insert(key, value.trim());
        }
        Ok(addr)
    }
}

impl Display for DeviceAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, "{PAIR_DELIMITER}")?;
            }
            first = false;
            write!(f, "{key}{KEY_VALUE_DELIMITER}{value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceAddr {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut addr = DeviceAddr::new();
        for (key, value) in iter {
            addr.insert(key, value);
        }
        addr
    }
}
