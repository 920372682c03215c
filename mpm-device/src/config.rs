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

//! Tunables for discovery, claim sessions and transports, loadable from JSON5.

use crate::discovery::MPM_DISCOVERY_PORT;
use crate::rpc::MPM_RPC_PORT;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

/// Crossbar port the daemon streams data to on the host side.
pub const MPM_DATA_PORT: u16 = 49153;
pub const DEFAULT_CLAIM_LABEL: &str = "mpm-device - Session 01";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "unable to read config file: {err}"),
            ConfigError::Parse(reason) => write!(f, "unable to parse config file: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(_) => None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct MpmConfig {
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
    pub transport: TransportConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DiscoveryConfig {
    pub port: u16,
    pub reply_timeout_ms: u64,
    pub max_reply_size: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub rpc_port: u16,
    pub claim_label: String,
    pub keepalive_interval_ms: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct TransportConfig {
    pub remote_data_port: u16,
    pub send_frame_size: usize,
    pub recv_frame_size: usize,
    pub num_send_frames: usize,
    pub num_recv_frames: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: MPM_DISCOVERY_PORT,
            reply_timeout_ms: 50,
            max_reply_size: 4096,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rpc_port: MPM_RPC_PORT,
            claim_label: DEFAULT_CLAIM_LABEL.to_string(),
            keepalive_interval_ms: 1000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            remote_data_port: MPM_DATA_PORT,
            send_frame_size: 8000,
            recv_frame_size: 8000,
            num_send_frames: 32,
            num_recv_frames: 32,
        }
    }
}

impl DiscoveryConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl SessionConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

impl MpmConfig {
    pub fn from_json5_str(contents: &str) -> Result<Self, ConfigError> {
        json5::from_str(contents).map_err(|e| ConfigError::Parse(format!("{e:?}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json5_str(&contents)
    }
}
