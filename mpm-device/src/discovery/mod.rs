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

//! UDP broadcast discovery of MPM daemons.
//!
//! A discovery round sends [`MPM_DISCOVERY_CMD`] to the discovery port and collects the
//! reply burst until one receive times out. Every reply is a `;` separated record starting
//! with [`MPM_DISCOVERY_MAGIC`]; the remaining `key=value` fields form the device
//! descriptor.
//!
//! ```no_run
//! use mpm_device::{DeviceAddr, DiscoveryClient, DiscoveryConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = DiscoveryClient::new(DiscoveryConfig::default());
//! let hint: DeviceAddr = "addr=192.168.10.2".parse().unwrap();
//! for descriptor in client.discover(&hint).await.unwrap() {
//!     println!("found {descriptor}");
//! }
//! # });
//! ```

mod interfaces;
mod reply;

pub use interfaces::{InterfaceSource, NetInterface, StaticInterfaces, SystemInterfaces};
pub use reply::{MPM_DEVICE_TYPE, MPM_DISCOVERY_MAGIC};

use crate::config::DiscoveryConfig;
use crate::device_addr::{DeviceAddr, InvalidKeyError};
use crate::observability::{events, fields};
use async_trait::async_trait;
use reply::{classify_reply, ReplyVerdict};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Well-known UDP port MPM daemons listen on for discovery requests.
pub const MPM_DISCOVERY_PORT: u16 = 49600;
/// Discovery request payload, NUL terminated as the daemon expects it.
pub const MPM_DISCOVERY_CMD: &[u8] = b"MPM-DISC\0";

const COMPONENT: &str = "discovery";

/// Failures for hint resolution.
#[derive(Debug)]
pub enum DiscoveryError {
    InvalidHint(InvalidKeyError),
    /// A sub-hint of a composite hint matched more than one device.
    AmbiguousHint { hint: String, found: usize },
    Resolve { addr: String },
    Interfaces(io::Error),
    Io(io::Error),
}

impl Display for DiscoveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::InvalidHint(err) => write!(f, "invalid device hint: {err}"),
            DiscoveryError::AmbiguousHint { hint, found } => write!(
                f,
                "could not resolve device hint \"{hint}\" to a single device ({found} found)"
            ),
            DiscoveryError::Resolve { addr } => {
                write!(f, "unable to resolve {addr:?} to an IPv4 address")
            }
            DiscoveryError::Interfaces(err) => {
                write!(f, "unable to enumerate network interfaces: {err}")
            }
            DiscoveryError::Io(err) => write!(f, "discovery socket failed: {err}"),
        }
    }
}

impl Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DiscoveryError::InvalidHint(err) => Some(err),
            DiscoveryError::Interfaces(err) | DiscoveryError::Io(err) => Some(err),
            DiscoveryError::AmbiguousHint { .. } | DiscoveryError::Resolve { .. } => None,
        }
    }
}

impl From<io::Error> for DiscoveryError {
    fn from(err: io::Error) -> Self {
        DiscoveryError::Io(err)
    }
}

/// Receiving half of a discovery socket.
#[async_trait]
trait ReplySocket: Send + Sync {
    async fn recv_reply(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl ReplySocket for UdpSocket {
    async fn recv_reply(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buffer).await
    }
}

///
/// [`DiscoveryClient`] resolves device hints into device descriptors.
///
/// Sockets are opened per discovery round and never shared, so one client may serve
/// concurrent callers.
#[derive(Clone)]
pub struct DiscoveryClient {
    config: DiscoveryConfig,
    interfaces: Arc<dyn InterfaceSource>,
}

impl DiscoveryClient {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self::with_interfaces(config, Arc::new(SystemInterfaces))
    }

    pub fn with_interfaces(config: DiscoveryConfig, interfaces: Arc<dyn InterfaceSource>) -> Self {
        Self { config, interfaces }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Resolves `hint` into device descriptors.
    ///
    /// - composite hint: every sub-hint must match exactly one device and the matches are
    ///   combined into a single descriptor; any unmatched sub-hint yields an empty result
    /// - hint with `addr`: one discovery round aimed at that address
    /// - hint without `addr`: one round per local interface broadcast address
    ///
    /// Finding nothing is not an error.
    pub async fn discover(&self, hint: &DeviceAddr) -> Result<Vec<DeviceAddr>, DiscoveryError> {
        let hints = hint.separate().map_err(DiscoveryError::InvalidHint)?;

        if hints.len() > 1 {
            return self.discover_composite(&hints).await;
        }

        let hint = &hints[0];
        if let Some(addr) = hint.get("addr") {
            return self.discover_at(addr).await;
        }

        let interfaces = self
            .interfaces
            .interfaces()
            .map_err(DiscoveryError::Interfaces)?;
        let mut found = Vec::new();
        for interface in interfaces {
            let broadcast = interface.broadcast.to_string();
            match self.discover_at(&broadcast).await {
                Ok(descriptors) => found.extend(descriptors),
                Err(err) => warn!(
                    event = events::DISCOVERY_INTERFACE_FAILED,
                    component = COMPONENT,
                    addr = broadcast.as_str(),
                    err = %err,
                    "skipping interface"
                ),
            }
        }
        Ok(found)
    }

    async fn discover_composite(
        &self,
        hints: &[DeviceAddr],
    ) -> Result<Vec<DeviceAddr>, DiscoveryError> {
        let mut found = Vec::with_capacity(hints.len());
        for hint in hints {
            let Some(addr) = hint.get("addr") else {
                debug!(
                    event = events::DISCOVERY_HINT_UNRESOLVED,
                    component = COMPONENT,
                    hint = %hint,
                    "sub-hint has no addr"
                );
                return Ok(Vec::new());
            };

            let mut descriptors = self.discover_at(addr).await?;
            match descriptors.len() {
                0 => {
                    debug!(
                        event = events::DISCOVERY_HINT_UNRESOLVED,
                        component = COMPONENT,
                        hint = %hint,
                        "no device answered sub-hint"
                    );
                    return Ok(Vec::new());
                }
                1 => found.push(descriptors.remove(0)),
                count => {
                    warn!(
                        event = events::DISCOVERY_HINT_AMBIGUOUS,
                        component = COMPONENT,
                        hint = %hint,
                        found = count,
                        "sub-hint matched several devices"
                    );
                    return Err(DiscoveryError::AmbiguousHint {
                        hint: hint.to_string(),
                        found: count,
                    });
                }
            }
        }
        Ok(vec![DeviceAddr::combine(&found)])
    }

    /// Runs one discovery round aimed at `addr`.
    ///
    /// The request is sent with broadcast enabled, so `addr` may be a subnet broadcast
    /// address or a single host. Malformed, foreign and self-echo replies are dropped
    /// without ending the round.
    pub async fn discover_at(&self, addr: &str) -> Result<Vec<DeviceAddr>, DiscoveryError> {
        let target = self.resolve(addr).await?;
        let local_addrs: Vec<Ipv4Addr> = self
            .interfaces
            .interfaces()
            .map_err(DiscoveryError::Interfaces)?
            .into_iter()
            .map(|interface| interface.ip)
            .collect();

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        socket.send_to(MPM_DISCOVERY_CMD, target).await?;
        debug!(
            event = events::DISCOVERY_REQUEST_SENT,
            component = COMPONENT,
            addr = %target,
            "discovery request sent"
        );

        let descriptors = self.collect_replies(&socket, &local_addrs).await;

        info!(
            event = events::DISCOVERY_BURST_DONE,
            component = COMPONENT,
            addr = %target,
            found = descriptors.len(),
            "discovery round finished"
        );
        Ok(descriptors)
    }

    /// Reads one burst of replies until a receive times out, yields zero bytes or fails.
    async fn collect_replies(
        &self,
        socket: &dyn ReplySocket,
        local_addrs: &[Ipv4Addr],
    ) -> Vec<DeviceAddr> {
        let mut descriptors = Vec::new();
        let mut buffer = vec![0u8; self.config.max_reply_size];
        loop {
            let (len, source) =
                match timeout(self.config.reply_timeout(), socket.recv_reply(&mut buffer)).await {
                    Err(_elapsed) => break,
                    Ok(Ok(received)) => received,
                    Ok(Err(err)) => {
                        warn!(
                            event = events::DISCOVERY_RECV_FAILED,
                            component = COMPONENT,
                            found = descriptors.len(),
                            err = %err,
                            "receive failed; ending round"
                        );
                        break;
                    }
                };
            if len == 0 {
                break;
            }

            let payload = &buffer[..len];
            match classify_reply(payload, source.ip(), local_addrs) {
                ReplyVerdict::Accepted(descriptor) => {
                    debug!(
                        event = events::DISCOVERY_REPLY_ACCEPTED,
                        component = COMPONENT,
                        source = %source,
                        descriptor = %descriptor,
                        "device answered"
                    );
                    descriptors.push(descriptor);
                }
                ReplyVerdict::Foreign => debug!(
                    event = events::DISCOVERY_REPLY_FOREIGN,
                    component = COMPONENT,
                    source = %source,
                    reason = fields::REASON_MISSING_MAGIC,
                    "dropping reply"
                ),
                ReplyVerdict::SelfEcho => debug!(
                    event = events::DISCOVERY_REPLY_SELF_ECHO,
                    component = COMPONENT,
                    source = %source,
                    reason = fields::REASON_SELF_ECHO,
                    "dropping reply"
                ),
                ReplyVerdict::Malformed(malformed) => debug!(
                    event = events::DISCOVERY_REPLY_MALFORMED,
                    component = COMPONENT,
                    source = %source,
                    reply = fields::format_reply_preview(payload).as_str(),
                    err = %malformed,
                    "dropping reply"
                ),
            }
        }

        descriptors
    }

    async fn resolve(&self, addr: &str) -> Result<SocketAddr, DiscoveryError> {
        if let Ok(ip) = addr.parse::<Ipv4Addr>() {
            return Ok(SocketAddr::new(IpAddr::V4(ip), self.config.port));
        }

        tokio::net::lookup_host((addr, self.config.port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.find(SocketAddr::is_ipv4))
            .ok_or_else(|| DiscoveryError::Resolve {
                addr: addr.to_string(),
            })
    }
}
