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

//! One MPM device: a claim session per motherboard and transports on demand.

use crate::config::MpmConfig;
use crate::device_addr::{DeviceAddr, InvalidKeyError};
use crate::discovery::{DiscoveryClient, DiscoveryError};
use crate::observability::events;
use crate::rpc::RpcConnector;
use crate::session::{ClaimSession, SessionError};
use crate::transport::{
    BothXports, EndpointFactory, TransportError, TransportNegotiator, UdpEndpointFactory,
    XportRoute, XportType,
};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tracing::{error, info};

const COMPONENT: &str = "mpm_device";

/// Default receive buffer for data transports: half a second at full rate.
#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
pub const MPM_RX_SW_BUFF_SIZE_ETH: usize = 0x200_0000;
/// BSD kernels reject larger resizes.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub const MPM_RX_SW_BUFF_SIZE_ETH: usize = 0x10_0000;

pub const DEFAULT_MTU: usize = 1500;
/// 1 GbE in bytes per second.
pub const DEFAULT_LINK_MAX_RATE: u64 = 125_000_000;

#[derive(Debug)]
pub enum DeviceError {
    InvalidArgs(InvalidKeyError),
    MissingAddr { mb_index: usize },
    NoSuchMboard { index: usize, count: usize },
    Session { mb_index: usize, source: SessionError },
    Discovery(DiscoveryError),
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::InvalidArgs(err) => write!(f, "invalid device args: {err}"),
            DeviceError::MissingAddr { mb_index } => {
                write!(f, "motherboard {mb_index} has no addr")
            }
            DeviceError::NoSuchMboard { index, count } => {
                write!(f, "no motherboard {index} (device has {count})")
            }
            DeviceError::Session { mb_index, source } => {
                write!(f, "motherboard {mb_index}: {source}")
            }
            DeviceError::Discovery(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DeviceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeviceError::InvalidArgs(err) => Some(err),
            DeviceError::Session { source, .. } => Some(source),
            DeviceError::Discovery(err) => Some(err),
            DeviceError::MissingAddr { .. } | DeviceError::NoSuchMboard { .. } => None,
        }
    }
}

impl From<DiscoveryError> for DeviceError {
    fn from(err: DiscoveryError) -> Self {
        DeviceError::Discovery(err)
    }
}

/// Identity and link facts published for one motherboard.
#[derive(Clone, Debug, PartialEq)]
pub struct MboardInfo {
    pub name: String,
    pub serial: String,
    pub connection: String,
    pub mtu_recv: usize,
    pub mtu_send: usize,
    pub link_max_rate: u64,
}

impl MboardInfo {
    fn from_device_info(device_info: &DeviceAddr) -> Self {
        Self {
            name: device_info.get_or("type", "").to_string(),
            serial: device_info.get_or("serial", "").to_string(),
            connection: device_info.get_or("connection", "remote").to_string(),
            mtu_recv: DEFAULT_MTU,
            mtu_send: DEFAULT_MTU,
            link_max_rate: DEFAULT_LINK_MAX_RATE,
        }
    }
}

struct Mboard {
    session: Arc<ClaimSession>,
    info: MboardInfo,
    recv_args: DeviceAddr,
    send_args: DeviceAddr,
}

/// Splits the args of one motherboard into those mentioning `recv` and those mentioning
/// `send`. A key may land in both.
fn split_stream_args(args: &DeviceAddr) -> (DeviceAddr, DeviceAddr) {
    let recv_args = args.iter().filter(|(key, _)| key.contains("recv")).collect();
    let send_args = args.iter().filter(|(key, _)| key.contains("send")).collect();
    (recv_args, send_args)
}

async fn close_sessions(mboards: &[Mboard]) {
    for mboard in mboards {
        mboard.session.close().await;
    }
}

///
/// [`MpmDevice`] holds every motherboard of one device.
///
/// Composite device args (`addr0=..,addr1=..`) open one claim session per motherboard, in
/// index order. Transports are requested per motherboard through [`XportRoute::mb_index`].
pub struct MpmDevice {
    device_addr: DeviceAddr,
    mboards: Vec<Mboard>,
    negotiator: TransportNegotiator,
}

impl MpmDevice {
    /// Resolves `hint` into device descriptors with the configured discovery settings.
    pub async fn find(
        hint: &DeviceAddr,
        config: &MpmConfig,
    ) -> Result<Vec<DeviceAddr>, DeviceError> {
        let client = DiscoveryClient::new(config.discovery.clone());
        Ok(client.discover(hint).await?)
    }

    /// Opens the device described by `device_addr` with kernel UDP data endpoints.
    pub async fn open(
        device_addr: &DeviceAddr,
        config: &MpmConfig,
        connector: &dyn RpcConnector,
    ) -> Result<Self, DeviceError> {
        Self::open_with_factory(device_addr, config, connector, Arc::new(UdpEndpointFactory))
            .await
    }

    /// Opens the device, creating data endpoints through `factory`.
    ///
    /// If any motherboard fails to open, sessions already opened are closed again before
    /// the error is returned.
    pub async fn open_with_factory(
        device_addr: &DeviceAddr,
        config: &MpmConfig,
        connector: &dyn RpcConnector,
        factory: Arc<dyn EndpointFactory>,
    ) -> Result<Self, DeviceError> {
        info!(
            event = events::DEVICE_OPEN_START,
            component = COMPONENT,
            device_addr = %device_addr,
            "opening device"
        );
        let mboard_args = device_addr.separate().map_err(DeviceError::InvalidArgs)?;

        let mut mboards: Vec<Mboard> = Vec::with_capacity(mboard_args.len());
        for (mb_index, args) in mboard_args.iter().enumerate() {
            let opened = match args.get("addr") {
                Some(addr) => ClaimSession::open(connector, addr, &config.session)
                    .await
                    .map_err(|source| DeviceError::Session { mb_index, source }),
                None => Err(DeviceError::MissingAddr { mb_index }),
            };
            let session = match opened {
                Ok(session) => Arc::new(session),
                Err(err) => {
                    error!(
                        event = events::DEVICE_OPEN_FAILED,
                        component = COMPONENT,
                        mb_index,
                        opened = mboards.len(),
                        err = %err,
                        "rolling back opened motherboards"
                    );
                    close_sessions(&mboards).await;
                    return Err(err);
                }
            };

            let info = MboardInfo::from_device_info(session.device_info());
            let (recv_args, send_args) = split_stream_args(args);
            info!(
                event = events::DEVICE_MBOARD_READY,
                component = COMPONENT,
                mb_index,
                session_id = session.session_id(),
                name = info.name.as_str(),
                serial = info.serial.as_str(),
                connection = info.connection.as_str(),
                "motherboard ready"
            );
            mboards.push(Mboard {
                session,
                info,
                recv_args,
                send_args,
            });
        }

        let negotiator = TransportNegotiator::new(
            mboards.iter().map(|mboard| mboard.session.clone()).collect(),
            factory,
            config.transport.clone(),
        );

        Ok(Self {
            device_addr: device_addr.clone(),
            mboards,
            negotiator,
        })
    }

    pub fn device_addr(&self) -> &DeviceAddr {
        &self.device_addr
    }

    pub fn mboard_count(&self) -> usize {
        self.mboards.len()
    }

    fn mboard(&self, index: usize) -> Result<&Mboard, DeviceError> {
        self.mboards.get(index).ok_or(DeviceError::NoSuchMboard {
            index,
            count: self.mboards.len(),
        })
    }

    pub fn mboard_info(&self, index: usize) -> Result<&MboardInfo, DeviceError> {
        Ok(&self.mboard(index)?.info)
    }

    pub fn session(&self, index: usize) -> Result<&Arc<ClaimSession>, DeviceError> {
        Ok(&self.mboard(index)?.session)
    }

    /// Device args of motherboard `index` whose key mentions `recv`.
    pub fn recv_args(&self, index: usize) -> Result<&DeviceAddr, DeviceError> {
        Ok(&self.mboard(index)?.recv_args)
    }

    /// Device args of motherboard `index` whose key mentions `send`.
    pub fn send_args(&self, index: usize) -> Result<&DeviceAddr, DeviceError> {
        Ok(&self.mboard(index)?.send_args)
    }

    /// Args to pass when making an RX data transport on motherboard `index`.
    ///
    /// A user supplied `recv_buff_size` wins over [`MPM_RX_SW_BUFF_SIZE_ETH`].
    pub fn rx_hints(&self, index: usize) -> Result<DeviceAddr, DeviceError> {
        let mut hints = DeviceAddr::new();
        match self.mboard(index)?.recv_args.get("recv_buff_size") {
            Some(size) => hints.insert("recv_buff_size", size),
            None => hints.insert("recv_buff_size", MPM_RX_SW_BUFF_SIZE_ETH.to_string()),
        };
        Ok(hints)
    }

    pub async fn make_transport(
        &self,
        route: XportRoute,
        kind: XportType,
        args: &DeviceAddr,
    ) -> Result<BothXports, TransportError> {
        self.negotiator.make_transport(route, kind, args).await
    }

    /// Closes every claim session. The device cannot be used afterwards.
    pub async fn close(&self) {
        close_sessions(&self.mboards).await;
        info!(
            event = events::DEVICE_CLOSE,
            component = COMPONENT,
            device_addr = %self.device_addr,
            mboards = self.mboards.len(),
            "device closed"
        );
    }
}

impl Debug for MpmDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpmDevice")
            .field("device_addr", &self.device_addr)
            .field("mboards", &self.mboards.len())
            .finish_non_exhaustive()
    }
}
