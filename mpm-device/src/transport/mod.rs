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

//! Transport negotiation: a local endpoint plus a crossbar SID pair per request.

mod endpoint;
mod udp;

pub use endpoint::{BoundEndpoint, BufferParams, DataEndpoint, EndpointFactory, FrameParams};
pub use udp::{UdpDataEndpoint, UdpEndpointFactory};

use crate::config::TransportConfig;
use crate::device_addr::DeviceAddr;
use crate::observability::events;
use crate::session::{ClaimSession, SessionError};
use crate::sid::Sid;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "transport_negotiator";

/// Crossbar source port stamped on every allocation request.
const XBAR_SRC_PORT: u32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XportType {
    Ctrl,
    AsyncMsg,
    TxData,
    RxData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Wire byte order of every MPM transport, independent of the host.
pub const MPM_WIRE_ENDIANNESS: Endianness = Endianness::Big;

/// Target of a transport request: which motherboard and which crossbar address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XportRoute {
    pub mb_index: usize,
    pub address: Sid,
}

impl XportRoute {
    pub fn new(mb_index: usize, address: Sid) -> Self {
        Self { mb_index, address }
    }
}

/// A negotiated bidirectional transport. `send` and `recv` are the same endpoint.
#[derive(Clone, Debug)]
pub struct BothXports {
    pub send_sid: Sid,
    pub recv_sid: Sid,
    pub endianness: Endianness,
    pub recv_buff_size: usize,
    pub send_buff_size: usize,
    pub frames: FrameParams,
    pub recv: Arc<dyn DataEndpoint>,
    pub send: Arc<dyn DataEndpoint>,
}

#[derive(Debug)]
pub enum TransportError {
    NoSuchMboard { index: usize, count: usize },
    Bind(io::Error),
    Session(SessionError),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NoSuchMboard { index, count } => {
                write!(f, "no motherboard {index} (device has {count})")
            }
            TransportError::Bind(err) => write!(f, "unable to bind local endpoint: {err}"),
            TransportError::Session(err) => write!(f, "sid allocation failed: {err}"),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::NoSuchMboard { .. } => None,
            TransportError::Bind(err) => Some(err),
            TransportError::Session(err) => Some(err),
        }
    }
}

///
/// [`TransportNegotiator`] turns a route into a ready transport.
///
/// The owning session is picked by the route's motherboard index. The local endpoint is
/// bound first so its port can be handed to the crossbar, then the allocated SID becomes
/// the send SID and its reverse the receive SID.
pub struct TransportNegotiator {
    sessions: Vec<Arc<ClaimSession>>,
    factory: Arc<dyn EndpointFactory>,
    config: TransportConfig,
}

impl TransportNegotiator {
    pub fn new(
        sessions: Vec<Arc<ClaimSession>>,
        factory: Arc<dyn EndpointFactory>,
        config: TransportConfig,
    ) -> Self {
        Self {
            sessions,
            factory,
            config,
        }
    }

    pub fn mboard_count(&self) -> usize {
        self.sessions.len()
    }

    /// Control transports ignore `args`; their buffers are never tuned.
    pub async fn make_transport(
        &self,
        route: XportRoute,
        kind: XportType,
        args: &DeviceAddr,
    ) -> Result<BothXports, TransportError> {
        let session =
            self.sessions
                .get(route.mb_index)
                .ok_or(TransportError::NoSuchMboard {
                    index: route.mb_index,
                    count: self.sessions.len(),
                })?;

        let empty = DeviceAddr::new();
        let xport_args = match kind {
            XportType::Ctrl => &empty,
            _ => args,
        };

        let bound = self
            .factory
            .bind(
                session.addr(),
                self.config.remote_data_port,
                FrameParams::from(&self.config),
                xport_args,
            )
            .await
            .map_err(|err| {
                warn!(
                    event = events::XPORT_NEGOTIATION_FAILED,
                    component = COMPONENT,
                    session_id = session.session_id(),
                    route = %route.address,
                    err = %err,
                    "unable to bind local endpoint"
                );
                TransportError::Bind(err)
            })?;
        let local_port = bound.endpoint.local_port();

        let send_sid = session
            .allocate_sid(
                local_port,
                route.address,
                u32::from(route.address.src_addr()),
                XBAR_SRC_PORT,
            )
            .await
            .map_err(|err| {
                warn!(
                    event = events::XPORT_NEGOTIATION_FAILED,
                    component = COMPONENT,
                    session_id = session.session_id(),
                    route = %route.address,
                    local_port,
                    err = %err,
                    "crossbar refused the route"
                );
                TransportError::Session(err)
            })?;
        let recv_sid = send_sid.reversed();

        debug!(
            event = events::XPORT_READY,
            component = COMPONENT,
            session_id = session.session_id(),
            kind = ?kind,
            local_port,
            send_sid = %send_sid,
            recv_sid = %recv_sid,
            "transport ready"
        );

        Ok(BothXports {
            send_sid,
            recv_sid,
            endianness: MPM_WIRE_ENDIANNESS,
            recv_buff_size: bound.buffers.recv_buff_size,
            send_buff_size: bound.buffers.send_buff_size,
            frames: bound.frames,
            recv: bound.endpoint.clone(),
            send: bound.endpoint,
        })
    }
}
