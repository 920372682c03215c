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

//! Kernel UDP sockets as transport endpoints.

use super::endpoint::{
    size_arg, BoundEndpoint, BufferParams, DataEndpoint, EndpointFactory, FrameParams,
};
use crate::device_addr::DeviceAddr;
use crate::observability::events;
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const COMPONENT: &str = "udp_endpoint";

/// UDP socket connected to one motherboard data port.
#[derive(Debug)]
pub struct UdpDataEndpoint {
    socket: UdpSocket,
    local_port: u16,
}

#[async_trait]
impl DataEndpoint for UdpDataEndpoint {
    fn local_port(&self) -> u16 {
        self.local_port
    }

    async fn send(&self, frame: &[u8]) -> io::Result<usize> {
        self.socket.send(frame).await
    }

    async fn recv(&self, frame: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(frame).await
    }
}

/// Binds an ephemeral local UDP port per transport.
///
/// `recv_buff_size` and `send_buff_size` args request kernel buffer sizes; without them the
/// buffers are sized to hold every frame. The kernel may grant less, and the granted size
/// is what gets reported.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpEndpointFactory;

#[async_trait]
impl EndpointFactory for UdpEndpointFactory {
    async fn bind(
        &self,
        remote_addr: &str,
        remote_port: u16,
        defaults: FrameParams,
        args: &DeviceAddr,
    ) -> io::Result<BoundEndpoint> {
        let frames = defaults.with_overrides(args)?;
        let remote = resolve_ipv4(remote_addr, remote_port).await?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        let recv_request = size_arg(args, Buffer::Recv.arg())?
            .unwrap_or(frames.num_recv_frames * frames.recv_frame_size);
        let send_request = size_arg(args, Buffer::Send.arg())?
            .unwrap_or(frames.num_send_frames * frames.send_frame_size);
        let buffers = BufferParams {
            recv_buff_size: resize_buffer(&socket, Buffer::Recv, recv_request)?,
            send_buff_size: resize_buffer(&socket, Buffer::Send, send_request)?,
        };

        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        socket.connect(&remote.into())?;
        let socket = UdpSocket::from_std(socket.into())?;
        let local_port = socket.local_addr()?.port();

        debug!(
            event = events::XPORT_ENDPOINT_BOUND,
            component = COMPONENT,
            local_port,
            remote = %remote,
            recv_buff_size = buffers.recv_buff_size,
            send_buff_size = buffers.send_buff_size,
            "data endpoint bound"
        );

        Ok(BoundEndpoint {
            endpoint: Arc::new(UdpDataEndpoint { socket, local_port }),
            frames,
            buffers,
        })
    }
}

#[derive(Clone, Copy)]
enum Buffer {
    Recv,
    Send,
}

impl Buffer {
    fn arg(self) -> &'static str {
        match self {
            Buffer::Recv => "recv_buff_size",
            Buffer::Send => "send_buff_size",
        }
    }
}

/// Requests `requested` bytes and returns what the kernel granted.
fn resize_buffer(socket: &Socket, buffer: Buffer, requested: usize) -> io::Result<usize> {
    let result = match buffer {
        Buffer::Recv => socket.set_recv_buffer_size(requested),
        Buffer::Send => socket.set_send_buffer_size(requested),
    };
    if let Err(err) = result {
        warn!(
            event = events::XPORT_BUFFER_RESIZE_FAILED,
            component = COMPONENT,
            buffer = buffer.arg(),
            requested,
            err = %err,
            "keeping kernel default buffer size"
        );
    }

    let granted = match buffer {
        Buffer::Recv => socket.recv_buffer_size()?,
        Buffer::Send => socket.send_buffer_size()?,
    };
    if granted < requested {
        warn!(
            event = events::XPORT_BUFFER_RESIZE_FAILED,
            component = COMPONENT,
            buffer = buffer.arg(),
            requested,
            granted,
            "kernel granted a smaller buffer than requested"
        );
    }
    Ok(granted)
}

async fn resolve_ipv4(addr: &str, port: u16) -> io::Result<SocketAddr> {
    if let Ok(ip) = addr.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::from((ip, port)));
    }
    tokio::net::lookup_host((addr, port))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{addr} has no IPv4 address"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::UdpEndpointFactory;
    use crate::config::TransportConfig;
    use crate::device_addr::DeviceAddr;
    use crate::transport::{EndpointFactory, FrameParams};
    use std::io;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn binds_ephemeral_port_connected_to_remote() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_port = device.local_addr().unwrap().port();

        let bound = UdpEndpointFactory
            .bind(
                "127.0.0.1",
                device_port,
                FrameParams::from(&TransportConfig::default()),
                &DeviceAddr::new(),
            )
            .await
            .unwrap();
        bound.endpoint.send(b"frame").await.unwrap();

        let mut buffer = [0u8; 16];
        let (len, from) = device.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..len], b"frame");
        assert_eq!(from.port(), bound.endpoint.local_port());
        assert_ne!(bound.endpoint.local_port(), 0);
        assert!(bound.buffers.recv_buff_size > 0);
        assert!(bound.buffers.send_buff_size > 0);
    }

    #[tokio::test]
    async fn two_endpoints_get_distinct_ports() {
        let frames = FrameParams::from(&TransportConfig::default());
        let args = DeviceAddr::new();

        let first = UdpEndpointFactory
            .bind("127.0.0.1", 49153, frames, &args)
            .await
            .unwrap();
        let second = UdpEndpointFactory
            .bind("127.0.0.1", 49153, frames, &args)
            .await
            .unwrap();

        assert_ne!(
            first.endpoint.local_port(),
            second.endpoint.local_port()
        );
    }

    #[tokio::test]
    async fn frame_overrides_are_reported() {
        let args: DeviceAddr = "recv_frame_size=1472".parse().unwrap();

        let bound = UdpEndpointFactory
            .bind(
                "127.0.0.1",
                49153,
                FrameParams::from(&TransportConfig::default()),
                &args,
            )
            .await
            .unwrap();

        assert_eq!(bound.frames.recv_frame_size, 1472);
    }

    #[tokio::test]
    async fn invalid_buffer_arg_is_rejected() {
        let args: DeviceAddr = "recv_buff_size=huge".parse().unwrap();

        let err = UdpEndpointFactory
            .bind(
                "127.0.0.1",
                49153,
                FrameParams::from(&TransportConfig::default()),
                &args,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
