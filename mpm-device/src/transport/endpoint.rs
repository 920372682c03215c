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

use crate::config::TransportConfig;
use crate::device_addr::DeviceAddr;
use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;

/// A bound local data endpoint, used for both directions of a transport.
#[async_trait]
pub trait DataEndpoint: Send + Sync + Debug {
    /// Port the device must address its traffic to.
    fn local_port(&self) -> u16;

    async fn send(&self, frame: &[u8]) -> io::Result<usize>;

    async fn recv(&self, frame: &mut [u8]) -> io::Result<usize>;
}

/// Frame geometry of a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameParams {
    pub send_frame_size: usize,
    pub recv_frame_size: usize,
    pub num_send_frames: usize,
    pub num_recv_frames: usize,
}

impl From<&TransportConfig> for FrameParams {
    fn from(config: &TransportConfig) -> Self {
        Self {
            send_frame_size: config.send_frame_size,
            recv_frame_size: config.recv_frame_size,
            num_send_frames: config.num_send_frames,
            num_recv_frames: config.num_recv_frames,
        }
    }
}

impl FrameParams {
    /// Applies `send_frame_size`, `recv_frame_size`, `num_send_frames` and
    /// `num_recv_frames` overrides from `args`.
    pub fn with_overrides(mut self, args: &DeviceAddr) -> io::Result<Self> {
        for (key, slot) in [
            ("send_frame_size", &mut self.send_frame_size),
            ("recv_frame_size", &mut self.recv_frame_size),
            ("num_send_frames", &mut self.num_send_frames),
            ("num_recv_frames", &mut self.num_recv_frames),
        ] {
            if let Some(value) = size_arg(args, key)? {
                *slot = value;
            }
        }
        Ok(self)
    }
}

/// Socket buffer sizes the kernel actually granted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferParams {
    pub recv_buff_size: usize,
    pub send_buff_size: usize,
}

#[derive(Clone, Debug)]
pub struct BoundEndpoint {
    pub endpoint: Arc<dyn DataEndpoint>,
    pub frames: FrameParams,
    pub buffers: BufferParams,
}

/// Creates the local endpoint of a transport towards a motherboard.
#[async_trait]
pub trait EndpointFactory: Send + Sync {
    async fn bind(
        &self,
        remote_addr: &str,
        remote_port: u16,
        defaults: FrameParams,
        args: &DeviceAddr,
    ) -> io::Result<BoundEndpoint>;
}

/// Reads a non-negative size from `args`; float notation such as `25e6` is accepted.
pub(crate) fn size_arg(args: &DeviceAddr, key: &str) -> io::Result<Option<usize>> {
    let Some(raw) = args.get(key) else {
        return Ok(None);
    };
    let invalid = || {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{key}={raw:?} is not a valid size"),
        )
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(Some(value as usize))
}
