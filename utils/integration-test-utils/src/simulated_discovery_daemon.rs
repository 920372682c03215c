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

use mpm_device::discovery::MPM_DISCOVERY_CMD;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::debug;

/// A UDP responder that answers every discovery request with a scripted reply burst.
///
/// Requests other than the discovery command are ignored. The responder stops when
/// dropped.
pub struct SimulatedDiscoveryDaemon {
    local_addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl SimulatedDiscoveryDaemon {
    /// Listens on `ip:port`; port `0` picks a free one.
    pub async fn start(ip: Ipv4Addr, port: u16, replies: Vec<Vec<u8>>) -> io::Result<Self> {
        let socket = UdpSocket::bind((ip, port)).await?;
        let local_addr = socket.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let received = requests.clone();
        let task = tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            loop {
                let Ok((len, source)) = socket.recv_from(&mut buffer).await else {
                    return;
                };
                if !buffer[..len].starts_with(MPM_DISCOVERY_CMD) {
                    continue;
                }
                received
                    .lock()
                    .expect("request log poisoned")
                    .push(buffer[..len].to_vec());
                debug!(%local_addr, %source, "answering discovery request");
                for reply in &replies {
                    if socket.send_to(reply, source).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            requests,
            task,
        })
    }

    /// Same as [`start`](Self::start) on `127.0.0.1` with a free port.
    pub async fn start_local(replies: &[&[u8]]) -> io::Result<Self> {
        Self::start(
            Ipv4Addr::LOCALHOST,
            0,
            replies.iter().map(|reply| reply.to_vec()).collect(),
        )
        .await
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of discovery requests answered so far.
    pub fn requests(&self) -> usize {
        self.request_payloads().len()
    }

    /// Raw payloads of the discovery requests answered so far.
    pub fn request_payloads(&self) -> Vec<Vec<u8>> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

impl Drop for SimulatedDiscoveryDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}
