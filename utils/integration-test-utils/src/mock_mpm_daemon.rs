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

use async_trait::async_trait;
use mpm_device::{RpcClient, RpcConnector, RpcError};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// One RPC call as seen by [`MockMpmDaemon`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub addr: String,
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Default)]
struct DaemonState {
    device_info: BTreeMap<String, String>,
    serials: BTreeMap<String, String>,
    token: String,
    denied: HashSet<String>,
    unreachable: HashSet<String>,
    reclaim_ok: AtomicBool,
    reclaim_delay: Duration,
    next_sid: AtomicU32,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Scripted stand-in for the management daemons of one or more motherboards.
///
/// Answers `get_device_info`, `claim`, `reclaim` and `allocate_sid`, and records every
/// call per target address. `allocate_sid` hands out consecutive SIDs starting from the
/// configured base.
#[derive(Clone)]
pub struct MockMpmDaemon {
    state: Arc<DaemonState>,
}

impl Default for MockMpmDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMpmDaemon {
    pub fn new() -> Self {
        let mut device_info = BTreeMap::new();
        device_info.insert("type".to_string(), "n3xx".to_string());
        device_info.insert("serial".to_string(), "ABC123".to_string());
        Self {
            state: Arc::new(DaemonState {
                device_info,
                token: "mock-token".to_string(),
                reclaim_ok: AtomicBool::new(true),
                next_sid: AtomicU32::new(0x0200_0001),
                ..DaemonState::default()
            }),
        }
    }

    fn state_mut(&mut self) -> &mut DaemonState {
        Arc::get_mut(&mut self.state).expect("configure the daemon before sharing it")
    }

    pub fn with_claim_token(mut self, token: &str) -> Self {
        self.state_mut().token = token.to_string();
        self
    }

    /// Serial reported by the daemon at `addr`.
    pub fn with_serial(mut self, addr: &str, serial: &str) -> Self {
        self.state_mut()
            .serials
            .insert(addr.to_string(), serial.to_string());
        self
    }

    /// The daemon at `addr` answers `claim` with an empty token.
    pub fn deny_claim_at(mut self, addr: &str) -> Self {
        self.state_mut().denied.insert(addr.to_string());
        self
    }

    /// Connections to `addr` are refused.
    pub fn unreachable_at(mut self, addr: &str) -> Self {
        self.state_mut().unreachable.insert(addr.to_string());
        self
    }

    /// Every `reclaim` takes `delay` before it answers.
    pub fn with_reclaim_delay(mut self, delay: Duration) -> Self {
        self.state_mut().reclaim_delay = delay;
        self
    }

    pub fn with_first_sid(self, sid: u32) -> Self {
        self.state.next_sid.store(sid, Ordering::SeqCst);
        self
    }

    /// What every subsequent `reclaim` returns.
    pub fn set_reclaim_result(&self, ok: bool) {
        self.state.reclaim_ok.store(ok, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().expect("call log poisoned").clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    pub fn call_count_at(&self, addr: &str, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.addr == addr && call.method == method)
            .count()
    }
}

#[async_trait]
impl RpcConnector for MockMpmDaemon {
    async fn connect(&self, addr: &str, port: u16) -> Result<Box<dyn RpcClient>, RpcError> {
        if self.state.unreachable.contains(addr) {
            return Err(RpcError::Connect {
                addr: addr.to_string(),
                port,
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MockMpmClient {
            addr: addr.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct MockMpmClient {
    addr: String,
    state: Arc<DaemonState>,
}

#[async_trait]
impl RpcClient for MockMpmClient {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        debug!(addr = self.addr.as_str(), method, ?args, "mock daemon call");
        self.state
            .calls
            .lock()
            .expect("call log poisoned")
            .push(RecordedCall {
                addr: self.addr.clone(),
                method: method.to_string(),
                args,
            });

        match method {
            "get_device_info" => {
                let mut info = self.state.device_info.clone();
                if let Some(serial) = self.state.serials.get(&self.addr) {
                    info.insert("serial".to_string(), serial.clone());
                }
                Ok(json!(info))
            }
            "claim" if self.state.denied.contains(&self.addr) => Ok(json!("")),
            "claim" => Ok(json!(self.state.token)),
            "reclaim" => {
                tokio::time::sleep(self.state.reclaim_delay).await;
                Ok(json!(self.state.reclaim_ok.load(Ordering::SeqCst)))
            }
            "allocate_sid" => Ok(json!(self.state.next_sid.fetch_add(1, Ordering::SeqCst))),
            other => Err(RpcError::Remote {
                method: other.to_string(),
                message: "method not supported by mock daemon".to_string(),
            }),
        }
    }
}
