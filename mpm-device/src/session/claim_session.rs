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

use super::keepalive::{leave_live, KeepaliveFailure, KeepaliveHandle, SessionHealth};
use crate::config::SessionConfig;
use crate::device_addr::DeviceAddr;
use crate::observability::{events, fields};
use crate::rpc::{RpcChannel, RpcConnector, RpcError};
use crate::sid::Sid;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "claim_session";

const GET_DEVICE_INFO_METHOD: &str = "get_device_info";
const CLAIM_METHOD: &str = "claim";
const ALLOCATE_SID_METHOD: &str = "allocate_sid";

#[derive(Debug)]
pub enum SessionError {
    /// The daemon could not be reached, or stopped answering while the session was built.
    Connection { addr: String, source: RpcError },
    /// `claim` returned an empty token.
    ClaimDenied { addr: String },
    /// The keepalive lost the claim; the session is dead.
    KeepaliveFailed(KeepaliveFailure),
    Closed,
    Rpc(RpcError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Connection { addr, source } => {
                write!(f, "unable to open session with {addr}: {source}")
            }
            SessionError::ClaimDenied { addr } => {
                write!(f, "device at {addr} refused the claim")
            }
            SessionError::KeepaliveFailed(failure) => write!(f, "session is dead: {failure}"),
            SessionError::Closed => write!(f, "session is closed"),
            SessionError::Rpc(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Connection { source, .. } => Some(source),
            SessionError::KeepaliveFailed(KeepaliveFailure::ConnectionLost(err)) => Some(err),
            SessionError::Rpc(err) => Some(err),
            SessionError::ClaimDenied { .. }
            | SessionError::KeepaliveFailed(KeepaliveFailure::ReclaimDenied)
            | SessionError::Closed => None,
        }
    }
}

impl From<RpcError> for SessionError {
    fn from(err: RpcError) -> Self {
        SessionError::Rpc(err)
    }
}

///
/// [`ClaimSession`] holds the exclusive claim on one motherboard.
///
/// The claim is taken in [`open`](Self::open) and defended by a background keepalive until
/// [`close`](Self::close). Once the keepalive reports a failure every privileged call fails
/// immediately with [`SessionError::KeepaliveFailed`] and never reaches the daemon.
pub struct ClaimSession {
    session_id: String,
    addr: String,
    device_info: DeviceAddr,
    rpc: Arc<RpcChannel>,
    health: Arc<watch::Sender<SessionHealth>>,
    keepalive: Mutex<Option<KeepaliveHandle>>,
}

impl ClaimSession {
    /// Connects to the daemon at `addr`, claims it and starts the keepalive.
    ///
    /// A refused claim is fatal and no keepalive is started. There is no retry here.
    pub async fn open(
        connector: &dyn RpcConnector,
        addr: &str,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(
            event = events::SESSION_CONNECT_START,
            component = COMPONENT,
            session_id = session_id.as_str(),
            addr,
            port = config.rpc_port,
            "opening claim session"
        );

        let connection_error = |source: RpcError| {
            error!(
                event = events::SESSION_CONNECT_FAILED,
                component = COMPONENT,
                session_id = session_id.as_str(),
                addr,
                err = %source,
                "unable to open claim session"
            );
            SessionError::Connection {
                addr: addr.to_string(),
                source,
            }
        };

        let client = connector
            .connect(addr, config.rpc_port)
            .await
            .map_err(connection_error)?;
        let rpc = Arc::new(RpcChannel::new(client));

        let info: BTreeMap<String, String> = rpc
            .call(GET_DEVICE_INFO_METHOD, Vec::new())
            .await
            .map_err(connection_error)?;
        let device_info: DeviceAddr = info.into_iter().collect();

        let token: String = rpc
            .call(CLAIM_METHOD, vec![json!(config.claim_label)])
            .await
            .map_err(connection_error)?;
        if token.is_empty() {
            warn!(
                event = events::SESSION_CLAIM_DENIED,
                component = COMPONENT,
                session_id = session_id.as_str(),
                addr,
                "claim returned an empty token"
            );
            return Err(SessionError::ClaimDenied {
                addr: addr.to_string(),
            });
        }
        rpc.set_token(&token).await;

        info!(
            event = events::SESSION_CLAIM_OK,
            component = COMPONENT,
            session_id = session_id.as_str(),
            addr,
            device = %device_info,
            "device claimed"
        );

        let health = Arc::new(watch::channel(SessionHealth::Live).0);
        let keepalive = KeepaliveHandle::spawn(
            session_id.clone(),
            rpc.clone(),
            health.clone(),
            config.keepalive_interval(),
        );

        Ok(Self {
            session_id,
            addr: addr.to_string(),
            device_info,
            rpc,
            health,
            keepalive: Mutex::new(Some(keepalive)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Answer of `get_device_info` taken when the session was opened.
    pub fn device_info(&self) -> &DeviceAddr {
        &self.device_info
    }

    pub fn health(&self) -> SessionHealth {
        self.health.borrow().clone()
    }

    pub fn is_live(&self) -> bool {
        self.health.borrow().is_live()
    }

    /// Resolves once the session stops being live, with the state it moved to.
    pub async fn wait_for_failure(&self) -> SessionHealth {
        let mut health = self.health.subscribe();
        let state = health
            .wait_for(|state| !state.is_live())
            .await
            .map(|state| state.clone())
            .unwrap_or(SessionHealth::Closed);
        state
    }

    /// The error a call on this session fails with, or `None` while it is live.
    fn rejection(&self, method: &str) -> Option<SessionError> {
        let err = match &*self.health.borrow() {
            SessionHealth::Live => return None,
            SessionHealth::Failed(failure) => SessionError::KeepaliveFailed(failure.clone()),
            SessionHealth::Closed => SessionError::Closed,
        };
        debug!(
            event = events::SESSION_CALL_REJECTED,
            component = COMPONENT,
            session_id = self.session_id.as_str(),
            method,
            err = %err,
            "call on dead session"
        );
        Some(err)
    }

    fn ensure_usable(&self, method: &str) -> Result<(), SessionError> {
        match self.rejection(method) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Asks the crossbar for a SID routing `address` to the host endpoint at `local_port`.
    ///
    /// The daemon's answer is returned as-is.
    pub async fn allocate_sid(
        &self,
        local_port: u16,
        address: Sid,
        xbar_src_addr: u32,
        xbar_src_port: u32,
    ) -> Result<Sid, SessionError> {
        let raw: u32 = self
            .call_with_token(
                ALLOCATE_SID_METHOD,
                vec![
                    json!(local_port),
                    json!(address.get()),
                    json!(xbar_src_addr),
                    json!(xbar_src_port),
                ],
            )
            .await?;
        let sid = Sid::from_raw(raw);
        debug!(
            event = events::XPORT_SID_ALLOCATED,
            component = COMPONENT,
            session_id = self.session_id.as_str(),
            local_port,
            sid = %sid,
            "sid allocated"
        );
        Ok(sid)
    }

    /// Unprivileged call on the session's connection.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, SessionError> {
        self.ensure_usable(method)?;
        Ok(self.rpc.call(method, args).await?)
    }

    /// Privileged call carrying the claim token.
    pub async fn call_with_token<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, SessionError> {
        self.ensure_usable(method)?;
        match self.rpc.call_with_token(method, args).await {
            Ok(value) => Ok(value),
            // The keepalive revoked the token while this call waited for the channel.
            Err(err @ RpcError::Unauthenticated { .. }) => {
                Err(self.rejection(method).unwrap_or(SessionError::Rpc(err)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Marks the session closed, then stops the keepalive and waits for it.
    ///
    /// Idempotent. The claim itself is not released; the daemon lets it lapse.
    pub async fn close(&self) {
        leave_live(&self.health, SessionHealth::Closed);
        let keepalive = self.keepalive.lock().await.take();
        if let Some(keepalive) = keepalive {
            keepalive.stop().await;
            self.rpc.revoke_token().await;
            info!(
                event = events::SESSION_CLOSE,
                component = COMPONENT,
                session_id = self.session_id.as_str(),
                addr = self.addr.as_str(),
                reason = fields::REASON_SHUTDOWN,
                "claim session closed"
            );
        }
    }
}

impl Debug for ClaimSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimSession")
            .field("session_id", &self.session_id)
            .field("addr", &self.addr)
            .field("health", &*self.health.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClaimSession, SessionError};
    use crate::config::SessionConfig;
    use crate::rpc::{RpcClient, RpcConnector, RpcError};
    use crate::session::{KeepaliveFailure, SessionHealth};
    use crate::sid::Sid;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Daemon {
        token: String,
        reclaim_fails: Arc<AtomicBool>,
        reclaim_delay: Duration,
        calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    }

    impl Daemon {
        fn with_token(token: &str) -> Self {
            Self {
                token: token.to_string(),
                ..Self::default()
            }
        }

        fn count(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(called, _)| called == method)
                .count()
        }
    }

    #[async_trait]
    impl RpcClient for Daemon {
        async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), args.clone()));
            match method {
                "get_device_info" => Ok(json!({"type": "n3xx", "serial": "ABC123"})),
                "claim" => Ok(json!(self.token)),
                "reclaim" => {
                    tokio::time::sleep(self.reclaim_delay).await;
                    Ok(json!(!self.reclaim_fails.load(Ordering::SeqCst)))
                }
                "allocate_sid" => Ok(json!(0x0002_0001u32)),
                other => Err(RpcError::Remote {
                    method: other.to_string(),
                    message: "no such method".to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl RpcConnector for Daemon {
        async fn connect(&self, _addr: &str, _port: u16) -> Result<Box<dyn RpcClient>, RpcError> {
            Ok(Box::new(self.clone()))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl RpcConnector for Unreachable {
        async fn connect(&self, addr: &str, port: u16) -> Result<Box<dyn RpcClient>, RpcError> {
            Err(RpcError::Connect {
                addr: addr.to_string(),
                port,
                reason: "connection refused".to_string(),
            })
        }
    }

    fn config(interval_ms: u64) -> SessionConfig {
        SessionConfig {
            keepalive_interval_ms: interval_ms,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn open_claims_and_exposes_device_info() {
        let daemon = Daemon::with_token("tok");

        let session = ClaimSession::open(&daemon, "10.0.0.2", &config(1000))
            .await
            .expect("open should succeed");

        assert!(session.is_live());
        assert_eq!(session.addr(), "10.0.0.2");
        assert_eq!(session.device_info().get("serial"), Some("ABC123"));
        let calls = daemon.calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "get_device_info");
        assert_eq!(calls[1].0, "claim");
        assert_eq!(calls[1].1, vec![json!(SessionConfig::default().claim_label)]);
        session.close().await;
    }

    #[tokio::test]
    async fn empty_token_is_claim_denied_without_keepalive() {
        let daemon = Daemon::with_token("");

        let err = ClaimSession::open(&daemon, "10.0.0.2", &config(1))
            .await
            .unwrap_err();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(err, SessionError::ClaimDenied { .. }));
        assert_eq!(daemon.count("reclaim"), 0);
    }

    #[tokio::test]
    async fn unreachable_daemon_is_connection_error() {
        let err = ClaimSession::open(&Unreachable, "10.0.0.9", &config(1000))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Connection { ref addr, .. } if addr == "10.0.0.9"));
    }

    #[tokio::test]
    async fn allocate_sid_passes_token_and_route() {
        let daemon = Daemon::with_token("tok");
        let session = ClaimSession::open(&daemon, "10.0.0.2", &config(1000))
            .await
            .unwrap();

        let sid = session
            .allocate_sid(40000, Sid::new(0, 0, 2, 0), 0, 0)
            .await
            .unwrap();

        assert_eq!(sid, Sid::from_raw(0x0002_0001));
        let calls = daemon.calls.lock().unwrap().clone();
        let (_, args) = calls
            .iter()
            .find(|(method, _)| method == "allocate_sid")
            .unwrap();
        assert_eq!(
            args,
            &vec![json!("tok"), json!(40000), json!(0x0000_0200u32), json!(0), json!(0)]
        );
        session.close().await;
    }

    #[tokio::test]
    async fn failed_reclaim_makes_privileged_calls_fail_fast() {
        let daemon = Daemon::with_token("tok");
        let session = ClaimSession::open(&daemon, "10.0.0.2", &config(5))
            .await
            .unwrap();

        daemon.reclaim_fails.store(true, Ordering::SeqCst);
        let health = tokio::time::timeout(Duration::from_secs(2), session.wait_for_failure())
            .await
            .expect("keepalive should notice the lost claim");
        assert_eq!(health, SessionHealth::Failed(KeepaliveFailure::ReclaimDenied));

        let err = session
            .allocate_sid(40000, Sid::new(0, 0, 2, 0), 0, 0)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::KeepaliveFailed(KeepaliveFailure::ReclaimDenied)
        ));
        assert_eq!(daemon.count("allocate_sid"), 0);
        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn allocation_queued_behind_failing_reclaim_never_reaches_daemon() {
        let daemon = Daemon {
            reclaim_delay: Duration::from_millis(100),
            ..Daemon::with_token("tok")
        };
        daemon.reclaim_fails.store(true, Ordering::SeqCst);
        let session = ClaimSession::open(&daemon, "10.0.0.2", &config(1000))
            .await
            .unwrap();
        while daemon.count("reclaim") == 0 {
            tokio::task::yield_now().await;
        }

        let result = session
            .allocate_sid(40000, Sid::new(0, 0, 2, 0), 0, 0)
            .await;

        assert!(matches!(
            result,
            Err(SessionError::KeepaliveFailed(KeepaliveFailure::ReclaimDenied))
        ));
        assert_eq!(daemon.count("allocate_sid"), 0);
        assert_eq!(
            session.health(),
            SessionHealth::Failed(KeepaliveFailure::ReclaimDenied)
        );
        session.close().await;
    }

    #[tokio::test]
    async fn close_stops_keepalive_and_rejects_calls() {
        let daemon = Daemon::with_token("tok");
        let session = ClaimSession::open(&daemon, "10.0.0.2", &config(5))
            .await
            .unwrap();

        session.close().await;
        let reclaims = daemon.count("reclaim");
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(daemon.count("reclaim"), reclaims);
        assert_eq!(session.health(), SessionHealth::Closed);
        assert!(matches!(
            session.call::<bool>("get_device_info", Vec::new()).await,
            Err(SessionError::Closed)
        ));
        session.close().await;
    }
}
