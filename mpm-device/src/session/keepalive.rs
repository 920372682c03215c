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

//! Background reclaim loop that defends a claim for the lifetime of a session.

use crate::observability::{events, fields};
use crate::rpc::{RpcChannel, RpcError};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub(crate) const RECLAIM_METHOD: &str = "reclaim";
const COMPONENT: &str = "keepalive";

/// Why a live session stopped being live.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeepaliveFailure {
    /// The daemon answered `reclaim` with `false`.
    ReclaimDenied,
    /// The `reclaim` call itself failed.
    ConnectionLost(RpcError),
}

impl Display for KeepaliveFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeepaliveFailure::ReclaimDenied => write!(f, "reclaim denied by device"),
            KeepaliveFailure::ConnectionLost(err) => write!(f, "reclaim failed: {err}"),
        }
    }
}

/// Liveness of a claim session as maintained by its keepalive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionHealth {
    Live,
    Failed(KeepaliveFailure),
    Closed,
}

impl SessionHealth {
    pub fn is_live(&self) -> bool {
        matches!(self, SessionHealth::Live)
    }
}

/// Moves `health` out of `Live`; later transitions are ignored so the first cause sticks.
pub(crate) fn leave_live(health: &watch::Sender<SessionHealth>, next: SessionHealth) -> bool {
    health.send_if_modified(|current| {
        if current.is_live() {
            *current = next;
            true
        } else {
            false
        }
    })
}

/// Owns the spawned keepalive task.
///
/// Dropping the handle also stops the loop: the shutdown sender goes away and the task
/// exits at its next sleep.
pub(crate) struct KeepaliveHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl KeepaliveHandle {
    pub(crate) fn spawn(
        session_id: String,
        rpc: Arc<RpcChannel>,
        health: Arc<watch::Sender<SessionHealth>>,
        interval: Duration,
    ) -> Self {
        let (shutdown, shutdown_receiver) = oneshot::channel();
        let task = tokio::spawn(keepalive_loop(
            session_id,
            rpc,
            health,
            interval,
            shutdown_receiver,
        ));

        Self { shutdown, task }
    }

    /// Stops the loop and waits for it, including a reclaim that is still in flight.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            warn!(
                event = events::KEEPALIVE_STOPPED,
                component = COMPONENT,
                err = %err,
                "keepalive task did not finish cleanly"
            );
        }
    }
}

fn reclaim_failure(result: &Result<bool, RpcError>) -> Option<KeepaliveFailure> {
    match result {
        Ok(true) => None,
        Ok(false) => Some(KeepaliveFailure::ReclaimDenied),
        Err(err) => Some(KeepaliveFailure::ConnectionLost(err.clone())),
    }
}

/// Reclaims immediately, then once per `interval`, until shut down or a reclaim fails.
///
/// A failed reclaim is fatal: the session is marked [`SessionHealth::Failed`] and the loop
/// ends without retrying.
pub(crate) async fn keepalive_loop(
    session_id: String,
    rpc: Arc<RpcChannel>,
    health: Arc<watch::Sender<SessionHealth>>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!(
        event = events::KEEPALIVE_START,
        component = COMPONENT,
        session_id = session_id.as_str(),
        interval_ms = interval.as_millis() as u64,
        "keepalive started"
    );

    loop {
        // The session leaves `Live` before the channel lock is released.
        let result = rpc
            .call_with_token_settled::<bool, _>(RECLAIM_METHOD, Vec::new(), |result| {
                match reclaim_failure(result) {
                    Some(failure) => {
                        leave_live(&health, SessionHealth::Failed(failure));
                        false
                    }
                    None => true,
                }
            })
            .await;

        if let Some(failure) = reclaim_failure(&result) {
            let reason = match failure {
                KeepaliveFailure::ReclaimDenied => fields::REASON_RECLAIM_DENIED,
                KeepaliveFailure::ConnectionLost(_) => fields::REASON_CONNECTION_LOST,
            };
            error!(
                event = events::KEEPALIVE_FAILED,
                component = COMPONENT,
                session_id = session_id.as_str(),
                reason,
                err = %failure,
                "claim lost; session is dead"
            );
            return;
        }

        debug!(
            event = events::KEEPALIVE_RECLAIM_OK,
            component = COMPONENT,
            session_id = session_id.as_str(),
            "reclaim ok"
        );

        tokio::select! {
            _ = &mut shutdown => {
                info!(
                    event = events::KEEPALIVE_STOPPED,
                    component = COMPONENT,
                    session_id = session_id.as_str(),
                    reason = fields::REASON_SHUTDOWN,
                    "keepalive stopped"
                );
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{keepalive_loop, leave_live, KeepaliveFailure, KeepaliveHandle, SessionHealth};
    use crate::rpc::{RpcChannel, RpcClient, RpcError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{oneshot, watch};

    /// Answers `reclaim` with `true` for the first `grants` calls, `false` afterwards.
    struct GrantingClient {
        grants: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RpcClient for GrantingClient {
        async fn call(&self, _method: &str, _args: Vec<Value>) -> Result<Value, RpcError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(call < self.grants))
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl RpcClient for BrokenClient {
        async fn call(&self, method: &str, _args: Vec<Value>) -> Result<Value, RpcError> {
            Err(RpcError::Transport {
                method: method.to_string(),
                reason: "connection reset".to_string(),
            })
        }
    }

    async fn channel(client: impl RpcClient + 'static) -> Arc<RpcChannel> {
        let channel = Arc::new(RpcChannel::new(Box::new(client)));
        channel.set_token("token").await;
        channel
    }

    #[tokio::test]
    async fn denied_reclaim_marks_session_failed_and_ends_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rpc = channel(GrantingClient {
            grants: 2,
            calls: calls.clone(),
        })
        .await;
        let health = Arc::new(watch::channel(SessionHealth::Live).0);
        let (_shutdown, shutdown_receiver) = oneshot::channel();

        keepalive_loop(
            "denied".to_string(),
            rpc,
            health.clone(),
            Duration::from_millis(1),
            shutdown_receiver,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *health.borrow(),
            SessionHealth::Failed(KeepaliveFailure::ReclaimDenied)
        );
    }

    #[tokio::test]
    async fn rpc_failure_marks_session_failed() {
        let rpc = channel(BrokenClient).await;
        let health = Arc::new(watch::channel(SessionHealth::Live).0);
        let (_shutdown, shutdown_receiver) = oneshot::channel();

        keepalive_loop(
            "broken".to_string(),
            rpc,
            health.clone(),
            Duration::from_millis(1),
            shutdown_receiver,
        )
        .await;

        assert!(matches!(
            *health.borrow(),
            SessionHealth::Failed(KeepaliveFailure::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn stop_ends_a_healthy_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rpc = channel(GrantingClient {
            grants: usize::MAX,
            calls: calls.clone(),
        })
        .await;
        let health = Arc::new(watch::channel(SessionHealth::Live).0);

        let handle = KeepaliveHandle::spawn(
            "healthy".to_string(),
            rpc,
            health.clone(),
            Duration::from_secs(60),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(health.borrow().is_live());
    }

    #[test]
    fn first_departure_from_live_sticks() {
        let health = watch::channel(SessionHealth::Live).0;

        assert!(leave_live(&health, SessionHealth::Closed));
        assert!(!leave_live(
            &health,
            SessionHealth::Failed(KeepaliveFailure::ReclaimDenied)
        ));
        assert_eq!(*health.borrow(), SessionHealth::Closed);
    }
}
