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

//! Seam to the management daemon's RPC protocol.
//!
//! The wire protocol itself is provided by an implementation of [`RpcConnector`] /
//! [`RpcClient`]. This module only adds what every caller needs on top of it: typed result
//! decoding, claim-token attachment and serialization of calls sharing one connection.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use tokio::sync::Mutex;

/// Well-known port of the management daemon's RPC server.
pub const MPM_RPC_PORT: u16 = 49601;

/// Failures reported by the RPC collaborator or while decoding its results.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RpcError {
    /// No connection could be established.
    Connect {
        addr: String,
        port: u16,
        reason: String,
    },
    /// The established connection failed while a call was in flight.
    Transport { method: String, reason: String },
    /// The daemon executed the call and reported an error.
    Remote { method: String, message: String },
    /// The daemon answered with a value of an unexpected shape.
    Decode { method: String, reason: String },
    /// A privileged call was attempted before a claim token was bound.
    Unauthenticated { method: String },
}

impl Display for RpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Connect { addr, port, reason } => {
                write!(f, "unable to connect to {addr}:{port}: {reason}")
            }
            RpcError::Transport { method, reason } => {
                write!(f, "connection failed during `{method}`: {reason}")
            }
            RpcError::Remote { method, message } => {
                write!(f, "remote call `{method}` failed: {message}")
            }
            RpcError::Decode { method, reason } => {
                write!(f, "unexpected result from `{method}`: {reason}")
            }
            RpcError::Unauthenticated { method } => {
                write!(f, "`{method}` requires a claim token but none is bound")
            }
        }
    }
}

impl Error for RpcError {}

/// One request/response connection to a management daemon.
///
/// Implementations are not required to support concurrent calls; [`RpcChannel`] never
/// issues more than one at a time.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Invokes `method` with positional `args` and returns the raw result.
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError>;
}

/// Opens [`RpcClient`] connections.
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn connect(&self, addr: &str, port: u16) -> Result<Box<dyn RpcClient>, RpcError>;
}

/// Decodes a raw RPC result into `T`.
pub fn decode_result<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|err| RpcError::Decode {
        method: method.to_string(),
        reason: err.to_string(),
    })
}

struct ChannelState {
    client: Box<dyn RpcClient>,
    token: String,
}

///
/// [`RpcChannel`] owns one [`RpcClient`] together with the claim token bound to it.
///
/// Every call holds the channel lock until the reply arrives, so the keepalive and
/// foreground callers sharing a session are serialized on the connection.
pub struct RpcChannel {
    state: Mutex<ChannelState>,
}

impl RpcChannel {
    pub fn new(client: Box<dyn RpcClient>) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                client,
                token: String::new(),
            }),
        }
    }

    /// Call that needs no claim token.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, RpcError> {
        let state = self.state.lock().await;
        let value = state.client.call(method, args).await?;
        decode_result(method, value)
    }

    /// Privileged call: the bound token is passed as the first positional argument.
    ///
    /// Fails without reaching the daemon when no token is bound.
    pub async fn call_with_token<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, RpcError> {
        self.call_with_token_settled(method, args, |_| true).await
    }

    /// Privileged call whose outcome is judged while the channel is still locked.
    ///
    /// When `settle` returns `false` the token is revoked before the lock is released, so
    /// a privileged call queued behind this one fails with [`RpcError::Unauthenticated`]
    /// instead of reaching the daemon.
    pub async fn call_with_token_settled<T, F>(
        &self,
        method: &str,
        args: Vec<Value>,
        settle: F,
    ) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
        F: FnOnce(&Result<T, RpcError>) -> bool + Send,
    {
        let mut state = self.state.lock().await;
        if state.token.is_empty() {
            return Err(RpcError::Unauthenticated {
                method: method.to_string(),
            });
        }
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(Value::String(state.token.clone()));
        full_args.extend(args);
        let result = match state.client.call(method, full_args).await {
            Ok(value) => decode_result(method, value),
            Err(err) => Err(err),
        };
        if !settle(&result) {
            state.token.clear();
        }
        result
    }

    /// Drops the bound token once any call in flight has finished.
    pub async fn revoke_token(&self) {
        self.state.lock().await.token.clear();
    }

    pub async fn set_token(&self, token: &str) {
        self.state.lock().await.token = token.to_string();
    }

    pub async fn has_token(&self) -> bool {
        !self.state.lock().await.token.is_empty()
    }
}

impl Debug for RpcChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel").finish_non_exhaustive()
    }
}
