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

//! # mpm-device
//!
//! `mpm-device` finds, claims and opens transports to SDR motherboards managed by an MPM
//! daemon.
//!
//! The flow is: a user hint goes through [`DiscoveryClient`] and yields device
//! descriptors; [`MpmDevice::open`] opens one [`ClaimSession`] per motherboard; transports
//! are then negotiated on demand with [`MpmDevice::make_transport`], which binds a local
//! endpoint and asks the owning session for a crossbar [`Sid`].
//!
//! The RPC wire protocol is not part of this crate. Callers plug it in through
//! [`RpcConnector`] / [`RpcClient`].
//!
//! ```
//! use std::sync::Arc;
//! use mpm_device::{DeviceAddr, MpmConfig, MpmDevice, Sid, XportRoute, XportType};
//!
//! # pub mod fake_daemon {
//! #     use async_trait::async_trait;
//! #     use mpm_device::{RpcClient, RpcConnector, RpcError};
//! #     use serde_json::{json, Value};
//! #
//! #     pub struct FakeDaemon;
//! #
//! #     #[async_trait]
//! #     impl RpcClient for FakeDaemon {
//! #         async fn call(&self, method: &str, _args: Vec<Value>) -> Result<Value, RpcError> {
//! #             Ok(match method {
//! #                 "get_device_info" => json!({"type": "n3xx", "serial": "ABC123"}),
//! #                 "claim" => json!("token"),
//! #                 "reclaim" => json!(true),
//! #                 _ => json!(0x0200_0001u32),
//! #             })
//! #         }
//! #     }
//! #
//! #     #[async_trait]
//! #     impl RpcConnector for FakeDaemon {
//! #         async fn connect(&self, _addr: &str, _port: u16) -> Result<Box<dyn RpcClient>, RpcError> {
//! #             Ok(Box::new(FakeDaemon))
//! #         }
//! #     }
//! # }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let device_addr: DeviceAddr = "addr=127.0.0.1".parse().unwrap();
//! let device = MpmDevice::open(&device_addr, &MpmConfig::default(), &fake_daemon::FakeDaemon)
//!     .await
//!     .unwrap();
//! assert_eq!(device.mboard_info(0).unwrap().serial, "ABC123");
//!
//! let xports = device
//!     .make_transport(
//!         XportRoute::new(0, Sid::new(0, 0, 2, 0)),
//!         XportType::Ctrl,
//!         &DeviceAddr::new(),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(xports.recv_sid, xports.send_sid.reversed());
//!
//! device.close().await;
//! # });
//! ```
//!
//! ## Observability model
//!
//! Library code emits `tracing` events carrying `event` and `component` fields and never
//! installs a subscriber. Binaries and tests initialize `tracing_subscriber` once.

mod config;
pub use config::{
    ConfigError, DiscoveryConfig, MpmConfig, SessionConfig, TransportConfig,
    DEFAULT_CLAIM_LABEL, MPM_DATA_PORT,
};

mod device;
pub use device::{
    DeviceError, MboardInfo, MpmDevice, DEFAULT_LINK_MAX_RATE, DEFAULT_MTU,
    MPM_RX_SW_BUFF_SIZE_ETH,
};

mod device_addr;
pub use device_addr::{DeviceAddr, InvalidKeyError, MAX_MBOARDS};

pub mod discovery;
pub use discovery::{DiscoveryClient, DiscoveryError};

#[doc(hidden)]
pub mod observability;

mod registry;
pub use registry::{Device, DeviceFamily, DeviceRegistry, FoundDevice, MpmFamily, RegistryError};

mod rpc;
pub use rpc::{decode_result, RpcChannel, RpcClient, RpcConnector, RpcError, MPM_RPC_PORT};

mod session;
pub use session::{ClaimSession, KeepaliveFailure, SessionError, SessionHealth};

mod sid;
pub use sid::{ParseSidError, Sid};

pub mod transport;
pub use transport::{
    BothXports, Endianness, TransportError, TransportNegotiator, XportRoute, XportType,
};
