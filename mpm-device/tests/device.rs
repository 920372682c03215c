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

use integration_test_utils::{init_logging, MockMpmDaemon, SimulatedDiscoveryDaemon};
use mpm_device::discovery::StaticInterfaces;
use mpm_device::{
    DeviceAddr, DeviceError, DeviceRegistry, DiscoveryClient, DiscoveryConfig, MpmConfig,
    MpmDevice, MpmFamily, SessionError, SessionHealth, MPM_RX_SW_BUFF_SIZE_ETH,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> MpmConfig {
    let mut config = MpmConfig::default();
    config.session.keepalive_interval_ms = 10;
    config
}

fn args(text: &str) -> DeviceAddr {
    text.parse().expect("args should parse")
}

#[tokio::test(flavor = "multi_thread")]
async fn composite_args_open_one_session_per_mboard() {
    init_logging();
    let daemon = MockMpmDaemon::new()
        .with_serial("10.0.0.2", "SER0")
        .with_serial("10.0.0.3", "SER1");

    let device = MpmDevice::open(
        &args("addr0=10.0.0.2,addr1=10.0.0.3,recv_buff_size=1e6,send_frame_size1=1400"),
        &config(),
        &daemon,
    )
    .await
    .expect("device should open");

    assert_eq!(device.mboard_count(), 2);
    assert_eq!(device.mboard_info(0).unwrap().serial, "SER0");
    assert_eq!(device.mboard_info(1).unwrap().serial, "SER1");
    assert_eq!(device.mboard_info(1).unwrap().connection, "remote");
    assert_eq!(device.session(1).unwrap().addr(), "10.0.0.3");
    assert_eq!(device.recv_args(0).unwrap().get("recv_buff_size"), Some("1e6"));
    assert_eq!(device.recv_args(1).unwrap().get("recv_buff_size"), Some("1e6"));
    assert!(device.send_args(0).unwrap().is_empty());
    assert_eq!(device.send_args(1).unwrap().get("send_frame_size"), Some("1400"));
    assert_eq!(daemon.call_count_at("10.0.0.2", "claim"), 1);
    assert_eq!(daemon.call_count_at("10.0.0.3", "claim"), 1);

    device.close().await;
    assert_eq!(device.session(0).unwrap().health(), SessionHealth::Closed);
    assert_eq!(device.session(1).unwrap().health(), SessionHealth::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn rx_hints_prefer_user_buffer_size() {
    init_logging();
    let daemon = MockMpmDaemon::new();

    let tuned = MpmDevice::open(&args("addr=10.0.0.2,recv_buff_size=1e6"), &config(), &daemon)
        .await
        .expect("device should open");
    let plain = MpmDevice::open(&args("addr=10.0.0.2"), &config(), &daemon)
        .await
        .expect("device should open");

    assert_eq!(
        tuned.rx_hints(0).unwrap().get("recv_buff_size"),
        Some("1e6")
    );
    assert_eq!(
        plain.rx_hints(0).unwrap().get("recv_buff_size"),
        Some(MPM_RX_SW_BUFF_SIZE_ETH.to_string().as_str())
    );
    assert!(matches!(
        plain.rx_hints(4),
        Err(DeviceError::NoSuchMboard { index: 4, count: 1 })
    ));
    tuned.close().await;
    plain.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_mboard_rolls_back_opened_sessions() {
    init_logging();
    let daemon = MockMpmDaemon::new().deny_claim_at("10.0.0.3");

    let err = MpmDevice::open(&args("addr0=10.0.0.2,addr1=10.0.0.3"), &config(), &daemon)
        .await
        .expect_err("second mboard should refuse the claim");
    let reclaims = daemon.call_count_at("10.0.0.2", "reclaim");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        err,
        DeviceError::Session {
            mb_index: 1,
            source: SessionError::ClaimDenied { .. }
        }
    ));
    assert_eq!(daemon.call_count_at("10.0.0.2", "reclaim"), reclaims);
    assert_eq!(daemon.call_count_at("10.0.0.3", "reclaim"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn args_without_addr_are_rejected() {
    init_logging();
    let daemon = MockMpmDaemon::new();

    let err = MpmDevice::open(&args("serial=ABC123"), &config(), &daemon)
        .await
        .expect_err("addr is required");

    assert!(matches!(err, DeviceError::MissingAddr { mb_index: 0 }));
    assert!(daemon.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_finds_and_opens_mpm_devices() {
    init_logging();
    let discovery_daemon = SimulatedDiscoveryDaemon::start_local(&[b"USRP-MPM;serial=ABC123"])
        .await
        .expect("daemon should start");
    let rpc_daemon = MockMpmDaemon::new();
    let discovery = DiscoveryClient::with_interfaces(
        DiscoveryConfig {
            port: discovery_daemon.port(),
            ..DiscoveryConfig::default()
        },
        Arc::new(StaticInterfaces::default()),
    );
    let family = MpmFamily::new(config(), Arc::new(rpc_daemon.clone())).with_discovery(discovery);
    let mut registry = DeviceRegistry::new();
    registry
        .register(Arc::new(family))
        .expect("first registration should succeed");

    let found = registry
        .find(&args("addr=127.0.0.1"))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].family, "mpmd");
    assert_eq!(found[0].device_addr.get("serial"), Some("ABC123"));

    let device = registry
        .make(&args("addr=127.0.0.1"))
        .await
        .expect("device should open");
    assert_eq!(device.mboard_count(), 1);
    assert_eq!(rpc_daemon.call_count_at("127.0.0.1", "claim"), 1);
    device.close().await;

    let direct = registry
        .make(&args("type=mpmd,addr=10.0.0.5"))
        .await
        .expect("typed args open without discovery");
    assert_eq!(discovery_daemon.requests(), 2);
    assert_eq!(rpc_daemon.call_count_at("10.0.0.5", "claim"), 1);
    direct.close().await;
}
