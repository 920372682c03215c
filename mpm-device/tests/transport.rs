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

use integration_test_utils::{init_logging, MockMpmDaemon};
use mpm_device::{
    DeviceAddr, Endianness, KeepaliveFailure, MpmConfig, MpmDevice, SessionError, Sid,
    TransportError, XportRoute, XportType,
};
use serde_json::json;
use std::time::Duration;
use tokio::net::UdpSocket;

const ROUTE: Sid = Sid::new(0, 0, 2, 0);

async fn open_device(daemon: &MockMpmDaemon, data_port: u16) -> MpmDevice {
    let mut config = MpmConfig::default();
    config.transport.remote_data_port = data_port;
    config.session.keepalive_interval_ms = 10;
    MpmDevice::open(
        &"addr=127.0.0.1".parse().expect("args should parse"),
        &config,
        daemon,
    )
    .await
    .expect("device should open")
}

#[tokio::test(flavor = "multi_thread")]
async fn data_transport_pairs_reversed_sids_on_one_endpoint() {
    init_logging();
    let device_side = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("device socket should bind");
    let daemon = MockMpmDaemon::new();
    let device = open_device(&daemon, device_side.local_addr().unwrap().port()).await;

    let hints = device.rx_hints(0).expect("mboard 0 exists");
    let xports = device
        .make_transport(XportRoute::new(0, ROUTE), XportType::RxData, &hints)
        .await
        .expect("transport should be negotiated");

    assert_eq!(xports.send_sid, Sid::from_raw(0x0200_0001));
    assert_eq!(xports.recv_sid, xports.send_sid.reversed());
    assert_eq!(xports.endianness, Endianness::Big);
    assert!(xports.recv_buff_size > 0);
    assert!(xports.send_buff_size > 0);

    let allocation = daemon
        .calls()
        .into_iter()
        .find(|call| call.method == "allocate_sid")
        .expect("allocate_sid should have been called");
    let local_port = xports.recv.local_port();
    assert_eq!(
        allocation.args,
        vec![
            json!("mock-token"),
            json!(local_port),
            json!(ROUTE.get()),
            json!(u32::from(ROUTE.src_addr())),
            json!(0)
        ]
    );

    xports.send.send(b"ping").await.expect("send should work");
    let mut buffer = [0u8; 16];
    let (len, host) = device_side.recv_from(&mut buffer).await.unwrap();
    assert_eq!(&buffer[..len], b"ping");
    assert_eq!(host.port(), local_port);

    device_side.send_to(b"pong", host).await.unwrap();
    let len = tokio::time::timeout(Duration::from_secs(1), xports.recv.recv(&mut buffer))
        .await
        .expect("reply should arrive")
        .expect("recv should work");
    assert_eq!(&buffer[..len], b"pong");

    device.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn each_transport_gets_its_own_port_and_sid() {
    init_logging();
    let daemon = MockMpmDaemon::new();
    let device = open_device(&daemon, 49153).await;

    let first = device
        .make_transport(XportRoute::new(0, ROUTE), XportType::TxData, &DeviceAddr::new())
        .await
        .expect("first transport");
    let second = device
        .make_transport(XportRoute::new(0, ROUTE), XportType::TxData, &DeviceAddr::new())
        .await
        .expect("second transport");

    assert_ne!(first.send_sid, second.send_sid);
    assert_ne!(first.recv.local_port(), second.recv.local_port());
    for xports in [&first, &second] {
        assert_eq!(xports.recv_sid, xports.send_sid.reversed());
    }
    device.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ctrl_transport_ignores_caller_args() {
    init_logging();
    let daemon = MockMpmDaemon::new();
    let device = open_device(&daemon, 49153).await;
    let bogus: DeviceAddr = "recv_buff_size=plenty".parse().unwrap();

    let ctrl = device
        .make_transport(XportRoute::new(0, ROUTE), XportType::Ctrl, &bogus)
        .await;
    let data = device
        .make_transport(XportRoute::new(0, ROUTE), XportType::RxData, &bogus)
        .await;

    assert!(ctrl.is_ok());
    assert!(matches!(data, Err(TransportError::Bind(_))));
    assert_eq!(daemon.call_count("allocate_sid"), 1);
    device.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_session_fails_negotiation_without_allocating() {
    init_logging();
    let daemon = MockMpmDaemon::new();
    let device = open_device(&daemon, 49153).await;

    daemon.set_reclaim_result(false);
    let session = device.session(0).expect("mboard 0 exists");
    tokio::time::timeout(Duration::from_secs(2), session.wait_for_failure())
        .await
        .expect("keepalive should notice the lost claim");

    let err = device
        .make_transport(XportRoute::new(0, ROUTE), XportType::RxData, &DeviceAddr::new())
        .await
        .expect_err("dead session should fail negotiation");

    assert!(matches!(
        err,
        TransportError::Session(SessionError::KeepaliveFailed(
            KeepaliveFailure::ReclaimDenied
        ))
    ));
    assert_eq!(daemon.call_count("allocate_sid"), 0);
    device.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn route_to_unknown_mboard_is_rejected() {
    init_logging();
    let daemon = MockMpmDaemon::new();
    let device = open_device(&daemon, 49153).await;

    let err = device
        .make_transport(XportRoute::new(1, ROUTE), XportType::Ctrl, &DeviceAddr::new())
        .await
        .expect_err("only one mboard exists");

    assert!(matches!(
        err,
        TransportError::NoSuchMboard { index: 1, count: 1 }
    ));
    device.close().await;
}
