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

//! Local IPv4 interface enumeration.

use get_if_addrs::IfAddr;
use std::io;
use std::net::Ipv4Addr;

/// One local IPv4 interface address and the broadcast address of its subnet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetInterface {
    pub ip: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

impl NetInterface {
    /// Uses the reported broadcast address, or derives it from the netmask.
    pub fn from_netmask(ip: Ipv4Addr, netmask: Ipv4Addr, broadcast: Option<Ipv4Addr>) -> Self {
        let broadcast =
            broadcast.unwrap_or_else(|| Ipv4Addr::from(u32::from(ip) | !u32::from(netmask)));
        Self { ip, broadcast }
    }
}

/// Source of the host's interface list.
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>>;
}

/// Reads the interface list from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
        Ok(get_if_addrs::get_if_addrs()?
            .into_iter()
            .filter_map(|interface| match interface.addr {
                IfAddr::V4(v4) => Some(NetInterface::from_netmask(
                    v4.ip,
                    v4.netmask,
                    v4.broadcast,
                )),
                IfAddr::V6(_) => None,
            })
            .collect())
    }
}

/// A fixed interface list.
#[derive(Clone, Debug, Default)]
pub struct StaticInterfaces(pub Vec<NetInterface>);

impl InterfaceSource for StaticInterfaces {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
        Ok(self.0.clone())
    }
}
