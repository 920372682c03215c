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

//! Explicit registry of device families, owned by the composing application.

use crate::config::MpmConfig;
use crate::device::{DeviceError, MpmDevice};
use crate::device_addr::DeviceAddr;
use crate::discovery::{DiscoveryClient, MPM_DEVICE_TYPE};
use crate::observability::events;
use crate::rpc::RpcConnector;
use crate::transport::{
    BothXports, EndpointFactory, TransportError, UdpEndpointFactory, XportRoute, XportType,
};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tracing::{info, warn};

const COMPONENT: &str = "device_registry";

/// An opened device of any family.
#[async_trait]
pub trait Device: Send + Sync + Debug {
    fn mboard_count(&self) -> usize;

    async fn make_transport(
        &self,
        route: XportRoute,
        kind: XportType,
        args: &DeviceAddr,
    ) -> Result<BothXports, TransportError>;

    async fn close(&self);
}

/// Discovery and construction for one kind of device.
#[async_trait]
pub trait DeviceFamily: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, hint: &DeviceAddr) -> Result<Vec<DeviceAddr>, DeviceError>;

    async fn make(&self, device_addr: &DeviceAddr) -> Result<Arc<dyn Device>, DeviceError>;
}

#[derive(Debug)]
pub enum RegistryError {
    DuplicateFamily { name: String },
    NoDeviceFound { hint: String },
    Family { family: String, source: DeviceError },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateFamily { name } => {
                write!(f, "device family {name:?} is already registered")
            }
            RegistryError::NoDeviceFound { hint } => {
                write!(f, "no device found for \"{hint}\"")
            }
            RegistryError::Family { family, source } => write!(f, "{family}: {source}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::Family { source, .. } => Some(source),
            RegistryError::DuplicateFamily { .. } | RegistryError::NoDeviceFound { .. } => None,
        }
    }
}

/// A descriptor together with the family that found it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundDevice {
    pub family: String,
    pub device_addr: DeviceAddr,
}

#[derive(Default)]
pub struct DeviceRegistry {
    families: Vec<Arc<dyn DeviceFamily>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, family: Arc<dyn DeviceFamily>) -> Result<(), RegistryError> {
        let name = family.name().to_string();
        if self.families.iter().any(|known| known.name() == name) {
            return Err(RegistryError::DuplicateFamily { name });
        }
        info!(
            event = events::REGISTRY_FAMILY_REGISTERED,
            component = COMPONENT,
            family = name.as_str(),
            "device family registered"
        );
        self.families.push(family);
        Ok(())
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.families.iter().map(|family| family.name())
    }

    /// Asks every family in registration order; the first failure aborts the search.
    pub async fn find(&self, hint: &DeviceAddr) -> Result<Vec<FoundDevice>, RegistryError> {
        let mut found = Vec::new();
        for family in &self.families {
            let descriptors = family.find(hint).await.map_err(|source| {
                warn!(
                    event = events::REGISTRY_FIND_FAILED,
                    component = COMPONENT,
                    family = family.name(),
                    hint = %hint,
                    err = %source,
                    "device family failed to search"
                );
                RegistryError::Family {
                    family: family.name().to_string(),
                    source,
                }
            })?;
            found.extend(descriptors.into_iter().map(|device_addr| FoundDevice {
                family: family.name().to_string(),
                device_addr,
            }));
        }
        Ok(found)
    }

    /// Opens the device described by `device_addr`.
    ///
    /// A `type` naming a registered family is handed to it directly. Otherwise the hint is
    /// searched for and the first match is opened.
    pub async fn make(&self, device_addr: &DeviceAddr) -> Result<Arc<dyn Device>, RegistryError> {
        let direct = device_addr
            .get("type")
            .and_then(|kind| self.families.iter().find(|family| family.name() == kind));
        if let Some(family) = direct {
            return make_with(family.as_ref(), device_addr).await;
        }

        for family in &self.families {
            let found = family.find(device_addr).await.map_err(|source| {
                RegistryError::Family {
                    family: family.name().to_string(),
                    source,
                }
            })?;
            if let Some(first) = found.first() {
                return make_with(family.as_ref(), first).await;
            }
        }
        Err(RegistryError::NoDeviceFound {
            hint: device_addr.to_string(),
        })
    }
}

async fn make_with(
    family: &dyn DeviceFamily,
    device_addr: &DeviceAddr,
) -> Result<Arc<dyn Device>, RegistryError> {
    family
        .make(device_addr)
        .await
        .map_err(|source| RegistryError::Family {
            family: family.name().to_string(),
            source,
        })
}

#[async_trait]
impl Device for MpmDevice {
    fn mboard_count(&self) -> usize {
        MpmDevice::mboard_count(self)
    }

    async fn make_transport(
        &self,
        route: XportRoute,
        kind: XportType,
        args: &DeviceAddr,
    ) -> Result<BothXports, TransportError> {
        MpmDevice::make_transport(self, route, kind, args).await
    }

    async fn close(&self) {
        MpmDevice::close(self).await
    }
}

/// The MPM driver as a [`DeviceFamily`] named [`MPM_DEVICE_TYPE`].
pub struct MpmFamily {
    config: MpmConfig,
    discovery: DiscoveryClient,
    connector: Arc<dyn RpcConnector>,
    factory: Arc<dyn EndpointFactory>,
}

impl MpmFamily {
    pub fn new(config: MpmConfig, connector: Arc<dyn RpcConnector>) -> Self {
        let discovery = DiscoveryClient::new(config.discovery.clone());
        Self {
            config,
            discovery,
            connector,
            factory: Arc::new(UdpEndpointFactory),
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryClient) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_endpoint_factory(mut self, factory: Arc<dyn EndpointFactory>) -> Self {
        self.factory = factory;
        self
    }
}

#[async_trait]
impl DeviceFamily for MpmFamily {
    fn name(&self) -> &str {
        MPM_DEVICE_TYPE
    }

    async fn find(&self, hint: &DeviceAddr) -> Result<Vec<DeviceAddr>, DeviceError> {
        Ok(self.discovery.discover(hint).await?)
    }

    async fn make(&self, device_addr: &DeviceAddr) -> Result<Arc<dyn Device>, DeviceError> {
        let device = MpmDevice::open_with_factory(
            device_addr,
            &self.config,
            self.connector.as_ref(),
            self.factory.clone(),
        )
        .await?;
        Ok(Arc::new(device))
    }
}
