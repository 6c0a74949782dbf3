// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory vendor API and registry used by tests.

use crate::errors::VersionError;
use crate::version::registry::{ImageVersion, RegistryClient};
use crate::version::vendor::{ImageComponent, LatestImageInfo, OneAgentConnectionInfo, VendorApi};
use crate::version::{ClientFactory, HttpSettings};
use crate::version::registry::RegistryCredentials;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const FAKE_DIGEST: &str =
    "sha256:7ece13a07a20c77a31cc36906a10ebc90bd47970905ee61e8ed491b7f4c5d62f";

fn unavailable(endpoint: &str) -> VersionError {
    VersionError::VendorApi {
        endpoint: endpoint.to_string(),
        reason: "HTTP 503 Service Unavailable: unavailable".to_string(),
    }
}

/// Vendor API answering from fixed values. `None` fields fail with a 503.
#[derive(Default)]
pub struct FakeVendor {
    pub agent_version: Option<String>,
    pub active_gate_version: Option<String>,
    pub latest_image: Option<LatestImageInfo>,
    pub connection_info: Option<OneAgentConnectionInfo>,
    pub calls: AtomicUsize,
}

impl FakeVendor {
    pub fn with_agent_version(version: &str) -> Self {
        Self {
            agent_version: Some(version.to_string()),
            active_gate_version: Some(version.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VendorApi for FakeVendor {
    async fn latest_agent_version(&self) -> Result<String, VersionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.agent_version.clone().ok_or_else(|| unavailable("agent"))
    }

    async fn latest_active_gate_version(&self) -> Result<String, VersionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.active_gate_version
            .clone()
            .ok_or_else(|| unavailable("gateway"))
    }

    async fn latest_image(&self, _component: ImageComponent) -> Result<LatestImageInfo, VersionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.latest_image.clone().ok_or_else(|| unavailable("image"))
    }

    async fn one_agent_connection_info(&self) -> Result<OneAgentConnectionInfo, VersionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.connection_info
            .clone()
            .ok_or_else(|| unavailable("connectioninfo"))
    }
}

/// Registry returning one digest for every image.
pub struct FakeRegistry {
    pub digest: String,
    pub image_type: Option<String>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl Default for FakeRegistry {
    fn default() -> Self {
        Self {
            digest: FAKE_DIGEST.to_string(),
            image_type: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeRegistry {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn image_version(&self, image: &str) -> Result<ImageVersion, VersionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VersionError::Registry {
                image: image.to_string(),
                reason: "HTTP 500 Internal Server Error".to_string(),
            });
        }
        Ok(ImageVersion {
            digest: self.digest.clone(),
            version: None,
            r#type: self.image_type.clone(),
        })
    }
}

/// Hands out shared fakes instead of HTTP clients.
#[derive(Clone, Default)]
pub struct FakeClientFactory {
    pub vendor: Arc<FakeVendor>,
    pub registry: Arc<FakeRegistry>,
}

struct SharedVendor(Arc<FakeVendor>);
struct SharedRegistry(Arc<FakeRegistry>);

#[async_trait]
impl VendorApi for SharedVendor {
    async fn latest_agent_version(&self) -> Result<String, VersionError> {
        self.0.latest_agent_version().await
    }

    async fn latest_active_gate_version(&self) -> Result<String, VersionError> {
        self.0.latest_active_gate_version().await
    }

    async fn latest_image(&self, component: ImageComponent) -> Result<LatestImageInfo, VersionError> {
        self.0.latest_image(component).await
    }

    async fn one_agent_connection_info(&self) -> Result<OneAgentConnectionInfo, VersionError> {
        self.0.one_agent_connection_info().await
    }
}

#[async_trait]
impl RegistryClient for SharedRegistry {
    async fn image_version(&self, image: &str) -> Result<ImageVersion, VersionError> {
        self.0.image_version(image).await
    }
}

impl ClientFactory for FakeClientFactory {
    fn vendor(
        &self,
        _api_url: &str,
        _api_token: &str,
        _http: &HttpSettings,
    ) -> anyhow::Result<Box<dyn VendorApi>> {
        Ok(Box::new(SharedVendor(Arc::clone(&self.vendor))))
    }

    fn registry(
        &self,
        _credentials: RegistryCredentials,
        _http: &HttpSettings,
    ) -> anyhow::Result<Box<dyn RegistryClient>> {
        Ok(Box::new(SharedRegistry(Arc::clone(&self.registry))))
    }
}
