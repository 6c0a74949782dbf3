// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Image version resolution.
//!
//! The operator pins the image of every component it deploys or injects:
//! - [`semver`] - agent version parsing and downgrade detection
//! - [`image`] - image references and default tenant registry URIs
//! - [`vendor`] - tenant deployment API client
//! - [`registry`] - OCI registry digest probe
//! - [`updater`] - per-component [`updater::StatusUpdater`] implementations
//! - [`reconciler`] - the pinning pass shared by all components
//!
//! HTTP clients are built per resource through a [`ClientFactory`] so proxy
//! and trusted CA settings of each `DynaKube` are honoured.

pub mod image;
pub mod reconciler;
pub mod registry;
pub mod semver;
pub mod updater;
pub mod vendor;

#[cfg(test)]
pub mod testing;

use crate::version::registry::{OciRegistryClient, RegistryClient, RegistryCredentials};
use crate::version::vendor::{DynatraceClient, VendorApi};
use anyhow::{Context as _, Result};
use reqwest::Client as HttpClient;
use std::time::Duration;

/// Timeout of a single vendor API or registry request.
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Outbound HTTP settings of one resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpSettings {
    /// Proxy URL for all requests.
    pub proxy: Option<String>,
    /// Additional PEM encoded root certificates.
    pub trusted_ca_pem: Option<String>,
    /// Accept any server certificate.
    pub skip_cert_check: bool,
}

impl HttpSettings {
    /// Build a single-attempt reqwest client.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL or a certificate is invalid.
    pub fn build_client(&self) -> Result<HttpClient> {
        let mut builder = HttpClient::builder().timeout(Duration::from_secs(HTTP_TIMEOUT_SECS));

        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid proxy URL")?);
        }

        if let Some(pem) = self.trusted_ca_pem.as_deref() {
            for cert in reqwest::Certificate::from_pem_bundle(pem.as_bytes())
                .context("invalid trusted CA bundle")?
            {
                builder = builder.add_root_certificate(cert);
            }
        }

        if self.skip_cert_check {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().context("failed to build HTTP client")
    }
}

/// Creates vendor API and registry clients for a resource.
pub trait ClientFactory: Send + Sync {
    /// Client for the tenant deployment API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    fn vendor(
        &self,
        api_url: &str,
        api_token: &str,
        http: &HttpSettings,
    ) -> Result<Box<dyn VendorApi>>;

    /// Client for the image registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    fn registry(
        &self,
        credentials: RegistryCredentials,
        http: &HttpSettings,
    ) -> Result<Box<dyn RegistryClient>>;
}

/// [`ClientFactory`] backed by reqwest.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestClientFactory;

impl ClientFactory for ReqwestClientFactory {
    fn vendor(
        &self,
        api_url: &str,
        api_token: &str,
        http: &HttpSettings,
    ) -> Result<Box<dyn VendorApi>> {
        Ok(Box::new(DynatraceClient::new(
            http.build_client()?,
            api_url,
            api_token,
        )))
    }

    fn registry(
        &self,
        credentials: RegistryCredentials,
        http: &HttpSettings,
    ) -> Result<Box<dyn RegistryClient>> {
        Ok(Box::new(OciRegistryClient::new(
            http.build_client()?,
            credentials,
        )))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
