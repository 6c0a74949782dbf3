// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Minimal OCI distribution client used to pin image digests.
//!
//! For an image reference the client fetches the manifest, records the
//! `Docker-Content-Digest`, follows an image index to its `linux/amd64` entry
//! and reads the config blob labels `com.dynatrace.type` and
//! `com.dynatrace.build-version`.
//!
//! Credentials come from the `.dockerconfigjson` of the pull secret.

use crate::constants::{IMAGE_TYPE_LABEL, IMAGE_VERSION_LABEL};
use crate::errors::VersionError;
use crate::version::image::ImageReference;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

/// Default registry for references without a host.
const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json";

/// What the registry reports about one image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageVersion {
    /// `sha256:<hex>` of the top-level manifest.
    pub digest: String,
    /// Value of the `com.dynatrace.build-version` label.
    pub version: Option<String>,
    /// Value of the `com.dynatrace.type` label.
    pub r#type: Option<String>,
}

/// Registry lookups needed to pin an image.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn image_version(&self, image: &str) -> Result<ImageVersion, VersionError>;
}

/// Username and password per registry host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryCredentials {
    auths: BTreeMap<String, (String, String)>,
}

#[derive(Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuth>,
}

#[derive(Deserialize)]
struct DockerAuth {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    auth: Option<String>,
}

impl RegistryCredentials {
    /// Parse the content of a `.dockerconfigjson` key.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON.
    pub fn from_docker_config(raw: &[u8]) -> anyhow::Result<Self> {
        let config: DockerConfig = serde_json::from_slice(raw)?;
        let mut auths = BTreeMap::new();
        for (host, entry) in config.auths {
            let pair = match (entry.username, entry.password, entry.auth) {
                (Some(user), Some(pass), _) => Some((user, pass)),
                (_, _, Some(auth)) => base64::engine::general_purpose::STANDARD
                    .decode(auth)
                    .ok()
                    .and_then(|decoded| String::from_utf8(decoded).ok())
                    .and_then(|decoded| {
                        decoded
                            .split_once(':')
                            .map(|(u, p)| (u.to_string(), p.to_string()))
                    }),
                _ => None,
            };
            if let Some(pair) = pair {
                auths.insert(normalize_host(&host).to_string(), pair);
            }
        }
        Ok(Self { auths })
    }

    #[must_use]
    pub fn for_host(&self, host: &str) -> Option<&(String, String)> {
        self.auths.get(host)
    }
}

fn normalize_host(host: &str) -> &str {
    let host = host
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    host.split('/').next().unwrap_or(host)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Vec<ManifestEntry>,
    #[serde(default)]
    config: Option<Descriptor>,
}

#[derive(Deserialize)]
struct ManifestEntry {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Deserialize)]
struct Platform {
    architecture: String,
    os: String,
}

#[derive(Deserialize)]
struct Descriptor {
    digest: String,
}

#[derive(Deserialize)]
struct ImageConfig {
    #[serde(default)]
    config: Option<ImageConfigInner>,
}

#[derive(Deserialize)]
struct ImageConfigInner {
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
}

/// [`RegistryClient`] speaking the OCI distribution API over reqwest.
pub struct OciRegistryClient {
    http: HttpClient,
    credentials: RegistryCredentials,
    scheme: &'static str,
}

impl OciRegistryClient {
    #[must_use]
    pub fn new(http: HttpClient, credentials: RegistryCredentials) -> Self {
        Self {
            http,
            credentials,
            scheme: "https",
        }
    }

    /// Talk plain HTTP, for local registries.
    #[must_use]
    pub fn with_plain_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    async fn fetch(
        &self,
        host: &str,
        url: &str,
        image: &str,
        accept: &str,
    ) -> Result<(Option<String>, Vec<u8>), VersionError> {
        let failed = |reason: String| VersionError::Registry {
            image: image.to_string(),
            reason,
        };

        let mut request = self.http.get(url).header("Accept", accept);
        if let Some((user, pass)) = self.credentials.for_host(host) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request
            .send()
            .await
            .map_err(|e| failed(format!("failed to send request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {status} for {url}")));
        }

        let digest = response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| failed(format!("failed to read body: {e}")))?;
        Ok((digest, body.to_vec()))
    }
}

fn sha256_digest(body: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(body))
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    async fn image_version(&self, image: &str) -> Result<ImageVersion, VersionError> {
        let reference = ImageReference::parse(image)?;
        let host = reference.registry().unwrap_or(DOCKER_HUB_REGISTRY).to_string();
        let path = reference.path().to_string();
        let manifest_ref = reference
            .manifest_reference()
            .unwrap_or("latest")
            .to_string();
        let base = format!("{}://{host}/v2/{path}", self.scheme);
        let decode_failed = |reason: String| VersionError::Registry {
            image: image.to_string(),
            reason,
        };

        debug!(image = %image, "Probing registry for image digest");

        let (header_digest, body) = self
            .fetch(&host, &format!("{base}/manifests/{manifest_ref}"), image, MANIFEST_ACCEPT)
            .await?;
        let digest = header_digest.unwrap_or_else(|| sha256_digest(&body));

        let mut manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| decode_failed(format!("invalid manifest: {e}")))?;

        let is_index = manifest
            .media_type
            .as_deref()
            .is_some_and(|m| m.contains("index") || m.contains("manifest.list"))
            || !manifest.manifests.is_empty();
        if is_index {
            let entry = manifest
                .manifests
                .iter()
                .find(|m| {
                    m.platform
                        .as_ref()
                        .is_some_and(|p| p.os == "linux" && p.architecture == "amd64")
                })
                .or_else(|| manifest.manifests.first())
                .ok_or_else(|| decode_failed("empty image index".to_string()))?;
            let (_, child) = self
                .fetch(&host, &format!("{base}/manifests/{}", entry.digest), image, MANIFEST_ACCEPT)
                .await?;
            manifest = serde_json::from_slice(&child)
                .map_err(|e| decode_failed(format!("invalid manifest: {e}")))?;
        }

        let labels = match manifest.config {
            Some(config) => {
                let (_, blob) = self
                    .fetch(&host, &format!("{base}/blobs/{}", config.digest), image, "*/*")
                    .await?;
                let config: ImageConfig = serde_json::from_slice(&blob)
                    .map_err(|e| decode_failed(format!("invalid image config: {e}")))?;
                config.config.and_then(|c| c.labels).unwrap_or_default()
            }
            None => BTreeMap::new(),
        };

        Ok(ImageVersion {
            digest,
            version: labels.get(IMAGE_VERSION_LABEL).cloned(),
            r#type: labels.get(IMAGE_TYPE_LABEL).cloned(),
        })
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
