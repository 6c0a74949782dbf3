// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Image reference parsing and default tenant registry URIs.

use crate::constants::TENANT_REGISTRY_OS;
use crate::errors::VersionError;
use std::fmt;

/// An image reference split into `repository[:tag][@digest]`.
///
/// The repository keeps its registry host, e.g. `abc.live.dynatrace.com/linux/oneagent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference. Fails only for empty input or an empty repository.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::ImageReference`] for empty references.
    pub fn parse(image: &str) -> Result<Self, VersionError> {
        let invalid = |reason: &str| VersionError::ImageReference {
            image: image.to_string(),
            reason: reason.to_string(),
        };

        let image = image.trim();
        if image.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (name, digest) = match image.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(invalid("empty digest")),
            None => (image, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a registry port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        if repository.is_empty() {
            return Err(invalid("empty repository"));
        }
        if tag.as_deref() == Some("") {
            return Err(invalid("empty tag"));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Registry host of the repository, or `None` for Docker Hub shorthand.
    #[must_use]
    pub fn registry(&self) -> Option<&str> {
        let (first, _) = self.repository.split_once('/')?;
        (first.contains('.') || first.contains(':') || first == "localhost").then_some(first)
    }

    /// Repository path without the registry host.
    #[must_use]
    pub fn path(&self) -> &str {
        match self.registry() {
            Some(registry) => &self.repository[registry.len() + 1..],
            None => &self.repository,
        }
    }

    /// Tag if present, else digest. Used when asking a registry for a manifest.
    #[must_use]
    pub fn manifest_reference(&self) -> Option<&str> {
        self.digest.as_deref().or(self.tag.as_deref())
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Tag part of a recorded image ID. Digest-only references are rejected.
///
/// # Errors
///
/// Returns [`VersionError::ImageReference`] when the reference has no tag.
pub fn tag_from_image_id(image_id: &str) -> Result<String, VersionError> {
    let reference = ImageReference::parse(image_id)?;
    reference.tag.ok_or_else(|| VersionError::ImageReference {
        image: image_id.to_string(),
        reason: "no tag found to check for downgrade".to_string(),
    })
}

/// Host of the tenant registry derived from the API URL.
///
/// # Errors
///
/// Returns [`VersionError::InvalidApiUrl`] if the URL has no host.
pub fn registry_host(api_url: &str) -> Result<String, VersionError> {
    let parsed = url::Url::parse(api_url).map_err(|e| VersionError::InvalidApiUrl {
        url: api_url.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed.host_str().ok_or_else(|| VersionError::InvalidApiUrl {
        url: api_url.to_string(),
        reason: "missing host".to_string(),
    })?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Default tenant registry image, `<host>/linux/<repository>[:<tag>]`.
///
/// # Errors
///
/// Returns [`VersionError::InvalidApiUrl`] if the host cannot be derived.
pub fn default_image(api_url: &str, repository: &str, tag: &str) -> Result<String, VersionError> {
    let host = registry_host(api_url)?;
    let base = format!("{host}/{TENANT_REGISTRY_OS}/{repository}");
    Ok(if tag.is_empty() {
        base
    } else {
        format!("{base}:{tag}")
    })
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod image_tests;
