// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-component version updaters.
//!
//! Each component whose image the operator pins implements [`StatusUpdater`].
//! The updater knows where the user overrides live on the resource, which
//! vendor API call yields the latest version and how the default tenant
//! registry image is spelled. The shared pass lives in
//! [`crate::version::reconciler`].

use crate::constants::{
    ACTIVE_GATE_IMAGE_REPOSITORY, CODE_MODULES_IMAGE_REPOSITORY, DEFAULT_COLLECTOR_IMAGE_REPOSITORY,
    DEFAULT_COLLECTOR_IMAGE_TAG, DEFAULT_EDGE_CONNECT_IMAGE_REPOSITORY, DEFAULT_EDGE_CONNECT_IMAGE_TAG,
    ONE_AGENT_IMAGE_REPOSITORY,
};
use crate::crd::{
    Condition, DynaKube, DynaKubeStatus, EdgeConnect, EdgeConnectStatus, VersionSource,
    VersionStatus, IMMUTABLE_IMAGE_TYPE,
};
use crate::errors::VersionError;
use crate::status_reasons::{
    CONDITION_TYPE_ACTIVE_GATE_VERSION, CONDITION_TYPE_CODE_MODULES_VERSION,
    CONDITION_TYPE_EDGE_CONNECT_VERSION, CONDITION_TYPE_ONE_AGENT_VERSION,
    CONDITION_TYPE_OTEL_COLLECTOR_VERSION,
};
use crate::version::image::{default_image, tag_from_image_id, ImageReference};
use crate::version::registry::RegistryClient;
use crate::version::semver::is_downgrade;
use crate::version::vendor::{ImageComponent, LatestImageInfo, VendorApi};
use async_trait::async_trait;
use tracing::debug;

/// Result of one update pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The status was (re)written.
    Updated,
    /// Auto-update is off and the recorded image was kept.
    Kept,
    /// The candidate is older than the recorded version.
    Downgrade { candidate: String },
    /// No update was due.
    Unchanged,
}

/// Version pinning hooks of one component.
#[async_trait]
pub trait StatusUpdater: Send + Sync {
    /// Status object holding the component's [`VersionStatus`].
    type Status: Send;

    fn name(&self) -> &'static str;

    fn condition_type(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    /// The pinned status of the component and the condition list it reports to.
    fn target<'s>(
        &self,
        status: &'s mut Self::Status,
    ) -> (&'s mut VersionStatus, &'s mut Vec<Condition>);

    fn custom_image(&self) -> Option<String>;

    fn custom_version(&self) -> Option<String> {
        None
    }

    fn is_auto_update_enabled(&self) -> bool {
        true
    }

    /// Public registry use requested and supported by the component.
    fn is_public_registry_enabled(&self) -> bool {
        false
    }

    /// Component name on the public image endpoint, if it has one.
    fn public_image(&self) -> Option<ImageComponent> {
        None
    }

    async fn latest_image_info(
        &self,
        vendor: &dyn VendorApi,
    ) -> Result<LatestImageInfo, VersionError> {
        let component = self.public_image().ok_or_else(|| VersionError::Validation {
            component: self.name().to_string(),
            reason: "no public image available".to_string(),
        })?;
        vendor.latest_image(component).await
    }

    /// Latest version known to the tenant.
    async fn latest_version(&self, vendor: &dyn VendorApi) -> Result<String, VersionError>;

    /// Tenant registry image for `version`.
    fn default_image(&self, version: &str) -> Result<String, VersionError>;

    /// Pin the component to the tenant registry.
    ///
    /// The version is the custom one or the latest from the vendor API; the
    /// image is probed for its digest.
    async fn use_tenant_registry(
        &self,
        vendor: &dyn VendorApi,
        registry: &dyn RegistryClient,
        target: &mut VersionStatus,
    ) -> Result<UpdateOutcome, VersionError> {
        let version = match self.custom_version() {
            Some(version) => version,
            None => {
                let latest = self.latest_version(vendor).await?;
                if self.check_for_downgrade(target, &latest)? {
                    return Ok(UpdateOutcome::Downgrade { candidate: latest });
                }
                latest
            }
        };

        let image = self.default_image(&version)?;
        let probed = set_image_id_with_digest(registry, target, &image).await?;
        target.version = version;
        target.r#type = probed.unwrap_or_default();
        Ok(UpdateOutcome::Updated)
    }

    /// True when `candidate` is older than what is recorded.
    ///
    /// The previous version is read from `version` for tenant registry
    /// sources and from the tag of `imageID` for public registry sources.
    /// Custom sources and empty statuses never count as a downgrade.
    fn check_for_downgrade(
        &self,
        target: &VersionStatus,
        candidate: &str,
    ) -> Result<bool, VersionError> {
        if target.image_id.is_empty() {
            return Ok(false);
        }
        let previous = match target.source {
            Some(VersionSource::TenantRegistry) => target.version.clone(),
            Some(VersionSource::PublicRegistry) => tag_from_image_id(&target.image_id)?,
            _ => return Ok(false),
        };
        is_downgrade(self.name(), &previous, candidate)
    }

    fn validate_status(&self, _target: &VersionStatus) -> Result<(), VersionError> {
        Ok(())
    }
}

/// Probe `image` and record a digest-qualified `imageID`.
///
/// References that already carry a digest are recorded verbatim, otherwise a
/// tag is required and the probed digest is appended. The registry is asked in
/// both cases. Returns the image type label.
///
/// # Errors
///
/// Returns an error if the reference is unusable or the registry probe fails.
pub async fn set_image_id_with_digest(
    registry: &dyn RegistryClient,
    target: &mut VersionStatus,
    image: &str,
) -> Result<Option<String>, VersionError> {
    let reference = ImageReference::parse(image)?;
    if reference.digest.is_none() && reference.tag.is_none() {
        return Err(VersionError::ImageReference {
            image: image.to_string(),
            reason: "a tag or digest is required".to_string(),
        });
    }

    let probed = registry.image_version(image).await?;

    target.image_id = if reference.digest.is_some() {
        image.to_string()
    } else {
        ImageReference {
            digest: Some(probed.digest),
            ..reference
        }
        .to_string()
    };
    debug!(image_id = %target.image_id, "Pinned image digest");
    Ok(probed.r#type)
}

// ============================================================================
// DynaKube components
// ============================================================================

/// Host agent image.
pub struct OneAgentUpdater<'a> {
    dk: &'a DynaKube,
}

impl<'a> OneAgentUpdater<'a> {
    #[must_use]
    pub fn new(dk: &'a DynaKube) -> Self {
        Self { dk }
    }
}

#[async_trait]
impl StatusUpdater for OneAgentUpdater<'_> {
    type Status = DynaKubeStatus;

    fn name(&self) -> &'static str {
        "oneagent"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_ONE_AGENT_VERSION
    }

    fn is_enabled(&self) -> bool {
        self.dk.needs_one_agent()
    }

    fn target<'s>(
        &self,
        status: &'s mut DynaKubeStatus,
    ) -> (&'s mut VersionStatus, &'s mut Vec<Condition>) {
        (&mut status.one_agent.version_status, &mut status.conditions)
    }

    fn custom_image(&self) -> Option<String> {
        self.dk.custom_one_agent_image().map(str::to_string)
    }

    fn custom_version(&self) -> Option<String> {
        self.dk.custom_one_agent_version().map(str::to_string)
    }

    fn is_auto_update_enabled(&self) -> bool {
        self.dk.should_auto_update_one_agent()
    }

    fn is_public_registry_enabled(&self) -> bool {
        self.dk.feature_flags().public_registry() && !self.dk.classic_full_stack_mode()
    }

    fn public_image(&self) -> Option<ImageComponent> {
        Some(ImageComponent::OneAgent)
    }

    async fn latest_version(&self, vendor: &dyn VendorApi) -> Result<String, VersionError> {
        vendor.latest_agent_version().await
    }

    fn default_image(&self, version: &str) -> Result<String, VersionError> {
        default_image(&self.dk.spec.api_url, ONE_AGENT_IMAGE_REPOSITORY, version)
    }

    fn validate_status(&self, target: &VersionStatus) -> Result<(), VersionError> {
        if target.version.is_empty() {
            return Err(VersionError::Validation {
                component: self.name().to_string(),
                reason: "build version of the image is not set".to_string(),
            });
        }
        if target.r#type == IMMUTABLE_IMAGE_TYPE && self.dk.classic_full_stack_mode() {
            return Err(VersionError::Validation {
                component: self.name().to_string(),
                reason: "immutable image cannot be used in classic full-stack mode".to_string(),
            });
        }
        Ok(())
    }
}

/// Code modules injected into application pods.
pub struct CodeModulesUpdater<'a> {
    dk: &'a DynaKube,
}

impl<'a> CodeModulesUpdater<'a> {
    #[must_use]
    pub fn new(dk: &'a DynaKube) -> Self {
        Self { dk }
    }
}

#[async_trait]
impl StatusUpdater for CodeModulesUpdater<'_> {
    type Status = DynaKubeStatus;

    fn name(&self) -> &'static str {
        "codemodules"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_CODE_MODULES_VERSION
    }

    fn is_enabled(&self) -> bool {
        self.dk.needs_app_injection()
    }

    fn target<'s>(
        &self,
        status: &'s mut DynaKubeStatus,
    ) -> (&'s mut VersionStatus, &'s mut Vec<Condition>) {
        (&mut status.code_modules, &mut status.conditions)
    }

    fn custom_image(&self) -> Option<String> {
        self.dk.custom_code_modules_image().map(str::to_string)
    }

    fn custom_version(&self) -> Option<String> {
        self.dk.custom_code_modules_version().map(str::to_string)
    }

    fn is_public_registry_enabled(&self) -> bool {
        self.dk.feature_flags().public_registry()
    }

    fn public_image(&self) -> Option<ImageComponent> {
        Some(ImageComponent::CodeModules)
    }

    async fn latest_version(&self, vendor: &dyn VendorApi) -> Result<String, VersionError> {
        vendor.latest_agent_version().await
    }

    fn default_image(&self, version: &str) -> Result<String, VersionError> {
        default_image(&self.dk.spec.api_url, CODE_MODULES_IMAGE_REPOSITORY, version)
    }
}

/// `ActiveGate` image, enabled by its capabilities.
pub struct ActiveGateUpdater<'a> {
    dk: &'a DynaKube,
}

impl<'a> ActiveGateUpdater<'a> {
    #[must_use]
    pub fn new(dk: &'a DynaKube) -> Self {
        Self { dk }
    }
}

#[async_trait]
impl StatusUpdater for ActiveGateUpdater<'_> {
    type Status = DynaKubeStatus;

    fn name(&self) -> &'static str {
        "activegate"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_ACTIVE_GATE_VERSION
    }

    fn is_enabled(&self) -> bool {
        self.dk.needs_active_gate()
    }

    fn target<'s>(
        &self,
        status: &'s mut DynaKubeStatus,
    ) -> (&'s mut VersionStatus, &'s mut Vec<Condition>) {
        (&mut status.active_gate, &mut status.conditions)
    }

    fn custom_image(&self) -> Option<String> {
        self.dk.custom_active_gate_image().map(str::to_string)
    }

    fn is_public_registry_enabled(&self) -> bool {
        self.dk.feature_flags().public_registry()
    }

    fn public_image(&self) -> Option<ImageComponent> {
        Some(ImageComponent::ActiveGate)
    }

    async fn latest_version(&self, vendor: &dyn VendorApi) -> Result<String, VersionError> {
        vendor.latest_active_gate_version().await
    }

    fn default_image(&self, version: &str) -> Result<String, VersionError> {
        default_image(&self.dk.spec.api_url, ACTIVE_GATE_IMAGE_REPOSITORY, version)
    }
}

/// OpenTelemetry collector image.
///
/// The collector has no tenant registry image: the default is the public
/// collector image and it is recorded without a registry probe.
pub struct CollectorUpdater<'a> {
    dk: &'a DynaKube,
}

impl<'a> CollectorUpdater<'a> {
    #[must_use]
    pub fn new(dk: &'a DynaKube) -> Self {
        Self { dk }
    }
}

#[async_trait]
impl StatusUpdater for CollectorUpdater<'_> {
    type Status = DynaKubeStatus;

    fn name(&self) -> &'static str {
        "otel-collector"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_OTEL_COLLECTOR_VERSION
    }

    fn is_enabled(&self) -> bool {
        self.dk.collector_enabled()
    }

    fn target<'s>(
        &self,
        status: &'s mut DynaKubeStatus,
    ) -> (&'s mut VersionStatus, &'s mut Vec<Condition>) {
        (&mut status.otel_collector, &mut status.conditions)
    }

    fn custom_image(&self) -> Option<String> {
        self.dk.custom_collector_image()
    }

    async fn latest_version(&self, _vendor: &dyn VendorApi) -> Result<String, VersionError> {
        Ok(DEFAULT_COLLECTOR_IMAGE_TAG.to_string())
    }

    fn default_image(&self, version: &str) -> Result<String, VersionError> {
        Ok(format!("{DEFAULT_COLLECTOR_IMAGE_REPOSITORY}:{version}"))
    }

    async fn use_tenant_registry(
        &self,
        vendor: &dyn VendorApi,
        _registry: &dyn RegistryClient,
        target: &mut VersionStatus,
    ) -> Result<UpdateOutcome, VersionError> {
        let version = self.latest_version(vendor).await?;
        target.image_id = self.default_image(&version)?;
        target.version = version;
        target.r#type = String::new();
        Ok(UpdateOutcome::Updated)
    }

    fn check_for_downgrade(
        &self,
        _target: &VersionStatus,
        _candidate: &str,
    ) -> Result<bool, VersionError> {
        Ok(false)
    }
}

// ============================================================================
// EdgeConnect
// ============================================================================

/// `EdgeConnect` image. Defaults to the public connector image.
pub struct EdgeConnectUpdater<'a> {
    ec: &'a EdgeConnect,
}

impl<'a> EdgeConnectUpdater<'a> {
    #[must_use]
    pub fn new(ec: &'a EdgeConnect) -> Self {
        Self { ec }
    }
}

#[async_trait]
impl StatusUpdater for EdgeConnectUpdater<'_> {
    type Status = EdgeConnectStatus;

    fn name(&self) -> &'static str {
        "edgeconnect"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_EDGE_CONNECT_VERSION
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn target<'s>(
        &self,
        status: &'s mut EdgeConnectStatus,
    ) -> (&'s mut VersionStatus, &'s mut Vec<Condition>) {
        (&mut status.version, &mut status.conditions)
    }

    fn custom_image(&self) -> Option<String> {
        self.ec.custom_image()
    }

    fn is_auto_update_enabled(&self) -> bool {
        self.ec.should_auto_update()
    }

    async fn latest_version(&self, _vendor: &dyn VendorApi) -> Result<String, VersionError> {
        Ok(DEFAULT_EDGE_CONNECT_IMAGE_TAG.to_string())
    }

    fn default_image(&self, version: &str) -> Result<String, VersionError> {
        Ok(format!("{DEFAULT_EDGE_CONNECT_IMAGE_REPOSITORY}:{version}"))
    }

    async fn use_tenant_registry(
        &self,
        vendor: &dyn VendorApi,
        _registry: &dyn RegistryClient,
        target: &mut VersionStatus,
    ) -> Result<UpdateOutcome, VersionError> {
        let version = self.latest_version(vendor).await?;
        target.image_id = self.default_image(&version)?;
        target.version = version;
        target.r#type = String::new();
        Ok(UpdateOutcome::Updated)
    }

    fn check_for_downgrade(
        &self,
        _target: &VersionStatus,
        _candidate: &str,
    ) -> Result<bool, VersionError> {
        Ok(false)
    }
}

#[cfg(test)]
#[path = "updater_tests.rs"]
mod updater_tests;
