// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The shared version pinning pass.
//!
//! For one [`StatusUpdater`] the pass decides whether an update is due, picks
//! the image source, runs the matching update and records exactly one
//! condition for the component.
//!
//! # Source selection
//!
//! First match wins:
//! 1. custom image
//! 2. public registry (flag on and supported by the component)
//! 3. custom version
//! 4. tenant registry

use crate::constants::CUSTOM_IMAGE_VERSION;
use crate::crd::{Condition, VersionSource, VersionStatus};
use crate::errors::VersionError;
use crate::metrics;
use crate::reconcilers::status::{find_condition, remove_condition, set_condition};
use crate::status_reasons::{
    MESSAGE_VERSION_VERIFIED, REASON_DOWNGRADE, REASON_VERIFICATION_SKIPPED, REASON_VERIFIED,
    STATUS_FALSE, STATUS_TRUE,
};
use crate::timeprovider::TimeProvider;
use crate::version::registry::RegistryClient;
use crate::version::updater::{StatusUpdater, UpdateOutcome};
use crate::version::vendor::VendorApi;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the image of a component comes from, given the current spec.
pub fn determine_source<U: StatusUpdater + ?Sized>(updater: &U) -> VersionSource {
    if updater.custom_image().is_some() {
        VersionSource::CustomImage
    } else if updater.is_public_registry_enabled() {
        VersionSource::PublicRegistry
    } else if updater.custom_version().is_some() {
        VersionSource::CustomVersion
    } else {
        VersionSource::TenantRegistry
    }
}

/// Runs [`StatusUpdater`]s against the vendor API and registry of one tenant.
pub struct VersionReconciler<'a> {
    vendor: &'a dyn VendorApi,
    registry: &'a dyn RegistryClient,
    time: &'a TimeProvider,
    threshold: Duration,
}

impl<'a> VersionReconciler<'a> {
    #[must_use]
    pub fn new(
        vendor: &'a dyn VendorApi,
        registry: &'a dyn RegistryClient,
        time: &'a TimeProvider,
        threshold: Duration,
    ) -> Self {
        Self {
            vendor,
            registry,
            time,
            threshold,
        }
    }

    /// Pin the image of one component.
    ///
    /// Disabled components get their status cleared and their condition
    /// removed. A blocked downgrade is reported through the condition and is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns the [`VersionError`] of a failed probe or validation, after
    /// recording it as the component condition.
    pub async fn reconcile<U: StatusUpdater>(
        &self,
        updater: &U,
        status: &mut U::Status,
    ) -> Result<(), VersionError> {
        let condition_type = updater.condition_type();
        let (target, conditions) = updater.target(status);

        if !updater.is_enabled() {
            if !target.is_empty() {
                debug!(component = updater.name(), "Component disabled, clearing version status");
                *target = VersionStatus::default();
            }
            remove_condition(conditions, condition_type);
            return Ok(());
        }

        let outcome = if self.needs_update(updater, target) {
            self.run(updater, target).await
        } else {
            Ok(UpdateOutcome::Unchanged)
        };
        let result = outcome.and_then(|outcome| updater.validate_status(target).map(|()| outcome));

        match result {
            Ok(UpdateOutcome::Downgrade { candidate }) => {
                metrics::record_version_probe(updater.name(), "downgrade");
                set_condition(
                    conditions,
                    condition_type,
                    STATUS_FALSE,
                    REASON_DOWNGRADE,
                    &format!("Version {candidate} is older than the deployed version, update skipped."),
                );
                Ok(())
            }
            Ok(UpdateOutcome::Unchanged) => {
                if find_condition(conditions, condition_type).is_none() {
                    set_success_condition(conditions, condition_type, target);
                }
                Ok(())
            }
            Ok(outcome) => {
                let label = if outcome == UpdateOutcome::Kept { "kept" } else { "updated" };
                metrics::record_version_probe(updater.name(), label);
                set_success_condition(conditions, condition_type, target);
                Ok(())
            }
            Err(e) => {
                warn!(component = updater.name(), error = %e, "Version resolution failed");
                metrics::record_version_probe(updater.name(), "error");
                set_condition(
                    conditions,
                    condition_type,
                    STATUS_FALSE,
                    e.condition_reason(),
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    /// True when the recorded status no longer reflects the spec or the
    /// last probe is older than the threshold.
    pub fn needs_update<U: StatusUpdater + ?Sized>(
        &self,
        updater: &U,
        target: &VersionStatus,
    ) -> bool {
        if !updater.is_enabled() {
            return false;
        }

        let source = determine_source(updater);
        if target.source != Some(source) {
            debug!(component = updater.name(), source = %source, "Version source changed");
            return true;
        }

        match source {
            VersionSource::CustomImage => {
                let custom = updater.custom_image().unwrap_or_default();
                if !target.image_id.starts_with(&custom) {
                    debug!(component = updater.name(), "Custom image changed");
                    return true;
                }
            }
            VersionSource::CustomVersion => {
                if updater.custom_version().as_deref() != Some(target.version.as_str()) {
                    debug!(component = updater.name(), "Custom version changed");
                    return true;
                }
            }
            VersionSource::PublicRegistry | VersionSource::TenantRegistry => {}
        }

        if !self
            .time
            .is_outdated(target.last_probe_timestamp.as_deref(), self.threshold)
        {
            debug!(component = updater.name(), "Status is recent, skipping probe");
            return false;
        }
        true
    }

    async fn run<U: StatusUpdater>(
        &self,
        updater: &U,
        target: &mut VersionStatus,
    ) -> Result<UpdateOutcome, VersionError> {
        let source = determine_source(updater);
        let outcome = self.run_source(updater, target, source).await?;

        target.source = Some(source);
        target.last_probe_timestamp = Some(self.time.now_rfc3339());
        Ok(outcome)
    }

    async fn run_source<U: StatusUpdater>(
        &self,
        updater: &U,
        target: &mut VersionStatus,
        source: VersionSource,
    ) -> Result<UpdateOutcome, VersionError> {
        let custom_source = matches!(
            source,
            VersionSource::CustomImage | VersionSource::CustomVersion
        );
        if !updater.is_auto_update_enabled()
            && !custom_source
            && target.source == Some(source)
            && !target.image_id.is_empty()
        {
            info!(
                component = updater.name(),
                image_id = %target.image_id,
                "Auto-update disabled, keeping recorded image"
            );
            return Ok(UpdateOutcome::Kept);
        }

        match source {
            VersionSource::CustomImage => {
                target.image_id = updater.custom_image().unwrap_or_default();
                target.version = CUSTOM_IMAGE_VERSION.to_string();
                target.r#type = String::new();
                info!(component = updater.name(), image_id = %target.image_id, "Using custom image");
                Ok(UpdateOutcome::Updated)
            }
            VersionSource::PublicRegistry => {
                let latest = updater.latest_image_info(self.vendor).await?;
                if updater.check_for_downgrade(target, &latest.tag)? {
                    return Ok(UpdateOutcome::Downgrade {
                        candidate: latest.tag,
                    });
                }
                target.image_id = latest.uri();
                target.version = latest.tag;
                target.r#type = String::new();
                info!(component = updater.name(), image_id = %target.image_id, "Using public registry image");
                Ok(UpdateOutcome::Updated)
            }
            VersionSource::TenantRegistry | VersionSource::CustomVersion => {
                let outcome = updater
                    .use_tenant_registry(self.vendor, self.registry, target)
                    .await?;
                if outcome == UpdateOutcome::Updated {
                    info!(
                        component = updater.name(),
                        image_id = %target.image_id,
                        version = %target.version,
                        "Using tenant registry image"
                    );
                }
                Ok(outcome)
            }
        }
    }
}

fn set_success_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    target: &VersionStatus,
) {
    match target.source {
        Some(VersionSource::CustomImage | VersionSource::CustomVersion) => set_condition(
            conditions,
            condition_type,
            STATUS_TRUE,
            REASON_VERIFICATION_SKIPPED,
            "Custom image or version in use, verification skipped.",
        ),
        _ => set_condition(
            conditions,
            condition_type,
            STATUS_TRUE,
            REASON_VERIFIED,
            MESSAGE_VERSION_VERIFIED,
        ),
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
