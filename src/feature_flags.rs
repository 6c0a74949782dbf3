// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed view over the `feature.dynatrace.com/*` annotations of a `DynaKube`.
//!
//! Feature flags are plain annotations so they can be toggled without a CRD
//! change. Each accessor documents its default; malformed values fall back to
//! that default instead of failing the reconcile.

use crate::constants::DEFAULT_API_REQUEST_THRESHOLD_MINUTES;
use crate::labels::FEATURE_FLAG_PREFIX;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Use the public registry instead of the tenant registry for images.
pub const FLAG_PUBLIC_REGISTRY: &str = "public-registry";

/// Minutes between two vendor API probes of the same component.
pub const FLAG_API_REQUEST_THRESHOLD: &str = "api-request-threshold";

/// Inject into every pod unless the pod opts out.
pub const FLAG_AUTOMATIC_INJECTION: &str = "automatic-injection";

/// Map release labels of pods to `DT_RELEASE_*` environment variables.
pub const FLAG_LABEL_VERSION_DETECTION: &str = "label-version-detection";

/// Set a `RuntimeDefault` seccomp profile on the install container.
pub const FLAG_INIT_CONTAINER_SECCOMP: &str = "init-container-seccomp-profile";

/// Failure policy of the install container: `silent` or `fail`.
pub const FLAG_INJECTION_FAILURE_POLICY: &str = "injection-failure-policy";

/// Additional `NO_PROXY` entries for operator-managed workloads.
pub const FLAG_NO_PROXY: &str = "no-proxy";

/// Failure policy values understood by the install container.
pub const FAILURE_POLICY_SILENT: &str = "silent";
pub const FAILURE_POLICY_FAIL: &str = "fail";

/// Borrowed view over the annotations of a `DynaKube`.
#[derive(Clone, Copy, Debug)]
pub struct FeatureFlags<'a> {
    annotations: &'a BTreeMap<String, String>,
}

impl<'a> FeatureFlags<'a> {
    #[must_use]
    pub fn new(annotations: &'a BTreeMap<String, String>) -> Self {
        Self { annotations }
    }

    /// Raw value of a flag, without the prefix.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&'a str> {
        self.annotations
            .get(&format!("{FEATURE_FLAG_PREFIX}{name}"))
            .map(String::as_str)
    }

    fn bool_flag(&self, name: &str, default: bool) -> bool {
        match self.raw(name).map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            Some(v) => {
                warn!(flag = %name, value = %v, "Ignoring malformed boolean feature flag");
                default
            }
            None => default,
        }
    }

    /// Default: false.
    #[must_use]
    pub fn public_registry(&self) -> bool {
        self.bool_flag(FLAG_PUBLIC_REGISTRY, false)
    }

    /// Probe interval. Default: 15 minutes; negative or malformed values use the default.
    #[must_use]
    pub fn api_request_threshold(&self) -> Duration {
        let minutes = self
            .raw(FLAG_API_REQUEST_THRESHOLD)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|m| *m >= 0)
            .unwrap_or(DEFAULT_API_REQUEST_THRESHOLD_MINUTES);
        Duration::from_secs(u64::try_from(minutes).unwrap_or_default() * 60)
    }

    /// Default: true.
    #[must_use]
    pub fn automatic_injection(&self) -> bool {
        self.bool_flag(FLAG_AUTOMATIC_INJECTION, true)
    }

    /// Default: false.
    #[must_use]
    pub fn label_version_detection(&self) -> bool {
        self.bool_flag(FLAG_LABEL_VERSION_DETECTION, false)
    }

    /// Default: false.
    #[must_use]
    pub fn init_container_seccomp(&self) -> bool {
        self.bool_flag(FLAG_INIT_CONTAINER_SECCOMP, false)
    }

    /// Default: `silent`. Only `fail` switches the policy.
    #[must_use]
    pub fn injection_failure_policy(&self) -> &'static str {
        match self.raw(FLAG_INJECTION_FAILURE_POLICY) {
            Some(v) if v.trim() == FAILURE_POLICY_FAIL => FAILURE_POLICY_FAIL,
            _ => FAILURE_POLICY_SILENT,
        }
    }

    /// Default: none.
    #[must_use]
    pub fn no_proxy(&self) -> Option<&'a str> {
        self.raw(FLAG_NO_PROXY).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
#[path = "feature_flags_tests.rs"]
mod feature_flags_tests;
