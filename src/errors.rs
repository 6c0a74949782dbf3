// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Structured error types for version resolution, configuration generation and
//! the admission webhook.
//!
//! Reconcilers work with `anyhow::Result` and wrap these errors with call-site
//! context. The typed variants exist so callers can map a failure to a status
//! condition reason (see [`VersionError::condition_reason`]).

use crate::status_reasons::{REASON_DYNATRACE_API_ERROR, REASON_VERIFICATION_FAILED};
use thiserror::Error;

/// Errors raised while resolving or validating the image of a component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// A version string does not follow `X.Y.Z.B[-R]`.
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion {
        /// The offending version string
        version: String,
        /// What part failed to parse
        reason: String,
    },

    /// An image reference lacks the parts required for the operation.
    #[error("invalid image reference '{image}': {reason}")]
    ImageReference {
        /// The offending image reference
        image: String,
        /// Why it was rejected
        reason: String,
    },

    /// The vendor API returned an error or could not be reached.
    #[error("vendor API request to {endpoint} failed: {reason}")]
    VendorApi {
        /// Path of the request
        endpoint: String,
        /// Transport error or HTTP status with body
        reason: String,
    },

    /// The image registry returned an error or could not be reached.
    #[error("registry probe of '{image}' failed: {reason}")]
    Registry {
        /// Image being probed
        image: String,
        /// Transport error or HTTP status
        reason: String,
    },

    /// A token required for the vendor API is missing.
    #[error("token '{key}' missing from secret '{secret}'")]
    MissingToken {
        /// Secret that should hold the token
        secret: String,
        /// Data key of the token
        key: String,
    },

    /// The `apiUrl` of the resource cannot be used to derive registry paths.
    #[error("invalid api url '{url}': {reason}")]
    InvalidApiUrl {
        /// The configured URL
        url: String,
        /// Parse failure
        reason: String,
    },

    /// The resolved status is not acceptable for the current spec.
    #[error("{component} status validation failed: {reason}")]
    Validation {
        /// Component name
        component: String,
        /// Violated rule
        reason: String,
    },
}

impl VersionError {
    /// Condition reason to record for this error.
    #[must_use]
    pub fn condition_reason(&self) -> &'static str {
        match self {
            Self::VendorApi { .. }
            | Self::Registry { .. }
            | Self::MissingToken { .. }
            | Self::InvalidApiUrl { .. } => REASON_DYNATRACE_API_ERROR,
            Self::InvalidVersion { .. } | Self::ImageReference { .. } | Self::Validation { .. } => {
                REASON_VERIFICATION_FAILED
            }
        }
    }
}

/// Errors raised by the collector configuration generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A protocol outside of otlp, jaeger, statsd and zipkin was requested.
    #[error("unknown telemetry protocol '{protocol}'")]
    UnknownProtocol {
        /// The requested protocol
        protocol: String,
    },

    /// Exporters were enabled without a required substitution.
    #[error("exporters require {option} to be set")]
    MissingSubstitution {
        /// Name of the missing option
        option: &'static str,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize collector configuration: {reason}")]
    Serialization {
        /// Serializer error
        reason: String,
    },
}

/// Errors raised while handling an admission request.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// The admission review could not be turned into a pod request.
    #[error("malformed admission request: {reason}")]
    Decode {
        /// Decoder error
        reason: String,
    },

    /// A cluster lookup needed to mutate the pod failed.
    #[error("failed to look up {kind} '{name}': {source}")]
    Lookup {
        /// Kind that was looked up
        kind: &'static str,
        /// Name that was looked up
        name: String,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The mutated pod could not be diffed into a JSON patch.
    #[error("failed to build JSON patch: {reason}")]
    Patch {
        /// Serializer error
        reason: String,
    },

    /// A mutator failed hard.
    #[error("mutator '{mutator}' failed: {source}")]
    Mutator {
        /// Name of the failing mutator
        mutator: &'static str,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
