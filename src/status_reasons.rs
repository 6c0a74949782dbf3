// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition types and reasons for operator resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a
//! condition has a particular status. Types name the aspect being reported.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   phase: Running
//!   conditions:
//!     - type: OneAgentVersion
//!       status: "True"
//!       reason: Verified
//!       message: Version verified for component.
//!     - type: Ready
//!       status: "True"
//!       reason: StatefulSetCreated
//!       message: dk-otel-collector created
//! ```

// ============================================================================
// Condition Status Values
// ============================================================================

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Condition Types
// ============================================================================

/// Collector workload condition.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Tokens secret condition.
pub const CONDITION_TYPE_TOKENS: &str = "Tokens";

/// Generated collector configuration condition.
pub const CONDITION_TYPE_COLLECTOR_CONFIG: &str = "TelemetryIngestConfiguration";

/// Version condition of the `OneAgent` component.
pub const CONDITION_TYPE_ONE_AGENT_VERSION: &str = "OneAgentVersion";

/// Version condition of the code modules component.
pub const CONDITION_TYPE_CODE_MODULES_VERSION: &str = "CodeModulesVersion";

/// Version condition of the `ActiveGate` component.
pub const CONDITION_TYPE_ACTIVE_GATE_VERSION: &str = "ActiveGateVersion";

/// Version condition of the OpenTelemetry collector component.
pub const CONDITION_TYPE_OTEL_COLLECTOR_VERSION: &str = "OtelCollectorVersion";

/// Version condition of the `EdgeConnect` component.
pub const CONDITION_TYPE_EDGE_CONNECT_VERSION: &str = "EdgeConnectVersion";

/// Connection info condition.
pub const CONDITION_TYPE_CONNECTION_INFO: &str = "ConnectionInfo";

/// `EdgeConnect` deployment condition.
pub const CONDITION_TYPE_DEPLOYMENT: &str = "Deployment";

// ============================================================================
// Workload Reasons
// ============================================================================

/// The collector `StatefulSet` was created or updated.
pub const REASON_STATEFULSET_CREATED: &str = "StatefulSetCreated";

/// The `EdgeConnect` `Deployment` was created or updated.
pub const REASON_DEPLOYMENT_CREATED: &str = "DeploymentCreated";

/// A call to the Kubernetes API failed.
pub const REASON_KUBE_API_ERROR: &str = "KubeApiError";

/// A required token is missing from the tokens secret.
pub const REASON_TOKEN_MISSING: &str = "TokenMissing";

/// All required tokens are present.
pub const REASON_TOKEN_READY: &str = "TokenReady";

/// The generated configuration changed and pods will roll.
pub const REASON_CONFIG_OUTDATED: &str = "ConfigOutdated";

/// The generated configuration is up to date.
pub const REASON_CONFIG_CREATED: &str = "ConfigCreated";

/// The generated configuration could not be produced.
pub const REASON_CONFIG_GENERATION_FAILED: &str = "ConfigGenerationFailed";

// ============================================================================
// Version Reasons
// ============================================================================

/// The pinned version was verified against the vendor API or registry.
pub const REASON_VERIFIED: &str = "Verified";

/// A custom image or version is used, no verification was done.
pub const REASON_VERIFICATION_SKIPPED: &str = "VerificationSkipped";

/// The candidate version is older than the pinned one.
pub const REASON_DOWNGRADE: &str = "Downgrade";

/// The pinned status failed validation or a version could not be parsed.
pub const REASON_VERIFICATION_FAILED: &str = "VerificationFailed";

/// The vendor API or registry could not be reached.
pub const REASON_DYNATRACE_API_ERROR: &str = "DynatraceAPIError";

/// Default message of a verified version condition.
pub const MESSAGE_VERSION_VERIFIED: &str = "Version verified for component.";

// ============================================================================
// Connection Info Reasons
// ============================================================================

/// Connection info was fetched from the vendor API.
pub const REASON_CONNECTION_INFO_UPDATED: &str = "ConnectionInfoUpdated";

/// The vendor API reported no communication endpoint.
pub const REASON_EMPTY_COMMUNICATION_HOSTS: &str = "EmptyCommunicationHosts";

// ============================================================================
// Injection Reasons (pod annotations, not conditions)
// ============================================================================

/// The tenant UUID is not yet known.
pub const REASON_EMPTY_TENANT_UUID: &str = "EmptyTenantUUID";

/// No communication host is known.
pub const REASON_EMPTY_CONNECTION_INFO: &str = "EmptyConnectionInfo";

/// Neither a code modules version nor a code modules image is known.
pub const REASON_UNKNOWN_CODE_MODULE: &str = "UnknownCodeModule";
