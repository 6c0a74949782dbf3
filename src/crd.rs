// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) managed by the operator.
//!
//! # Resource Types
//!
//! - [`DynaKube`] - Declares the monitoring footprint of a cluster: agent mode,
//!   `ActiveGate`, telemetry ingest, extensions and metadata enrichment
//! - [`EdgeConnect`] - Auxiliary connector workload tied to a tenant
//!
//! # Example: Creating a `DynaKube`
//!
//! ```rust,no_run
//! use dynakube_operator::crd::{DynaKubeSpec, TelemetryIngestSpec};
//!
//! let spec = DynaKubeSpec {
//!     api_url: "https://abc123.live.dynatrace.com/api".to_string(),
//!     telemetry_ingest: Some(TelemetryIngestSpec::default()),
//!     ..Default::default()
//! };
//! ```

use crate::constants::{
    DEFAULT_INSTALL_PATH, EXTENSIONS_TLS_SECRET_SUFFIX, EXTENSIONS_TOKEN_SECRET_SUFFIX,
    OTEL_COLLECTOR_SUFFIX, PULL_SECRET_SUFFIX, TELEMETRY_CONFIG_MAP_SUFFIX, TENANT_SECRET_SUFFIX,
};
use crate::feature_flags::FeatureFlags;
use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration, TopologySpreadConstraint};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label selector to match Kubernetes resources.
///
/// A label selector is a label query over a set of resources. The result of matchLabels and
/// matchExpressions are `ANDed`. An empty label selector matches all objects.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Map of {key,value} pairs. A single {key,value} in the matchLabels map is equivalent
    /// to an element of matchExpressions, whose key field is "key", the operator is "In",
    /// and the values array contains only "value". All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// List of label selector requirements. All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

/// A label selector requirement is a selector that contains values, a key, and an operator
/// that relates the key and values.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct LabelSelectorRequirement {
    /// The label key that the selector applies to.
    pub key: String,

    /// Operator represents a key's relationship to a set of values.
    /// Valid operators are In, `NotIn`, Exists and `DoesNotExist`.
    pub operator: String,

    /// An array of string values. If the operator is In or `NotIn`,
    /// the values array must be non-empty. If the operator is Exists or `DoesNotExist`,
    /// the values array must be empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// Standard Kubernetes condition.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Ready` or `OneAgentVersion`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

// ============================================================================
// Version Status
// ============================================================================

/// Provenance of a pinned image reference.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    /// Image lives in the tenant registry; version comes from the vendor API
    TenantRegistry,
    /// Image lives in a globally accessible registry
    PublicRegistry,
    /// Image string supplied verbatim by the user
    CustomImage,
    /// Version supplied by the user, image in the tenant registry
    CustomVersion,
}

impl std::fmt::Display for VersionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TenantRegistry => "tenant-registry",
            Self::PublicRegistry => "public-registry",
            Self::CustomImage => "custom-image",
            Self::CustomVersion => "custom-version",
        };
        f.write_str(s)
    }
}

/// Pinned image identity of one component.
///
/// `source` and `image_id` are always written together.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    /// Where the image reference came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<VersionSource>,

    /// Fully qualified image reference, may carry both tag and digest.
    #[serde(default, rename = "imageID", skip_serializing_if = "String::is_empty")]
    pub image_id: String,

    /// Version of the component (`X.Y.Z.B-R`) or `custom-image`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Image type label: `immutable`, `mutable` or empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,

    /// Last time the vendor API or registry was probed (RFC3339 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_timestamp: Option<String>,
}

impl VersionStatus {
    /// True when nothing has been pinned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.image_id.is_empty() && self.version.is_empty()
    }
}

/// Image type value of immutable agent images.
pub const IMMUTABLE_IMAGE_TYPE: &str = "immutable";

// ============================================================================
// DynaKube
// ============================================================================

/// Proxy used for outbound calls to the tenant.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// Proxy URL given inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Name of a secret holding the proxy URL under the `proxy` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
}

/// Settings shared by the modes that deploy a host agent.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostInjectSpec {
    /// Custom agent image; takes precedence over every other version source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Custom agent version, pulled from the tenant registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Follow new versions automatically. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<bool>,

    /// Tolerations of the host agent pods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

/// Settings shared by the modes that inject code modules into application pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppInjectionSpec {
    /// Custom code modules image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_modules_image: Option<String>,

    /// Resources of the install init container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_resources: Option<ResourceRequirements>,

    /// Restricts injection to namespaces matching this selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
}

/// Host agent plus application injection.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudNativeFullStackSpec {
    #[serde(flatten)]
    pub host: HostInjectSpec,

    #[serde(flatten)]
    pub app: AppInjectionSpec,
}

/// Application injection only.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMonitoringSpec {
    /// Custom code modules version, pulled from the tenant registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(flatten)]
    pub app: AppInjectionSpec,
}

/// Agent deployment mode. At most one mode may be set.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OneAgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classic_full_stack: Option<HostInjectSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_native_full_stack: Option<CloudNativeFullStackSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_monitoring: Option<ApplicationMonitoringSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_monitoring: Option<HostInjectSpec>,
}

/// Resolved agent mode of a `DynaKube`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OneAgentMode {
    ClassicFullStack,
    CloudNativeFullStack,
    ApplicationMonitoring,
    HostMonitoring,
}

impl OneAgentMode {
    /// Mode name as reported in deployment metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassicFullStack => "classic_fullstack",
            Self::CloudNativeFullStack => "cloud_native_fullstack",
            Self::ApplicationMonitoring => "application_monitoring",
            Self::HostMonitoring => "host_monitoring",
        }
    }
}

/// In-cluster `ActiveGate`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateSpec {
    /// Enabled capabilities, e.g. `routing` or `dynatrace-api`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// Custom `ActiveGate` image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Secret holding the `ActiveGate` certificate (`server.crt`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
}

/// Telemetry ingest through the OpenTelemetry collector.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryIngestSpec {
    /// Enabled protocols. Empty means all of otlp, jaeger, statsd and zipkin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,

    /// Name of the service exposing the collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Secret with `tls.crt`/`tls.key` used by the collector receivers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ref_name: Option<String>,
}

/// Prometheus extensions executed by the collector.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionsSpec {
    /// Secret with the extensions controller certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ref_name: Option<String>,
}

/// Where an enrichment rule reads its value from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum EnrichmentRuleType {
    #[serde(rename = "LABEL")]
    Label,
    #[serde(rename = "ANNOTATION")]
    Annotation,
}

/// Copies a namespace label or annotation onto injected pods.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRule {
    pub r#type: EnrichmentRuleType,

    /// Label or annotation key on the namespace.
    pub source: String,

    /// Suffix of the `metadata.dynatrace.com/` annotation written on the pod.
    #[serde(default)]
    pub target: String,
}

/// Metadata enrichment of injected pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEnrichmentSpec {
    /// Enabled by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Restricts enrichment to namespaces matching this selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Custom rules applied after the prefixed namespace annotations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<EnrichmentRule>,
}

/// Repository and tag of an image.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRefSpec {
    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub tag: String,
}

impl ImageRefSpec {
    /// `repository:tag`, or `None` when no repository is set.
    #[must_use]
    pub fn reference(&self) -> Option<String> {
        if self.repository.is_empty() {
            return None;
        }
        if self.tag.is_empty() {
            Some(self.repository.clone())
        } else {
            Some(format!("{}:{}", self.repository, self.tag))
        }
    }
}

/// Pod template overrides of the collector `StatefulSet`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenTelemetryCollectorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageRefSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Workload templates.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesSpec {
    #[serde(default)]
    pub open_telemetry_collector: OpenTelemetryCollectorSpec,
}

/// `DynaKube` declares how a cluster is monitored.
///
/// # Example
///
/// ```yaml
/// apiVersion: dynatrace.com/v1beta1
/// kind: DynaKube
/// metadata:
///   name: dynakube
///   namespace: dynatrace
///   annotations:
///     feature.dynatrace.com/automatic-injection: "true"
/// spec:
///   apiUrl: https://abc123.live.dynatrace.com/api
///   oneAgent:
///     cloudNativeFullStack: {}
///   telemetryIngest:
///     protocols: [otlp, statsd]
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "dynatrace.com",
    version = "v1beta1",
    kind = "DynaKube",
    namespaced,
    shortname = "dk",
    doc = "DynaKube declares the monitoring footprint of a cluster: agent injection, ActiveGate, telemetry ingest and metadata enrichment.",
    printcolumn = r#"{"name":"ApiUrl","type":"string","jsonPath":".spec.apiUrl"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DynaKubeStatus")]
#[serde(rename_all = "camelCase")]
pub struct DynaKubeSpec {
    /// Tenant API URL, e.g. `https://abc123.live.dynatrace.com/api`.
    pub api_url: String,

    /// Name of the tokens secret. Defaults to the `DynaKube` name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<String>,

    /// Pull secret for tenant registry images. Defaults to `<name>-pull-secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_pull_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,

    /// Accept any certificate presented by the tenant API and registry.
    #[serde(default)]
    pub skip_cert_check: bool,

    /// Name of a configmap holding additional CA certificates under `certs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_cas: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_zone: Option<String>,

    #[serde(default)]
    pub one_agent: OneAgentSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_gate: Option<ActiveGateSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_ingest: Option<TelemetryIngestSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionsSpec>,

    #[serde(default)]
    pub metadata_enrichment: MetadataEnrichmentSpec,

    #[serde(default)]
    pub templates: TemplatesSpec,
}

/// Overall phase of a monitored resource.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    Running,
    Deploying,
    Error,
}

/// A `(protocol, host, port)` the agent uses to reach the tenant.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationHost {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

/// Connection details of the tenant as reported by the vendor API.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_uuid: String,

    /// Comma separated communication endpoints.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoints: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communication_hosts: Vec<CommunicationHost>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request: Option<String>,
}

impl ConnectionInfo {
    /// The communication route is clear when both the tenant and at least one host are known.
    #[must_use]
    pub fn route_is_clear(&self) -> bool {
        !self.tenant_uuid.is_empty() && !self.communication_hosts.is_empty()
    }
}

/// Agent part of the `DynaKube` status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OneAgentStatus {
    #[serde(default)]
    pub version_status: VersionStatus,

    #[serde(default)]
    pub connection_info: ConnectionInfo,
}

/// `DynaKube` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DynaKubeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// UID of the `kube-system` namespace, used as the cluster identity.
    #[serde(default, rename = "kubeSystemUUID", skip_serializing_if = "String::is_empty")]
    pub kube_system_uuid: String,

    /// Monitored entity ID of the cluster in the tenant.
    #[serde(default, rename = "kubernetesClusterMEID", skip_serializing_if = "String::is_empty")]
    pub kubernetes_cluster_meid: String,

    #[serde(default)]
    pub one_agent: OneAgentStatus,

    #[serde(default)]
    pub code_modules: VersionStatus,

    #[serde(default)]
    pub active_gate: VersionStatus,

    #[serde(default)]
    pub otel_collector: VersionStatus,
}

static EMPTY_ANNOTATIONS: BTreeMap<String, String> = BTreeMap::new();

impl DynaKube {
    /// Feature flags read from the `feature.dynatrace.com/*` annotations.
    #[must_use]
    pub fn feature_flags(&self) -> FeatureFlags<'_> {
        FeatureFlags::new(
            self.metadata
                .annotations
                .as_ref()
                .unwrap_or(&EMPTY_ANNOTATIONS),
        )
    }

    /// Annotations of the `DynaKube` itself.
    #[must_use]
    pub fn annotations_or_empty(&self) -> &BTreeMap<String, String> {
        self.metadata
            .annotations
            .as_ref()
            .unwrap_or(&EMPTY_ANNOTATIONS)
    }

    /// Status, or an empty one when the resource has never been reconciled.
    #[must_use]
    pub fn status_or_default(&self) -> DynaKubeStatus {
        self.status.clone().unwrap_or_default()
    }

    /// The configured agent mode, if any.
    #[must_use]
    pub fn one_agent_mode(&self) -> Option<OneAgentMode> {
        let oa = &self.spec.one_agent;
        if oa.classic_full_stack.is_some() {
            Some(OneAgentMode::ClassicFullStack)
        } else if oa.cloud_native_full_stack.is_some() {
            Some(OneAgentMode::CloudNativeFullStack)
        } else if oa.application_monitoring.is_some() {
            Some(OneAgentMode::ApplicationMonitoring)
        } else if oa.host_monitoring.is_some() {
            Some(OneAgentMode::HostMonitoring)
        } else {
            None
        }
    }

    #[must_use]
    pub fn classic_full_stack_mode(&self) -> bool {
        self.spec.one_agent.classic_full_stack.is_some()
    }

    /// True when a host agent is deployed.
    #[must_use]
    pub fn needs_one_agent(&self) -> bool {
        matches!(
            self.one_agent_mode(),
            Some(
                OneAgentMode::ClassicFullStack
                    | OneAgentMode::CloudNativeFullStack
                    | OneAgentMode::HostMonitoring
            )
        )
    }

    /// True when code modules are injected into application pods.
    #[must_use]
    pub fn needs_app_injection(&self) -> bool {
        matches!(
            self.one_agent_mode(),
            Some(OneAgentMode::CloudNativeFullStack | OneAgentMode::ApplicationMonitoring)
        )
    }

    fn host_inject_spec(&self) -> Option<&HostInjectSpec> {
        let oa = &self.spec.one_agent;
        oa.classic_full_stack
            .as_ref()
            .or(oa.cloud_native_full_stack.as_ref().map(|c| &c.host))
            .or(oa.host_monitoring.as_ref())
    }

    fn app_injection_spec(&self) -> Option<&AppInjectionSpec> {
        let oa = &self.spec.one_agent;
        oa.cloud_native_full_stack
            .as_ref()
            .map(|c| &c.app)
            .or(oa.application_monitoring.as_ref().map(|a| &a.app))
    }

    /// User supplied agent image, empty strings count as unset.
    #[must_use]
    pub fn custom_one_agent_image(&self) -> Option<&str> {
        self.host_inject_spec()
            .and_then(|h| h.image.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// User supplied agent version, empty strings count as unset.
    #[must_use]
    pub fn custom_one_agent_version(&self) -> Option<&str> {
        self.host_inject_spec()
            .and_then(|h| h.version.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Whether the host agent follows new versions. Defaults to true.
    #[must_use]
    pub fn should_auto_update_one_agent(&self) -> bool {
        self.host_inject_spec()
            .and_then(|h| h.auto_update)
            .unwrap_or(true)
    }

    /// User supplied code modules image.
    #[must_use]
    pub fn custom_code_modules_image(&self) -> Option<&str> {
        self.app_injection_spec()
            .and_then(|a| a.code_modules_image.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// User supplied code modules version (application monitoring only).
    #[must_use]
    pub fn custom_code_modules_version(&self) -> Option<&str> {
        self.spec
            .one_agent
            .application_monitoring
            .as_ref()
            .and_then(|a| a.version.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Namespace selector restricting agent injection.
    #[must_use]
    pub fn one_agent_namespace_selector(&self) -> Option<&LabelSelector> {
        self.app_injection_spec()
            .and_then(|a| a.namespace_selector.as_ref())
    }

    /// Resources of the install init container.
    #[must_use]
    pub fn init_resources(&self) -> Option<&ResourceRequirements> {
        self.app_injection_spec()
            .and_then(|a| a.init_resources.as_ref())
    }

    #[must_use]
    pub fn needs_active_gate(&self) -> bool {
        self.spec
            .active_gate
            .as_ref()
            .is_some_and(|ag| !ag.capabilities.is_empty())
    }

    #[must_use]
    pub fn custom_active_gate_image(&self) -> Option<&str> {
        self.spec
            .active_gate
            .as_ref()
            .and_then(|ag| ag.image.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// `ActiveGate` TLS secret, only meaningful when the `ActiveGate` is deployed.
    #[must_use]
    pub fn active_gate_tls_secret(&self) -> Option<&str> {
        if !self.needs_active_gate() {
            return None;
        }
        self.spec
            .active_gate
            .as_ref()
            .and_then(|ag| ag.tls_secret_name.as_deref())
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn telemetry_ingest_enabled(&self) -> bool {
        self.spec.telemetry_ingest.is_some()
    }

    #[must_use]
    pub fn extensions_enabled(&self) -> bool {
        self.spec.extensions.is_some()
    }

    /// The collector runs whenever telemetry ingest or extensions are configured.
    #[must_use]
    pub fn collector_enabled(&self) -> bool {
        self.telemetry_ingest_enabled() || self.extensions_enabled()
    }

    /// Custom collector image from the template image ref.
    #[must_use]
    pub fn custom_collector_image(&self) -> Option<String> {
        self.spec
            .templates
            .open_telemetry_collector
            .image_ref
            .as_ref()
            .and_then(ImageRefSpec::reference)
    }

    /// Custom TLS secret of the telemetry ingest receivers.
    #[must_use]
    pub fn telemetry_ingest_tls_ref(&self) -> Option<&str> {
        self.spec
            .telemetry_ingest
            .as_ref()
            .and_then(|t| t.tls_ref_name.as_deref())
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn metadata_enrichment_enabled(&self) -> bool {
        self.spec.metadata_enrichment.enabled.unwrap_or(true)
    }

    #[must_use]
    pub fn otel_collector_statefulset_name(&self) -> String {
        format!("{}{OTEL_COLLECTOR_SUFFIX}", self.name_any())
    }

    #[must_use]
    pub fn telemetry_config_map_name(&self) -> String {
        format!("{}{TELEMETRY_CONFIG_MAP_SUFFIX}", self.name_any())
    }

    /// Name of the tokens secret.
    #[must_use]
    pub fn tokens(&self) -> String {
        self.spec
            .tokens
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    #[must_use]
    pub fn extensions_token_secret_name(&self) -> String {
        format!("{}{EXTENSIONS_TOKEN_SECRET_SUFFIX}", self.name_any())
    }

    /// Extensions controller TLS secret: the custom one or the generated default.
    #[must_use]
    pub fn extensions_tls_secret_name(&self) -> String {
        self.spec
            .extensions
            .as_ref()
            .and_then(|e| e.tls_ref_name.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}{EXTENSIONS_TLS_SECRET_SUFFIX}", self.name_any()))
    }

    /// Secret holding the agent tenant token.
    #[must_use]
    pub fn tenant_secret_name(&self) -> String {
        format!("{}{TENANT_SECRET_SUFFIX}", self.name_any())
    }

    /// Pull secret of tenant registry images.
    #[must_use]
    pub fn pull_secret_name(&self) -> String {
        self.spec
            .custom_pull_secret
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}{PULL_SECRET_SUFFIX}", self.name_any()))
    }

    /// Default agent install path inside injected containers.
    #[must_use]
    pub fn install_path(&self) -> &'static str {
        DEFAULT_INSTALL_PATH
    }

    /// Tenant UUID recorded in the connection info.
    #[must_use]
    pub fn tenant_uuid(&self) -> String {
        self.status
            .as_ref()
            .map(|s| s.one_agent.connection_info.tenant_uuid.clone())
            .unwrap_or_default()
    }
}

// ============================================================================
// EdgeConnect
// ============================================================================

/// `EdgeConnect` runs a connector that lets the tenant reach in-cluster services.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "dynatrace.com",
    version = "v1alpha1",
    kind = "EdgeConnect",
    namespaced,
    shortname = "ec",
    doc = "EdgeConnect deploys a connector workload that bridges the tenant and in-cluster services.",
    printcolumn = r#"{"name":"ApiServer","type":"string","jsonPath":".spec.apiServer"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "EdgeConnectStatus")]
#[serde(rename_all = "camelCase")]
pub struct EdgeConnectSpec {
    /// Tenant host, e.g. `abc123.apps.dynatrace.com`.
    pub api_server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageRefSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Follow new versions automatically. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_pull_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_patterns: Vec<String>,
}

/// `EdgeConnect` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConnectStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub version: VersionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl EdgeConnect {
    #[must_use]
    pub fn should_auto_update(&self) -> bool {
        self.spec.auto_update.unwrap_or(true)
    }

    #[must_use]
    pub fn custom_image(&self) -> Option<String> {
        self.spec
            .image_ref
            .as_ref()
            .and_then(ImageRefSpec::reference)
    }
}
