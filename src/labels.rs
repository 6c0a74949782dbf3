// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across reconcilers and the webhook.
//!
//! This module defines standard Kubernetes labels and the operator-specific
//! labels/annotations to ensure consistency across all resources the operator
//! creates or mutates.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the version of an application
pub const K8S_VERSION: &str = "app.kubernetes.io/version";

/// Node label holding the CPU architecture
pub const K8S_ARCH: &str = "kubernetes.io/arch";

/// Node label holding the operating system
pub const K8S_OS: &str = "kubernetes.io/os";

/// Node label holding the host name
pub const K8S_HOSTNAME: &str = "kubernetes.io/hostname";

/// Node label holding the availability zone
pub const K8S_ZONE: &str = "topology.kubernetes.io/zone";

/// Pod label holding the `StatefulSet` pod name
pub const STATEFULSET_POD_NAME: &str = "statefulset.kubernetes.io/pod-name";

/// Pod label holding the `StatefulSet` pod ordinal
pub const STATEFULSET_POD_INDEX: &str = "apps.kubernetes.io/pod-index";

// ============================================================================
// Label Values
// ============================================================================

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_OPERATOR: &str = "dynatrace-operator";

/// Value for `app.kubernetes.io/name`
pub const APP_NAME: &str = "dynatrace-operator";

/// Component value for the OpenTelemetry collector
pub const COMPONENT_OTEL_COLLECTOR: &str = "dynatrace-otel-collector";

/// Component value for `EdgeConnect`
pub const COMPONENT_EDGE_CONNECT: &str = "dynatrace-edgeconnect";

// ============================================================================
// Operator Labels
// ============================================================================

/// Namespace label naming the `DynaKube` that governs injection in that namespace
pub const INJECTION_INSTANCE_LABEL: &str = "dynakube.internal.dynatrace.com/instance";

// ============================================================================
// Workload Annotations
// ============================================================================

/// Structural hash of a workload built by the operator
pub const ANNOTATION_HASH: &str = "dynatrace.com/hash";

/// Hash of the custom telemetry ingest TLS secret
pub const ANNOTATION_TELEMETRY_INGEST_SECRET_HASH: &str =
    "dynatrace.com/telemetry-ingest-secret-hash";

/// Hash of the generated collector configuration
pub const ANNOTATION_TELEMETRY_INGEST_CONFIG_HASH: &str =
    "dynatrace.com/telemetry-ingest-config-hash";

/// Hash of the extensions controller TLS secret
pub const ANNOTATION_EXTENSIONS_SECRET_HASH: &str = "dynatrace.com/extensions-secret-hash";

// ============================================================================
// Feature Flags
// ============================================================================

/// Prefix of every feature flag annotation on a `DynaKube`
pub const FEATURE_FLAG_PREFIX: &str = "feature.dynatrace.com/";

// ============================================================================
// Injection Annotations
// ============================================================================

/// Global opt-out annotation on pods
pub const ANNOTATION_DYNATRACE_INJECT: &str = "dynatrace.com/inject";

/// Stamped on every pod that went through the injection path
pub const ANNOTATION_DYNATRACE_INJECTED: &str = "dynakube.dynatrace.com/injected";

/// Prefix of per-container exclusion annotations (`container.inject.dynatrace.com/<name>`)
pub const ANNOTATION_CONTAINER_INJECTION_PREFIX: &str = "container.inject.dynatrace.com/";

/// Agent opt-in/out annotation on pods
pub const ANNOTATION_ONE_AGENT_INJECT: &str = "oneagent.dynatrace.com/inject";

/// Agent sentinel annotation on pods
pub const ANNOTATION_ONE_AGENT_INJECTED: &str = "oneagent.dynatrace.com/injected";

/// Reason the agent was not injected
pub const ANNOTATION_ONE_AGENT_REASON: &str = "oneagent.dynatrace.com/reason";

/// Technologies the agent should be restricted to
pub const ANNOTATION_ONE_AGENT_TECHNOLOGIES: &str = "oneagent.dynatrace.com/technologies";

/// Install path override of the agent
pub const ANNOTATION_ONE_AGENT_INSTALL_PATH: &str = "oneagent.dynatrace.com/install-path";

/// Failure policy override of the install container
pub const ANNOTATION_FAILURE_POLICY: &str = "oneagent.dynatrace.com/failure-policy";

/// Metadata enrichment opt-in/out annotation on pods
pub const ANNOTATION_METADATA_ENRICHMENT_INJECT: &str = "metadata-enrichment.dynatrace.com/inject";

/// Metadata enrichment sentinel annotation on pods
pub const ANNOTATION_METADATA_ENRICHMENT_INJECTED: &str =
    "metadata-enrichment.dynatrace.com/injected";

/// Data ingest opt-in/out annotation on pods
pub const ANNOTATION_DATA_INGEST_INJECT: &str = "data-ingest.dynatrace.com/inject";

/// Data ingest sentinel annotation on pods
pub const ANNOTATION_DATA_INGEST_INJECTED: &str = "data-ingest.dynatrace.com/injected";

/// Prefix of namespace annotations copied to pods by metadata enrichment
pub const METADATA_PREFIX: &str = "metadata.dynatrace.com/";

/// Workload kind annotation written by metadata enrichment
pub const ANNOTATION_WORKLOAD_KIND: &str = "metadata.dynatrace.com/dt.kubernetes.workload.kind";

/// Workload name annotation written by metadata enrichment
pub const ANNOTATION_WORKLOAD_NAME: &str = "metadata.dynatrace.com/dt.kubernetes.workload.name";

/// Annotation on OpenShift debug pods naming the source container
pub const ANNOTATION_OC_DEBUG_SOURCE_CONTAINER: &str = "debug.openshift.io/source-container";

/// Annotation on OpenShift debug pods naming the source resource
pub const ANNOTATION_OC_DEBUG_SOURCE_RESOURCE: &str = "debug.openshift.io/source-resource";

// ============================================================================
// Label Version Detection
// ============================================================================

/// Namespace annotation overriding the field path of `DT_RELEASE_VERSION`
pub const ANNOTATION_RELEASE_VERSION: &str = "mapping.release.dynatrace.com/version";

/// Namespace annotation overriding the field path of `DT_RELEASE_PRODUCT`
pub const ANNOTATION_RELEASE_PRODUCT: &str = "mapping.release.dynatrace.com/product";

/// Namespace annotation overriding the field path of `DT_RELEASE_STAGE`
pub const ANNOTATION_RELEASE_STAGE: &str = "mapping.release.dynatrace.com/stage";

/// Namespace annotation overriding the field path of `DT_RELEASE_BUILD_VERSION`
pub const ANNOTATION_RELEASE_BUILD_VERSION: &str = "mapping.release.dynatrace.com/build-version";

/// Default field path of `DT_RELEASE_VERSION`
pub const DEFAULT_RELEASE_VERSION_PATH: &str = "metadata.labels['app.kubernetes.io/version']";

/// Default field path of `DT_RELEASE_PRODUCT`
pub const DEFAULT_RELEASE_PRODUCT_PATH: &str = "metadata.labels['app.kubernetes.io/part-of']";
