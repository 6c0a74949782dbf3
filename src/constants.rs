// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the DynaKube operator.
//!
//! This module contains the numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all operator CRDs
pub const API_GROUP: &str = "dynatrace.com";

/// API version of the `DynaKube` CRD
pub const API_VERSION: &str = "v1beta1";

/// API version of the `EdgeConnect` CRD
pub const EDGE_CONNECT_API_VERSION: &str = "v1alpha1";

/// Kind name for `DynaKube` resource
pub const KIND_DYNAKUBE: &str = "DynaKube";

/// Kind name for `EdgeConnect` resource
pub const KIND_EDGE_CONNECT: &str = "EdgeConnect";

/// Field manager used for every write the operator performs
pub const FIELD_MANAGER: &str = "dynakube-operator";

// ============================================================================
// Version Resolution
// ============================================================================

/// Default interval between two vendor API probes of the same component (minutes)
pub const DEFAULT_API_REQUEST_THRESHOLD_MINUTES: i64 = 15;

/// Version recorded when a component runs from a user-supplied image
pub const CUSTOM_IMAGE_VERSION: &str = "custom-image";

/// Image label carrying the image type (`immutable` or `mutable`)
pub const IMAGE_TYPE_LABEL: &str = "com.dynatrace.type";

/// Image label carrying the build version
pub const IMAGE_VERSION_LABEL: &str = "com.dynatrace.build-version";

/// Operating system segment of tenant registry image paths
pub const TENANT_REGISTRY_OS: &str = "linux";

/// Tenant registry repository of the `OneAgent` image
pub const ONE_AGENT_IMAGE_REPOSITORY: &str = "oneagent";

/// Tenant registry repository of the code modules image
pub const CODE_MODULES_IMAGE_REPOSITORY: &str = "codemodules";

/// Tenant registry repository of the `ActiveGate` image
pub const ACTIVE_GATE_IMAGE_REPOSITORY: &str = "dynatrace-activegate";

/// Default OpenTelemetry collector image (public registry)
pub const DEFAULT_COLLECTOR_IMAGE_REPOSITORY: &str =
    "public.ecr.aws/dynatrace/dynatrace-otel-collector";

/// Default tag of the OpenTelemetry collector image
pub const DEFAULT_COLLECTOR_IMAGE_TAG: &str = "latest";

/// Default `EdgeConnect` image (public registry)
pub const DEFAULT_EDGE_CONNECT_IMAGE_REPOSITORY: &str = "public.ecr.aws/dynatrace/edgeconnect";

/// Default tag of the `EdgeConnect` image
pub const DEFAULT_EDGE_CONNECT_IMAGE_TAG: &str = "latest";

// ============================================================================
// Tokens
// ============================================================================

/// Key of the API token inside the tokens secret
pub const API_TOKEN_KEY: &str = "apiToken";

/// Key of the data ingest token inside the tokens secret
pub const DATA_INGEST_TOKEN_KEY: &str = "dataIngestToken";

/// Key of the collector token inside the extensions token secret
pub const OTELC_TOKEN_SECRET_KEY: &str = "otelc.token";

/// Suffix of the extensions token secret (`<dynakube>-extensions-token`)
pub const EXTENSIONS_TOKEN_SECRET_SUFFIX: &str = "-extensions-token";

/// Suffix of the extensions TLS secret (`<dynakube>-extensions-controller-tls`)
pub const EXTENSIONS_TLS_SECRET_SUFFIX: &str = "-extensions-controller-tls";

/// Suffix of the tenant secret holding the agent tenant token (`<dynakube>-oneagent-tenant-secret`)
pub const TENANT_SECRET_SUFFIX: &str = "-oneagent-tenant-secret";

/// Key of the tenant token inside the tenant secret
pub const TENANT_TOKEN_KEY: &str = "tenant-token";

/// Suffix of the default pull secret (`<dynakube>-pull-secret`)
pub const PULL_SECRET_SUFFIX: &str = "-pull-secret";

/// Key of the docker config inside a pull secret
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Key of the proxy URL inside a proxy secret
pub const PROXY_SECRET_KEY: &str = "proxy";

/// Key of the certificate bundle inside the trusted CA configmap
pub const TRUSTED_CAS_KEY: &str = "certs";

/// Certificate data key of TLS secrets
pub const TLS_CRT_KEY: &str = "tls.crt";

/// Private key data key of TLS secrets
pub const TLS_KEY_KEY: &str = "tls.key";

// ============================================================================
// Collector Workload
// ============================================================================

/// Suffix of the collector `StatefulSet` name (`<dynakube>-otel-collector`)
pub const OTEL_COLLECTOR_SUFFIX: &str = "-otel-collector";

/// Name of the collector container
pub const COLLECTOR_CONTAINER_NAME: &str = "collector";

/// Service account used by the collector pods
pub const COLLECTOR_SERVICE_ACCOUNT: &str = "dynatrace-otel-collector";

/// Default number of collector replicas
pub const DEFAULT_COLLECTOR_REPLICAS: i32 = 1;

/// Default OTLP gRPC port of the collector
pub const OTLP_GRPC_PORT: u16 = 10001;

/// Default OTLP HTTP port of the collector
pub const OTLP_HTTP_PORT: u16 = 10002;

/// Suffix of the generated configuration `ConfigMap`
pub const TELEMETRY_CONFIG_MAP_SUFFIX: &str = "-telemetry-collector-config";

/// The single key of the generated configuration `ConfigMap`
pub const TELEMETRY_CONFIG_KEY: &str = "telemetry.yaml";

/// Name of the `ConfigMap` holding the OTLP endpoint for the collector
pub const OTLP_API_ENDPOINT_CONFIG_MAP: &str = "dynatrace-otlp-api-endpoint";

/// Mount path of the generated configuration
pub const TELEMETRY_CONFIG_MOUNT_PATH: &str = "/config";

/// Mount path of the custom telemetry ingest TLS secret
pub const CUSTOM_TLS_CERT_MOUNT_PATH: &str = "/tls/custom/telemetry";

/// Mount path of the trusted CA bundle
pub const TRUSTED_CA_MOUNT_PATH: &str = "/tls/custom/cacerts";

/// File name of the trusted CA bundle inside its mount
pub const TRUSTED_CA_FILE: &str = "rootca.pem";

/// Mount path of the in-cluster `ActiveGate` certificate
pub const ACTIVE_GATE_CERT_MOUNT_PATH: &str = "/tls/custom/activegate";

/// File name of the in-cluster `ActiveGate` certificate
pub const ACTIVE_GATE_CERT_FILE: &str = "cert.pem";

/// Mount path of the extensions controller TLS certificate
pub const EXTENSIONS_TLS_MOUNT_PATH: &str = "/tls/custom/eec";

/// Mount path of the collector token
pub const SECRETS_TOKENS_MOUNT_PATH: &str = "/secrets/tokens";

/// Default mode of projected secret volumes (0644)
pub const SECRET_VOLUME_DEFAULT_MODE: i32 = 420;

/// Architectures the collector can be scheduled on
pub const SUPPORTED_NODE_ARCHES: [&str; 3] = ["amd64", "arm64", "ppc64le"];

// ============================================================================
// Agent Injection
// ============================================================================

/// Default installation root of the agent inside injected containers
pub const DEFAULT_INSTALL_PATH: &str = "/opt/dynatrace/oneagent-paas";

/// Shared configuration directory of the agent inside injected containers
pub const AGENT_SHARE_PATH: &str = "/var/lib/dynatrace";

/// Agent configuration directory inside injected containers
pub const AGENT_CONFIG_MOUNT_PATH: &str = "/var/lib/dynatrace/oneagent/agent/config";

/// Pre-loader library path relative to the install root
pub const PRELOAD_LIBRARY: &str = "agent/lib64/liboneagentproc.so";

/// Path of the dynamic linker preload file
pub const LD_PRELOAD_FILE: &str = "/etc/ld.so.preload";

/// Mount path of the agent binaries inside the install container
pub const INSTALL_CONTAINER_BIN_PATH: &str = "/mnt/bin";

/// Mount path of the agent configuration inside the install container
pub const INSTALL_CONTAINER_CONFIG_PATH: &str = "/mnt/config";

/// Mount path of the enrichment files inside the install container and user containers
pub const ENRICHMENT_MOUNT_PATH: &str = "/var/lib/dynatrace/enrichment";

/// Mount path of the data ingest endpoint inside user containers
pub const DATA_INGEST_ENDPOINT_MOUNT_PATH: &str = "/var/lib/dynatrace/enrichment/endpoint";

/// Name of the install container
pub const INSTALL_CONTAINER_NAME: &str = "dynatrace-operator";

/// Default user and group of the install container
pub const DEFAULT_INSTALL_CONTAINER_USER: i64 = 1001;

/// Name of the data ingest endpoint secret in injected namespaces
pub const DATA_INGEST_ENDPOINT_SECRET: &str = "dynatrace-data-ingest-endpoint";

/// Key of the data ingest endpoint properties inside its secret
pub const DATA_INGEST_ENDPOINT_KEY: &str = "endpoint.properties";

// ============================================================================
// Controller Timing
// ============================================================================

/// Requeue interval in steady state (30 minutes)
pub const REQUEUE_STEADY_STATE_SECS: u64 = 1800;

/// Requeue interval after a status conflict or a failed pass (1 minute)
pub const REQUEUE_FAST_SECS: u64 = 60;

/// Requeue interval while the resource is still converging (30 seconds)
pub const REQUEUE_NOT_READY_SECS: u64 = 30;

// ============================================================================
// Servers
// ============================================================================

/// Default bind address of the metrics server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Default bind address of the admission webhook
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:8443";

/// Default directory holding `tls.crt` and `tls.key` of the webhook
pub const DEFAULT_CERTS_DIR: &str = "/tmp/webhook/certs";

/// Number of tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;
