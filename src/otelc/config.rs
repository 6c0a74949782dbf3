// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! OpenTelemetry collector pipeline configuration.
//!
//! [`ConfigBuilder`] renders the `telemetry.yaml` document mounted into the
//! collector. Every section is opt-in through a `with_*` method so callers
//! decide which parts the collector gets.
//!
//! Rendering is pure. JSON objects are ordered maps, so the same input yields
//! byte-identical YAML on every reconcile and the ConfigMap hash only moves
//! when the input does.
//!
//! # Example
//!
//! ```rust
//! use dynakube_operator::otelc::config::{ConfigBuilder, Protocol};
//!
//! let config = ConfigBuilder::new(&[Protocol::Otlp])
//!     .with_api_token("${env:DT_DATA_INGEST_TOKEN}")
//!     .with_exporters_endpoint("${env:DT_ENDPOINT}")
//!     .with_receivers()
//!     .with_exporters()
//!     .with_services()
//!     .build()
//!     .unwrap();
//! assert!(config.as_str().contains("otlphttp"));
//! ```

use crate::errors::ConfigError;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Receiver port of OTLP over gRPC.
pub const OTLP_GRPC_RECEIVER_PORT: u16 = 4317;
/// Receiver port of OTLP over HTTP.
pub const OTLP_HTTP_RECEIVER_PORT: u16 = 4318;
/// Receiver port of Jaeger gRPC.
pub const JAEGER_GRPC_PORT: u16 = 14250;
/// Receiver port of Jaeger Thrift binary.
pub const JAEGER_THRIFT_BINARY_PORT: u16 = 6832;
/// Receiver port of Jaeger Thrift compact.
pub const JAEGER_THRIFT_COMPACT_PORT: u16 = 6831;
/// Receiver port of Jaeger Thrift HTTP.
pub const JAEGER_THRIFT_HTTP_PORT: u16 = 14268;
/// Receiver port of Zipkin.
pub const ZIPKIN_PORT: u16 = 9411;
/// Receiver port of StatsD.
pub const STATSD_PORT: u16 = 8125;
/// Port of the health check extension.
pub const HEALTH_CHECK_PORT: u16 = 13133;

const POD_IP: &str = "${env:MY_POD_IP}";
const EXPORTER: &str = "otlphttp";
const HEALTH_CHECK: &str = "health_check";
const MEMORY_LIMITER: &str = "memory_limiter";
const K8S_ATTRIBUTES: &str = "k8sattributes";
const TRANSFORM: &str = "transform";
const CUMULATIVE_TO_DELTA: &str = "cumulativetodelta";

/// Ingest protocol accepted by the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Otlp,
    Jaeger,
    Statsd,
    Zipkin,
}

impl Protocol {
    /// Every known protocol, in rendering order.
    pub const ALL: [Protocol; 4] = [
        Protocol::Otlp,
        Protocol::Jaeger,
        Protocol::Statsd,
        Protocol::Zipkin,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Otlp => "otlp",
            Protocol::Jaeger => "jaeger",
            Protocol::Statsd => "statsd",
            Protocol::Zipkin => "zipkin",
        }
    }

    fn carries_traces(self) -> bool {
        matches!(self, Protocol::Otlp | Protocol::Jaeger | Protocol::Zipkin)
    }

    fn carries_metrics(self) -> bool {
        matches!(self, Protocol::Otlp | Protocol::Statsd)
    }

    fn carries_logs(self) -> bool {
        self == Protocol::Otlp
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownProtocol {
                protocol: s.to_string(),
            })
    }
}

/// Parse the protocol list of a `DynaKube`. An empty list means all protocols.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownProtocol`] for names outside the known set.
pub fn parse_protocols<S: AsRef<str>>(names: &[S]) -> Result<Vec<Protocol>, ConfigError> {
    if names.is_empty() {
        return Ok(Protocol::ALL.to_vec());
    }
    let parsed = names
        .iter()
        .map(|n| n.as_ref().parse())
        .collect::<Result<BTreeSet<Protocol>, _>>()?;
    Ok(parsed.into_iter().collect())
}

/// Rendered collector configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedConfig {
    /// The YAML document.
    pub bytes: Vec<u8>,
    /// Protocols with an enabled receiver.
    pub protocols: Vec<Protocol>,
}

impl GeneratedConfig {
    /// The YAML document as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TlsFiles {
    cert: String,
    key: String,
}

/// Builder of the collector configuration.
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    protocols: Vec<Protocol>,
    api_token: Option<String>,
    endpoint: Option<String>,
    ca_file: Option<String>,
    tls: Option<TlsFiles>,
    exporters: bool,
    processors: bool,
    receivers: bool,
    extensions: bool,
    services: bool,
}

impl ConfigBuilder {
    /// Start a configuration for `protocols`; an empty slice enables all.
    #[must_use]
    pub fn new(protocols: &[Protocol]) -> Self {
        let mut protocols = if protocols.is_empty() {
            Protocol::ALL.to_vec()
        } else {
            protocols.to_vec()
        };
        protocols.sort();
        protocols.dedup();
        Self {
            protocols,
            ..Self::default()
        }
    }

    /// Value of the exporter `Authorization` header token, usually an env reference.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Endpoint of the OTLP HTTP exporter, usually an env reference.
    #[must_use]
    pub fn with_exporters_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// CA bundle the exporter trusts.
    #[must_use]
    pub fn with_ca(mut self, path: impl Into<String>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Server certificate of the receivers.
    #[must_use]
    pub fn with_tls(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.tls = Some(TlsFiles {
            cert: cert.into(),
            key: key.into(),
        });
        self
    }

    #[must_use]
    pub fn with_exporters(mut self) -> Self {
        self.exporters = true;
        self
    }

    #[must_use]
    pub fn with_processors(mut self) -> Self {
        self.processors = true;
        self
    }

    #[must_use]
    pub fn with_receivers(mut self) -> Self {
        self.receivers = true;
        self
    }

    #[must_use]
    pub fn with_extensions(mut self) -> Self {
        self.extensions = true;
        self
    }

    #[must_use]
    pub fn with_services(mut self) -> Self {
        self.services = true;
        self
    }

    /// Render the YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSubstitution`] when exporters are enabled
    /// without an endpoint or API token, and [`ConfigError::Serialization`]
    /// if rendering fails.
    pub fn build(&self) -> Result<GeneratedConfig, ConfigError> {
        let mut root = Map::new();

        if self.exporters {
            root.insert("exporters".to_string(), self.exporters_section()?);
        }
        if self.extensions {
            root.insert("extensions".to_string(), extensions_section());
        }
        if self.processors {
            root.insert("processors".to_string(), processors_section());
        }
        if self.receivers {
            root.insert("receivers".to_string(), self.receivers_section());
        }
        if self.services {
            root.insert("service".to_string(), self.service_section());
        }

        let yaml = serde_yaml::to_string(&Value::Object(root)).map_err(|e| {
            ConfigError::Serialization {
                reason: e.to_string(),
            }
        })?;

        Ok(GeneratedConfig {
            bytes: yaml.into_bytes(),
            protocols: self.protocols.clone(),
        })
    }

    fn exporters_section(&self) -> Result<Value, ConfigError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(ConfigError::MissingSubstitution { option: "endpoint" })?;
        let token = self
            .api_token
            .as_deref()
            .ok_or(ConfigError::MissingSubstitution { option: "api token" })?;

        let mut exporter = json!({
            "endpoint": endpoint,
            "headers": { "Authorization": format!("Api-Token {token}") },
        });
        if let Some(ca) = &self.ca_file {
            exporter["tls"] = json!({ "ca_file": ca });
        }
        Ok(json!({ EXPORTER: exporter }))
    }

    fn server_endpoint(&self, port: u16) -> Value {
        let mut server = json!({ "endpoint": format!("{POD_IP}:{port}") });
        if let Some(tls) = &self.tls {
            server["tls"] = json!({ "cert_file": tls.cert, "key_file": tls.key });
        }
        server
    }

    fn receivers_section(&self) -> Value {
        let mut receivers = Map::new();
        for protocol in &self.protocols {
            let receiver = match protocol {
                Protocol::Otlp => json!({
                    "protocols": {
                        "grpc": self.server_endpoint(OTLP_GRPC_RECEIVER_PORT),
                        "http": self.server_endpoint(OTLP_HTTP_RECEIVER_PORT),
                    }
                }),
                Protocol::Jaeger => json!({
                    "protocols": {
                        "grpc": self.server_endpoint(JAEGER_GRPC_PORT),
                        "thrift_binary": { "endpoint": format!("{POD_IP}:{JAEGER_THRIFT_BINARY_PORT}") },
                        "thrift_compact": { "endpoint": format!("{POD_IP}:{JAEGER_THRIFT_COMPACT_PORT}") },
                        "thrift_http": self.server_endpoint(JAEGER_THRIFT_HTTP_PORT),
                    }
                }),
                Protocol::Zipkin => self.server_endpoint(ZIPKIN_PORT),
                Protocol::Statsd => json!({
                    "endpoint": format!("{POD_IP}:{STATSD_PORT}"),
                    "aggregation_interval": "60s",
                    "enable_metric_type": true,
                    "timer_histogram_mapping": [
                        { "statsd_type": "histogram", "observer_type": "histogram",
                          "histogram": { "max_size": 10 } },
                        { "statsd_type": "timing", "observer_type": "histogram",
                          "histogram": { "max_size": 100 } },
                        { "statsd_type": "distribution", "observer_type": "histogram",
                          "histogram": { "max_size": 100 } },
                    ],
                }),
            };
            receivers.insert(protocol.as_str().to_string(), receiver);
        }
        Value::Object(receivers)
    }

    fn pipeline(&self, filter: fn(Protocol) -> bool, processors: &[&str]) -> Option<Value> {
        let receivers: Vec<&str> = self
            .protocols
            .iter()
            .filter(|p| filter(**p))
            .map(|p| p.as_str())
            .collect();
        if receivers.is_empty() {
            return None;
        }

        let mut pipeline = json!({ "receivers": receivers });
        if self.processors {
            pipeline["processors"] = json!(processors);
        }
        if self.exporters {
            pipeline["exporters"] = json!([EXPORTER]);
        }
        Some(pipeline)
    }

    fn service_section(&self) -> Value {
        let mut pipelines = Map::new();
        let traces = self.pipeline(Protocol::carries_traces, &[
            MEMORY_LIMITER,
            K8S_ATTRIBUTES,
            TRANSFORM,
            "batch/traces",
        ]);
        let metrics = self.pipeline(Protocol::carries_metrics, &[
            MEMORY_LIMITER,
            K8S_ATTRIBUTES,
            TRANSFORM,
            CUMULATIVE_TO_DELTA,
            "batch/metrics",
        ]);
        let logs = self.pipeline(Protocol::carries_logs, &[
            MEMORY_LIMITER,
            K8S_ATTRIBUTES,
            TRANSFORM,
            "batch/logs",
        ]);
        for (name, pipeline) in [("traces", traces), ("metrics", metrics), ("logs", logs)] {
            if let Some(pipeline) = pipeline {
                pipelines.insert(name.to_string(), pipeline);
            }
        }

        let mut service = json!({ "pipelines": pipelines });
        if self.extensions {
            service["extensions"] = json!([HEALTH_CHECK]);
        }
        service
    }
}

fn extensions_section() -> Value {
    json!({ HEALTH_CHECK: { "endpoint": format!("{POD_IP}:{HEALTH_CHECK_PORT}") } })
}

fn processors_section() -> Value {
    let cluster_attributes = [
        r#"set(attributes["k8s.cluster.name"], "${env:K8S_CLUSTER_NAME}")"#,
        r#"set(attributes["k8s.cluster.uid"], "${env:K8S_CLUSTER_UID}")"#,
        r#"set(attributes["dt.entity.kubernetes_cluster"], "${env:DT_ENTITY_KUBERNETES_CLUSTER}")"#,
    ];
    let statements = |context: &str| {
        json!({ "context": context, "statements": cluster_attributes })
    };

    json!({
        MEMORY_LIMITER: {
            "check_interval": "1s",
            "limit_percentage": 70,
            "spike_limit_percentage": 30,
        },
        K8S_ATTRIBUTES: {
            "extract": {
                "metadata": [
                    "k8s.pod.name",
                    "k8s.pod.uid",
                    "k8s.pod.ip",
                    "k8s.deployment.name",
                    "k8s.replicaset.name",
                    "k8s.statefulset.name",
                    "k8s.daemonset.name",
                    "k8s.cronjob.name",
                    "k8s.job.name",
                    "k8s.node.name",
                    "k8s.namespace.name",
                    "k8s.container.name",
                ],
                "annotations": [{
                    "from": "pod",
                    "key_regex": "metadata.dynatrace.com/(.*)",
                    "tag_name": "$$1",
                }],
            },
            "pod_association": [
                { "sources": [{ "from": "resource_attribute", "name": "k8s.pod.name" },
                              { "from": "resource_attribute", "name": "k8s.namespace.name" }] },
                { "sources": [{ "from": "resource_attribute", "name": "k8s.pod.ip" }] },
                { "sources": [{ "from": "resource_attribute", "name": "k8s.pod.uid" }] },
                { "sources": [{ "from": "connection" }] },
            ],
        },
        TRANSFORM: {
            "error_mode": "ignore",
            "trace_statements": [statements("resource")],
            "metric_statements": [statements("resource")],
            "log_statements": [statements("resource")],
        },
        CUMULATIVE_TO_DELTA: {},
        "batch/traces": { "send_batch_size": 5000, "send_batch_max_size": 5000, "timeout": "60s" },
        "batch/metrics": { "send_batch_size": 3000, "send_batch_max_size": 3000, "timeout": "60s" },
        "batch/logs": { "send_batch_size": 1800, "send_batch_max_size": 2000, "timeout": "60s" },
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
