// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Builders for the collector `StatefulSet` and its configuration `ConfigMap`.
//!
//! The builders are pure: everything read from the cluster (content hashes,
//! resolved image) is passed in by the reconciler.

use crate::constants::{
    ACTIVE_GATE_CERT_FILE, ACTIVE_GATE_CERT_MOUNT_PATH, COLLECTOR_CONTAINER_NAME,
    COLLECTOR_SERVICE_ACCOUNT, CUSTOM_TLS_CERT_MOUNT_PATH, DATA_INGEST_TOKEN_KEY,
    DEFAULT_COLLECTOR_REPLICAS, EXTENSIONS_TLS_MOUNT_PATH, OTELC_TOKEN_SECRET_KEY,
    OTLP_API_ENDPOINT_CONFIG_MAP, OTLP_GRPC_PORT, OTLP_HTTP_PORT, PROXY_SECRET_KEY,
    SECRETS_TOKENS_MOUNT_PATH, SECRET_VOLUME_DEFAULT_MODE, SUPPORTED_NODE_ARCHES,
    TELEMETRY_CONFIG_KEY, TELEMETRY_CONFIG_MOUNT_PATH, TLS_CRT_KEY, TLS_KEY_KEY,
    TRUSTED_CAS_KEY, TRUSTED_CA_FILE, TRUSTED_CA_MOUNT_PATH,
};
use crate::crd::DynaKube;
use crate::labels::{
    COMPONENT_OTEL_COLLECTOR, K8S_ARCH, K8S_COMPONENT, K8S_HOSTNAME, K8S_INSTANCE,
    K8S_MANAGED_BY, K8S_NAME, K8S_OS, K8S_ZONE, MANAGED_BY_OPERATOR, STATEFULSET_POD_INDEX,
    STATEFULSET_POD_NAME,
};
use crate::otelc::config::GeneratedConfig;
use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Affinity, Capabilities, ConfigMap, ConfigMapKeySelector, ConfigMapVolumeSource, Container,
    EnvVar, EnvVarSource, KeyToPath, LocalObjectReference, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector, PodSecurityContext,
    PodSpec, PodTemplateSpec, SeccompProfile, SecretKeySelector, SecretVolumeSource,
    SecurityContext, TopologySpreadConstraint, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

pub const ENV_SHARDS: &str = "SHARDS";
pub const ENV_POD_NAME_PREFIX: &str = "POD_NAME_PREFIX";
pub const ENV_POD_NAME: &str = "POD_NAME";
pub const ENV_SHARD_ID: &str = "SHARD_ID";
pub const ENV_OTLP_GRPC_PORT: &str = "OTLP_GRPC_PORT";
pub const ENV_OTLP_HTTP_PORT: &str = "OTLP_HTTP_PORT";
pub const ENV_K8S_CLUSTER_NAME: &str = "K8S_CLUSTER_NAME";
pub const ENV_K8S_CLUSTER_UID: &str = "K8S_CLUSTER_UID";
pub const ENV_DT_ENTITY_KUBERNETES_CLUSTER: &str = "DT_ENTITY_KUBERNETES_CLUSTER";
pub const ENV_EEC_DS_TOKEN: &str = "EEC_DS_TOKEN";
pub const ENV_CERT_DIR: &str = "SSL_CERT_DIR";
pub const ENV_TRUSTED_CAS: &str = "TRUSTED_CAS";
pub const ENV_DT_ENDPOINT: &str = "DT_ENDPOINT";
pub const ENV_MY_POD_IP: &str = "MY_POD_IP";
pub const ENV_DT_DATA_INGEST_TOKEN: &str = "DT_DATA_INGEST_TOKEN";
pub const ENV_HTTPS_PROXY: &str = "HTTPS_PROXY";
pub const ENV_HTTP_PROXY: &str = "HTTP_PROXY";
pub const ENV_NO_PROXY: &str = "NO_PROXY";

pub const VOLUME_EXTENSIONS_TOKEN: &str = "extensions-token";
pub const VOLUME_EXTENSIONS_TLS: &str = "extensions-controller-tls";
pub const VOLUME_TRUSTED_CAS: &str = "dynatrace-certs";
pub const VOLUME_ACTIVE_GATE_CERT: &str = "activegate-tls";
pub const VOLUME_CUSTOM_TLS: &str = "telemetry-custom-tls";
pub const VOLUME_TELEMETRY_CONFIG: &str = "telemetry-collector-config";

const EXTENSIONS_CONTROLLER_PORT: u16 = 14599;

/// Labels shared by the `StatefulSet`, its selector and its pods.
#[must_use]
pub fn build_app_labels(dk: &DynaKube) -> BTreeMap<String, String> {
    let mut labels = build_match_labels(dk);
    labels.insert(K8S_COMPONENT.into(), COMPONENT_OTEL_COLLECTOR.into());
    labels
}

/// Immutable selector labels.
#[must_use]
pub fn build_match_labels(dk: &DynaKube) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_NAME.into(), COMPONENT_OTEL_COLLECTOR.into()),
        (K8S_INSTANCE.into(), dk.name_any()),
        (K8S_MANAGED_BY.into(), MANAGED_BY_OPERATOR.into()),
    ])
}

/// Replica count from the template, defaulting to one.
#[must_use]
pub fn replicas(dk: &DynaKube) -> i32 {
    dk.spec
        .templates
        .open_telemetry_collector
        .replicas
        .unwrap_or(DEFAULT_COLLECTOR_REPLICAS)
}

/// The user override, or one replica per zone (soft) and per node (hard).
#[must_use]
pub fn build_topology_spread_constraints(dk: &DynaKube) -> Vec<TopologySpreadConstraint> {
    let overrides = &dk.spec.templates.open_telemetry_collector.topology_spread_constraints;
    if !overrides.is_empty() {
        return overrides.clone();
    }

    let selector = LabelSelector {
        match_labels: Some(build_match_labels(dk)),
        ..Default::default()
    };
    vec![
        TopologySpreadConstraint {
            max_skew: 1,
            topology_key: K8S_ZONE.into(),
            when_unsatisfiable: "ScheduleAnyway".into(),
            label_selector: Some(selector.clone()),
            ..Default::default()
        },
        TopologySpreadConstraint {
            max_skew: 1,
            topology_key: K8S_HOSTNAME.into(),
            when_unsatisfiable: "DoNotSchedule".into(),
            node_taints_policy: Some("Honor".into()),
            label_selector: Some(selector),
            ..Default::default()
        },
    ]
}

/// Schedule only on linux nodes of a supported architecture.
#[must_use]
pub fn build_affinity() -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![
                        NodeSelectorRequirement {
                            key: K8S_ARCH.into(),
                            operator: "In".into(),
                            values: Some(SUPPORTED_NODE_ARCHES.iter().map(|a| (*a).into()).collect()),
                        },
                        NodeSelectorRequirement {
                            key: K8S_OS.into(),
                            operator: "In".into(),
                            values: Some(vec!["linux".into()]),
                        },
                    ]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn runtime_default_seccomp() -> SeccompProfile {
    SeccompProfile {
        type_: "RuntimeDefault".into(),
        ..Default::default()
    }
}

/// In-cluster services the collector must reach without the proxy.
fn no_proxy(dk: &DynaKube) -> String {
    let namespace = dk.namespace().unwrap_or_default();
    let name = dk.name_any();
    let mut hosts = Vec::new();
    if dk.extensions_enabled() {
        hosts.push(format!("{name}-extensions-controller.{namespace}"));
    }
    if dk.extensions_enabled() || (dk.telemetry_ingest_enabled() && dk.needs_active_gate()) {
        hosts.push(format!("{name}-activegate.{namespace}"));
    }
    if let Some(extra) = dk.feature_flags().no_proxy() {
        hosts.push(extra.to_string());
    }
    hosts.join(",")
}

fn env_value(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn env_field_ref(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.into(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_secret_ref(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.into(),
                key: key.into(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Environment of the collector container.
#[must_use]
pub fn build_env(dk: &DynaKube) -> Vec<EnvVar> {
    let status = dk.status.clone().unwrap_or_default();
    let mut env = vec![
        env_value(ENV_SHARDS, replicas(dk).to_string()),
        env_value(ENV_POD_NAME_PREFIX, dk.otel_collector_statefulset_name()),
        env_field_ref(ENV_POD_NAME, &format!("metadata.labels['{STATEFULSET_POD_NAME}']")),
        env_field_ref(ENV_SHARD_ID, &format!("metadata.labels['{STATEFULSET_POD_INDEX}']")),
        env_value(ENV_OTLP_GRPC_PORT, OTLP_GRPC_PORT.to_string()),
        env_value(ENV_OTLP_HTTP_PORT, OTLP_HTTP_PORT.to_string()),
        env_value(ENV_K8S_CLUSTER_NAME, dk.name_any()),
        env_value(ENV_K8S_CLUSTER_UID, status.kube_system_uuid),
        env_value(ENV_DT_ENTITY_KUBERNETES_CLUSTER, status.kubernetes_cluster_meid),
    ];

    if dk.extensions_enabled() {
        env.push(env_secret_ref(
            ENV_EEC_DS_TOKEN,
            &dk.extensions_token_secret_name(),
            OTELC_TOKEN_SECRET_KEY,
        ));
        env.push(env_value(ENV_CERT_DIR, EXTENSIONS_TLS_MOUNT_PATH));
    }

    if dk.telemetry_ingest_enabled() {
        env.push(EnvVar {
            name: ENV_DT_ENDPOINT.into(),
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: OTLP_API_ENDPOINT_CONFIG_MAP.into(),
                    key: ENV_DT_ENDPOINT.into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        env.push(env_field_ref(ENV_MY_POD_IP, "status.podIP"));
        env.push(env_secret_ref(
            ENV_DT_DATA_INGEST_TOKEN,
            &dk.tokens(),
            DATA_INGEST_TOKEN_KEY,
        ));
    }

    if trusted_ca_mounted(dk) {
        env.push(env_value(
            ENV_TRUSTED_CAS,
            format!("{TRUSTED_CA_MOUNT_PATH}/{TRUSTED_CA_FILE}"),
        ));
    }

    if let Some(proxy) = dk.spec.proxy.as_ref() {
        let proxy_env = |name: &str| match (&proxy.value_from, &proxy.value) {
            (Some(secret), _) if !secret.is_empty() => {
                Some(env_secret_ref(name, secret, PROXY_SECRET_KEY))
            }
            (_, Some(value)) if !value.is_empty() => Some(env_value(name, value.clone())),
            _ => None,
        };
        if let (Some(https), Some(http)) = (proxy_env(ENV_HTTPS_PROXY), proxy_env(ENV_HTTP_PROXY)) {
            env.push(https);
            env.push(http);
            env.push(env_value(ENV_NO_PROXY, no_proxy(dk)));
        }
    }

    env
}

/// The `ActiveGate` certificate is mounted for telemetry ingest and wins over
/// the trusted CA bundle.
fn active_gate_cert_mounted(dk: &DynaKube) -> bool {
    dk.telemetry_ingest_enabled() && dk.active_gate_tls_secret().is_some()
}

fn trusted_ca_mounted(dk: &DynaKube) -> bool {
    !active_gate_cert_mounted(dk) && dk.spec.trusted_cas.as_deref().is_some_and(|s| !s.is_empty())
}

/// CA bundle path handed to the exporter, if any.
#[must_use]
pub fn exporter_ca_path(dk: &DynaKube) -> Option<String> {
    if active_gate_cert_mounted(dk) {
        Some(format!("{ACTIVE_GATE_CERT_MOUNT_PATH}/{ACTIVE_GATE_CERT_FILE}"))
    } else if trusted_ca_mounted(dk) {
        Some(format!("{TRUSTED_CA_MOUNT_PATH}/{TRUSTED_CA_FILE}"))
    } else {
        None
    }
}

/// Receiver certificate and key paths when a custom TLS secret is set.
#[must_use]
pub fn receiver_tls_paths(dk: &DynaKube) -> Option<(String, String)> {
    dk.telemetry_ingest_tls_ref().map(|_| {
        (
            format!("{CUSTOM_TLS_CERT_MOUNT_PATH}/{TLS_CRT_KEY}"),
            format!("{CUSTOM_TLS_CERT_MOUNT_PATH}/{TLS_KEY_KEY}"),
        )
    })
}

fn key_to_path(key: &str, path: &str) -> KeyToPath {
    KeyToPath {
        key: key.into(),
        path: path.into(),
        ..Default::default()
    }
}

fn secret_volume(name: &str, secret: &str, items: Vec<KeyToPath>, mode: Option<i32>) -> Volume {
    Volume {
        name: name.into(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.into()),
            items: Some(items),
            default_mode: mode,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn read_only_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.into(),
        mount_path: path.into(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Volumes of the collector pod and the matching container mounts.
#[must_use]
pub fn build_volumes(dk: &DynaKube) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    if dk.extensions_enabled() {
        volumes.push(secret_volume(
            VOLUME_EXTENSIONS_TOKEN,
            &dk.extensions_token_secret_name(),
            vec![key_to_path(OTELC_TOKEN_SECRET_KEY, OTELC_TOKEN_SECRET_KEY)],
            Some(SECRET_VOLUME_DEFAULT_MODE),
        ));
        mounts.push(read_only_mount(VOLUME_EXTENSIONS_TOKEN, SECRETS_TOKENS_MOUNT_PATH));

        volumes.push(secret_volume(
            VOLUME_EXTENSIONS_TLS,
            &dk.extensions_tls_secret_name(),
            vec![key_to_path(TLS_CRT_KEY, TLS_CRT_KEY)],
            None,
        ));
        mounts.push(read_only_mount(VOLUME_EXTENSIONS_TLS, EXTENSIONS_TLS_MOUNT_PATH));
    }

    if let Some(trusted_cas) = dk.spec.trusted_cas.as_deref().filter(|_| trusted_ca_mounted(dk)) {
        volumes.push(Volume {
            name: VOLUME_TRUSTED_CAS.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: trusted_cas.into(),
                items: Some(vec![key_to_path(TRUSTED_CAS_KEY, TRUSTED_CA_FILE)]),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(read_only_mount(VOLUME_TRUSTED_CAS, TRUSTED_CA_MOUNT_PATH));
    }

    if let Some(ag_secret) = dk.active_gate_tls_secret().filter(|_| active_gate_cert_mounted(dk)) {
        volumes.push(secret_volume(
            VOLUME_ACTIVE_GATE_CERT,
            ag_secret,
            vec![key_to_path(TLS_CRT_KEY, ACTIVE_GATE_CERT_FILE)],
            None,
        ));
        mounts.push(read_only_mount(VOLUME_ACTIVE_GATE_CERT, ACTIVE_GATE_CERT_MOUNT_PATH));
    }

    if let Some(tls_ref) = dk.telemetry_ingest_tls_ref() {
        volumes.push(secret_volume(
            VOLUME_CUSTOM_TLS,
            tls_ref,
            vec![
                key_to_path(TLS_CRT_KEY, TLS_CRT_KEY),
                key_to_path(TLS_KEY_KEY, TLS_KEY_KEY),
            ],
            None,
        ));
        mounts.push(read_only_mount(VOLUME_CUSTOM_TLS, CUSTOM_TLS_CERT_MOUNT_PATH));
    }

    if dk.telemetry_ingest_enabled() {
        volumes.push(Volume {
            name: VOLUME_TELEMETRY_CONFIG.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: dk.telemetry_config_map_name(),
                items: Some(vec![key_to_path(TELEMETRY_CONFIG_KEY, TELEMETRY_CONFIG_KEY)]),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(read_only_mount(VOLUME_TELEMETRY_CONFIG, TELEMETRY_CONFIG_MOUNT_PATH));
    }

    (volumes, mounts)
}

/// Collector arguments: one `--config` per configuration source.
#[must_use]
pub fn build_args(dk: &DynaKube) -> Vec<String> {
    let mut args = Vec::new();
    if dk.extensions_enabled() {
        args.push(format!(
            "--config=eec://{}-extensions-controller.{}:{EXTENSIONS_CONTROLLER_PORT}/otcconfig/prometheusMetrics#refresh-interval=5s&auth-file={SECRETS_TOKENS_MOUNT_PATH}/{OTELC_TOKEN_SECRET_KEY}",
            dk.name_any(),
            dk.namespace().unwrap_or_default(),
        ));
    }
    if dk.telemetry_ingest_enabled() {
        args.push(format!(
            "--config=file://{TELEMETRY_CONFIG_MOUNT_PATH}/{TELEMETRY_CONFIG_KEY}"
        ));
    }
    args
}

fn build_container(dk: &DynaKube, image: &str, mounts: Vec<VolumeMount>) -> Container {
    Container {
        name: COLLECTOR_CONTAINER_NAME.into(),
        image: Some(image.into()),
        image_pull_policy: Some("IfNotPresent".into()),
        args: Some(build_args(dk)),
        env: Some(build_env(dk)),
        resources: dk.spec.templates.open_telemetry_collector.resources.clone(),
        volume_mounts: Some(mounts),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            privileged: Some(false),
            read_only_root_filesystem: Some(true),
            run_as_non_root: Some(true),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".into()]),
                ..Default::default()
            }),
            seccomp_profile: Some(runtime_default_seccomp()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the collector `StatefulSet`.
///
/// `template_annotations` carries the content hashes that roll the pods when
/// a mounted secret or the configuration changes.
#[must_use]
pub fn build_stateful_set(
    dk: &DynaKube,
    image: &str,
    template_annotations: BTreeMap<String, String>,
) -> StatefulSet {
    let name = dk.otel_collector_statefulset_name();
    let template = &dk.spec.templates.open_telemetry_collector;
    debug!(name = %name, image = %image, "Building collector StatefulSet");

    let labels = build_app_labels(dk);
    let mut pod_labels = template.labels.clone();
    pod_labels.extend(labels.clone());

    let (volumes, mounts) = build_volumes(dk);

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: dk.namespace(),
            labels: Some(labels),
            owner_references: dk.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas(dk)),
            pod_management_policy: Some("Parallel".into()),
            selector: LabelSelector {
                match_labels: Some(build_match_labels(dk)),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".into()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: Some(0),
                    ..Default::default()
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(template_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![build_container(dk, image, mounts)],
                    affinity: Some(build_affinity()),
                    tolerations: Some(template.tolerations.clone()).filter(|t| !t.is_empty()),
                    topology_spread_constraints: Some(build_topology_spread_constraints(dk)),
                    security_context: Some(PodSecurityContext {
                        seccomp_profile: Some(runtime_default_seccomp()),
                        ..Default::default()
                    }),
                    service_account_name: Some(COLLECTOR_SERVICE_ACCOUNT.into()),
                    image_pull_secrets: Some(vec![LocalObjectReference {
                        name: dk.pull_secret_name(),
                    }]),
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `ConfigMap` holding the rendered `telemetry.yaml`.
#[must_use]
pub fn build_config_map(dk: &DynaKube, config: &GeneratedConfig) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(dk.telemetry_config_map_name()),
            namespace: dk.namespace(),
            labels: Some(build_app_labels(dk)),
            owner_references: dk.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            TELEMETRY_CONFIG_KEY.to_string(),
            config.as_str().to_string(),
        )])),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "statefulset_tests.rs"]
mod statefulset_tests;
