// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `statefulset.rs`

use super::*;
use crate::crd::{
    ActiveGateSpec, DynaKubeSpec, DynaKubeStatus, ExtensionsSpec, ProxySpec, TelemetryIngestSpec,
};
use crate::otelc::config::{ConfigBuilder, Protocol};

fn dynakube() -> DynaKube {
    let mut dk = DynaKube::new(
        "dk",
        DynaKubeSpec {
            api_url: "https://abc123.live.dynatrace.com/api".to_string(),
            ..DynaKubeSpec::default()
        },
    );
    dk.metadata.namespace = Some("dynatrace".to_string());
    dk.metadata.uid = Some("dk-uid".to_string());
    dk.status = Some(DynaKubeStatus {
        kube_system_uuid: "cluster-uid".to_string(),
        kubernetes_cluster_meid: "KUBERNETES_CLUSTER-1".to_string(),
        ..DynaKubeStatus::default()
    });
    dk
}

fn with_telemetry_ingest() -> DynaKube {
    let mut dk = dynakube();
    dk.spec.telemetry_ingest = Some(TelemetryIngestSpec::default());
    dk
}

fn with_extensions() -> DynaKube {
    let mut dk = dynakube();
    dk.spec.extensions = Some(ExtensionsSpec::default());
    dk
}

fn with_active_gate_tls(dk: &mut DynaKube) {
    dk.spec.active_gate = Some(ActiveGateSpec {
        capabilities: vec!["dynatrace-api".to_string()],
        tls_secret_name: Some("ag-cert".to_string()),
        ..ActiveGateSpec::default()
    });
}

fn env_names(dk: &DynaKube) -> Vec<String> {
    build_env(dk).into_iter().map(|e| e.name).collect()
}

fn pod_spec(sts: &StatefulSet) -> &PodSpec {
    sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
}

#[test]
fn test_telemetry_ingest_env_order() {
    let names = env_names(&with_telemetry_ingest());

    assert_eq!(
        names,
        vec![
            ENV_SHARDS,
            ENV_POD_NAME_PREFIX,
            ENV_POD_NAME,
            ENV_SHARD_ID,
            ENV_OTLP_GRPC_PORT,
            ENV_OTLP_HTTP_PORT,
            ENV_K8S_CLUSTER_NAME,
            ENV_K8S_CLUSTER_UID,
            ENV_DT_ENTITY_KUBERNETES_CLUSTER,
            ENV_DT_ENDPOINT,
            ENV_MY_POD_IP,
            ENV_DT_DATA_INGEST_TOKEN,
        ]
    );
}

#[test]
fn test_env_values() {
    let env = build_env(&with_telemetry_ingest());

    assert_eq!(env[0].value.as_deref(), Some("1"));
    assert_eq!(env[1].value.as_deref(), Some("dk-otel-collector"));
    assert_eq!(
        env[2].value_from.as_ref().unwrap().field_ref.as_ref().unwrap().field_path,
        "metadata.labels['statefulset.kubernetes.io/pod-name']"
    );
    assert_eq!(env[4].value.as_deref(), Some("10001"));
    assert_eq!(env[5].value.as_deref(), Some("10002"));
    assert_eq!(env[7].value.as_deref(), Some("cluster-uid"));
    assert_eq!(env[8].value.as_deref(), Some("KUBERNETES_CLUSTER-1"));

    let token = env[11].value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap();
    assert_eq!(token.name, "dk");
    assert_eq!(token.key, "dataIngestToken");
}

#[test]
fn test_extensions_env() {
    let env = build_env(&with_extensions());

    let token = env
        .iter()
        .find(|e| e.name == ENV_EEC_DS_TOKEN)
        .and_then(|e| e.value_from.as_ref())
        .and_then(|v| v.secret_key_ref.as_ref())
        .unwrap();
    assert_eq!(token.name, "dk-extensions-token");
    assert_eq!(token.key, "otelc.token");
    assert!(env
        .iter()
        .any(|e| e.name == ENV_CERT_DIR && e.value.as_deref() == Some("/tls/custom/eec")));
}

#[test]
fn test_no_proxy_env_without_proxy() {
    let names = env_names(&with_extensions());

    assert!(!names.iter().any(|n| n == ENV_HTTPS_PROXY || n == ENV_NO_PROXY));
}

#[test]
fn test_proxy_from_secret_with_extensions() {
    let mut dk = with_extensions();
    dk.spec.proxy = Some(ProxySpec {
        value: None,
        value_from: Some("proxy-secret".to_string()),
    });

    let env = build_env(&dk);
    let https = env.iter().find(|e| e.name == ENV_HTTPS_PROXY).unwrap();
    let no_proxy = env.iter().find(|e| e.name == ENV_NO_PROXY).unwrap();

    let secret = https.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap();
    assert_eq!(secret.name, "proxy-secret");
    assert_eq!(secret.key, "proxy");
    assert_eq!(
        no_proxy.value.as_deref(),
        Some("dk-extensions-controller.dynatrace,dk-activegate.dynatrace")
    );
}

#[test]
fn test_proxy_value_with_public_active_gate() {
    let mut dk = with_telemetry_ingest();
    dk.spec.proxy = Some(ProxySpec {
        value: Some("http://proxy:3128".to_string()),
        value_from: None,
    });

    let env = build_env(&dk);

    assert!(env
        .iter()
        .any(|e| e.name == ENV_HTTP_PROXY && e.value.as_deref() == Some("http://proxy:3128")));
    assert!(env
        .iter()
        .any(|e| e.name == ENV_NO_PROXY && e.value.as_deref() == Some("")));
}

#[test]
fn test_trusted_ca_volume_and_env() {
    let mut dk = with_telemetry_ingest();
    dk.spec.trusted_cas = Some("my-cas".to_string());

    let (volumes, mounts) = build_volumes(&dk);

    let volume = volumes.iter().find(|v| v.name == VOLUME_TRUSTED_CAS).unwrap();
    assert_eq!(volume.config_map.as_ref().unwrap().name, "my-cas");
    assert!(mounts
        .iter()
        .any(|m| m.name == VOLUME_TRUSTED_CAS && m.mount_path == "/tls/custom/cacerts"));
    assert_eq!(
        exporter_ca_path(&dk).as_deref(),
        Some("/tls/custom/cacerts/rootca.pem")
    );
    assert!(env_names(&dk).iter().any(|n| n == ENV_TRUSTED_CAS));
}

#[test]
fn test_active_gate_cert_wins_over_trusted_ca() {
    let mut dk = with_telemetry_ingest();
    dk.spec.trusted_cas = Some("my-cas".to_string());
    with_active_gate_tls(&mut dk);

    let (volumes, mounts) = build_volumes(&dk);

    assert!(!volumes.iter().any(|v| v.name == VOLUME_TRUSTED_CAS));
    let ag = volumes.iter().find(|v| v.name == VOLUME_ACTIVE_GATE_CERT).unwrap();
    assert_eq!(
        ag.secret.as_ref().unwrap().secret_name.as_deref(),
        Some("ag-cert")
    );
    assert!(mounts.iter().any(|m| m.mount_path == "/tls/custom/activegate"));
    assert_eq!(
        exporter_ca_path(&dk).as_deref(),
        Some("/tls/custom/activegate/cert.pem")
    );
}

#[test]
fn test_extensions_volumes() {
    let mut dk = with_extensions();
    dk.spec.extensions = Some(ExtensionsSpec {
        tls_ref_name: Some("custom-eec-tls".to_string()),
    });

    let (volumes, _) = build_volumes(&dk);

    assert_eq!(volumes.len(), 2);
    let token = volumes[0].secret.as_ref().unwrap();
    assert_eq!(token.secret_name.as_deref(), Some("dk-extensions-token"));
    assert_eq!(token.default_mode, Some(420));
    assert_eq!(
        volumes[1].secret.as_ref().unwrap().secret_name.as_deref(),
        Some("custom-eec-tls")
    );
}

#[test]
fn test_custom_tls_volume() {
    let mut dk = with_telemetry_ingest();
    dk.spec.telemetry_ingest = Some(TelemetryIngestSpec {
        tls_ref_name: Some("ingest-tls".to_string()),
        ..TelemetryIngestSpec::default()
    });

    let (volumes, mounts) = build_volumes(&dk);
    let tls = volumes.iter().find(|v| v.name == VOLUME_CUSTOM_TLS).unwrap();
    let items = tls.secret.as_ref().unwrap().items.as_ref().unwrap();

    assert_eq!(items.len(), 2);
    assert!(mounts
        .iter()
        .any(|m| m.mount_path == "/tls/custom/telemetry" && m.read_only == Some(true)));
    assert_eq!(
        receiver_tls_paths(&dk),
        Some((
            "/tls/custom/telemetry/tls.crt".to_string(),
            "/tls/custom/telemetry/tls.key".to_string()
        ))
    );
}

#[test]
fn test_default_topology_spread() {
    let constraints = build_topology_spread_constraints(&with_telemetry_ingest());

    assert_eq!(constraints.len(), 2);
    assert_eq!(constraints[0].topology_key, "topology.kubernetes.io/zone");
    assert_eq!(constraints[0].when_unsatisfiable, "ScheduleAnyway");
    assert_eq!(constraints[1].topology_key, "kubernetes.io/hostname");
    assert_eq!(constraints[1].when_unsatisfiable, "DoNotSchedule");
    assert_eq!(constraints[1].node_taints_policy.as_deref(), Some("Honor"));
}

#[test]
fn test_topology_spread_override() {
    let mut dk = with_telemetry_ingest();
    dk.spec.templates.open_telemetry_collector.topology_spread_constraints =
        vec![TopologySpreadConstraint {
            max_skew: 2,
            topology_key: "rack".to_string(),
            when_unsatisfiable: "ScheduleAnyway".to_string(),
            ..Default::default()
        }];

    let constraints = build_topology_spread_constraints(&dk);

    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints[0].topology_key, "rack");
}

#[test]
fn test_stateful_set_shape() {
    let mut dk = with_telemetry_ingest();
    dk.spec.templates.open_telemetry_collector.replicas = Some(3);
    let annotations = BTreeMap::from([("a".to_string(), "b".to_string())]);

    let sts = build_stateful_set(&dk, "registry/otel:1.0", annotations.clone());
    let spec = sts.spec.as_ref().unwrap();
    let pod = pod_spec(&sts);

    assert_eq!(sts.metadata.name.as_deref(), Some("dk-otel-collector"));
    assert_eq!(spec.replicas, Some(3));
    assert_eq!(spec.pod_management_policy.as_deref(), Some("Parallel"));
    assert_eq!(
        spec.update_strategy.as_ref().unwrap().type_.as_deref(),
        Some("RollingUpdate")
    );
    assert_eq!(
        spec.template.metadata.as_ref().unwrap().annotations.as_ref(),
        Some(&annotations)
    );
    assert_eq!(
        pod.service_account_name.as_deref(),
        Some("dynatrace-otel-collector")
    );
    assert_eq!(
        pod.security_context.as_ref().unwrap().seccomp_profile.as_ref().unwrap().type_,
        "RuntimeDefault"
    );
    assert_eq!(pod.containers[0].image.as_deref(), Some("registry/otel:1.0"));
    assert_eq!(
        pod.containers[0].args.as_ref().unwrap(),
        &vec!["--config=file:///config/telemetry.yaml".to_string()]
    );
    assert_eq!(
        pod.image_pull_secrets.as_ref().unwrap()[0].name,
        "dk-pull-secret"
    );
}

#[test]
fn test_stateful_set_owner_reference() {
    let sts = build_stateful_set(&with_telemetry_ingest(), "img", BTreeMap::new());
    let owner = &sts.metadata.owner_references.as_ref().unwrap()[0];

    assert_eq!(owner.kind, "DynaKube");
    assert_eq!(owner.uid, "dk-uid");
    assert_eq!(owner.controller, Some(true));
    assert_eq!(owner.block_owner_deletion, Some(true));
}

#[test]
fn test_user_labels_do_not_override_selector_labels() {
    let mut dk = with_telemetry_ingest();
    dk.spec.templates.open_telemetry_collector.labels = BTreeMap::from([
        ("team".to_string(), "obs".to_string()),
        (K8S_NAME.to_string(), "hijack".to_string()),
    ]);

    let sts = build_stateful_set(&dk, "img", BTreeMap::new());
    let labels = sts
        .spec
        .unwrap()
        .template
        .metadata
        .unwrap()
        .labels
        .unwrap();

    assert_eq!(labels.get("team").map(String::as_str), Some("obs"));
    assert_eq!(
        labels.get(K8S_NAME).map(String::as_str),
        Some(COMPONENT_OTEL_COLLECTOR)
    );
}

#[test]
fn test_affinity_restricts_architectures() {
    let affinity = build_affinity();
    let terms = affinity
        .node_affinity
        .unwrap()
        .required_during_scheduling_ignored_during_execution
        .unwrap()
        .node_selector_terms;
    let arch = &terms[0].match_expressions.as_ref().unwrap()[0];

    assert_eq!(arch.key, "kubernetes.io/arch");
    assert_eq!(
        arch.values.as_ref().unwrap(),
        &vec!["amd64".to_string(), "arm64".to_string(), "ppc64le".to_string()]
    );
}

#[test]
fn test_config_map_holds_generated_config() {
    let dk = with_telemetry_ingest();
    let config = ConfigBuilder::new(&[Protocol::Otlp]).with_receivers().build().unwrap();

    let cm = build_config_map(&dk, &config);

    assert_eq!(
        cm.metadata.name.as_deref(),
        Some("dk-telemetry-collector-config")
    );
    assert_eq!(
        cm.data.unwrap().get("telemetry.yaml").map(String::as_str),
        Some(config.as_str())
    );
}
