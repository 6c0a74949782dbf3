// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Objects shared by the webhook unit tests.

use crate::crd::{
    ApplicationMonitoringSpec, CommunicationHost, ConnectionInfo, DynaKube, DynaKubeSpec,
    DynaKubeStatus, OneAgentSpec, OneAgentStatus, VersionStatus,
};
use crate::labels::INJECTION_INSTANCE_LABEL;
use crate::webhook::request::BaseRequest;
use k8s_openapi::api::core::v1::{Container, Namespace, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const DK_NAMESPACE: &str = "dynatrace";
pub const DK_NAME: &str = "dynakube";
pub const POD_NAMESPACE: &str = "shop";

fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Application monitoring `DynaKube` with a complete connection info and a
/// known code modules version.
pub fn dynakube() -> DynaKube {
    let mut dk = DynaKube::new(
        DK_NAME,
        DynaKubeSpec {
            api_url: "https://abc123.live.dynatrace.com/api".to_string(),
            one_agent: OneAgentSpec {
                application_monitoring: Some(ApplicationMonitoringSpec::default()),
                ..OneAgentSpec::default()
            },
            ..DynaKubeSpec::default()
        },
    );
    dk.metadata.namespace = Some(DK_NAMESPACE.to_string());
    dk.status = Some(DynaKubeStatus {
        kube_system_uuid: "kube-uid".to_string(),
        one_agent: OneAgentStatus {
            connection_info: ConnectionInfo {
                tenant_uuid: "abc123".to_string(),
                endpoints: "https://abc123.live.dynatrace.com:443".to_string(),
                communication_hosts: vec![CommunicationHost {
                    protocol: "https".to_string(),
                    host: "abc123.live.dynatrace.com".to_string(),
                    port: 443,
                }],
                last_request: None,
            },
            ..OneAgentStatus::default()
        },
        code_modules: VersionStatus {
            version: "1.303.0.20240101-000000".to_string(),
            ..VersionStatus::default()
        },
        ..DynaKubeStatus::default()
    });
    dk
}

pub fn dynakube_with_annotations(annotations: &[(&str, &str)]) -> DynaKube {
    let mut dk = dynakube();
    dk.metadata.annotations = Some(string_map(annotations));
    dk
}

/// Pod namespace governed by [`dynakube`].
pub fn namespace(annotations: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(POD_NAMESPACE.to_string()),
            labels: Some(string_map(&[(INJECTION_INSTANCE_LABEL, DK_NAME)])),
            annotations: Some(string_map(annotations)),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

pub fn container(name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(format!("registry.example.com/{name}:1.0")),
        ..Container::default()
    }
}

/// Pod created by a replica set, with one container per name.
pub fn pod(containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("app-7d9f8-x2k4p".to_string()),
            generate_name: Some("app-7d9f8-".to_string()),
            namespace: Some(POD_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: containers.iter().map(|name| container(name)).collect(),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

pub fn pod_with_annotations(containers: &[&str], annotations: &[(&str, &str)]) -> Pod {
    let mut pod = pod(containers);
    pod.metadata.annotations = Some(string_map(annotations));
    pod
}

pub fn base_request(pod: Pod) -> BaseRequest {
    BaseRequest::new(pod, namespace(&[]), dynakube())
}
