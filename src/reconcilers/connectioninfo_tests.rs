// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `connectioninfo.rs`

use super::*;
use crate::cluster_fake::FakeCluster;
use crate::crd::{CloudNativeFullStackSpec, CommunicationHost, DynaKubeSpec, OneAgentSpec};
use crate::reconcilers::status::find_condition;
use crate::version::testing::FakeVendor;
use crate::version::vendor::OneAgentConnectionInfo;
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn dynakube() -> DynaKube {
    let mut dk = DynaKube::new(
        "dk",
        DynaKubeSpec {
            api_url: "https://abc123.live.dynatrace.com/api".to_string(),
            one_agent: OneAgentSpec {
                cloud_native_full_stack: Some(CloudNativeFullStackSpec::default()),
                ..OneAgentSpec::default()
            },
            ..DynaKubeSpec::default()
        },
    );
    dk.metadata.namespace = Some("dynatrace".to_string());
    dk.metadata.uid = Some("dk-uid".to_string());
    dk
}

fn vendor_with_hosts(hosts: Vec<CommunicationHost>) -> FakeVendor {
    FakeVendor {
        connection_info: Some(OneAgentConnectionInfo {
            tenant_uuid: "abc123".to_string(),
            tenant_token: "tenant-token-value".to_string(),
            endpoints: "https://abc123.live.dynatrace.com:443/communication".to_string(),
            communication_hosts: hosts,
        }),
        ..FakeVendor::default()
    }
}

fn host() -> CommunicationHost {
    CommunicationHost {
        protocol: "https".to_string(),
        host: "abc123.live.dynatrace.com".to_string(),
        port: 443,
    }
}

fn clock() -> TimeProvider {
    TimeProvider::frozen_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
}

#[tokio::test]
async fn test_fetches_and_writes_tenant_secret() {
    let cluster = FakeCluster::new();
    let vendor = vendor_with_hosts(vec![host()]);
    let time = clock();
    let dk = dynakube();
    let mut status = DynaKubeStatus::default();

    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("reconcile");

    let info = &status.one_agent.connection_info;
    assert_eq!(info.tenant_uuid, "abc123");
    assert!(info.route_is_clear());
    assert_eq!(info.last_request, Some(time.now_rfc3339()));

    let secret = cluster
        .secret("dynatrace", "dk-oneagent-tenant-secret")
        .expect("tenant secret");
    let token = secret
        .data
        .as_ref()
        .and_then(|d| d.get(TENANT_TOKEN_KEY))
        .expect("token");
    assert_eq!(token.0, b"tenant-token-value");
    assert_eq!(
        secret.metadata.owner_references.expect("owner")[0].uid,
        "dk-uid"
    );

    let condition =
        find_condition(&status.conditions, CONDITION_TYPE_CONNECTION_INFO).expect("condition");
    assert_eq!(condition.status, STATUS_TRUE);
}

#[tokio::test]
async fn test_recent_connection_info_is_not_refetched() {
    let cluster = FakeCluster::new();
    let vendor = vendor_with_hosts(vec![host()]);
    let mut time = clock();
    let dk = dynakube();
    let mut status = DynaKubeStatus::default();

    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("reconcile");
    time.advance(Duration::from_secs(60));
    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("reconcile");
    assert_eq!(vendor.calls(), 1);

    time.advance(Duration::from_secs(15 * 60));
    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("reconcile");
    assert_eq!(vendor.calls(), 2);
}

#[tokio::test]
async fn test_missing_secret_forces_refetch() {
    let cluster = FakeCluster::new();
    let vendor = vendor_with_hosts(vec![host()]);
    let time = clock();
    let dk = dynakube();
    let mut status = DynaKubeStatus::default();
    status.one_agent.connection_info.last_request = Some(time.now_rfc3339());

    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("reconcile");
    assert_eq!(vendor.calls(), 1);
}

#[tokio::test]
async fn test_empty_hosts_is_informational() {
    let cluster = FakeCluster::new();
    let vendor = vendor_with_hosts(Vec::new());
    let time = clock();
    let dk = dynakube();
    let mut status = DynaKubeStatus::default();

    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("no error");

    assert!(!status.one_agent.connection_info.route_is_clear());
    let condition =
        find_condition(&status.conditions, CONDITION_TYPE_CONNECTION_INFO).expect("condition");
    assert_eq!(condition.status, STATUS_FALSE);
    assert_eq!(condition.reason.as_deref(), Some(REASON_EMPTY_COMMUNICATION_HOSTS));
}

#[tokio::test]
async fn test_vendor_error_is_returned() {
    let cluster = FakeCluster::new();
    let vendor = FakeVendor::default();
    let time = clock();
    let dk = dynakube();
    let mut status = DynaKubeStatus::default();

    assert!(
        reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
            .await
            .is_err()
    );
    assert!(cluster.secret("dynatrace", "dk-oneagent-tenant-secret").is_none());
    let condition =
        find_condition(&status.conditions, CONDITION_TYPE_CONNECTION_INFO).expect("condition");
    assert_eq!(condition.status, STATUS_FALSE);
}

#[tokio::test]
async fn test_disabled_agent_clears_connection_info() {
    let cluster = FakeCluster::new();
    let vendor = FakeVendor::default();
    let time = clock();
    let mut dk = dynakube();
    dk.spec.one_agent = OneAgentSpec::default();
    let mut status = DynaKubeStatus::default();
    status.one_agent.connection_info.tenant_uuid = "abc123".to_string();

    reconcile_connection_info(&cluster, &vendor, &time, &dk, &mut status)
        .await
        .expect("reconcile");
    assert_eq!(status.one_agent.connection_info, ConnectionInfo::default());
    assert_eq!(vendor.calls(), 0);
}
