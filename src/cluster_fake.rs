// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`Cluster`] for unit tests.

use crate::cluster::Cluster;
use crate::crd::{DynaKube, DynaKubeStatus, EdgeConnect, EdgeConnectStatus};
use crate::hash::get_hash;
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Mutex;

type Key = (String, String);

#[derive(Default)]
struct State {
    secrets: BTreeMap<Key, Secret>,
    config_maps: BTreeMap<Key, ConfigMap>,
    stateful_sets: BTreeMap<Key, StatefulSet>,
    deployments: BTreeMap<Key, Deployment>,
    namespaces: BTreeMap<String, Namespace>,
    dynakubes: BTreeMap<Key, DynaKube>,
    edge_connects: BTreeMap<Key, EdgeConnect>,
    owners: BTreeMap<(String, String, String), ObjectMeta>,
    fail_writes: bool,
    conflict_on_status: bool,
}

/// Cluster state kept in ordered maps behind a mutex.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn object_key<K: ResourceExt>(object: &K) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}

fn api_error(code: u16, reason: &str) -> anyhow::Error {
    anyhow::Error::new(kube::Error::Api(kube::error::ErrorResponse {
        status: Some(kube::core::response::StatusSummary::Failure),
        message: format!("fake cluster: {reason}"),
        reason: reason.to_string(),
        code,
        metadata: None,
        details: None,
    }.boxed()))
}

impl FakeCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster lock poisoned")
    }

    /// Make every subsequent write fail with a 500.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Make status writes fail with a 409.
    pub fn conflict_on_status(&self, conflict: bool) {
        self.state().conflict_on_status = conflict;
    }

    pub fn insert_secret(&self, secret: Secret) {
        self.state().secrets.insert(object_key(&secret), secret);
    }

    /// Insert an opaque secret from string data.
    pub fn insert_secret_data(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        self.insert_secret(secret);
    }

    pub fn insert_config_map(&self, config_map: ConfigMap) {
        self.state()
            .config_maps
            .insert(object_key(&config_map), config_map);
    }

    pub fn insert_namespace(&self, namespace: Namespace) {
        self.state()
            .namespaces
            .insert(namespace.name_any(), namespace);
    }

    pub fn insert_dynakube(&self, dynakube: DynaKube) {
        self.state()
            .dynakubes
            .insert(object_key(&dynakube), dynakube);
    }

    pub fn insert_edge_connect(&self, edge_connect: EdgeConnect) {
        self.state()
            .edge_connects
            .insert(object_key(&edge_connect), edge_connect);
    }

    /// Register an owner object for the owner-reference walk.
    pub fn insert_owner(&self, namespace: &str, kind: &str, meta: ObjectMeta) {
        let name = meta.name.clone().unwrap_or_default();
        self.state()
            .owners
            .insert((namespace.to_string(), kind.to_string(), name), meta);
    }

    #[must_use]
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state().secrets.get(&key(namespace, name)).cloned()
    }

    #[must_use]
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state().config_maps.get(&key(namespace, name)).cloned()
    }

    #[must_use]
    pub fn stateful_set(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.state()
            .stateful_sets
            .get(&key(namespace, name))
            .cloned()
    }

    #[must_use]
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state().deployments.get(&key(namespace, name)).cloned()
    }

    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state().namespaces.get(name).cloned()
    }

    #[must_use]
    pub fn dynakube_status(&self, namespace: &str, name: &str) -> Option<DynaKubeStatus> {
        self.state()
            .dynakubes
            .get(&key(namespace, name))
            .and_then(|dk| dk.status.clone())
    }

    #[must_use]
    pub fn edge_connect_status(&self, namespace: &str, name: &str) -> Option<EdgeConnectStatus> {
        self.state()
            .edge_connects
            .get(&key(namespace, name))
            .and_then(|ec| ec.status.clone())
    }

    fn check_writable(&self) -> Result<()> {
        if self.state().fail_writes {
            return Err(api_error(500, "InternalError"));
        }
        Ok(())
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secret(namespace, name))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.config_map(namespace, name))
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        Ok(self.stateful_set(namespace, name))
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        Ok(self.namespace(name))
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(self.state().namespaces.values().cloned().collect())
    }

    async fn get_dynakube(&self, namespace: &str, name: &str) -> Result<Option<DynaKube>> {
        Ok(self.state().dynakubes.get(&key(namespace, name)).cloned())
    }

    async fn get_owner(
        &self,
        namespace: &str,
        _api_version: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        Ok(self
            .state()
            .owners
            .get(&(namespace.to_string(), kind.to_string(), name.to_string()))
            .cloned())
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state();
        let changed = state.secrets.get(&object_key(secret)).map_or(true, |existing| {
            existing.data != secret.data || existing.type_ != secret.type_
        });
        state.secrets.insert(object_key(secret), secret.clone());
        Ok(changed)
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state();
        let changed = state
            .config_maps
            .get(&object_key(config_map))
            .map_or(true, |existing| existing.data != config_map.data);
        state
            .config_maps
            .insert(object_key(config_map), config_map.clone());
        Ok(changed)
    }

    async fn apply_stateful_set(&self, stateful_set: &StatefulSet) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state();
        let changed = state
            .stateful_sets
            .get(&object_key(stateful_set))
            .map_or(true, |existing| get_hash(existing) != get_hash(stateful_set));
        state
            .stateful_sets
            .insert(object_key(stateful_set), stateful_set.clone());
        Ok(changed)
    }

    async fn apply_deployment(&self, deployment: &Deployment) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state();
        let changed = state
            .deployments
            .get(&object_key(deployment))
            .map_or(true, |existing| get_hash(existing) != get_hash(deployment));
        state
            .deployments
            .insert(object_key(deployment), deployment.clone());
        Ok(changed)
    }

    async fn delete_stateful_set(&self, namespace: &str, name: &str) -> Result<bool> {
        self.check_writable()?;
        Ok(self
            .state()
            .stateful_sets
            .remove(&key(namespace, name))
            .is_some())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool> {
        self.check_writable()?;
        Ok(self
            .state()
            .config_maps
            .remove(&key(namespace, name))
            .is_some())
    }

    async fn set_namespace_labels(
        &self,
        name: &str,
        labels: &BTreeMap<String, Option<String>>,
    ) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state();
        let namespace = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        let current = namespace.metadata.labels.get_or_insert_with(BTreeMap::new);
        for (k, v) in labels {
            match v {
                Some(value) => {
                    current.insert(k.clone(), value.clone());
                }
                None => {
                    current.remove(k);
                }
            }
        }
        Ok(())
    }

    async fn patch_dynakube_status(
        &self,
        dynakube: &DynaKube,
        status: &DynaKubeStatus,
    ) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state();
        if state.conflict_on_status {
            return Err(api_error(409, "Conflict"));
        }
        let entry = state
            .dynakubes
            .entry(object_key(dynakube))
            .or_insert_with(|| dynakube.clone());
        entry.status = Some(status.clone());
        Ok(())
    }

    async fn patch_edge_connect_status(
        &self,
        edge_connect: &EdgeConnect,
        status: &EdgeConnectStatus,
    ) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state();
        if state.conflict_on_status {
            return Err(api_error(409, "Conflict"));
        }
        let entry = state
            .edge_connects
            .entry(object_key(edge_connect))
            .or_insert_with(|| edge_connect.clone());
        entry.status = Some(status.clone());
        Ok(())
    }

    async fn kube_system_uid(&self) -> Result<String> {
        Ok(self
            .namespace("kube-system")
            .and_then(|ns| ns.metadata.uid)
            .unwrap_or_else(|| "kube-system-uid".to_string()))
    }
}
