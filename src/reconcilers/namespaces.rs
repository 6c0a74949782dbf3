// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespace mapper.
//!
//! Namespaces governed by a `DynaKube` carry the
//! `dynakube.internal.dynatrace.com/instance=<name>` label. The admission
//! webhook reads this label to find the `DynaKube` of a pod.
//!
//! A namespace is governed when it matches the agent injection selector or
//! the metadata enrichment selector of the `DynaKube`. System namespaces and
//! the operator namespace are never labelled.

use crate::cluster::Cluster;
use crate::crd::DynaKube;
use crate::labels::INJECTION_INSTANCE_LABEL;
use crate::selector::matches_optional_selector;
use anyhow::{bail, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Namespace name prefixes that are never injected.
const IGNORED_NAMESPACE_PREFIXES: [&str; 3] = ["kube-", "openshift", "gke-"];

fn is_ignored_namespace(name: &str, operator_namespace: &str) -> bool {
    name == operator_namespace
        || IGNORED_NAMESPACE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

/// True when `dk` wants to inject into a namespace with these labels.
#[must_use]
pub fn dynakube_matches_namespace(dk: &DynaKube, labels: &BTreeMap<String, String>) -> bool {
    let agent = dk.needs_app_injection()
        && matches_optional_selector(dk.one_agent_namespace_selector(), labels);
    let enrichment = dk.metadata_enrichment_enabled()
        && matches_optional_selector(dk.spec.metadata_enrichment.namespace_selector.as_ref(), labels);
    agent || enrichment
}

/// Label matching namespaces with the `DynaKube` name and unlabel those that
/// no longer match.
///
/// A namespace labelled for another existing `DynaKube` that also matches it
/// is a conflict. Labels naming a `DynaKube` that is gone are overwritten.
///
/// Returns the number of namespaces whose labels changed.
///
/// # Errors
///
/// Returns an error on conflicting `DynaKube`s or cluster API failures.
pub async fn map_namespaces(cluster: &dyn Cluster, dk: &DynaKube) -> Result<usize> {
    let dk_name = dk.name_any();
    let operator_namespace = dk.namespace().unwrap_or_default();
    let mut changed = 0;

    for namespace in cluster.list_namespaces().await? {
        let name = namespace.name_any();
        if is_ignored_namespace(&name, &operator_namespace) {
            continue;
        }

        let labels = namespace.labels();
        let current = labels.get(INJECTION_INSTANCE_LABEL).map(String::as_str);
        let matches = dynakube_matches_namespace(dk, labels);

        let update = match (matches, current) {
            (true, Some(owner)) if owner == dk_name => None,
            (true, Some(other)) => {
                check_conflict(cluster, &operator_namespace, other, &namespace, &dk_name).await?;
                Some(Some(dk_name.clone()))
            }
            (true, None) => Some(Some(dk_name.clone())),
            (false, Some(owner)) if owner == dk_name => Some(None),
            (false, _) => None,
        };

        if let Some(value) = update {
            let patch = BTreeMap::from([(INJECTION_INSTANCE_LABEL.to_string(), value.clone())]);
            cluster.set_namespace_labels(&name, &patch).await?;
            changed += 1;
            match value {
                Some(_) => info!(namespace = %name, dynakube = %dk_name, "Namespace mapped"),
                None => info!(namespace = %name, dynakube = %dk_name, "Namespace unmapped"),
            }
        }
    }

    debug!(dynakube = %dk_name, changed, "Namespace mapping complete");
    Ok(changed)
}

async fn check_conflict(
    cluster: &dyn Cluster,
    operator_namespace: &str,
    other: &str,
    namespace: &Namespace,
    dk_name: &str,
) -> Result<()> {
    if let Some(other_dk) = cluster.get_dynakube(operator_namespace, other).await? {
        if dynakube_matches_namespace(&other_dk, namespace.labels()) {
            bail!(
                "namespace {} is matched by both DynaKube {other} and DynaKube {dk_name}",
                namespace.name_any()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "namespaces_tests.rs"]
mod namespaces_tests;
