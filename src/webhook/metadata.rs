// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Metadata enrichment of pods.
//!
//! Copies `metadata.dynatrace.com/*` annotations and custom rule values from
//! the namespace onto the pod, and records the root workload of the pod.
//! Existing pod annotations are never overwritten, so of two rules writing the
//! same target the first declared one wins.

use crate::cluster::Cluster;
use crate::crd::EnrichmentRuleType;
use crate::errors::WebhookError;
use crate::labels::{
    ANNOTATION_METADATA_ENRICHMENT_INJECT, ANNOTATION_METADATA_ENRICHMENT_INJECTED,
    ANNOTATION_WORKLOAD_KIND, ANNOTATION_WORKLOAD_NAME, METADATA_PREFIX,
};
use crate::selector::matches_optional_selector;
use crate::webhook::request::{BaseRequest, MutationRequest};
use crate::webhook::PodMutator;
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Enriches pods with namespace and workload metadata.
pub struct MetadataMutator {
    cluster: Arc<dyn Cluster>,
}

impl MetadataMutator {
    #[must_use]
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }
}

/// Annotations the namespace contributes to the pod, in rule order.
#[must_use]
pub fn namespace_metadata(request: &BaseRequest) -> Vec<(String, String)> {
    let namespace = &request.namespace;
    let mut copied: Vec<(String, String)> = namespace
        .annotations()
        .iter()
        .filter(|(key, _)| key.starts_with(METADATA_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for rule in &request.dynakube.spec.metadata_enrichment.rules {
        if rule.target.is_empty() {
            warn!(source = %rule.source, "Enrichment rule without target, skipping");
            continue;
        }
        let source = match rule.r#type {
            EnrichmentRuleType::Label => namespace.labels(),
            EnrichmentRuleType::Annotation => namespace.annotations(),
        };
        match source.get(&rule.source) {
            Some(value) => copied.push((format!("{METADATA_PREFIX}{}", rule.target), value.clone())),
            None => debug!(source = %rule.source, "Enrichment rule source not found on namespace"),
        }
    }
    copied
}

fn add_missing(annotations: &mut BTreeMap<String, String>, entries: Vec<(String, String)>) {
    for (key, value) in entries {
        annotations.entry(key).or_insert(value);
    }
}

#[async_trait]
impl PodMutator for MetadataMutator {
    fn name(&self) -> &'static str {
        "metadata-enrichment"
    }

    fn enabled(&self, request: &BaseRequest) -> bool {
        let dk = &request.dynakube;
        request.injection_requested(ANNOTATION_METADATA_ENRICHMENT_INJECT)
            && dk.metadata_enrichment_enabled()
            && matches_optional_selector(
                dk.spec.metadata_enrichment.namespace_selector.as_ref(),
                request.namespace.labels(),
            )
    }

    fn injected(&self, request: &BaseRequest) -> bool {
        request.pod_annotation(ANNOTATION_METADATA_ENRICHMENT_INJECTED) == Some("true")
    }

    async fn mutate(&self, request: &mut MutationRequest) -> Result<(), WebhookError> {
        let workload = request.workload(self.cluster.as_ref()).await?;

        let mut entries = namespace_metadata(&request.base);
        entries.push((ANNOTATION_WORKLOAD_KIND.to_string(), workload.kind.clone()));
        entries.push((ANNOTATION_WORKLOAD_NAME.to_string(), workload.name.clone()));
        add_missing(
            request
                .base
                .pod
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new),
            entries,
        );

        request
            .base
            .set_pod_annotation(ANNOTATION_METADATA_ENRICHMENT_INJECTED, "true");
        debug!(pod = %request.base.pod.name_any(), kind = %workload.kind, workload = %workload.name, "Metadata enrichment applied");
        Ok(())
    }

    /// Enrichment is pod level; new containers need nothing.
    fn reinvoke(&self, _request: &mut BaseRequest) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod metadata_tests;
