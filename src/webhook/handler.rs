// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admission handler for pods.
//!
//! The handler never rejects a pod. Failures are logged, counted and reported
//! as a warning on an allowed response without a patch.

use crate::errors::WebhookError;
use crate::labels::{
    ANNOTATION_DYNATRACE_INJECT, ANNOTATION_DYNATRACE_INJECTED, ANNOTATION_OC_DEBUG_SOURCE_CONTAINER,
    ANNOTATION_OC_DEBUG_SOURCE_RESOURCE, INJECTION_INSTANCE_LABEL,
};
use crate::metrics::{record_admission, record_pod_mutation};
use crate::webhook::install_container::build_install_container;
use crate::webhook::request::{BaseRequest, MutationRequest};
use crate::webhook::{PodMutator, WebhookState};
use axum::{extract::State, Json};
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `POST /inject`
pub async fn inject(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            record_admission("invalid");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(review(&state, &req).await.into_review())
}

/// Answer one admission request.
pub async fn review(state: &WebhookState, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);
    let Some(object) = &req.object else {
        debug!(uid = %req.uid, "No object in admission request, allowing unchanged");
        record_admission("skipped");
        return response;
    };

    let pod = match decode_pod(object) {
        Ok(pod) => pod,
        Err(e) => return allow_with_warning(response, &e),
    };
    let namespace = req
        .namespace
        .clone()
        .or_else(|| pod.namespace())
        .unwrap_or_default();

    match patch_for(state, &namespace, pod).await {
        Ok(patch) if patch.0.is_empty() => {
            record_admission("skipped");
            response
        }
        Ok(patch) => {
            let operations = patch.0.len();
            match response.clone().with_patch(patch) {
                Ok(patched) => {
                    info!(uid = %req.uid, namespace = %namespace, operations, "Pod mutated");
                    record_admission("mutated");
                    patched
                }
                Err(e) => allow_with_warning(
                    response,
                    &WebhookError::Patch {
                        reason: e.to_string(),
                    },
                ),
            }
        }
        Err(e) => allow_with_warning(response, &e),
    }
}

fn decode_pod(object: &DynamicObject) -> Result<Pod, WebhookError> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| WebhookError::Decode {
            reason: e.to_string(),
        })
}

fn allow_with_warning(mut response: AdmissionResponse, error: &WebhookError) -> AdmissionResponse {
    warn!(error = %error, "Pod admitted without mutation");
    record_admission("error");
    response
        .warnings
        .get_or_insert_with(Vec::new)
        .push(error.to_string());
    response
}

fn is_oc_debug_pod(pod: &Pod) -> bool {
    let annotations = pod.annotations();
    annotations.contains_key(ANNOTATION_OC_DEBUG_SOURCE_CONTAINER)
        && annotations.contains_key(ANNOTATION_OC_DEBUG_SOURCE_RESOURCE)
}

/// JSON patch turning `pod` into its mutated form. An empty patch leaves the
/// pod untouched.
///
/// # Errors
///
/// Returns a [`WebhookError`] when a lookup or a mutator fails.
pub async fn patch_for(
    state: &WebhookState,
    namespace: &str,
    pod: Pod,
) -> Result<json_patch::Patch, WebhookError> {
    let pod_name = pod.name_any();
    if is_oc_debug_pod(&pod) {
        debug!(pod = %pod_name, "OpenShift debug pod, skipping");
        return Ok(json_patch::Patch::default());
    }
    if pod.annotations().get(ANNOTATION_DYNATRACE_INJECT).map(String::as_str) == Some("false") {
        debug!(pod = %pod_name, "Injection disabled by annotation");
        return Ok(json_patch::Patch::default());
    }

    let Some(ns) = state
        .cluster
        .get_namespace(namespace)
        .await
        .map_err(|source| WebhookError::Lookup {
            kind: "Namespace",
            name: namespace.to_string(),
            source,
        })?
    else {
        return Ok(json_patch::Patch::default());
    };
    let Some(instance) = ns.labels().get(INJECTION_INSTANCE_LABEL).cloned() else {
        debug!(namespace = %namespace, "Namespace not governed by a DynaKube");
        return Ok(json_patch::Patch::default());
    };
    let Some(dynakube) = state
        .cluster
        .get_dynakube(&state.config.namespace, &instance)
        .await
        .map_err(|source| WebhookError::Lookup {
            kind: "DynaKube",
            name: instance.clone(),
            source,
        })?
    else {
        warn!(namespace = %namespace, dynakube = %instance, "DynaKube of namespace not found");
        return Ok(json_patch::Patch::default());
    };

    let before = to_json(&pod)?;
    let base = BaseRequest::new(pod, ns, dynakube);
    let enabled: Vec<&dyn PodMutator> = state
        .mutators
        .iter()
        .map(|m| m.as_ref())
        .filter(|m| m.enabled(&base))
        .collect();
    if enabled.is_empty() {
        debug!(pod = %pod_name, "No mutator enabled");
        return Ok(json_patch::Patch::default());
    }

    let already_injected = base.pod_annotation(ANNOTATION_DYNATRACE_INJECTED) == Some("true")
        || state.mutators.iter().any(|m| m.injected(&base));
    let mutated = if already_injected {
        reinvoke(&enabled, base)
    } else {
        Some(mutate(state, &enabled, base).await?)
    };

    match mutated {
        Some(pod) => Ok(json_patch::diff(&before, &to_json(&pod)?)),
        None => Ok(json_patch::Patch::default()),
    }
}

/// Reinvocation pass. `None` when no mutator changed the pod.
fn reinvoke(mutators: &[&dyn PodMutator], mut base: BaseRequest) -> Option<Pod> {
    let mut changed = false;
    for mutator in mutators {
        if mutator.reinvoke(&mut base) {
            debug!(pod = %base.pod.name_any(), mutator = mutator.name(), "Reinvocation updated pod");
            record_pod_mutation(mutator.name(), "reinvoked");
            changed = true;
        }
    }
    changed.then_some(base.pod)
}

async fn mutate(
    state: &WebhookState,
    mutators: &[&dyn PodMutator],
    base: BaseRequest,
) -> Result<Pod, WebhookError> {
    let install = build_install_container(
        &state.config.webhook_image,
        &state.config.cluster_id,
        &base.pod,
        &base.dynakube,
    );
    let mut request = MutationRequest::new(base, install);

    for mutator in mutators {
        if let Err(e) = mutator.mutate(&mut request).await {
            record_pod_mutation(mutator.name(), "error");
            return Err(WebhookError::Mutator {
                mutator: mutator.name(),
                source: anyhow::Error::new(e),
            });
        }
        record_pod_mutation(mutator.name(), "injected");
    }

    let MutationRequest {
        mut base,
        install_container,
        ..
    } = request;
    base.set_pod_annotation(ANNOTATION_DYNATRACE_INJECTED, "true");
    if let Some(spec) = base.pod.spec.as_mut() {
        spec.init_containers
            .get_or_insert_with(Vec::new)
            .push(install_container);
    }
    Ok(base.pod)
}

fn to_json(pod: &Pod) -> Result<serde_json::Value, WebhookError> {
    serde_json::to_value(pod).map_err(|e| WebhookError::Patch {
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod handler_tests;
