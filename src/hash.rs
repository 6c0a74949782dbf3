// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Content hashes that drive rolling restarts.
//!
//! Values are serialized to JSON and hashed with SHA-256. Kubernetes maps are
//! `BTreeMap`s, so the serialized form is canonical and the hash is stable
//! across reconciles.

use crate::labels::ANNOTATION_HASH;
use anyhow::{Context as _, Result};
use kube::Resource;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of the canonical JSON form of `value`.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn generate_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).context("failed to serialize value for hashing")?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}

/// Stamp the structural hash of `object` onto its own annotations.
///
/// The hash is computed with the annotation removed so re-stamping is
/// idempotent.
///
/// # Errors
///
/// Returns an error if the object cannot be serialized.
pub fn set_hash<K>(object: &mut K) -> Result<String>
where
    K: Resource + Serialize,
{
    if let Some(annotations) = object.meta_mut().annotations.as_mut() {
        annotations.remove(ANNOTATION_HASH);
    }
    let hash = generate_hash(object)?;
    object
        .meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(ANNOTATION_HASH.to_string(), hash.clone());
    Ok(hash)
}

/// The structural hash previously stamped on `object`, if any.
#[must_use]
pub fn get_hash<K: Resource>(object: &K) -> Option<&str> {
    object
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_HASH))
        .map(String::as_str)
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod hash_tests;
