// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `version/mod.rs`

use super::*;

#[test]
fn test_build_client_defaults() {
    assert!(HttpSettings::default().build_client().is_ok());
}

#[test]
fn test_build_client_with_proxy() {
    let settings = HttpSettings {
        proxy: Some("http://proxy.example.com:3128".to_string()),
        ..HttpSettings::default()
    };
    assert!(settings.build_client().is_ok());
}

#[test]
fn test_build_client_invalid_proxy() {
    let settings = HttpSettings {
        proxy: Some("http://[::1".to_string()),
        ..HttpSettings::default()
    };
    assert!(settings.build_client().is_err());
}

#[test]
fn test_factory_builds_clients() {
    let factory = ReqwestClientFactory;
    let settings = HttpSettings::default();
    assert!(factory
        .vendor("https://abc.live.dynatrace.com/api", "token", &settings)
        .is_ok());
    assert!(factory
        .registry(RegistryCredentials::default(), &settings)
        .is_ok());
}
