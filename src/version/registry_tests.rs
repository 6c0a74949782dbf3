// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `registry.rs`

use super::*;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIGEST: &str = "sha256:7ece13a07a20c77a31cc36906a10ebc90bd47970905ee61e8ed491b7f4c5d62f";
const CONFIG_DIGEST: &str = "sha256:c0ffee";

fn registry_host(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn config_blob() -> serde_json::Value {
    json!({
        "config": {
            "Labels": {
                "com.dynatrace.type": "immutable",
                "com.dynatrace.build-version": "1.2.3.4-5"
            }
        }
    })
}

#[tokio::test]
async fn test_image_version_reads_digest_and_labels() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/linux/oneagent/manifests/1.2.3"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Docker-Content-Digest", DIGEST)
                .set_body_json(json!({
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "config": {"digest": CONFIG_DIGEST}
                })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/linux/oneagent/blobs/{CONFIG_DIGEST}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_blob()))
        .mount(&server)
        .await;

    let client = OciRegistryClient::new(HttpClient::new(), RegistryCredentials::default())
        .with_plain_http();
    let image = format!("{}/linux/oneagent:1.2.3", registry_host(&server));
    let version = client.image_version(&image).await.expect("version");

    assert_eq!(version.digest, DIGEST);
    assert_eq!(version.version.as_deref(), Some("1.2.3.4-5"));
    assert_eq!(version.r#type.as_deref(), Some("immutable"));
}

#[tokio::test]
async fn test_image_version_follows_index_to_amd64() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/linux/codemodules/manifests/latest"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Docker-Content-Digest", DIGEST)
                .set_body_json(json!({
                    "mediaType": "application/vnd.oci.image.index.v1+json",
                    "manifests": [
                        {"digest": "sha256:arm", "platform": {"architecture": "arm64", "os": "linux"}},
                        {"digest": "sha256:amd", "platform": {"architecture": "amd64", "os": "linux"}}
                    ]
                })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/linux/codemodules/manifests/sha256:amd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "config": {"digest": CONFIG_DIGEST}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/linux/codemodules/blobs/{CONFIG_DIGEST}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_blob()))
        .mount(&server)
        .await;

    let client = OciRegistryClient::new(HttpClient::new(), RegistryCredentials::default())
        .with_plain_http();
    let image = format!("{}/linux/codemodules", registry_host(&server));
    let version = client.image_version(&image).await.expect("version");

    assert_eq!(version.digest, DIGEST, "digest of the index, not the child");
    assert_eq!(version.version.as_deref(), Some("1.2.3.4-5"));
}

#[tokio::test]
async fn test_image_version_sends_credentials() {
    let server = MockServer::start().await;
    let host = registry_host(&server);
    Mock::given(method("GET"))
        .and(path("/v2/repo/manifests/tag"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let docker_config = json!({"auths": {host.clone(): {"username": "user", "password": "pass"}}});
    let credentials =
        RegistryCredentials::from_docker_config(docker_config.to_string().as_bytes()).expect("creds");
    let client = OciRegistryClient::new(HttpClient::new(), credentials).with_plain_http();

    let version = client
        .image_version(&format!("{host}/repo:tag"))
        .await
        .expect("version");
    assert!(version.digest.starts_with("sha256:"), "digest computed from body");
    assert_eq!(version.version, None);
}

#[tokio::test]
async fn test_image_version_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = OciRegistryClient::new(HttpClient::new(), RegistryCredentials::default())
        .with_plain_http();
    let err = client
        .image_version(&format!("{}/repo:tag", registry_host(&server)))
        .await
        .expect_err("error");
    assert!(matches!(err, VersionError::Registry { .. }));
}

#[test]
fn test_credentials_from_auth_field() {
    // "user:pass"
    let raw = br#"{"auths":{"https://registry.example.com/v1/":{"auth":"dXNlcjpwYXNz"}}}"#;
    let credentials = RegistryCredentials::from_docker_config(raw).expect("creds");
    assert_eq!(
        credentials.for_host("registry.example.com"),
        Some(&("user".to_string(), "pass".to_string()))
    );
}

#[test]
fn test_credentials_invalid_json() {
    assert!(RegistryCredentials::from_docker_config(b"not json").is_err());
}
