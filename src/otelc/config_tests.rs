// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

use super::*;
use serde_yaml::Value as Yaml;

fn full(protocols: &[Protocol]) -> ConfigBuilder {
    ConfigBuilder::new(protocols)
        .with_api_token("${env:DT_DATA_INGEST_TOKEN}")
        .with_exporters_endpoint("${env:DT_ENDPOINT}")
        .with_exporters()
        .with_processors()
        .with_receivers()
        .with_extensions()
        .with_services()
}

fn parse(config: &GeneratedConfig) -> Yaml {
    serde_yaml::from_slice(&config.bytes).unwrap()
}

#[test]
fn test_output_is_byte_identical_across_builds() {
    let first = full(&[]).with_ca("/tls/custom/cacerts/rootca.pem").build().unwrap();
    let second = full(&[]).with_ca("/tls/custom/cacerts/rootca.pem").build().unwrap();

    assert_eq!(first.bytes, second.bytes);
}

#[test]
fn test_protocol_order_does_not_change_output() {
    let a = full(&[Protocol::Zipkin, Protocol::Otlp]).build().unwrap();
    let b = full(&[Protocol::Otlp, Protocol::Zipkin, Protocol::Otlp]).build().unwrap();

    assert_eq!(a, b);
    assert_eq!(a.protocols, vec![Protocol::Otlp, Protocol::Zipkin]);
}

#[test]
fn test_empty_protocols_enable_all_receivers() {
    let config = full(&[]).build().unwrap();
    let doc = parse(&config);

    assert_eq!(config.protocols, Protocol::ALL.to_vec());
    for name in ["otlp", "jaeger", "statsd", "zipkin"] {
        assert!(doc["receivers"].get(name).is_some(), "missing receiver {name}");
    }
}

#[test]
fn test_parse_protocols() {
    assert_eq!(parse_protocols::<&str>(&[]).unwrap(), Protocol::ALL.to_vec());
    assert_eq!(
        parse_protocols(&["statsd", "otlp"]).unwrap(),
        vec![Protocol::Otlp, Protocol::Statsd]
    );
    assert_eq!(
        parse_protocols(&["otlp", "carrier-pigeon"]).unwrap_err(),
        ConfigError::UnknownProtocol {
            protocol: "carrier-pigeon".to_string()
        }
    );
}

#[test]
fn test_exporters_require_endpoint() {
    let err = ConfigBuilder::new(&[])
        .with_api_token("token")
        .with_exporters()
        .build()
        .unwrap_err();

    assert_eq!(err, ConfigError::MissingSubstitution { option: "endpoint" });
}

#[test]
fn test_exporters_require_api_token() {
    let err = ConfigBuilder::new(&[])
        .with_exporters_endpoint("https://example.com")
        .with_exporters()
        .build()
        .unwrap_err();

    assert_eq!(err, ConfigError::MissingSubstitution { option: "api token" });
}

#[test]
fn test_missing_substitutions_are_fine_without_exporters() {
    let config = ConfigBuilder::new(&[]).with_receivers().build().unwrap();

    assert!(parse(&config).get("exporters").is_none());
}

#[test]
fn test_exporter_headers_and_ca() {
    let config = full(&[Protocol::Otlp])
        .with_ca("/tls/custom/activegate/cert.pem")
        .build()
        .unwrap();
    let exporter = &parse(&config)["exporters"]["otlphttp"];

    assert_eq!(exporter["endpoint"].as_str(), Some("${env:DT_ENDPOINT}"));
    assert_eq!(
        exporter["headers"]["Authorization"].as_str(),
        Some("Api-Token ${env:DT_DATA_INGEST_TOKEN}")
    );
    assert_eq!(
        exporter["tls"]["ca_file"].as_str(),
        Some("/tls/custom/activegate/cert.pem")
    );
}

#[test]
fn test_receiver_tls_applies_to_otlp_endpoints() {
    let config = full(&[Protocol::Otlp])
        .with_tls("/tls/custom/telemetry/tls.crt", "/tls/custom/telemetry/tls.key")
        .build()
        .unwrap();
    let doc = parse(&config);
    let grpc = &doc["receivers"]["otlp"]["protocols"]["grpc"];

    assert_eq!(grpc["endpoint"].as_str(), Some("${env:MY_POD_IP}:4317"));
    assert_eq!(
        grpc["tls"]["cert_file"].as_str(),
        Some("/tls/custom/telemetry/tls.crt")
    );
    assert_eq!(
        doc["receivers"]["otlp"]["protocols"]["http"]["tls"]["key_file"].as_str(),
        Some("/tls/custom/telemetry/tls.key")
    );
}

#[test]
fn test_receivers_without_tls() {
    let config = full(&[Protocol::Zipkin]).build().unwrap();
    let doc = parse(&config);

    assert_eq!(
        doc["receivers"]["zipkin"]["endpoint"].as_str(),
        Some("${env:MY_POD_IP}:9411")
    );
    assert!(doc["receivers"]["zipkin"].get("tls").is_none());
}

#[test]
fn test_statsd_only_builds_metrics_pipeline() {
    let config = full(&[Protocol::Statsd]).build().unwrap();
    let pipelines = &parse(&config)["service"]["pipelines"];

    assert!(pipelines.get("metrics").is_some());
    assert!(pipelines.get("traces").is_none());
    assert!(pipelines.get("logs").is_none());
    let processors: Vec<&str> = pipelines["metrics"]["processors"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(Yaml::as_str)
        .collect();
    assert!(processors.contains(&"cumulativetodelta"));
}

#[test]
fn test_trace_pipeline_collects_trace_receivers() {
    let config = full(&[]).build().unwrap();
    let parsed = parse(&config);
    let receivers: Vec<&str> = parsed["service"]["pipelines"]["traces"]["receivers"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(Yaml::as_str)
        .collect();

    assert_eq!(receivers, vec!["otlp", "jaeger", "zipkin"]);
}

#[test]
fn test_service_lists_health_check_extension() {
    let config = full(&[Protocol::Otlp]).build().unwrap();
    let doc = parse(&config);

    assert_eq!(
        doc["service"]["extensions"][0].as_str(),
        Some("health_check")
    );
    assert_eq!(
        doc["extensions"]["health_check"]["endpoint"].as_str(),
        Some("${env:MY_POD_IP}:13133")
    );
}

#[test]
fn test_pipelines_omit_disabled_sections() {
    let config = ConfigBuilder::new(&[Protocol::Otlp])
        .with_receivers()
        .with_services()
        .build()
        .unwrap();
    let traces = &parse(&config)["service"]["pipelines"]["traces"];

    assert!(traces.get("processors").is_none());
    assert!(traces.get("exporters").is_none());
}
