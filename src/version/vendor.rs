// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client for the tenant deployment API.
//!
//! Only the calls the operator needs are implemented: latest agent and gateway
//! versions, latest public images and the agent connection info. All requests
//! authenticate with `Authorization: Api-Token <token>`.

use crate::crd::CommunicationHost;
use crate::errors::VersionError;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

/// Latest image published on the public registry for a component.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LatestImageInfo {
    pub source: String,
    pub tag: String,
}

impl LatestImageInfo {
    /// `source:tag`
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}:{}", self.source, self.tag)
    }
}

/// Components with a public image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageComponent {
    OneAgent,
    CodeModules,
    ActiveGate,
}

impl ImageComponent {
    fn path(self) -> &'static str {
        match self {
            Self::OneAgent => "/v1/deployment/image/agent/oneAgent/latest",
            Self::CodeModules => "/v1/deployment/image/agent/codeModules/latest",
            Self::ActiveGate => "/v1/deployment/image/gateway/latest",
        }
    }
}

/// Connection details the injected agent needs to reach the tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OneAgentConnectionInfo {
    pub tenant_uuid: String,
    pub tenant_token: String,
    pub endpoints: String,
    pub communication_hosts: Vec<CommunicationHost>,
}

/// Calls against the tenant deployment API.
#[async_trait]
pub trait VendorApi: Send + Sync {
    /// Latest agent version for unix with the default installer.
    async fn latest_agent_version(&self) -> Result<String, VersionError>;

    async fn latest_active_gate_version(&self) -> Result<String, VersionError>;

    async fn latest_image(&self, component: ImageComponent) -> Result<LatestImageInfo, VersionError>;

    async fn one_agent_connection_info(&self) -> Result<OneAgentConnectionInfo, VersionError>;
}

const AGENT_VERSION_PATH: &str = "/v1/deployment/installer/agent/unix/default/latest/metainfo";
const GATEWAY_VERSION_PATH: &str = "/v1/deployment/installer/gateway/unix/latest/metainfo";
const CONNECTION_INFO_PATH: &str = "/v1/deployment/installer/agent/connectioninfo";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentVersionResponse {
    latest_agent_version: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayVersionResponse {
    latest_gateway_version: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionInfoResponse {
    #[serde(rename = "tenantUUID", default)]
    tenant_uuid: String,
    #[serde(default)]
    tenant_token: String,
    #[serde(default)]
    communication_endpoints: Vec<String>,
    #[serde(default)]
    formatted_communication_endpoints: String,
}

/// Parse `https://host:443/communication` into a [`CommunicationHost`].
///
/// Endpoints that are not absolute URLs are skipped.
#[must_use]
pub fn parse_communication_host(endpoint: &str) -> Option<CommunicationHost> {
    let url = url::Url::parse(endpoint).ok()?;
    Some(CommunicationHost {
        protocol: url.scheme().to_string(),
        host: url.host_str()?.to_string(),
        port: url.port_or_known_default()?,
    })
}

/// [`VendorApi`] over HTTPS with reqwest.
pub struct DynatraceClient {
    http: HttpClient,
    base_url: String,
    api_token: String,
}

impl DynatraceClient {
    #[must_use]
    pub fn new(http: HttpClient, api_url: &str, api_token: &str) -> Self {
        Self {
            http,
            base_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, VersionError> {
        let url = format!("{}{path}", self.base_url);
        let failed = |reason: String| VersionError::VendorApi {
            endpoint: path.to_string(),
            reason,
        };

        debug!(url = %url, "Vendor API request");

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Api-Token {}", self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| failed(format!("failed to send request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(url = %url, status = %status, error = %body, "Vendor API request failed");
            return Err(failed(format!("HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| failed(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl VendorApi for DynatraceClient {
    async fn latest_agent_version(&self) -> Result<String, VersionError> {
        let response: AgentVersionResponse = self.get_json(AGENT_VERSION_PATH).await?;
        Ok(response.latest_agent_version)
    }

    async fn latest_active_gate_version(&self) -> Result<String, VersionError> {
        let response: GatewayVersionResponse = self.get_json(GATEWAY_VERSION_PATH).await?;
        Ok(response.latest_gateway_version)
    }

    async fn latest_image(&self, component: ImageComponent) -> Result<LatestImageInfo, VersionError> {
        self.get_json(component.path()).await
    }

    async fn one_agent_connection_info(&self) -> Result<OneAgentConnectionInfo, VersionError> {
        let response: ConnectionInfoResponse = self.get_json(CONNECTION_INFO_PATH).await?;
        let communication_hosts = response
            .communication_endpoints
            .iter()
            .filter_map(|e| parse_communication_host(e))
            .collect();
        Ok(OneAgentConnectionInfo {
            tenant_uuid: response.tenant_uuid,
            tenant_token: response.tenant_token,
            endpoints: response.formatted_communication_endpoints,
            communication_hosts,
        })
    }
}

#[cfg(test)]
#[path = "vendor_tests.rs"]
mod vendor_tests;
