//! Apigee Client
//!
//! Main client for the Apigee management API, combining credentials,
//! HTTP transport and URL construction for one organization.

use super::auth::{CredentialProvider, GcpCredentials};
use super::http::{ApiResponse, ApigeeHttpClient};
use crate::config::ProviderConfig;
use crate::context::OpContext;
use crate::error::{DcError, Result};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Main Apigee client
#[derive(Clone)]
pub struct ApigeeClient {
    credentials: Arc<dyn CredentialProvider>,
    http: ApigeeHttpClient,
    base_url: Url,
    org: String,
}

impl ApigeeClient {
    /// Create a client from resolved configuration
    pub async fn new(config: &ProviderConfig) -> Result<Self> {
        let credentials = GcpCredentials::from_source(&config.credentials).await?;
        let http = ApigeeHttpClient::new(config.request_timeout)?;

        Ok(Self::with_parts(
            Arc::new(credentials),
            http,
            config.base_url.clone(),
            &config.org_name,
        ))
    }

    /// Assemble a client from explicit collaborators
    pub fn with_parts(
        credentials: Arc<dyn CredentialProvider>,
        http: ApigeeHttpClient,
        base_url: Url,
        org: &str,
    ) -> Self {
        Self {
            credentials,
            http,
            base_url,
            org: org.to_string(),
        }
    }

    /// Organization every request is scoped to
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Fetch a token and send one request, bounded by `ctx`
    pub async fn execute(
        &self,
        ctx: &OpContext,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        ctx.run(async {
            let token = self.credentials.access_token().await?;
            self.http.send(method, url, &token, body).await
        })
        .await
    }

    // =========================================================================
    // Data collector URL helpers
    // =========================================================================

    /// Build an Apigee v1 URL from already-encoded path segments
    fn api_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("v1/{}", path))
            .map_err(|e| DcError::ConfigInvalid(format!("cannot build URL for {path}: {e}")))
    }

    /// `/v1/organizations/{org}/datacollectors`
    pub fn datacollectors_url(&self) -> Result<Url> {
        self.api_url(&format!(
            "organizations/{}/datacollectors",
            urlencoding::encode(&self.org)
        ))
    }

    /// `/v1/organizations/{org}/datacollectors/{name}`
    pub fn datacollector_url(&self, name: &str) -> Result<Url> {
        self.api_url(&format!(
            "organizations/{}/datacollectors/{}",
            urlencoding::encode(&self.org),
            urlencoding::encode(name)
        ))
    }
}
