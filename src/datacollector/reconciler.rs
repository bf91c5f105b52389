//! Resource Reconciler
//!
//! One method per lifecycle operation. Each is a single authenticated round
//! trip, bounded by the caller's [`OpContext`]. Nothing is retried here;
//! callers consult [`DcError::is_transient`] to decide.

use super::{DataCollectorSpec, DataCollectorState, Observed};
use crate::context::OpContext;
use crate::error::{DcError, Result};
use crate::gcp::client::ApigeeClient;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Parsed `{project_id}/{name}` import key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    pub project_id: String,
    pub name: String,
}

/// Parse a composite import id; exactly two non-empty segments
pub fn parse_import_id(id: &str) -> Result<ImportId> {
    let parts: Vec<&str> = id.split('/').collect();
    match parts.as_slice() {
        [project_id, name] if !project_id.is_empty() && !name.is_empty() => Ok(ImportId {
            project_id: project_id.to_string(),
            name: name.to_string(),
        }),
        _ => Err(DcError::MalformedImportId(id.to_string())),
    }
}

/// Result of adopting an existing remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedCollector {
    pub project_id: String,
    pub name: String,
    pub observed: Observed,
}

/// Body sent on create
pub fn create_payload(spec: &DataCollectorSpec) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "type": spec.kind,
    })
}

/// Body sent on update; the name is immutable and never included
pub fn update_payload(spec: &DataCollectorSpec) -> Value {
    json!({
        "description": spec.description,
        "type": spec.kind,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    data_collectors: Vec<DataCollectorState>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Lifecycle operations for data collectors in one organization
#[derive(Clone)]
pub struct ResourceReconciler {
    client: ApigeeClient,
}

impl ResourceReconciler {
    pub fn new(client: ApigeeClient) -> Self {
        Self { client }
    }

    pub fn org(&self) -> &str {
        self.client.org()
    }

    /// Create the collector; returns its identity (the name)
    pub async fn create(&self, ctx: &OpContext, spec: &DataCollectorSpec) -> Result<String> {
        validate_spec(spec)?;

        let url = self.client.datacollectors_url()?;
        let body = create_payload(spec);
        let response = self
            .client
            .execute(ctx, Method::POST, &url, Some(&body))
            .await?;

        if response.status != StatusCode::CREATED {
            tracing::error!("Create of {} rejected: {}", spec.name, response.status);
            return Err(DcError::RemoteRejected {
                status: response.status,
            });
        }

        tracing::info!("Created data collector {} in {}", spec.name, self.org());
        Ok(spec.name.clone())
    }

    /// Read the collector; a 404 is `Observed::NotFound`
    pub async fn read(&self, ctx: &OpContext, name: &str) -> Result<Observed> {
        let url = self.client.datacollector_url(name)?;
        let response = self.client.execute(ctx, Method::GET, &url, None).await?;

        match response.status {
            StatusCode::OK => Ok(Observed::Found(response.json()?)),
            StatusCode::NOT_FOUND => {
                tracing::warn!("Data collector {} not found in {}", name, self.org());
                Ok(Observed::NotFound)
            }
            status => {
                tracing::error!("Read of {} failed: {}", name, status);
                Err(DcError::RemoteReadFailed { status })
            }
        }
    }

    /// Update description and type of an existing collector
    pub async fn update(&self, ctx: &OpContext, name: &str, spec: &DataCollectorSpec) -> Result<()> {
        validate_spec(spec)?;
        if spec.name != name {
            return Err(DcError::ConfigInvalid(format!(
                "name is immutable: cannot rename {} to {}",
                name, spec.name
            )));
        }

        let url = self.client.datacollector_url(name)?;
        let body = update_payload(spec);
        let response = self
            .client
            .execute(ctx, Method::PUT, &url, Some(&body))
            .await?;

        if response.status != StatusCode::OK {
            tracing::error!("Update of {} failed: {}", name, response.status);
            return Err(DcError::RemoteUpdateFailed {
                status: response.status,
            });
        }

        tracing::info!("Updated data collector {} in {}", name, self.org());
        Ok(())
    }

    /// Delete the collector
    pub async fn delete(&self, ctx: &OpContext, name: &str) -> Result<()> {
        let url = self.client.datacollector_url(name)?;
        let response = self.client.execute(ctx, Method::DELETE, &url, None).await?;

        if response.status != StatusCode::NO_CONTENT {
            tracing::error!("Delete of {} failed: {}", name, response.status);
            return Err(DcError::RemoteDeleteFailed {
                status: response.status,
            });
        }

        tracing::info!("Deleted data collector {} from {}", name, self.org());
        Ok(())
    }

    /// Adopt an existing collector from a `{project_id}/{name}` key
    pub async fn import(&self, ctx: &OpContext, composite_id: &str) -> Result<ImportedCollector> {
        let ImportId { project_id, name } = parse_import_id(composite_id)?;
        let observed = self.read(ctx, &name).await?;

        tracing::info!(
            "Imported {} (project {}): {}",
            name,
            project_id,
            if observed.found().is_some() { "found" } else { "not found" }
        );

        Ok(ImportedCollector {
            project_id,
            name,
            observed,
        })
    }

    /// List every collector in the organization (auto-paginate)
    pub async fn list(&self, ctx: &OpContext) -> Result<Vec<DataCollectorState>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.client.datacollectors_url()?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self.client.execute(ctx, Method::GET, &url, None).await?;
            if response.status != StatusCode::OK {
                tracing::error!("List in {} failed: {}", self.org(), response.status);
                return Err(DcError::RemoteReadFailed {
                    status: response.status,
                });
            }

            let page: ListPage = if response.body.trim().is_empty() {
                ListPage {
                    data_collectors: Vec::new(),
                    next_page_token: None,
                }
            } else {
                response.json()?
            };
            all_items.extend(page.data_collectors);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!("Listed {} data collectors in {}", all_items.len(), self.org());
        Ok(all_items)
    }
}

fn validate_spec(spec: &DataCollectorSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(DcError::ConfigInvalid("name is required".to_string()));
    }
    if spec.kind.trim().is_empty() {
        return Err(DcError::ConfigInvalid(format!(
            "type is required for data collector {}",
            spec.name
        )));
    }
    Ok(())
}
