//! Data collector resource
//!
//! An Apigee data collector is a named, typed field that API proxies can
//! populate with custom analytics values. This module holds the resource
//! model and everything that manages its lifecycle.
//!
//! - [`reconciler`] - create / read / update / delete / import / list
//! - [`state`] - local resource state driven by lifecycle results
//! - [`plan`] - drift detection and bulk apply from a manifest

pub mod plan;
pub mod reconciler;
pub mod state;

use serde::{Deserialize, Deserializer, Serialize};

/// Desired state of a data collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCollectorSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DataCollectorSpec {
    pub fn new(name: &str, description: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Remote state of a data collector as last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCollectorState {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    pub kind: String,
    /// Milliseconds since epoch, set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<String>,
}

/// Servers may send `null` for an unset text field
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl DataCollectorState {
    /// Whether the remote object matches `spec` on every managed field
    pub fn matches(&self, spec: &DataCollectorSpec) -> bool {
        self.name == spec.name && self.description == spec.description && self.kind == spec.kind
    }
}

/// Outcome of a read: the object, or an explicit marker that it is gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "collector", rename_all = "snake_case")]
pub enum Observed {
    Found(DataCollectorState),
    NotFound,
}

impl Observed {
    pub fn found(&self) -> Option<&DataCollectorState> {
        match self {
            Observed::Found(state) => Some(state),
            Observed::NotFound => None,
        }
    }
}
