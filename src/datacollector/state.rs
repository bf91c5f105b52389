//! Local resource state
//!
//! [`ResourceData`] is what a host keeps between lifecycle calls. The
//! functions here run one reconciler operation and fold its result into that
//! record: identity is set on create, refreshed or cleared on read, and
//! cleared on delete.

use super::reconciler::ResourceReconciler;
use super::{DataCollectorSpec, DataCollectorState, Observed};
use crate::context::OpContext;
use crate::error::{DcError, Result};
use serde::{Deserialize, Serialize};

/// Tracked state of one managed data collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    /// Remote identity; `None` when nothing is tracked
    pub id: Option<String>,
    /// Project scope recorded on import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResourceData {
    /// Untracked record holding the desired fields
    pub fn from_spec(spec: &DataCollectorSpec) -> Self {
        Self {
            id: None,
            project_id: None,
            name: spec.name.clone(),
            description: spec.description.clone(),
            kind: spec.kind.clone(),
        }
    }

    pub fn spec(&self) -> DataCollectorSpec {
        DataCollectorSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    fn apply_observed(&mut self, state: DataCollectorState) {
        self.name = state.name;
        self.description = state.description;
        self.kind = state.kind;
    }
}

/// Create the remote object and start tracking it
pub async fn create(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    data: &mut ResourceData,
) -> Result<()> {
    let id = reconciler.create(ctx, &data.spec()).await?;
    data.id = Some(id);
    Ok(())
}

/// Refresh fields from the remote object; stop tracking it if it is gone
pub async fn read(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    data: &mut ResourceData,
) -> Result<()> {
    let Some(id) = data.id.clone().filter(|id| !id.is_empty()) else {
        return Ok(());
    };

    match reconciler.read(ctx, &id).await? {
        Observed::Found(state) => data.apply_observed(state),
        Observed::NotFound => {
            tracing::warn!("Data collector {} disappeared, removing from state", id);
            data.id = None;
        }
    }
    Ok(())
}

/// Push desired fields of a tracked object
pub async fn update(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    data: &ResourceData,
) -> Result<()> {
    let Some(id) = data.id.as_deref().filter(|id| !id.is_empty()) else {
        return Err(DcError::ConfigInvalid(format!(
            "data collector {} is not tracked, create or import it first",
            data.name
        )));
    };
    reconciler.update(ctx, id, &data.spec()).await
}

/// Delete the remote object and stop tracking it
pub async fn delete(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    data: &mut ResourceData,
) -> Result<()> {
    let Some(id) = data.id.clone().filter(|id| !id.is_empty()) else {
        return Ok(());
    };
    reconciler.delete(ctx, &id).await?;
    data.id = None;
    Ok(())
}

/// Build tracked state for an existing object from `{project_id}/{name}`.
///
/// When the object does not exist the record comes back untracked, with the
/// project and name filled in, so a later apply recreates it.
pub async fn import(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    composite_id: &str,
) -> Result<ResourceData> {
    let imported = reconciler.import(ctx, composite_id).await?;

    let mut data = ResourceData {
        id: None,
        project_id: Some(imported.project_id),
        name: imported.name.clone(),
        ..Default::default()
    };

    if let Observed::Found(state) = imported.observed {
        data.apply_observed(state);
        data.id = Some(imported.name);
    }

    Ok(data)
}
