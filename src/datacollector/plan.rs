//! Drift detection and bulk apply
//!
//! A [`Manifest`] lists desired collectors. Planning reads each one and
//! decides what to do; applying runs those actions with bounded concurrency,
//! retrying transient failures and reading back every write.

use super::reconciler::ResourceReconciler;
use super::{DataCollectorSpec, Observed};
use crate::context::OpContext;
use crate::error::{DcError, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Desired collectors, as written in a YAML manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub collectors: Vec<DataCollectorSpec>,
}

impl Manifest {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)
            .map_err(|e| DcError::ConfigInvalid(format!("invalid manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DcError::ConfigInvalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Names must be present and unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.collectors {
            if spec.name.trim().is_empty() {
                return Err(DcError::ConfigInvalid("manifest entry without a name".to_string()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(DcError::ConfigInvalid(format!(
                    "data collector {} is declared twice",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// What reconciliation will do for one collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
}

/// Decide the action for one collector
pub fn plan(desired: Option<&DataCollectorSpec>, observed: &Observed) -> Action {
    match (desired, observed) {
        (Some(_), Observed::NotFound) => Action::Create,
        (Some(spec), Observed::Found(state)) if state.matches(spec) => Action::NoOp,
        (Some(_), Observed::Found(_)) => Action::Update,
        (None, Observed::Found(_)) => Action::Delete,
        (None, Observed::NotFound) => Action::NoOp,
    }
}

/// A planned action with the inputs it was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub name: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<DataCollectorSpec>,
    pub observed: Observed,
}

/// Read every manifest entry and derive its action.
///
/// With `prune`, names in `managed` that the manifest no longer lists are
/// planned for deletion when they still exist remotely.
pub async fn plan_manifest(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    manifest: &Manifest,
    managed: &[String],
    prune: bool,
    concurrency: usize,
) -> Result<Vec<PlannedChange>> {
    let mut targets: Vec<(String, Option<DataCollectorSpec>)> = manifest
        .collectors
        .iter()
        .map(|spec| (spec.name.clone(), Some(spec.clone())))
        .collect();

    if prune {
        let mut seen: HashSet<&str> = manifest.collectors.iter().map(|s| s.name.as_str()).collect();
        for name in managed {
            if seen.insert(name.as_str()) {
                targets.push((name.clone(), None));
            }
        }
    }

    stream::iter(targets)
        .map(|(name, desired)| async move {
            let observed = reconciler.read(ctx, &name).await?;
            let action = plan(desired.as_ref(), &observed);
            tracing::debug!("Planned {:?} for {}", action, name);
            Ok::<_, DcError>(PlannedChange {
                name,
                action,
                desired,
                observed,
            })
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Knobs for [`apply`]
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub concurrency: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Result of applying one planned change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub name: String,
    pub action: Action,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApplyOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-change outcomes of an apply run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<ApplyOutcome>,
}

impl ApplyReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }
}

/// Execute planned changes. A failure only affects its own entry.
pub async fn apply(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    changes: &[PlannedChange],
    options: &ApplyOptions,
) -> ApplyReport {
    let outcomes: Vec<ApplyOutcome> = stream::iter(changes)
        .map(|change| apply_one(reconciler, ctx, change, options))
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    ApplyReport { outcomes }
}

async fn apply_one(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    change: &PlannedChange,
    options: &ApplyOptions,
) -> ApplyOutcome {
    let name = change.name.as_str();

    let (result, attempts) = match (change.action, change.desired.as_ref()) {
        (Action::NoOp, _) => (Ok(()), 0),
        (Action::Create, Some(spec)) => {
            let (result, attempts) = with_retry(ctx, options, name, move || async move {
                reconciler.create(ctx, spec).await.map(|_| ())
            })
            .await;
            match result {
                // An earlier attempt may have landed before its response was lost
                Err(DcError::RemoteRejected { status })
                    if status == StatusCode::CONFLICT && attempts > 1 =>
                {
                    tracing::warn!("Retried create of {} hit a conflict, checking remote state", name);
                    (Ok(()), attempts)
                }
                result => (result, attempts),
            }
        }
        (Action::Update, Some(spec)) => {
            with_retry(ctx, options, name, move || reconciler.update(ctx, name, spec)).await
        }
        (Action::Delete, _) => with_retry(ctx, options, name, move || reconciler.delete(ctx, name)).await,
        (action, None) => (
            Err(DcError::ConfigInvalid(format!(
                "{:?} of {} has no desired state",
                action, name
            ))),
            0,
        ),
    };

    let result = match (result, change.desired.as_ref()) {
        (Ok(()), Some(spec)) if matches!(change.action, Action::Create | Action::Update) => {
            verify_written(reconciler, ctx, spec).await
        }
        (result, _) => result.map_err(|e| e.to_string()),
    };

    ApplyOutcome {
        name: change.name.clone(),
        action: change.action,
        attempts,
        error: result.err(),
    }
}

/// Read back a written collector and compare it to what was sent
async fn verify_written(
    reconciler: &ResourceReconciler,
    ctx: &OpContext,
    spec: &DataCollectorSpec,
) -> std::result::Result<(), String> {
    match reconciler.read(ctx, &spec.name).await {
        Ok(Observed::Found(state)) if state.matches(spec) => Ok(()),
        Ok(Observed::Found(_)) => {
            tracing::warn!("Data collector {} drifted right after write", spec.name);
            Err(format!("remote state of {} differs from what was written", spec.name))
        }
        Ok(Observed::NotFound) => Err(format!("{} not found after write", spec.name)),
        Err(e) => Err(format!("read-after-write failed: {e}")),
    }
}

/// Run `op`, retrying transient errors with exponential backoff.
/// Returns the final result and the number of attempts made. No retry is
/// scheduled past the context deadline.
async fn with_retry<F, Fut>(
    ctx: &OpContext,
    options: &ApplyOptions,
    name: &str,
    mut op: F,
) -> (Result<()>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempts = 0;
    let mut backoff = options.initial_backoff;

    loop {
        attempts += 1;
        match op().await {
            Err(e) if e.is_transient() && attempts <= options.max_retries => {
                let wake = tokio::time::Instant::now() + backoff;
                if ctx.deadline().is_some_and(|deadline| wake >= deadline) {
                    tracing::warn!(
                        "Attempt {} for {} failed ({}), no time left before deadline",
                        attempts,
                        name,
                        e
                    );
                    return (Err(e), attempts);
                }
                tracing::warn!(
                    "Attempt {} for {} failed ({}), retrying in {:?}",
                    attempts,
                    name,
                    e,
                    backoff
                );
                tokio::select! {
                    _ = ctx.cancel_token().cancelled() => return (Err(DcError::Cancelled), attempts),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2);
            }
            result => return (result, attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacollector::DataCollectorState;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn state(name: &str, description: &str, kind: &str) -> DataCollectorState {
        DataCollectorState {
            name: name.into(),
            description: description.into(),
            kind: kind.into(),
            created_at: None,
            last_modified_at: None,
        }
    }

    #[test]
    fn test_plan_matrix() {
        let spec = DataCollectorSpec::new("dc1", "test", "STRING");

        assert_eq!(plan(Some(&spec), &Observed::NotFound), Action::Create);
        assert_eq!(
            plan(Some(&spec), &Observed::Found(state("dc1", "test", "STRING"))),
            Action::NoOp
        );
        assert_eq!(
            plan(Some(&spec), &Observed::Found(state("dc1", "changed", "STRING"))),
            Action::Update
        );
        assert_eq!(
            plan(Some(&spec), &Observed::Found(state("dc1", "test", "INTEGER"))),
            Action::Update
        );
        assert_eq!(
            plan(None, &Observed::Found(state("dc1", "test", "STRING"))),
            Action::Delete
        );
        assert_eq!(plan(None, &Observed::NotFound), Action::NoOp);
    }

    #[test]
    fn test_manifest_from_yaml() {
        let manifest = Manifest::from_yaml(
            r#"
collectors:
  - name: dc_orders
    description: Order totals
    type: INTEGER
  - name: dc_region
    type: STRING
"#,
        )
        .unwrap();
        assert_eq!(manifest.collectors.len(), 2);
        assert_eq!(manifest.collectors[0].kind, "INTEGER");
        assert_eq!(manifest.collectors[1].description, "");
    }

    #[test]
    fn test_manifest_rejects_duplicates() {
        let result = Manifest::from_yaml(
            r#"
collectors:
  - {name: dc1, type: STRING}
  - {name: dc1, type: INTEGER}
"#,
        );
        assert!(matches!(result, Err(DcError::ConfigInvalid(_))));
    }

    #[test]
    fn test_manifest_rejects_missing_type() {
        assert!(Manifest::from_yaml("collectors:\n  - name: dc1\n").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_then_succeed() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let ctx = OpContext::default();
        let options = ApplyOptions::default();

        let (result, attempts) = with_retry(&ctx, &options, "dc1", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DcError::RemoteUpdateFailed {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max() {
        let ctx = OpContext::default();
        let options = ApplyOptions {
            max_retries: 2,
            ..Default::default()
        };

        let (result, attempts) = with_retry(&ctx, &options, "dc1", || async {
            Err::<(), _>(DcError::RemoteDeleteFailed {
                status: StatusCode::BAD_GATEWAY,
            })
        })
        .await;

        assert!(matches!(result, Err(DcError::RemoteDeleteFailed { .. })));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let ctx = OpContext::default();
        let (result, attempts) = with_retry(&ctx, &ApplyOptions::default(), "dc1", || async {
            Err::<(), _>(DcError::RemoteRejected {
                status: StatusCode::CONFLICT,
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_after_deadline_passed() {
        let ctx = OpContext::default().with_timeout(Duration::from_millis(10));
        let started = tokio::time::Instant::now();

        let (result, attempts) = with_retry(&ctx, &ApplyOptions::default(), "dc1", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<(), _>(DcError::DeadlineExceeded)
        })
        .await;

        assert!(matches!(result, Err(DcError::DeadlineExceeded)));
        assert_eq!(attempts, 1);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_when_backoff_outlives_deadline() {
        let ctx = OpContext::default().with_timeout(Duration::from_millis(100));
        let started = tokio::time::Instant::now();

        let (result, attempts) = with_retry(&ctx, &ApplyOptions::default(), "dc1", || async {
            Err::<(), _>(DcError::RemoteUpdateFailed {
                status: StatusCode::SERVICE_UNAVAILABLE,
            })
        })
        .await;

        assert!(matches!(result, Err(DcError::RemoteUpdateFailed { .. })));
        assert_eq!(attempts, 1);
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
