//! Apigee data collector lifecycle management
//!
//! Manages Apigee data collectors through the Apigee REST control plane:
//! create, read, update, delete and import, with explicit not-found
//! handling so callers can drop state for objects removed out of band.
//!
//! # Module Structure
//!
//! - [`config`] - typed provider configuration (file, env, overrides)
//! - [`context`] - cancellation and deadlines for each operation
//! - [`datacollector`] - resource model, reconciler, local state, planning
//! - [`error`] - error taxonomy and retry classification
//! - [`gcp`] - credentials, HTTP transport and URL construction
//!
//! # Example
//!
//! ```ignore
//! use apigee_dc::{ApigeeClient, DataCollectorSpec, OpContext, ProviderConfig, ResourceReconciler};
//!
//! async fn example() -> apigee_dc::Result<()> {
//!     let config = ProviderConfig::load(&Default::default())?;
//!     let reconciler = ResourceReconciler::new(ApigeeClient::new(&config).await?);
//!     let ctx = OpContext::default();
//!     let id = reconciler
//!         .create(&ctx, &DataCollectorSpec::new("dc_orders", "Order totals", "INTEGER"))
//!         .await?;
//!     let observed = reconciler.read(&ctx, &id).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod datacollector;
pub mod error;
pub mod gcp;

pub use config::{ConfigFile, Overrides, ProviderConfig};
pub use context::OpContext;
pub use datacollector::reconciler::{parse_import_id, ImportId, ImportedCollector, ResourceReconciler};
pub use datacollector::state::ResourceData;
pub use datacollector::{DataCollectorSpec, DataCollectorState, Observed};
pub use error::{DcError, Result};
pub use gcp::auth::{CredentialProvider, CredentialSource, GcpCredentials, StaticToken};
pub use gcp::client::ApigeeClient;
