//! GCP / Apigee API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - token acquisition via `gcp_auth` (ADC or service account key)
//! - [`client`] - organization-scoped client and URL construction
//! - [`http`] - raw HTTP exchange and error formatting
//!
//! # Example
//!
//! ```ignore
//! use apigee_dc::gcp::client::ApigeeClient;
//!
//! async fn example(config: &ProviderConfig) -> apigee_dc::Result<()> {
//!     let client = ApigeeClient::new(config).await?;
//!     let url = client.datacollector_url("dc_orders")?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
