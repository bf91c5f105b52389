//! GCP Authentication
//!
//! Resolves a [`CredentialSource`] once into a [`CredentialProvider`] that
//! hands out bearer tokens for the Apigee API. Tokens are minted by
//! `gcp_auth`, either from Application Default Credentials or from an
//! explicit service account key.

use crate::error::{DcError, Result};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::fmt;
use std::sync::Arc;

/// Scopes requested for Apigee management calls
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Where access tokens come from
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Application Default Credentials (env var, gcloud, metadata server)
    Ambient,
    /// Service account key JSON content
    ServiceAccountKey(String),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Ambient => f.write_str("Ambient"),
            // Never print key material
            CredentialSource::ServiceAccountKey(_) => f.write_str("ServiceAccountKey(<redacted>)"),
        }
    }
}

/// Capability to obtain a bearer token for API calls.
///
/// Implementations must be safe to share between concurrent operations.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// GCP credentials backed by a `gcp_auth` token provider.
///
/// Every provider `gcp_auth` hands out keeps its own token cache keyed on
/// the expiry the token endpoint reports, so each call goes straight to it.
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
}

impl GcpCredentials {
    /// Build credentials for the given source
    pub async fn from_source(source: &CredentialSource) -> Result<Self> {
        let provider: Arc<dyn TokenProvider> = match source {
            CredentialSource::Ambient => gcp_auth::provider().await.map_err(|e| {
                DcError::CredentialFailure(format!(
                    "no application default credentials ({e}). Run 'gcloud auth application-default login'"
                ))
            })?,
            CredentialSource::ServiceAccountKey(json) => {
                let account = CustomServiceAccount::from_json(json).map_err(|e| {
                    DcError::CredentialFailure(format!("invalid service account key: {e}"))
                })?;
                Arc::new(account)
            }
        };

        tracing::debug!("Credential provider initialized from {:?}", source);

        Ok(Self::from_provider(provider))
    }

    /// Wrap an already constructed token provider
    pub fn from_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CredentialProvider for GcpCredentials {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .map_err(|e| DcError::CredentialFailure(e.to_string()))?;

        Ok(token.as_str().to_string())
    }
}

/// A fixed, pre-minted bearer token
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(DcError::CredentialFailure("static token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcp_auth::Token;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_debug_redacts_key() {
        let source = CredentialSource::ServiceAccountKey(r#"{"private_key":"secret"}"#.into());
        let printed = format!("{:?}", source);
        assert!(!printed.contains("secret"));
        assert_eq!(format!("{:?}", CredentialSource::Ambient), "Ambient");
    }

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.access_token().await.unwrap(), "abc");

        let empty = StaticToken::new("");
        assert!(matches!(
            empty.access_token().await,
            Err(DcError::CredentialFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_key_is_credential_failure() {
        let source = CredentialSource::ServiceAccountKey("not json".into());
        let result = GcpCredentials::from_source(&source).await;
        assert!(matches!(result, Err(DcError::CredentialFailure(_))));
    }

    /// Hands out a fresh short-lived token on every call, like a token
    /// endpoint whose tokens expire within seconds.
    struct ShortLivedTokens {
        minted: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for ShortLivedTokens {
        async fn token(&self, scopes: &[&str]) -> std::result::Result<Arc<Token>, gcp_auth::Error> {
            assert_eq!(scopes, DEFAULT_SCOPES);
            let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
            let token: Token = serde_json::from_value(serde_json::json!({
                "access_token": format!("tok{n}"),
                "expires_in": 2,
            }))
            .unwrap();
            Ok(Arc::new(token))
        }

        async fn project_id(&self) -> std::result::Result<Arc<str>, gcp_auth::Error> {
            Ok(Arc::from("test-project"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_token_is_not_served_after_expiry() {
        let provider = Arc::new(ShortLivedTokens {
            minted: AtomicUsize::new(0),
        });
        let credentials = GcpCredentials::from_provider(provider.clone());

        assert_eq!(credentials.access_token().await.unwrap(), "tok1");
        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
        assert_eq!(credentials.access_token().await.unwrap(), "tok2");
        assert_eq!(provider.minted.load(Ordering::SeqCst), 2);
    }
}
