//! Configuration Management
//!
//! Resolves the typed [`ProviderConfig`] passed to every lifecycle operation.
//! Precedence is CLI flag > environment > config file > default.

use crate::error::{DcError, Result};
use crate::gcp::auth::CredentialSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const ENV_ORG_NAME: &str = "ORG_NAME";
pub const ENV_DC_NAMES: &str = "DC_NAMES";
pub const ENV_GOOGLE_CREDENTIALS: &str = "GOOGLE_CREDENTIALS";
pub const ENV_BASE_URL: &str = "APIGEE_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://apigee.googleapis.com/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// On-disk configuration, every field optional
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub org_name: Option<String>,
    /// Data collectors managed by this provider
    #[serde(default)]
    pub dc_names: Option<Vec<String>>,
    /// Service account key JSON, or a path to one
    #[serde(default)]
    pub google_credentials: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Get the config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("apigee-dc").join("config.json"))
    }

    /// Load configuration from the default location, falling back to empty
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DcError::ConfigInvalid(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| DcError::ConfigInvalid(format!("cannot parse {}: {e}", path.display())))
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub org_name: Option<String>,
    pub dc_names: Option<Vec<String>>,
    pub google_credentials: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Fully resolved provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub org_name: String,
    pub dc_names: Vec<String>,
    pub credentials: CredentialSource,
    pub base_url: Url,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Resolve from the default config file and the process environment
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::resolve(&ConfigFile::load(), |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve from explicit sources
    pub fn resolve<F>(file: &ConfigFile, env: F, overrides: &Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let org_name = overrides
            .org_name
            .clone()
            .or_else(|| env(ENV_ORG_NAME))
            .or_else(|| file.org_name.clone())
            .ok_or_else(|| {
                DcError::ConfigInvalid(format!("organization name ({ENV_ORG_NAME}) is not set"))
            })?;

        let dc_names = overrides
            .dc_names
            .clone()
            .or_else(|| env(ENV_DC_NAMES).map(|raw| parse_dc_names(&raw)))
            .or_else(|| file.dc_names.clone())
            .unwrap_or_default();

        let credentials = match overrides
            .google_credentials
            .clone()
            .or_else(|| env(ENV_GOOGLE_CREDENTIALS))
            .or_else(|| file.google_credentials.clone())
        {
            Some(raw) if !raw.trim().is_empty() => parse_credentials(&raw)?,
            _ => CredentialSource::Ambient,
        };

        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| env(ENV_BASE_URL))
            .or_else(|| file.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url)?;

        let request_timeout = overrides
            .request_timeout_secs
            .or(file.request_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let config = Self {
            org_name: org_name.trim().to_string(),
            dc_names,
            credentials,
            base_url,
            request_timeout,
        };
        config.validate()?;

        tracing::debug!(
            "Resolved config: org={}, dc_names={:?}, credentials={:?}",
            config.org_name,
            config.dc_names,
            config.credentials
        );

        Ok(config)
    }

    /// Check field-level invariants
    pub fn validate(&self) -> Result<()> {
        if self.org_name.is_empty() {
            return Err(DcError::ConfigInvalid(
                "organization name (org_name) is empty".to_string(),
            ));
        }
        if self.org_name.contains('/') {
            return Err(DcError::ConfigInvalid(format!(
                "organization name ({}) must not contain '/'",
                self.org_name
            )));
        }
        if let Some(i) = self.dc_names.iter().position(|n| n.trim().is_empty()) {
            return Err(DcError::ConfigInvalid(format!(
                "data collector name (dc_names) at index {i} is empty"
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(DcError::ConfigInvalid(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated list of names
pub fn parse_dc_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Interpret a credentials value as inline key JSON or a path to a key file
fn parse_credentials(raw: &str) -> Result<CredentialSource> {
    let trimmed = raw.trim();
    let json = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(trimmed).map_err(|e| {
            DcError::ConfigInvalid(format!("cannot read credentials file {trimmed}: {e}"))
        })?
    };

    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| DcError::ConfigInvalid(format!("credentials are not valid JSON: {e}")))?;
    match value.get("type").and_then(|v| v.as_str()) {
        Some("service_account") => Ok(CredentialSource::ServiceAccountKey(json)),
        Some(other) => Err(DcError::ConfigInvalid(format!(
            "credentials type {other} is not supported, expected service_account"
        ))),
        None => Err(DcError::ConfigInvalid(
            "credentials JSON has no type field".to_string(),
        )),
    }
}

/// Parse the API base URL, keeping a trailing slash so path joins append
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| DcError::ConfigInvalid(format!("invalid base URL {raw}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(DcError::ConfigInvalid(format!(
            "base URL {raw} must use http or https"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const KEY_JSON: &str = r#"{"type":"service_account","client_email":"a@b.iam.gserviceaccount.com"}"#;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_org_is_config_invalid() {
        let result = ProviderConfig::resolve(&ConfigFile::default(), env_of(&[]), &Overrides::default());
        assert!(matches!(result, Err(DcError::ConfigInvalid(_))));
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::resolve(
            &ConfigFile::default(),
            env_of(&[(ENV_ORG_NAME, "acme")]),
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(config.org_name, "acme");
        assert!(config.dc_names.is_empty());
        assert_eq!(config.credentials, CredentialSource::Ambient);
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_precedence() {
        let file = ConfigFile {
            org_name: Some("from-file".into()),
            dc_names: Some(vec!["file_dc".into()]),
            base_url: Some("http://file.local".into()),
            request_timeout_secs: Some(5),
            ..Default::default()
        };
        let env = env_of(&[(ENV_ORG_NAME, "from-env"), (ENV_DC_NAMES, "a, b,,c")]);
        let overrides = Overrides {
            org_name: Some("from-cli".into()),
            ..Default::default()
        };

        let config = ProviderConfig::resolve(&file, env, &overrides).unwrap();
        assert_eq!(config.org_name, "from-cli");
        assert_eq!(config.dc_names, vec!["a", "b", "c"]);
        assert_eq!(config.base_url.as_str(), "http://file.local/");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_inline_service_account_key() {
        let env = env_of(&[(ENV_ORG_NAME, "acme"), (ENV_GOOGLE_CREDENTIALS, KEY_JSON)]);
        let config = ProviderConfig::resolve(&ConfigFile::default(), env, &Overrides::default()).unwrap();
        assert_eq!(
            config.credentials,
            CredentialSource::ServiceAccountKey(KEY_JSON.to_string())
        );
    }

    #[test]
    fn test_service_account_key_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KEY_JSON.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let overrides = Overrides {
            org_name: Some("acme".into()),
            google_credentials: Some(path),
            ..Default::default()
        };
        let config = ProviderConfig::resolve(&ConfigFile::default(), env_of(&[]), &overrides).unwrap();
        assert!(matches!(config.credentials, CredentialSource::ServiceAccountKey(_)));
    }

    #[test]
    fn test_rejects_non_service_account_credentials() {
        let env = env_of(&[
            (ENV_ORG_NAME, "acme"),
            (ENV_GOOGLE_CREDENTIALS, r#"{"type":"authorized_user"}"#),
        ]);
        let result = ProviderConfig::resolve(&ConfigFile::default(), env, &Overrides::default());
        assert!(matches!(result, Err(DcError::ConfigInvalid(_))));
    }

    #[test]
    fn test_rejects_bad_org_and_url() {
        let env = env_of(&[(ENV_ORG_NAME, "a/b")]);
        assert!(ProviderConfig::resolve(&ConfigFile::default(), env, &Overrides::default()).is_err());

        let env = env_of(&[(ENV_ORG_NAME, "acme"), (ENV_BASE_URL, "ftp://x")]);
        assert!(ProviderConfig::resolve(&ConfigFile::default(), env, &Overrides::default()).is_err());
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let url = parse_base_url("http://localhost:9000/proxy").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/proxy/");
    }

    #[test]
    fn test_config_file_round_trip_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"org_name":"acme","dc_names":["dc1"]}"#).unwrap();
        let loaded = ConfigFile::load_from(file.path()).unwrap();
        assert_eq!(loaded.org_name.as_deref(), Some("acme"));
        assert_eq!(loaded.dc_names, Some(vec!["dc1".to_string()]));
        assert!(loaded.base_url.is_none());
    }
}
