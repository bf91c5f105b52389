//! HTTP utilities for Apigee REST API calls

use crate::error::{DcError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.chars().count() > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Status and raw body of a completed exchange
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP client wrapper for Apigee API calls.
///
/// Status codes are returned to the caller untouched; each lifecycle
/// operation decides for itself which status means success.
#[derive(Clone)]
pub struct ApigeeHttpClient {
    client: Client,
}

impl ApigeeHttpClient {
    /// Create a new HTTP client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("apigee-dc/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Send one authenticated JSON request and collect the response
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        token: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url.clone())
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(token);

        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
        }

        Ok(ApiResponse { status, body })
    }
}

/// Format a lifecycle error for display on a terminal
pub fn format_api_error(error: &DcError) -> String {
    let hint = match error.status() {
        Some(StatusCode::UNAUTHORIZED) => {
            Some("Authentication failed. Run 'gcloud auth application-default login' or check the service account key.")
        }
        Some(StatusCode::FORBIDDEN) => Some("Permission denied. Check the Apigee IAM roles of the caller."),
        Some(StatusCode::NOT_FOUND) => Some("Organization or data collector not found."),
        Some(StatusCode::CONFLICT) => Some("A data collector with this name already exists."),
        Some(StatusCode::TOO_MANY_REQUESTS) => Some("Rate limit exceeded. Please try again later."),
        Some(StatusCode::BAD_REQUEST) => Some("Invalid request. Check the name and type fields."),
        Some(s) if s.is_server_error() => Some("Apigee service temporarily unavailable. Please try again."),
        _ => None,
    };

    match hint {
        Some(hint) => format!("{} ({})", error, hint),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_multibyte_does_not_panic() {
        let body = "é".repeat(300);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("600 bytes total"));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize_for_log("a\nb\tc d"), "abc d");
    }

    #[test]
    fn test_format_api_error_hints() {
        let err = DcError::RemoteRejected {
            status: StatusCode::CONFLICT,
        };
        let msg = format_api_error(&err);
        assert!(msg.starts_with("failed to create data collector: 409 Conflict"));
        assert!(msg.contains("already exists"));

        let err = DcError::MalformedImportId("bad".into());
        assert_eq!(format_api_error(&err), err.to_string());
    }
}
