//! HTTP client for the key-rotation authority.
//!
//! Resolves the authority base URL (explicit, or derived from the public API
//! key's `ref` claim), fetches the published signing keys, and performs the
//! identity-introspection fallback.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde_json::Value;
use tracing::{debug, warn};

use vaultgate_config::AuthorityConfig;
use vaultgate_core::auth::{Claims, Introspector, KeySet, KeySource};
use vaultgate_core::error::{AuthError, ConfigurationError, KeySetError, UnavailableError};

/// Resolve the authority base URL from configuration.
///
/// An explicit `url` wins. Otherwise the URL is derived from the public API
/// key using `derived_url_template`.
pub fn resolve_authority_url(config: &AuthorityConfig) -> Result<String, ConfigurationError> {
    if let Some(url) = config.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(url.trim_end_matches('/').to_string());
    }

    let key = config
        .public_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ConfigurationError::new(
                "authority URL is not configured and no public API key is available to derive it",
            )
        })?;

    derive_authority_url(key, &config.derived_url_template)
}

/// Derive the canonical authority URL from a public API key.
///
/// The key is a JWT-shaped string; its second segment is a base64url JSON
/// object carrying a `ref` project identifier.
pub fn derive_authority_url(public_key: &str, template: &str) -> Result<String, ConfigurationError> {
    let segment = public_key
        .split('.')
        .nth(1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigurationError::new("public API key is not a dot-separated token"))?;

    let mut padded = segment.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| ConfigurationError::new(format!("public API key payload is not base64url: {e}")))?;

    let payload: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ConfigurationError::new(format!("public API key payload is not JSON: {e}")))?;

    let project_ref = payload
        .get("ref")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ConfigurationError::new("public API key payload has no 'ref' field"))?;

    Ok(template.replace("{ref}", project_ref).trim_end_matches('/').to_string())
}

/// Map an introspection response body to claims.
///
/// The identity may be reported at the top level or nested under `user`.
pub fn claims_from_introspection(body: &Value) -> Result<Claims, AuthError> {
    let user = body.get("user").filter(|u| u.is_object()).unwrap_or(body);

    let field = |name: &str| {
        user.get(name)
            .or_else(|| body.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let subject = field("id").ok_or(AuthError::MissingSubject)?;
    Ok(Claims::new(subject, field("email")))
}

/// The key-rotation authority reached over HTTP.
pub struct HttpAuthority {
    config: AuthorityConfig,
    client: reqwest::Client,
}

impl HttpAuthority {
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Share an existing HTTP client (connection pool) with other collaborators.
    pub fn with_client(config: AuthorityConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn base_url(&self) -> Result<String, ConfigurationError> {
        resolve_authority_url(&self.config)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn with_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.public_api_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }
}

#[async_trait]
impl KeySource for HttpAuthority {
    async fn fetch_key_set(&self) -> Result<KeySet, KeySetError> {
        let url = format!("{}{}", self.base_url()?, self.config.jwks_path);
        debug!(url = %url, "Fetching signing-key set");

        let mut request = self.with_api_key(self.client.get(&url)).timeout(self.timeout());
        if let Some(key) = &self.config.public_api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| UnavailableError {
            url: url.clone(),
            status: None,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Key-set endpoint returned an error");
            return Err(UnavailableError {
                url,
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("error").to_string(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| UnavailableError {
            url: url.clone(),
            status: Some(status.as_u16()),
            reason: e.to_string(),
        })?;

        KeySet::from_json(&body).map_err(|e| {
            UnavailableError {
                url,
                status: Some(status.as_u16()),
                reason: format!("invalid key-set document: {e}"),
            }
            .into()
        })
    }
}

#[async_trait]
impl Introspector for HttpAuthority {
    async fn introspect(&self, token: &str) -> Result<Claims, AuthError> {
        let base = self
            .base_url()
            .map_err(|e| AuthError::IntrospectionFailed(e.to_string()))?;
        let url = format!("{base}{}", self.config.introspection_path);
        debug!(url = %url, "Introspecting token with the authority");

        let response = self
            .with_api_key(self.client.get(&url))
            .bearer_auth(token)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| AuthError::IntrospectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::IntrospectionRejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("error").to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::IntrospectionFailed(e.to_string()))?;

        claims_from_introspection(&body)
    }
}
