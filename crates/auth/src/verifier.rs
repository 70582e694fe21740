//! Bearer-token verification.
//!
//! A token is checked against the authority's published signing keys. When no
//! published key matches, the verifier either asks the authority to identify
//! the token (lenient, the default) or rejects it (strict).

use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::debug;

use vaultgate_core::auth::{Claims, Introspector, PublishedKey};
use vaultgate_core::error::{AuthError, ConfigurationError, Error, Result};

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome, VerificationPath};
use crate::key_cache::KeySetCache;

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; an empty token is rejected.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Parse an algorithm name such as `RS256` or `EdDSA`.
pub fn parse_algorithm(name: &str) -> std::result::Result<Algorithm, ConfigurationError> {
    Algorithm::from_str(name)
        .map_err(|_| ConfigurationError::new(format!("unknown signing algorithm '{name}'")))
}

/// Claims read from a verified token payload.
#[derive(Deserialize)]
struct TokenPayload {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    introspector: Arc<dyn Introspector>,
    fallback_enabled: bool,
    default_algorithm: Algorithm,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("keys", &self.keys)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("default_algorithm", &self.default_algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Lenient verifier (introspection fallback on) assuming RS256 for keys without `alg`.
    pub fn new(keys: Arc<KeySetCache>, introspector: Arc<dyn Introspector>) -> Self {
        Self {
            keys,
            introspector,
            fallback_enabled: true,
            default_algorithm: Algorithm::RS256,
            audit: Arc::new(AuditLogger::new()),
        }
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn with_default_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.default_algorithm = algorithm;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Verify a raw token and return its claims.
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        let outcome = self.resolve(token.trim()).await;

        match &outcome {
            Ok((claims, path)) => self.audit.log(
                AuditEvent::TokenVerified { path: *path },
                &claims.subject,
                AuditOutcome::Success,
                None,
            ),
            Err((path, err)) => self.audit.log(
                AuditEvent::TokenRejected { path: *path },
                "anonymous",
                AuditOutcome::Denied,
                Some(err.to_string()),
            ),
        }

        outcome.map(|(claims, _)| claims).map_err(|(_, err)| err)
    }

    /// Verify the value of an `Authorization: Bearer <token>` header.
    pub async fn verify_bearer_header(&self, header_value: &str) -> Result<Claims> {
        match bearer_token(header_value) {
            Some(token) => self.verify(token).await,
            None => {
                self.audit.log(
                    AuditEvent::TokenRejected { path: None },
                    "anonymous",
                    AuditOutcome::Denied,
                    Some(AuthError::MissingToken.to_string()),
                );
                Err(AuthError::MissingToken.into())
            }
        }
    }

    async fn resolve(
        &self,
        token: &str,
    ) -> std::result::Result<(Claims, VerificationPath), (Option<VerificationPath>, Error)> {
        if token.is_empty() {
            return Err((None, Error::from(AuthError::MissingToken)));
        }

        let header = decode_header(token)
            .map_err(|e| (None, Error::from(AuthError::MalformedToken(e.to_string()))))?;

        let keys = self.keys.current().await.map_err(|e| (None, Error::from(e)))?;

        if let Some(key) = keys.find(header.kid.as_deref()) {
            debug!(kid = ?header.kid, alg = ?header.alg, "Verifying token signature");
            return self
                .verify_signature(token, key)
                .map(|claims| (claims, VerificationPath::Signature))
                .map_err(|e| (Some(VerificationPath::Signature), Error::from(e)));
        }

        if !self.fallback_enabled {
            let err = if keys.is_empty() {
                AuthError::NoPublishedKeys
            } else {
                AuthError::UnknownKey(header.kid)
            };
            return Err((None, Error::from(err)));
        }

        debug!(
            kid = ?header.kid,
            published = keys.len(),
            "No matching published key; falling back to introspection"
        );
        self.introspector
            .introspect(token)
            .await
            .map(|claims| (claims, VerificationPath::Introspection))
            .map_err(|e| (Some(VerificationPath::Introspection), Error::from(e)))
    }

    fn verify_signature(&self, token: &str, key: &PublishedKey) -> std::result::Result<Claims, AuthError> {
        let kid = key.kid.clone().unwrap_or_default();

        let algorithm = match key.alg.as_deref() {
            Some(name) => Algorithm::from_str(name)
                .map_err(|_| AuthError::UnsupportedAlgorithm(name.to_string()))?,
            None => self.default_algorithm,
        };

        let jwk: Jwk = serde_json::from_value(key.jwk.clone()).map_err(|e| AuthError::UnusableKey {
            kid: kid.clone(),
            reason: e.to_string(),
        })?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::UnusableKey {
            kid,
            reason: e.to_string(),
        })?;

        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<TokenPayload>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    AuthError::MalformedToken(e.to_string())
                }
                _ => AuthError::InvalidSignature(e.to_string()),
            }
        })?;

        let subject = data
            .claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;
        Ok(Claims::new(subject, data.claims.email))
    }
}
