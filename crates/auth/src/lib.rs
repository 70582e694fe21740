//! Bearer-token verification against a time-rotating signing-key set.
//!
//! Provides:
//! - **Authority client**: URL resolution and HTTP access to the key-rotation authority
//! - **Key cache**: one key-set fetch per time window, shared by concurrent callers
//! - **Verifier**: signature check with an introspection fallback
//! - **Audit logging**: structured record of every verification outcome

pub mod audit;
pub mod authority;
pub mod key_cache;
pub mod verifier;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use vaultgate_config::AuthorityConfig;
use vaultgate_core::error::ConfigurationError;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink, VerificationPath};
pub use authority::{HttpAuthority, claims_from_introspection, derive_authority_url, resolve_authority_url};
pub use key_cache::{Clock, KeySetCache};
pub use verifier::{TokenVerifier, bearer_token, parse_algorithm};

/// Build a verifier backed by the HTTP authority described in `config`.
///
/// The authority URL itself is resolved lazily on each fetch, so a missing
/// URL surfaces as a configuration error on the first request rather than
/// here. An unknown `default_algorithm` is rejected immediately.
pub fn verifier_from_config(
    config: &AuthorityConfig,
    client: reqwest::Client,
    audit: Arc<AuditLogger>,
) -> Result<TokenVerifier, ConfigurationError> {
    let default_algorithm = parse_algorithm(&config.default_algorithm)?;
    let authority = Arc::new(HttpAuthority::with_client(config.clone(), client));

    let cache = KeySetCache::new(authority.clone(), Duration::from_secs(config.key_cache_ttl_secs))
        .with_audit(audit.clone());

    if config.fallback_enabled {
        warn!(
            "Lenient token policy active: tokens without a matching published key are validated by introspection"
        );
    }

    Ok(TokenVerifier::new(Arc::new(cache), authority)
        .with_fallback(config.fallback_enabled)
        .with_default_algorithm(default_algorithm)
        .with_audit(audit))
}
