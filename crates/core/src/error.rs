//! Error types for the VaultGate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; [`Error`] aggregates them.

use thiserror::Error;

/// The top-level error type for all VaultGate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigurationError),

    // --- Key authority errors ---
    #[error("Key authority unavailable: {0}")]
    Unavailable(#[from] UnavailableError),

    // --- Credential errors ---
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    // --- Metadata / object store errors ---
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    // --- Language model errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<KeySetError> for Error {
    fn from(err: KeySetError) -> Self {
        match err {
            KeySetError::Configuration(e) => Error::Config(e),
            KeySetError::Unavailable(e) => Error::Unavailable(e),
        }
    }
}

// --- Bounded context errors ---

/// The authority URL or a required secret is missing or cannot be derived.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The remote signing-key endpoint could not be reached or answered non-2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnavailableError {
    pub url: String,
    pub status: Option<u16>,
    pub reason: String,
}

impl std::fmt::Display for UnavailableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{}: {} (status: {})", self.url, self.reason, status),
            None => write!(f, "{}: {}", self.url, self.reason),
        }
    }
}

impl std::error::Error for UnavailableError {}

/// Failure modes of a key-set fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeySetError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Key authority unavailable: {0}")]
    Unavailable(#[from] UnavailableError),
}

/// The presented credential was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid token: {0}")]
    InvalidSignature(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Published key '{kid}' is unusable: {reason}")]
    UnusableKey { kid: String, reason: String },

    #[error("No signing keys are published")]
    NoPublishedKeys,

    #[error("No published key matches kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("Token has no subject")]
    MissingSubject,

    #[error("Fallback user validation failed: HTTP {status} {reason}")]
    IntrospectionRejected { status: u16, reason: String },

    #[error("Fallback user validation failed: {0}")]
    IntrospectionFailed(String),
}

/// A metadata or object store call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// HTTP status reported by the store, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}
