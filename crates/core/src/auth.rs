//! Authentication domain: verified claims, published signing keys, and the
//! two seams onto the key-rotation authority.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, KeySetError};

/// Identity produced by a successful token verification.
///
/// Only ever built whole: a verification either yields a subject or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Opaque subject identifier (`sub`).
    #[serde(rename = "sub")]
    pub subject: String,

    /// Email address, when the authority reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    pub fn new(subject: impl Into<String>, email: Option<String>) -> Self {
        Self {
            subject: subject.into(),
            email,
        }
    }
}

/// One signing key as published by the authority.
///
/// The raw JSON web key is kept verbatim; it is only turned into key
/// material when a token actually selects it.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedKey {
    pub kid: Option<String>,
    pub alg: Option<String>,
    pub jwk: serde_json::Value,
}

impl PublishedKey {
    /// Build from a raw JSON web key object.
    pub fn from_jwk(jwk: serde_json::Value) -> Self {
        let field = |name: &str| jwk.get(name).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            kid: field("kid"),
            alg: field("alg"),
            jwk,
        }
    }
}

/// The authority's current signing-key set.
///
/// An empty set is a valid answer: it means the authority publishes no
/// asymmetric keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet {
    pub keys: Vec<PublishedKey>,
}

#[derive(Deserialize)]
struct KeySetDocument {
    #[serde(default)]
    keys: Vec<serde_json::Value>,
}

impl KeySet {
    pub fn new(keys: Vec<PublishedKey>) -> Self {
        Self { keys }
    }

    /// Parse a `{"keys": [...]}` document. Non-object entries are dropped.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let doc: KeySetDocument = serde_json::from_slice(body)?;
        Ok(Self {
            keys: doc
                .keys
                .into_iter()
                .filter(|k| k.is_object())
                .map(PublishedKey::from_jwk)
                .collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Linear search by key id. A token without `kid` never matches.
    pub fn find(&self, kid: Option<&str>) -> Option<&PublishedKey> {
        let kid = kid?;
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Fetches the signing-key set from the authority.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_key_set(&self) -> Result<KeySet, KeySetError>;
}

/// Validates a token by asking the authority who it belongs to.
#[async_trait]
pub trait Introspector: Send + Sync {
    async fn introspect(&self, token: &str) -> Result<Claims, AuthError>;
}
