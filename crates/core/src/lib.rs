//! # VaultGate Core
//!
//! Domain types, traits, and error definitions for the VaultGate API gateway.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every remote collaborator is defined as a trait here. Implementations live
//! in their respective crates:
//! - [`KeySource`] / [`Introspector`]: the key-rotation authority (`vaultgate-auth`)
//! - [`DocumentStore`]: metadata + object stores (`vaultgate-documents`)
//! - [`Provider`]: the language model (`vaultgate-providers`)
//!
//! Tests swap any of them for in-process mocks.

pub mod auth;
pub mod context;
pub mod document;
pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use auth::{Claims, Introspector, KeySet, KeySource, PublishedKey};
pub use context::{AssemblyResult, ContextBudget, ContextDocument, IncludedDocument};
pub use document::{Collection, DocumentRecord, DocumentStore, StoredObject};
pub use error::{
    AuthError, ConfigurationError, Error, KeySetError, ProviderError, Result, UnavailableError,
    UpstreamError,
};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
