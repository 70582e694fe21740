//! Document access for VaultGate: the REST-backed metadata/object store client
//! and per-format text extraction.

pub mod extract;
pub mod store;

pub use extract::{ContentKind, TextExtractor};
pub use store::{RestDocumentStore, newest_first};
