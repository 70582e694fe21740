//! Context assembly for VaultGate.
//!
//! - [`ContextAssembler`]: deterministic, character-budgeted packing of document texts
//! - [`ContextBuilder`]: lists an owner scope's documents, reuses or extracts
//!   their text, writes fresh text back to the store, and assembles the result

pub mod assembler;
pub mod builder;

pub use assembler::ContextAssembler;
pub use builder::{ContextBuilder, DEFAULT_FETCH_CONCURRENCY};
