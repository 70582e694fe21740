//! LLM Provider implementations for VaultGate.
//!
//! All providers implement the `vaultgate_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
