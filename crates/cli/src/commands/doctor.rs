//! `vaultgate doctor` — Diagnose configuration plus authority and language
//! model reachability.

use std::path::Path;

use vaultgate_auth::{HttpAuthority, resolve_authority_url};
use vaultgate_config::{AppConfig, LlmConfig};
use vaultgate_core::auth::KeySource;
use vaultgate_core::provider::Provider;
use vaultgate_providers::OpenAiCompatProvider;

/// Outcome of checking the configured language model endpoint.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LlmStatus {
    NotConfigured,
    Reachable,
    Rejected,
    Unreachable(String),
}

pub(crate) async fn check_llm(config: &LlmConfig) -> LlmStatus {
    let provider = match OpenAiCompatProvider::from_config(config, reqwest::Client::new()) {
        Ok(provider) => provider,
        Err(_) => return LlmStatus::NotConfigured,
    };
    match provider.health_check().await {
        Ok(true) => LlmStatus::Reachable,
        Ok(false) => LlmStatus::Rejected,
        Err(e) => LlmStatus::Unreachable(e.to_string()),
    }
}

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 VaultGate Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    if !config_path.exists() {
        println!("  ⚠️  No config file at {}, using defaults", config_path.display());
        issues += 1;
    }

    let config = match AppConfig::load_with_env(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config and run again.");
            return Ok(());
        }
    };

    match resolve_authority_url(&config.authority) {
        Ok(url) => {
            println!("  ✅ Authority URL: {url}");

            let authority = HttpAuthority::new(config.authority.clone());
            match authority.fetch_key_set().await {
                Ok(keys) if keys.is_empty() => {
                    println!("  ✅ Key set reachable (no published keys)");
                    if !config.authority.fallback_enabled {
                        println!("  ⚠️  Strict policy with no published keys rejects every token");
                        issues += 1;
                    }
                }
                Ok(keys) => println!("  ✅ Key set reachable ({} key(s))", keys.len()),
                Err(e) => {
                    println!("  ❌ Key set unreachable: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ Authority URL unresolved: {e}");
            issues += 1;
        }
    }

    if config.store.url.is_some() {
        println!("  ✅ Document store URL set explicitly");
    }

    match check_llm(&config.llm).await {
        LlmStatus::Reachable => println!(
            "  ✅ Language model endpoint reachable ({}, {})",
            config.llm.api_url, config.llm.default_model
        ),
        LlmStatus::NotConfigured => {
            println!("  ⚠️  No llm.api_key: chat routes will fail, context previews still work");
            issues += 1;
        }
        LlmStatus::Rejected => {
            println!("  ❌ Language model endpoint refused the model listing ({})", config.llm.api_url);
            issues += 1;
        }
        LlmStatus::Unreachable(e) => {
            println!("  ❌ Language model endpoint unreachable: {e}");
            issues += 1;
        }
    }

    if config.authority.fallback_enabled {
        println!("  ℹ️  Lenient token policy: unmatched tokens are introspected");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
