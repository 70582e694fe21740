//! `vaultgate verify` — Verify one token and print its claims as JSON.

use std::path::Path;
use std::sync::Arc;

use vaultgate_auth::{AuditLogger, verifier_from_config};

pub async fn run(config_path: &Path, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let verifier = verifier_from_config(&config.authority, reqwest::Client::new(), Arc::new(AuditLogger::tracing()))?;

    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let claims = verifier.verify(token).await?;
    println!("{}", serde_json::to_string_pretty(&claims)?);

    Ok(())
}
