//! `vaultgate context` — Print the assembled context for a collection scope.

use std::path::Path;

use vaultgate_core::context::ContextBudget;

pub async fn run(
    config_path: &Path,
    collection: &str,
    scope: &str,
    token: &str,
    max_chars: Option<usize>,
    include_headers: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let settings = config
        .collections
        .get(collection)
        .cloned()
        .ok_or_else(|| format!("Unknown collection '{collection}' (expected 'vault' or 'server')"))?;

    let state = vaultgate_gateway::build_state(config)?;
    let claims = state.verifier.verify(token).await?;
    tracing::info!(user = %claims.subject, collection = %collection, scope = %scope, "Building context");

    let budget = ContextBudget::new(max_chars.unwrap_or(settings.default_max_chars), include_headers)?;
    let result = state
        .builder
        .build_context(&settings.to_collection(collection), scope, &budget, token)
        .await?;

    println!("{}", result.context);
    eprintln!();
    eprintln!("── {} / {} chars ──", result.used_chars, budget.max_chars());
    for label in result.included_labels() {
        eprintln!("  • {label}");
    }

    Ok(())
}
