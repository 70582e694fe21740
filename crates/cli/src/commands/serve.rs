//! `vaultgate serve` — Start the HTTP API server.

use std::path::Path;

pub async fn run(config_path: &Path, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🔐 VaultGate Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Token policy: {}",
        if config.authority.fallback_enabled {
            "lenient (introspection fallback)"
        } else {
            "strict (published keys only)"
        }
    );

    vaultgate_gateway::start(config).await?;

    Ok(())
}
