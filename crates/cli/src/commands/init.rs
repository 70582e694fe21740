//! `vaultgate init` — Write a starter config file.

use std::path::Path;

use vaultgate_config::AppConfig;

pub fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() && !force {
        println!("  Config already exists: {} (use --force to overwrite)", config_path.display());
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())?;

    println!("✅ Wrote {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set authority.url or authority.public_api_key");
    println!("  2. Set llm.api_key (or OPENAI_API_KEY)");
    println!("  3. Run `vaultgate doctor`");

    Ok(())
}
