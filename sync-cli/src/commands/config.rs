//! Show the effective configuration.

use anyhow::{Context, Result};
use chatsync_client::{CacheRegistry, Config};

/// Run the config command.
pub fn run(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered.trim_end());

    let registry = CacheRegistry::from_config(&config.caches);
    println!();
    println!("# registered caches: {}", registry.names().join(", "));

    Ok(())
}
