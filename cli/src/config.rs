//! Configuration file loading.

use std::path::Path;

use anyhow::{Context, Result};
use borderly_pipeline::Config;

/// Read, parse and validate the configuration at `path`.
///
/// `.json` files are parsed as JSON; anything else as TOML.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let config = parse(&text, path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    Ok(config)
}

fn parse(text: &str, path: &Path) -> Result<Config> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(text)
            .with_context(|| format!("failed to parse JSON config {}", path.display()))
    } else {
        toml::from_str(text)
            .with_context(|| format!("failed to parse TOML config {}", path.display()))
    }
}
