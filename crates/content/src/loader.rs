//! TOML catalogue loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chargen_engine::Ruleset;

/// Parse a ruleset catalogue from TOML text.
pub fn ruleset_from_toml(text: &str) -> Result<Ruleset> {
    let ruleset: Ruleset = toml::from_str(text).context("failed to parse ruleset TOML")?;
    anyhow::ensure!(!ruleset.id.is_empty(), "ruleset id must not be empty");
    Ok(ruleset)
}

/// Read and parse a ruleset catalogue file.
pub fn ruleset_from_path(path: impl AsRef<Path>) -> Result<Ruleset> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read ruleset file {}", path.display()))?;
    ruleset_from_toml(&text)
}
