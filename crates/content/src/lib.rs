//! Ruleset content loading for `chargen-engine`.
//!
//! The engine consumes a [`chargen_engine::Ruleset`] as plain data; this
//! crate turns TOML catalogue text into one and ships a small demo ruleset
//! used by examples and tests.

mod demo;
mod loader;

pub use demo::demo_ruleset;
pub use loader::{ruleset_from_path, ruleset_from_toml};
