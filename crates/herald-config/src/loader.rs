// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered config loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/herald/herald.toml`,
//! `~/.config/herald/herald.toml`, `./herald.toml`, then `HERALD_*` env vars.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::HeraldConfig;

/// Top-level config sections. Env vars map onto these by their first segment.
pub(crate) const SECTIONS: &[&str] = &[
    "engine",
    "lease",
    "connection",
    "dispatch",
    "storage",
    "ingest",
];

/// Config file locations in merge order (lowest precedence first).
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/herald/herald.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("herald").join("herald.toml"));
    }
    paths.push(PathBuf::from("herald.toml"));
    paths
}

/// Build the full figment without extracting it.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(HeraldConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<HeraldConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<HeraldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HeraldConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HeraldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HeraldConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// `HERALD_LEASE_TTL_SECS` -> `lease.ttl_secs`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// field names keep their underscores. Unknown sections pass through
/// unchanged and are rejected by `deny_unknown_fields`.
fn env_provider() -> Env {
    Env::prefixed("HERALD_").map(|key| map_env_key(key.as_str()).into())
}

/// `lease.ttl_secs` -> `HERALD_LEASE_TTL_SECS`.
pub fn env_var_for(key: &str) -> String {
    format!("HERALD_{}", key.replace('.', "_").to_uppercase())
}

fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
