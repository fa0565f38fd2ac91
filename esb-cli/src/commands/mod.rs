// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod build;
pub mod cni;
pub mod list;
pub mod up;
pub mod use_project;
pub mod validate;

use std::path::Path;

use esb_core::global::{self, GlobalConfig};
use esb_core::{ConfigLoader, EsbResult, ProjectConfig};

/// Fallback environment when neither the flag nor the global config names one.
pub const DEFAULT_ENV: &str = "default";

/// Parse a `KEY=VALUE` template parameter.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Load the project config and apply `--param` overrides.
pub fn load_project(config_path: &Path, params: Vec<(String, String)>) -> EsbResult<ProjectConfig> {
    let mut config = ConfigLoader::load_or_default(config_path)?;
    config.parameters.extend(params);
    Ok(config)
}

/// Name a project is recorded under in the global config.
pub fn project_name(config: &ProjectConfig) -> String {
    let dir = std::fs::canonicalize(&config.project_dir).unwrap_or_else(|_| config.project_dir.clone());
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

/// `--env`, then the project's active environment, then [`DEFAULT_ENV`].
pub fn resolve_env(explicit: Option<String>, config: &ProjectConfig) -> String {
    if let Some(env) = explicit.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) {
        return env;
    }
    let active = global::global_config_path()
        .and_then(|path| GlobalConfig::load_or_default(&path))
        .ok()
        .and_then(|global| {
            global
                .active_environment(&project_name(config))
                .map(str::to_string)
        });
    active.unwrap_or_else(|| DEFAULT_ENV.to_string())
}
