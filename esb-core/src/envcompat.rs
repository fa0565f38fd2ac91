// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Environment variable compatibility layer.
//!
//! Reads resolve a canonical key, then `<ENV_PREFIX>_<SUFFIX>`, then the
//! legacy `ESB_<SUFFIX>`. Writes go to the canonical and prefixed keys only;
//! `ESB_*` keys are never written.

use crate::error::ValidationError;
use crate::types::RuntimeMode;

pub const ENV_PREFIX_KEY: &str = "ENV_PREFIX";
const LEGACY_PREFIX: &str = "ESB";

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn prefix() -> Option<String> {
    non_empty(ENV_PREFIX_KEY)
}

/// `<ENV_PREFIX>_<suffix>`; fails when `ENV_PREFIX` is unset or blank.
pub fn host_env_key(suffix: &str) -> Result<String, ValidationError> {
    prefix()
        .map(|p| format!("{}_{}", p, suffix))
        .ok_or(ValidationError::EnvPrefixRequired)
}

/// Value of the prefixed key; empty when unset.
pub fn get_host_env(suffix: &str) -> Result<String, ValidationError> {
    let key = host_env_key(suffix)?;
    Ok(std::env::var(key).unwrap_or_default())
}

pub fn set_host_env(suffix: &str, value: &str) -> Result<(), ValidationError> {
    let key = host_env_key(suffix)?;
    std::env::set_var(key, value);
    Ok(())
}

/// Resolve `(value, source_key)`; `None` when no key holds a non-blank value.
pub fn get_compat_env(suffix: &str, canonical_key: &str) -> Option<(String, String)> {
    let canonical = canonical_key.trim();
    let mut candidates = Vec::with_capacity(3);
    if !canonical.is_empty() {
        candidates.push(canonical.to_string());
    }
    if let Some(prefix) = prefix() {
        candidates.push(format!("{}_{}", prefix, suffix));
    }
    candidates.push(format!("{}_{}", LEGACY_PREFIX, suffix));

    candidates
        .into_iter()
        .find_map(|key| non_empty(&key).map(|value| (value, key)))
}

/// Write the canonical key (if given) and the prefixed key (if `ENV_PREFIX` is set).
///
/// Fails with [`ValidationError::EnvPrefixRequired`] when neither was written.
pub fn set_compat_env(suffix: &str, canonical_key: &str, value: &str) -> Result<(), ValidationError> {
    let mut written = false;

    let canonical = canonical_key.trim();
    if !canonical.is_empty() {
        std::env::set_var(canonical, value);
        written = true;
    }

    if let Some(prefix) = prefix() {
        std::env::set_var(format!("{}_{}", prefix, suffix), value);
        written = true;
    }

    if !written {
        return Err(ValidationError::EnvPrefixRequired);
    }
    Ok(())
}

/// Propagate the runtime mode unless one is already configured.
pub fn apply_mode_env(mode: RuntimeMode) -> Result<(), ValidationError> {
    if let Some((existing, source)) = get_compat_env("MODE", "MODE") {
        tracing::debug!(mode = %existing, source = %source, "Runtime mode already set");
        return Ok(());
    }
    set_compat_env("MODE", "MODE", mode.as_str())
}

/// Set `ENV` and default `PROJECT_NAME` (`esb-<env>`) and `IMAGE_TAG` (`<env>`).
pub fn apply_up_env(env: &str) -> Result<(), ValidationError> {
    let env = env.trim();
    if env.is_empty() {
        return Ok(());
    }
    set_compat_env("ENV", "ENV", env)?;

    if get_compat_env("PROJECT_NAME", "PROJECT_NAME").is_none() {
        set_compat_env(
            "PROJECT_NAME",
            "PROJECT_NAME",
            &format!("esb-{}", env.to_lowercase()),
        )?;
    }
    if get_compat_env("IMAGE_TAG", "IMAGE_TAG").is_none() {
        set_compat_env("IMAGE_TAG", "IMAGE_TAG", env)?;
    }
    Ok(())
}
