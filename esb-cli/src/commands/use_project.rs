// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `esb use` command - Record the active project and environment.

use std::path::Path;

use esb_core::global::{self, GlobalConfig};

pub async fn execute(
    config_path: &Path,
    project: Option<String>,
    env: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_project(config_path, Vec::new())?;
    let project = project
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| super::project_name(&config));

    let global_path = global::global_config_path()?;
    let mut global = GlobalConfig::load_or_default(&global_path)?;
    let project_dir =
        std::fs::canonicalize(&config.project_dir).unwrap_or_else(|_| config.project_dir.clone());
    global.touch_project(&project, &project_dir, chrono::Utc::now());

    if let Some(env) = env.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) {
        global.set_active_environment(&project, &env);
    }
    global.save(&global_path)?;

    tracing::debug!(project = %project, path = %global_path.display(), "Updated active project");
    match global.active_environment(&project) {
        Some(env) => println!("✓ Using project '{}' ({})", project, env),
        None => println!("✓ Using project '{}'", project),
    }
    Ok(())
}
