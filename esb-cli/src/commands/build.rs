// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `esb build` command - Stage the template without provisioning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use esb_core::orchestrator::InProcessApplier;
use esb_core::{Orchestrator, ProvisionRequest};

pub async fn execute(
    config_path: &Path,
    env: Option<String>,
    template: Option<PathBuf>,
    dry_run: bool,
    params: Vec<(String, String)>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_project(config_path, params)?;
    let env = super::resolve_env(env, &config);
    let orchestrator = Orchestrator::new(config.clone(), Arc::new(InProcessApplier::new(config)));
    let mut request = ProvisionRequest::new(env);
    request.template = template;
    request.dry_run = dry_run;
    request.verbose = verbose;
    tracing::info!(
        env = %request.env,
        template = %orchestrator.template_path(&request).display(),
        "Building"
    );
    let outcome = orchestrator.build(&request)?;

    println!("Functions ({}):", outcome.manifest.functions.len());
    for function in &outcome.manifest.functions {
        let layers: Vec<&str> = function
            .layers
            .iter()
            .map(|l| l.content_uri.as_str())
            .collect();
        println!(
            "  - {} → {}{}",
            function.name,
            function.code_uri,
            if layers.is_empty() {
                String::new()
            } else {
                format!(" [{}]", layers.join(", "))
            }
        );
    }

    println!("Layers ({}):", outcome.manifest.resources.layers.len());
    for layer in &outcome.manifest.resources.layers {
        println!("  - {} → {}", layer.name, layer.content_uri);
    }

    println!();
    match outcome.resources_path {
        Some(path) => println!("✓ Staged into {} ({})", outcome.output_dir.display(), path.display()),
        None => println!("Dry run: nothing written to {}", outcome.output_dir.display()),
    }
    Ok(())
}
