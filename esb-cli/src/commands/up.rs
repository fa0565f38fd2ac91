// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `esb up` command - Stage the template and provision its resources.
//!
//! Ctrl+C cancels outstanding provisioning work; resources created so far
//! are kept and the rest are reported as cancelled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use esb_core::compose::TokioCommandRunner;
use esb_core::global::{self, GlobalConfig};
use esb_core::orchestrator::{ComposeApplier, InProcessApplier};
use esb_core::provision::OutcomeStatus;
use esb_core::{Orchestrator, ProvisionRequest, ResourceApplier, RuntimeMode};
use tokio_util::sync::CancellationToken;

pub struct UpOptions {
    pub env: Option<String>,
    pub mode: RuntimeMode,
    pub compose: bool,
    pub project_name: Option<String>,
    pub template: Option<PathBuf>,
    pub dry_run: bool,
    pub params: Vec<(String, String)>,
    pub verbose: bool,
}

pub async fn execute(config_path: &Path, options: UpOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_project(config_path, options.params)?;
    let env = super::resolve_env(options.env, &config);
    let project = super::project_name(&config);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling provisioning");
            signal_token.cancel();
        }
    });

    let applier: Arc<dyn ResourceApplier> = if options.compose {
        let runner = Arc::new(TokioCommandRunner::new(cancel.clone()));
        Arc::new(ComposeApplier::new(runner, &config).with_verbose(options.verbose))
    } else {
        Arc::new(InProcessApplier::new(config.clone()))
    };

    let request = ProvisionRequest {
        env: env.clone(),
        compose_project: options.project_name.unwrap_or_default(),
        mode: options.mode,
        template: options.template,
        dry_run: options.dry_run,
        verbose: options.verbose,
    };

    let orchestrator = Orchestrator::new(config.clone(), applier);
    println!(
        "▶ Staging {} for environment '{}'",
        orchestrator.template_path(&request).display(),
        env
    );
    let (outcome, report) = orchestrator.up(&request, &cancel).await?;

    println!(
        "  ✓ {} function(s) staged into {}",
        outcome.manifest.functions.len(),
        outcome.output_dir.display()
    );

    if options.dry_run {
        for function in &outcome.manifest.functions {
            println!("    - {} → {}", function.name, function.code_uri);
        }
        println!();
        println!("Dry run: nothing written, nothing provisioned.");
        return Ok(());
    }

    if !report.outcomes.is_empty() {
        println!();
        println!("Resources:");
        for outcome in &report.outcomes {
            let icon = match outcome.status {
                OutcomeStatus::Applied(_) => "✓",
                OutcomeStatus::Failed(_) => "✗",
                OutcomeStatus::Cancelled => "○",
            };
            println!("  {} {:<7} {:<32} {}", icon, outcome.kind, outcome.name, outcome.status);
        }
    }

    // Remember the project only after a successful run.
    let global_path = global::global_config_path()?;
    let mut global = GlobalConfig::load_or_default(&global_path)?;
    let project_dir =
        std::fs::canonicalize(&config.project_dir).unwrap_or_else(|_| config.project_dir.clone());
    global.touch_project(&project, &project_dir, chrono::Utc::now());
    global.set_active_environment(&project, &env);
    global.save(&global_path)?;

    println!();
    println!("✓ Environment '{}' is up", env);
    Ok(())
}
