// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! esb CLI
//!
//! Command-line interface for the edge serverless box: stages SAM-style
//! templates and provisions the local DynamoDB/S3 emulators.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use esb_core::RuntimeMode;
use tracing_subscriber::EnvFilter;

mod commands;

/// esb - stage and provision serverless projects against local emulators
#[derive(Parser)]
#[command(name = "esb")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project configuration file path
    #[arg(short, long, default_value = esb_core::config::CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stage the template and provision its resources
    Up {
        /// Target environment (defaults to the active one, then "default")
        #[arg(short, long)]
        env: Option<String>,

        /// Runtime mode propagated to the compose stack
        #[arg(short, long, default_value = "docker")]
        mode: RuntimeMode,

        /// Run the provisioner container via docker compose instead of in-process
        #[arg(long)]
        compose: bool,

        /// Template to stage instead of the configured one
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Compose project name (defaults to PROJECT_NAME, then esb-<env>)
        #[arg(short = 'p', long)]
        project_name: Option<String>,

        /// Show what would be staged without writing or provisioning
        #[arg(long)]
        dry_run: bool,

        /// Template parameter override, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = commands::parse_param)]
        params: Vec<(String, String)>,
    },

    /// Stage the template without provisioning
    Build {
        /// Target environment
        #[arg(short, long)]
        env: Option<String>,

        /// Template to stage instead of the configured one
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Show what would be staged without writing
        #[arg(long)]
        dry_run: bool,

        /// Template parameter override, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = commands::parse_param)]
        params: Vec<(String, String)>,
    },

    /// Validate the project configuration and template
    Validate,

    /// List functions and resources declared in the template
    List,

    /// Select the active project and environment
    Use {
        /// Project name to record (defaults to the project directory name)
        project: Option<String>,

        /// Environment to make active for the project
        #[arg(short, long)]
        env: Option<String>,
    },

    /// Write a CNI bridge network config for containerd mode
    Cni {
        /// Directory the conflist is written to
        #[arg(long, default_value = "/etc/cni/net.d")]
        dir: PathBuf,

        /// IPv4 subnet in CIDR notation
        #[arg(long, default_value = "10.88.0.0/16")]
        subnet: String,

        /// Network name
        #[arg(long, default_value = "esb-net")]
        name: String,

        /// Bridge interface name
        #[arg(long, default_value = "esb0")]
        bridge: String,

        /// Also write a shell-sourceable identity file
        #[arg(long)]
        identity: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Up {
            env,
            mode,
            compose,
            template,
            project_name,
            dry_run,
            params,
        } => {
            let options = commands::up::UpOptions {
                env,
                mode,
                compose,
                project_name,
                template,
                dry_run,
                params,
                verbose: cli.verbose,
            };
            commands::up::execute(&cli.config, options).await
        }
        Commands::Build {
            env,
            template,
            dry_run,
            params,
        } => {
            commands::build::execute(&cli.config, env, template, dry_run, params, cli.verbose).await
        }
        Commands::Validate => commands::validate::execute(&cli.config).await,
        Commands::List => commands::list::execute(&cli.config).await,
        Commands::Use { project, env } => commands::use_project::execute(&cli.config, project, env).await,
        Commands::Cni {
            dir,
            subnet,
            name,
            bridge,
            identity,
        } => commands::cni::execute(&dir, &subnet, &name, &bridge, identity.as_deref()).await,
    }
}
