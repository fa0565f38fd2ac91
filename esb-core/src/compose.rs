// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `docker compose run` invocation of the provisioner container.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{EsbError, EsbResult};

pub const DEFAULT_PROVISIONER_SERVICE: &str = "provisioner";
const DOCKER: &str = "docker";
const DEPLOY_PROFILE: &str = "deploy";

/// One provisioner run through compose.
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    pub compose_project: String,
    pub compose_files: Vec<String>,
    pub env_file: String,
    pub no_deps: bool,
    pub verbose: bool,
    pub no_warn_orphans: bool,
    pub provisioner_service: String,
}

/// Argument vector passed to `docker`.
pub fn build_args(request: &ComposeRequest) -> Vec<String> {
    let mut args = vec!["compose".to_string()];

    for file in &request.compose_files {
        let file = file.trim();
        if !file.is_empty() {
            args.extend(["-f".to_string(), file.to_string()]);
        }
    }
    if request.no_warn_orphans {
        args.push("--no-warn-orphans".to_string());
    }
    let project = request.compose_project.trim();
    if !project.is_empty() {
        args.extend(["-p".to_string(), project.to_string()]);
    }
    let env_file = request.env_file.trim();
    if !env_file.is_empty() {
        args.extend(["--env-file".to_string(), env_file.to_string()]);
    }
    args.extend(
        ["--profile", DEPLOY_PROFILE, "run", "--rm"]
            .into_iter()
            .map(String::from),
    );
    if request.no_deps {
        args.push("--no-deps".to_string());
    }

    let service = request.provisioner_service.trim();
    args.push(if service.is_empty() {
        DEFAULT_PROVISIONER_SERVICE.to_string()
    } else {
        service.to_string()
    });
    args
}

/// Executes external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with output streamed to the terminal.
    async fn run(&self, cwd: &Path, program: &str, args: &[String]) -> EsbResult<()>;

    /// Run with output captured; it is only surfaced on failure.
    async fn run_quiet(&self, cwd: &Path, program: &str, args: &[String]) -> EsbResult<()>;
}

/// Runner backed by `tokio::process`. Children are killed on cancellation.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    cancel: CancellationToken,
}

impl TokioCommandRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    fn command(cwd: &Path, program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn cancelled(program: &str) -> EsbError {
        EsbError::Command {
            program: program.to_string(),
            message: "cancelled".to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, cwd: &Path, program: &str, args: &[String]) -> EsbResult<()> {
        tracing::debug!(program = %program, args = ?args, cwd = %cwd.display(), "Running command");

        let mut child = Self::command(cwd, program, args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EsbError::Command {
                program: program.to_string(),
                message: format!("failed to spawn: {}", e),
            })?;

        let status = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Self::cancelled(program)),
            status = child.wait() => status.map_err(|e| EsbError::Io {
                context: "waiting for command",
                source: e,
            })?,
        };

        if !status.success() {
            return Err(EsbError::Command {
                program: program.to_string(),
                message: format!("exited with {}", status),
            });
        }
        Ok(())
    }

    async fn run_quiet(&self, cwd: &Path, program: &str, args: &[String]) -> EsbResult<()> {
        tracing::debug!(program = %program, args = ?args, cwd = %cwd.display(), "Running command quietly");

        let child = Self::command(cwd, program, args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EsbError::Command {
                program: program.to_string(),
                message: format!("failed to spawn: {}", e),
            })?;

        let output = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Self::cancelled(program)),
            output = child.wait_with_output() => output.map_err(|e| EsbError::Io {
                context: "waiting for command",
                source: e,
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(EsbError::Command {
                program: program.to_string(),
                message: format!("exited with {}: {}", output.status, detail),
            });
        }
        Ok(())
    }
}

/// Run the provisioner service; output is streamed only when verbose.
pub async fn execute(
    runner: &dyn CommandRunner,
    working_dir: &Path,
    request: &ComposeRequest,
) -> EsbResult<()> {
    let args = build_args(request);
    tracing::info!(
        project = %request.compose_project,
        service = %args.last().map(String::as_str).unwrap_or(DEFAULT_PROVISIONER_SERVICE),
        "Running provisioner via compose"
    );

    if request.verbose {
        runner.run(working_dir, DOCKER, &args).await
    } else {
        runner.run_quiet(working_dir, DOCKER, &args).await
    }
}
