// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end `up` flow: normalize the environment, parse and stage the
//! manifest, write the staged config, then hand the resources to a
//! provisioning backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::aws;
use crate::compose::{self, CommandRunner, ComposeRequest};
use crate::config::ProjectConfig;
use crate::envcompat;
use crate::error::{EsbError, EsbResult, FsError};
use crate::fs;
use crate::manifest::{FunctionSpec, Manifest, ManifestParser, ResourcesSpec};
use crate::provision::{LifecyclePolicy, ProvisionReport, Provisioner, S3LayerPublisher};
use crate::stage::{self, StageContext};
use crate::types::RuntimeMode;

/// Staged config directory under the output directory.
pub const CONFIG_DIR: &str = "config";
pub const RESOURCES_FILE: &str = "resources.yml";
pub const FUNCTIONS_FILE: &str = "functions.yml";

/// Inputs for one staging + provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub env: String,
    /// Blank means `PROJECT_NAME` from the environment, then `esb-<env>`.
    pub compose_project: String,
    pub mode: RuntimeMode,
    /// Overrides the configured template. Relative paths resolve against the project dir.
    pub template: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: bool,
}

impl ProvisionRequest {
    pub fn new(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            compose_project: String::new(),
            mode: RuntimeMode::default(),
            template: None,
            dry_run: false,
            verbose: false,
        }
    }
}

/// What staging produced.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub manifest: Manifest,
    pub output_dir: PathBuf,
    /// `None` on dry runs.
    pub resources_path: Option<PathBuf>,
}

/// Applies staged resources somewhere.
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    async fn apply(
        &self,
        resources: &ResourcesSpec,
        output_dir: &Path,
        compose_project: &str,
        cancel: &CancellationToken,
    ) -> EsbResult<ProvisionReport>;
}

/// Provision directly against the configured DynamoDB/S3 endpoints.
#[derive(Debug, Clone)]
pub struct InProcessApplier {
    config: ProjectConfig,
}

impl InProcessApplier {
    pub fn new(config: ProjectConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResourceApplier for InProcessApplier {
    async fn apply(
        &self,
        resources: &ResourcesSpec,
        output_dir: &Path,
        compose_project: &str,
        cancel: &CancellationToken,
    ) -> EsbResult<ProvisionReport> {
        let endpoints = self.config.endpoints.clone().with_env_overrides();
        let settings = &self.config.provisioner;

        let tables = Arc::new(aws::dynamodb_client(
            endpoints.dynamodb.as_str(),
            settings.request_timeout,
        )?);
        let buckets = Arc::new(aws::s3_client(endpoints.s3.as_str(), settings.request_timeout)?);
        let publisher = Arc::new(S3LayerPublisher::new(
            buckets.clone(),
            settings.layer_bucket.clone(),
        ));

        tracing::debug!(
            dynamodb = %endpoints.dynamodb,
            s3 = %endpoints.s3,
            parallelism = settings.parallelism,
            "Provisioning in-process"
        );

        let provisioner = Provisioner::new(tables, buckets, output_dir)
            .with_publisher(publisher)
            .with_parallelism(settings.parallelism)
            .with_lifecycle_policy(LifecyclePolicy::from_env());

        Ok(provisioner.apply(resources, compose_project, cancel).await)
    }
}

/// Run the provisioner container through `docker compose`.
pub struct ComposeApplier {
    runner: Arc<dyn CommandRunner>,
    working_dir: PathBuf,
    files: Vec<String>,
    env_file: String,
    no_deps: bool,
    verbose: bool,
}

impl ComposeApplier {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &ProjectConfig) -> Self {
        Self {
            runner,
            working_dir: config.project_dir.clone(),
            files: config.compose.files.clone(),
            env_file: config.compose.env_file.clone().unwrap_or_default(),
            no_deps: true,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_no_deps(mut self, no_deps: bool) -> Self {
        self.no_deps = no_deps;
        self
    }
}

#[async_trait]
impl ResourceApplier for ComposeApplier {
    async fn apply(
        &self,
        _resources: &ResourcesSpec,
        _output_dir: &Path,
        compose_project: &str,
        _cancel: &CancellationToken,
    ) -> EsbResult<ProvisionReport> {
        let request = ComposeRequest {
            compose_project: compose_project.to_string(),
            compose_files: self.files.clone(),
            env_file: self.env_file.clone(),
            no_deps: self.no_deps,
            verbose: self.verbose,
            no_warn_orphans: true,
            provisioner_service: compose::DEFAULT_PROVISIONER_SERVICE.to_string(),
        };
        compose::execute(self.runner.as_ref(), &self.working_dir, &request).await?;
        // Per-resource outcomes stay inside the container.
        Ok(ProvisionReport::default())
    }
}

/// Drives staging and provisioning for one project.
pub struct Orchestrator {
    config: ProjectConfig,
    applier: Arc<dyn ResourceApplier>,
}

impl Orchestrator {
    pub fn new(config: ProjectConfig, applier: Arc<dyn ResourceApplier>) -> Self {
        Self { config, applier }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Template a request stages: its override, else the configured one.
    pub fn template_path(&self, request: &ProvisionRequest) -> PathBuf {
        match &request.template {
            Some(path) => self.config.project_dir.join(path),
            None => self.config.template_path(),
        }
    }

    /// Parse and stage the manifest and write the staged config files.
    pub fn build(&self, request: &ProvisionRequest) -> EsbResult<StageOutcome> {
        let template = self.template_path(request);
        tracing::debug!(template = %template.display(), env = %request.env, "Parsing template");
        let manifest = ManifestParser::new(self.config.parameters.clone()).parse_file(&template)?;

        let base_dir = template
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.project_dir.clone());
        let output_dir = self.config.output_dir(&request.env);

        let mut ctx = StageContext::new(&base_dir, &output_dir, &self.config.project_dir)
            .with_sitecustomize(self.config.sitecustomize_source.clone())
            .with_dry_run(request.dry_run)
            .with_verbose(request.verbose);
        let staged = stage::stage(&manifest, &mut ctx)?;

        let resources_path = if request.dry_run {
            None
        } else {
            Some(write_staged_config(&output_dir, &staged)?)
        };

        Ok(StageOutcome {
            manifest: staged,
            output_dir,
            resources_path,
        })
    }

    /// Normalize the environment, stage, then provision unless dry-running.
    ///
    /// Fails with [`EsbError::Provision`] when any resource failed or was cancelled.
    pub async fn up(
        &self,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> EsbResult<(StageOutcome, ProvisionReport)> {
        envcompat::apply_mode_env(request.mode)?;
        envcompat::apply_up_env(&request.env)?;

        let outcome = self.build(request)?;
        if request.dry_run {
            tracing::info!(output = %outcome.output_dir.display(), "Dry run, skipping provisioning");
            return Ok((outcome, ProvisionReport::default()));
        }

        let compose_project = resolve_compose_project(&request.compose_project, &request.env);
        tracing::info!(
            env = %request.env,
            project = %compose_project,
            tables = outcome.manifest.resources.dynamodb.len(),
            buckets = outcome.manifest.resources.s3.len(),
            layers = outcome.manifest.resources.layers.len(),
            "Provisioning resources"
        );

        let report = self
            .applier
            .apply(
                &outcome.manifest.resources,
                &outcome.output_dir,
                &compose_project,
                cancel,
            )
            .await?
            .into_result()?;
        Ok((outcome, report))
    }
}

/// Explicit name, then `PROJECT_NAME` via the compat layer, then `esb-<env>`.
pub fn resolve_compose_project(explicit: &str, env: &str) -> String {
    let explicit = explicit.trim();
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    if let Some((value, _)) = envcompat::get_compat_env("PROJECT_NAME", "PROJECT_NAME") {
        return value;
    }
    match env.trim() {
        "" => "esb".to_string(),
        env => format!("esb-{}", env.to_lowercase()),
    }
}

#[derive(Serialize)]
struct ResourcesFile<'a> {
    resources: &'a ResourcesSpec,
}

#[derive(Serialize)]
struct FunctionsFile<'a> {
    functions: &'a [FunctionSpec],
}

/// Write `config/resources.yml` and `config/functions.yml`; returns the former.
fn write_staged_config(output_dir: &Path, manifest: &Manifest) -> EsbResult<PathBuf> {
    let config_dir = output_dir.join(CONFIG_DIR);
    fs::ensure_dir(&config_dir)?;

    let resources_path = config_dir.join(RESOURCES_FILE);
    write_yaml(
        &resources_path,
        &ResourcesFile {
            resources: &manifest.resources,
        },
    )?;
    write_yaml(
        &config_dir.join(FUNCTIONS_FILE),
        &FunctionsFile {
            functions: &manifest.functions,
        },
    )?;

    tracing::debug!(path = %resources_path.display(), "Wrote staged resources");
    Ok(resources_path)
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> EsbResult<()> {
    let payload = serde_yaml::to_string(value).map_err(|e| EsbError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    std::fs::write(path, payload).map_err(|e| FsError::io("write staged config", path, e))?;
    Ok(())
}
