// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Project configuration (`esb.yaml`) with strict validation.
//!
//! Raw serde structs carry the defaults; `ConfigLoader` validates them into
//! typed config. A missing file yields the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EsbError, EsbResult, ValidationError};
use crate::types::{BucketName, Endpoint};

/// File name looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "esb.yaml";

pub const DEFAULT_DYNAMODB_ENDPOINT: &str = "http://localhost:8001";
pub const DEFAULT_S3_ENDPOINT: &str = "http://localhost:9000";

const MAX_PARALLELISM: usize = 16;
const MAX_REQUEST_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaths {
    #[serde(default = "default_sam_template")]
    sam_template: String,
    #[serde(default = "default_output_dir")]
    output_dir: String,
}

fn default_sam_template() -> String {
    "template.yaml".to_string()
}

fn default_output_dir() -> String {
    ".esb".to_string()
}

impl Default for RawPaths {
    fn default() -> Self {
        Self {
            sam_template: default_sam_template(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocker {
    #[serde(default)]
    sitecustomize_source: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoints {
    #[serde(default = "default_dynamodb_endpoint")]
    dynamodb: String,
    #[serde(default = "default_s3_endpoint")]
    s3: String,
}

fn default_dynamodb_endpoint() -> String {
    DEFAULT_DYNAMODB_ENDPOINT.to_string()
}

fn default_s3_endpoint() -> String {
    DEFAULT_S3_ENDPOINT.to_string()
}

impl Default for RawEndpoints {
    fn default() -> Self {
        Self {
            dynamodb: default_dynamodb_endpoint(),
            s3: default_s3_endpoint(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProvisioner {
    #[serde(default = "default_parallelism")]
    parallelism: usize,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_layer_bucket")]
    layer_bucket: String,
}

fn default_parallelism() -> usize {
    2
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_layer_bucket() -> String {
    "esb-layers".to_string()
}

impl Default for RawProvisioner {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            request_timeout_ms: default_request_timeout_ms(),
            layer_bucket: default_layer_bucket(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompose {
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    env_file: Option<String>,
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    docker: RawDocker,
    #[serde(default)]
    endpoints: RawEndpoints,
    #[serde(default)]
    provisioner: RawProvisioner,
    #[serde(default)]
    compose: RawCompose,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub sam_template: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EndpointsConfig {
    pub dynamodb: Endpoint,
    pub s3: Endpoint,
}

impl EndpointsConfig {
    /// Apply `DYNAMODB_ENDPOINT` / `S3_ENDPOINT` when set and non-blank.
    pub fn with_env_overrides(self) -> Self {
        let pick = |service: &'static str, key: &str, current: Endpoint| {
            std::env::var(key)
                .ok()
                .and_then(|value| Endpoint::new(service, value).ok())
                .unwrap_or(current)
        };
        Self {
            dynamodb: pick("dynamodb", "DYNAMODB_ENDPOINT", self.dynamodb),
            s3: pick("s3", "S3_ENDPOINT", self.s3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub parallelism: usize,
    pub request_timeout: Duration,
    pub layer_bucket: BucketName,
}

#[derive(Debug, Clone, Default)]
pub struct ComposeConfig {
    pub files: Vec<String>,
    pub env_file: Option<String>,
}

/// Complete validated project configuration.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Directory relative paths resolve against.
    pub project_dir: PathBuf,
    pub paths: PathsConfig,
    pub sitecustomize_source: String,
    pub endpoints: EndpointsConfig,
    pub provisioner: ProvisionerConfig,
    pub compose: ComposeConfig,
    pub parameters: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Absolute template path.
    pub fn template_path(&self) -> PathBuf {
        self.project_dir.join(&self.paths.sam_template)
    }

    /// Per-environment output directory: `<project>/<output_dir>/<env>`.
    pub fn output_dir(&self, env: &str) -> PathBuf {
        let root = self.project_dir.join(&self.paths.output_dir);
        if env.trim().is_empty() {
            root
        } else {
            root.join(env.trim())
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a config file. Relative paths resolve against its directory.
    pub fn load_file(path: impl AsRef<Path>) -> EsbResult<ProjectConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(EsbError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| EsbError::Io {
            context: "reading config file",
            source: e,
        })?;

        let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| EsbError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw, project_dir_of(path))
    }

    /// Like [`ConfigLoader::load_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> EsbResult<ProjectConfig> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_file(path);
        }
        tracing::debug!(path = %path.display(), "No project config, using defaults");
        Self::validate(RawConfig::default(), project_dir_of(path))
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str, project_dir: impl Into<PathBuf>) -> EsbResult<ProjectConfig> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| EsbError::ConfigParse {
            path: PathBuf::from(CONFIG_FILE_NAME),
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw, project_dir.into())
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig, project_dir: PathBuf) -> EsbResult<ProjectConfig> {
        let paths = Self::validate_paths(raw.paths)?;
        let provisioner = Self::validate_provisioner(raw.provisioner)?;

        let endpoints = EndpointsConfig {
            dynamodb: Endpoint::new("dynamodb", raw.endpoints.dynamodb)?,
            s3: Endpoint::new("s3", raw.endpoints.s3)?,
        };

        let files = raw
            .compose
            .files
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        let env_file = raw
            .compose
            .env_file
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        for key in raw.parameters.keys() {
            if key.trim().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: "parameters",
                    value: key.clone(),
                    reason: "Parameter names cannot be empty".to_string(),
                }
                .into());
            }
        }

        Ok(ProjectConfig {
            project_dir,
            paths,
            sitecustomize_source: raw.docker.sitecustomize_source.trim().to_string(),
            endpoints,
            provisioner,
            compose: ComposeConfig { files, env_file },
            parameters: raw.parameters,
        })
    }

    fn validate_paths(raw: RawPaths) -> EsbResult<PathsConfig> {
        if raw.sam_template.trim().is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "sam_template",
                context: "paths".to_string(),
            }
            .into());
        }

        let output_dir = PathBuf::from(raw.output_dir.trim());
        if output_dir.as_os_str().is_empty() || output_dir.is_absolute() {
            return Err(ValidationError::InvalidFieldValue {
                field: "output_dir",
                value: raw.output_dir,
                reason: "Must be a non-empty path relative to the project".to_string(),
            }
            .into());
        }

        Ok(PathsConfig {
            sam_template: PathBuf::from(raw.sam_template.trim()),
            output_dir,
        })
    }

    fn validate_provisioner(raw: RawProvisioner) -> EsbResult<ProvisionerConfig> {
        if raw.parallelism == 0 || raw.parallelism > MAX_PARALLELISM {
            return Err(ValidationError::InvalidFieldValue {
                field: "parallelism",
                value: raw.parallelism.to_string(),
                reason: format!("Must be between 1 and {}", MAX_PARALLELISM),
            }
            .into());
        }

        if raw.request_timeout_ms == 0 || raw.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
            return Err(ValidationError::InvalidFieldValue {
                field: "request_timeout_ms",
                value: raw.request_timeout_ms.to_string(),
                reason: format!("Must be between 1 and {}", MAX_REQUEST_TIMEOUT_MS),
            }
            .into());
        }

        Ok(ProvisionerConfig {
            parallelism: raw.parallelism,
            request_timeout: Duration::from_millis(raw.request_timeout_ms),
            layer_bucket: BucketName::new(raw.layer_bucket)?,
        })
    }
}

fn project_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
