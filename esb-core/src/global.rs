// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Global CLI state in `$HOME/.esb/config.yaml`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EsbError, EsbResult, FsError};
use crate::fs;

pub const GLOBAL_CONFIG_VERSION: u32 = 1;
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub path: String,
    /// RFC 3339 timestamp.
    pub last_used: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub active_project: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub active_environments: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub projects: BTreeMap<String, ProjectEntry>,
}

/// `$HOME/.esb/config.yaml`.
pub fn global_config_path() -> EsbResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".esb").join("config.yaml"))
        .ok_or_else(|| EsbError::Io {
            context: "resolving home directory",
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found"),
        })
}

impl GlobalConfig {
    pub fn load(path: &Path) -> EsbResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| FsError::io("read global config", path, e))?;
        serde_yaml::from_str(&content).map_err(|e| EsbError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load, or start empty when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> EsbResult<Self> {
        if !fs::file_exists(path) {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write the file, creating parent directories with mode 0755.
    pub fn save(&self, path: &Path) -> EsbResult<()> {
        let payload = serde_yaml::to_string(self).map_err(|e| EsbError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::ensure_dir(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let mut file = options
            .open(path)
            .map_err(|e| FsError::io("write global config", path, e))?;
        file.write_all(payload.as_bytes())
            .map_err(|e| FsError::io("write global config", path, e))?;

        tracing::debug!(path = %path.display(), "Saved global config");
        Ok(())
    }

    /// Record a project as used now and make it the active one.
    pub fn touch_project(&mut self, name: &str, project_dir: &Path, now: DateTime<Utc>) {
        if self.version == 0 {
            self.version = GLOBAL_CONFIG_VERSION;
        }
        self.projects.insert(
            name.to_string(),
            ProjectEntry {
                path: project_dir.to_string_lossy().into_owned(),
                last_used: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        );
        self.active_project = name.to_string();
    }

    pub fn set_active_environment(&mut self, project: &str, env: &str) {
        self.active_environments
            .insert(project.to_string(), env.to_string());
    }

    pub fn active_environment(&self, project: &str) -> Option<&str> {
        self.active_environments.get(project).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_with_touch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/.esb/config.yaml");

        let mut config = GlobalConfig::load_or_default(&path).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        config.touch_project("shop", Path::new("/work/shop"), now);
        config.set_active_environment("shop", "dev");
        config.save(&path).unwrap();

        let loaded = GlobalConfig::load(&path).unwrap();
        assert_eq!(loaded.version, GLOBAL_CONFIG_VERSION);
        assert_eq!(loaded.active_project, "shop");
        assert_eq!(loaded.active_environment("shop"), Some("dev"));
        assert_eq!(loaded.projects["shop"].path, "/work/shop");
        assert_eq!(loaded.projects["shop"].last_used, "2025-03-01T12:30:00Z");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_modes() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("esb/config.yaml");
        GlobalConfig::default().save(&path).unwrap();

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        // Both are subject to the process umask.
        assert_eq!(file_mode & !0o644, 0);
        assert_eq!(dir_mode & !0o755, 0);
    }

    #[test]
    fn test_load_missing_is_error() {
        let err = GlobalConfig::load(Path::new("/nonexistent/.esb/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/.esb/config.yaml"));
    }

    #[test]
    fn test_load_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "version: [").unwrap();
        assert!(matches!(
            GlobalConfig::load(&path),
            Err(EsbError::ConfigParse { .. })
        ));
    }
}
