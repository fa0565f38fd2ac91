// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Path and filesystem primitives used by the stager and the provisioner.
//!
//! All operations are synchronous and surface the first error encountered,
//! tagged with the path that produced it.

use std::fs::{self, File};
use std::io::{self, BufReader, Cursor};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::FsError;

/// Directory mode used for every directory the stager creates.
pub const DIR_MODE: u32 = 0o755;

/// What a path currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
    Missing,
}

/// Classify a path, following symlinks.
pub fn exists(path: &Path) -> PathKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => PathKind::Directory,
        Ok(_) => PathKind::File,
        Err(_) => PathKind::Missing,
    }
}

pub fn file_exists(path: &Path) -> bool {
    exists(path) == PathKind::File
}

pub fn dir_exists(path: &Path) -> bool {
    exists(path) == PathKind::Directory
}

/// Create a directory and its parents with mode 0755.
pub fn ensure_dir(path: &Path) -> Result<(), FsError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder
        .create(path)
        .map_err(|e| FsError::io("create directory", path, e))
}

/// Recursively remove a directory. Absent paths are not an error.
pub fn remove_dir(path: &Path) -> Result<(), FsError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(FsError::io("inspect", path, e)),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FsError::io("remove", path, e)),
    }
}

/// Copy a single file, creating the destination's parent directory.
/// Permission bits travel with the copy.
pub fn copy_file(src: &Path, dst: &Path) -> Result<(), FsError> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).map_err(|e| FsError::io("copy file", src, e))?;
    Ok(())
}

/// Recursively copy `src` into `dst`, preserving mode bits.
///
/// Directory permissions are applied after their contents are copied so
/// read-only source directories can still be populated.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<(), FsError> {
    ensure_dir(dst)?;

    for entry in WalkDir::new(src).contents_first(true) {
        let entry = entry.map_err(|e| FsError::Walk {
            path: src.to_path_buf(),
            message: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| FsError::Walk {
                path: entry.path().to_path_buf(),
                message: e.to_string(),
            })?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            ensure_dir(&target)?;
            copy_permissions(entry.path(), &target)?;
        } else if file_type.is_symlink() {
            match exists(entry.path()) {
                PathKind::File => copy_file(entry.path(), &target)?,
                PathKind::Directory => copy_dir(entry.path(), &target)?,
                PathKind::Missing => {
                    tracing::debug!(path = %entry.path().display(), "Skipping dangling symlink");
                }
            }
        } else {
            copy_file(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_permissions(src: &Path, dst: &Path) -> Result<(), FsError> {
    let perms = fs::metadata(src)
        .map_err(|e| FsError::io("inspect", src, e))?
        .permissions();
    fs::set_permissions(dst, perms).map_err(|e| FsError::io("set permissions", dst, e))
}

#[cfg(not(unix))]
fn copy_permissions(_src: &Path, _dst: &Path) -> Result<(), FsError> {
    Ok(())
}

/// Extract a zip archive into `dst`.
///
/// Entries whose resolved destination would land outside `dst` (absolute
/// names, `..` components) are rejected with [`FsError::PathTraversal`].
pub fn unzip(archive_path: &Path, dst: &Path) -> Result<(), FsError> {
    let file = File::open(archive_path).map_err(|e| FsError::io("open archive", archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| FsError::Archive {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    })?;

    ensure_dir(dst)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| FsError::Archive {
            path: archive_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let name = entry.name().to_string();
        let rel = entry.enclosed_name().ok_or_else(|| FsError::PathTraversal {
            archive: archive_path.to_path_buf(),
            entry: name.clone(),
        })?;
        let target = dst.join(rel);

        if entry.is_dir() {
            ensure_dir(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }

        let mut out = File::create(&target).map_err(|e| FsError::io("create file", &target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| FsError::io("extract", &target, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| FsError::io("set permissions", &target, e))?;
            }
        }
    }

    Ok(())
}

/// Package a directory into an in-memory zip archive.
///
/// Entries are written in file-name order with a fixed timestamp, so the same
/// tree always yields the same bytes.
pub fn zip_dir(src: &Path) -> Result<Vec<u8>, FsError> {
    let archive_err = |message: String| FsError::Archive {
        path: src.to_path_buf(),
        message,
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let base_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| FsError::Walk {
            path: src.to_path_buf(),
            message: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| archive_err(e.to_string()))?;
        let name = to_slash(rel);

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{}/", name), base_options)
                .map_err(|e| archive_err(e.to_string()))?;
            continue;
        }

        let mut options = base_options;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(entry.path())
                .map_err(|e| FsError::io("inspect", entry.path(), e))?
                .permissions()
                .mode();
            options = options.unix_permissions(mode & 0o7777);
        }

        writer
            .start_file(name, options)
            .map_err(|e| archive_err(e.to_string()))?;
        let mut input =
            File::open(entry.path()).map_err(|e| FsError::io("open file", entry.path(), e))?;
        io::copy(&mut input, &mut writer).map_err(|e| FsError::io("archive", entry.path(), e))?;
    }

    let cursor = writer.finish().map_err(|e| archive_err(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Lexically clean a path: drop `.` components and fold `..` into their parent.
/// Leading `..` components of relative paths are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Render a relative path with forward slashes regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
