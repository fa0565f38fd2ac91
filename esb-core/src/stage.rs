// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Stager: materializes function sources and shared layers under the output
//! directory and rewrites the manifest to point at the staged copies.
//!
//! Staged references are forward-slash paths relative to the output
//! directory (`functions/<name>/src/`, `layers/<staged-name>`).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{EsbResult, ValidationError};
use crate::fs::{self, PathKind};
use crate::manifest::{FunctionSpec, LayerSpec, Manifest};

/// Sitecustomize hook copied next to every function when present.
pub const DEFAULT_SITECUSTOMIZE_SOURCE: &str =
    "cli/internal/generator/assets/site-packages/sitecustomize.py";

pub const FUNCTIONS_DIR: &str = "functions";
pub const LAYERS_DIR: &str = "layers";

const SITECUSTOMIZE_FILE: &str = "sitecustomize.py";
const REQUIREMENTS_FILE: &str = "requirements.txt";

static UNSAFE_LAYER_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]+").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// Per-run staging state. Owns the layer cache.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub base_dir: PathBuf,
    pub output_dir: PathBuf,
    pub functions_dir: PathBuf,
    pub layers_dir: PathBuf,
    pub project_root: PathBuf,
    pub sitecustomize_path: String,
    pub dry_run: bool,
    pub verbose: bool,
    /// Canonical source path -> `layers/<staged-name>`.
    layer_cache: HashMap<PathBuf, String>,
    /// Staged names already handed out, to keep the cache injective.
    staged_names: HashSet<String>,
}

impl StageContext {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            base_dir: base_dir.into(),
            functions_dir: output_dir.join(FUNCTIONS_DIR),
            layers_dir: output_dir.join(LAYERS_DIR),
            output_dir,
            project_root: project_root.into(),
            sitecustomize_path: String::new(),
            dry_run: false,
            verbose: false,
            layer_cache: HashMap::new(),
            staged_names: HashSet::new(),
        }
    }

    pub fn with_sitecustomize(mut self, path: impl Into<String>) -> Self {
        self.sitecustomize_path = path.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn layer_cache(&self) -> &HashMap<PathBuf, String> {
        &self.layer_cache
    }
}

/// Stage every function (in order), then the manifest's shared layers.
///
/// Returns the rewritten manifest. The input is left untouched.
pub fn stage(manifest: &Manifest, ctx: &mut StageContext) -> EsbResult<Manifest> {
    if !ctx.dry_run {
        fs::ensure_dir(&ctx.functions_dir)?;
        fs::ensure_dir(&ctx.layers_dir)?;
    }

    let mut staged = manifest.clone();
    for function in staged.functions.iter_mut() {
        *function = stage_function(function, ctx)?;
    }
    staged.resources.layers = stage_layers(&manifest.resources.layers, ctx)?;

    tracing::info!(
        functions = staged.functions.len(),
        layers = ctx.layer_cache.len(),
        output = %ctx.output_dir.display(),
        dry_run = ctx.dry_run,
        "Staged manifest"
    );

    Ok(staged)
}

/// Copy one function's sources and layers into the build tree.
pub fn stage_function(function: &FunctionSpec, ctx: &mut StageContext) -> EsbResult<FunctionSpec> {
    validate_function_name(&function.name)?;

    let function_dir = ctx.functions_dir.join(&function.name);
    if !ctx.dry_run {
        fs::ensure_dir(&function_dir)?;
    }

    let source_dir = resolve_resource_path(&ctx.base_dir, &function.code_uri);
    let staging_src = function_dir.join("src");
    if !ctx.dry_run && fs::dir_exists(&source_dir) {
        fs::remove_dir(&staging_src)?;
        fs::copy_dir(&source_dir, &staging_src)?;
    } else if !fs::dir_exists(&source_dir) {
        tracing::warn!(
            function = %function.name,
            source = %source_dir.display(),
            "Function source directory not found"
        );
    }

    let mut staged = function.clone();
    staged.code_uri = ensure_slash(&format!("{}/{}/src", FUNCTIONS_DIR, function.name));
    staged.has_requirements = fs::file_exists(&staging_src.join(REQUIREMENTS_FILE));
    staged.layers = stage_layers(&function.layers, ctx)?;

    if !ctx.dry_run {
        if let Some(site_src) = resolve_sitecustomize_source(ctx) {
            fs::copy_file(&site_src, &function_dir.join(SITECUSTOMIZE_FILE))?;
        }
    }

    if ctx.verbose {
        tracing::info!(
            function = %staged.name,
            code_uri = %staged.code_uri,
            layers = staged.layers.len(),
            has_requirements = staged.has_requirements,
            "Staged function"
        );
    }

    Ok(staged)
}

/// Stage a list of layers through the context's cache.
///
/// Missing sources and non-archive files are skipped; the result holds only
/// the layers that were staged (or found in the cache).
pub fn stage_layers(layers: &[LayerSpec], ctx: &mut StageContext) -> EsbResult<Vec<LayerSpec>> {
    let mut staged = Vec::with_capacity(layers.len());

    for layer in layers {
        let source = resolve_resource_path(&ctx.base_dir, &layer.content_uri);
        let kind = fs::exists(&source);
        let is_zip = kind == PathKind::File && has_zip_extension(&source);
        match kind {
            PathKind::Missing => {
                tracing::debug!(layer = %layer.name, source = %source.display(), "Layer source missing, skipping");
                continue;
            }
            PathKind::File if !is_zip => {
                tracing::warn!(layer = %layer.name, source = %source.display(), "Layer source is not a .zip archive, skipping");
                continue;
            }
            _ => {}
        }

        let cache_key = std::fs::canonicalize(&source).unwrap_or_else(|_| source.clone());
        if let Some(cached) = ctx.layer_cache.get(&cache_key) {
            let mut layer = layer.clone();
            layer.content_uri = cached.clone();
            staged.push(layer);
            continue;
        }

        let staged_name = unique_staged_name(layer_staging_name(&source, &ctx.base_dir), ctx);
        let target_dir = ctx.layers_dir.join(&staged_name);
        if !ctx.dry_run {
            fs::remove_dir(&target_dir)?;
            fs::ensure_dir(&target_dir)?;
            if is_zip {
                fs::unzip(&source, &target_dir)?;
            } else {
                fs::copy_dir(&source, &target_dir)?;
            }
        }

        let layer_ref = format!("{}/{}", LAYERS_DIR, staged_name);
        tracing::debug!(layer = %layer.name, staged = %layer_ref, "Staged layer");
        ctx.staged_names.insert(staged_name);
        ctx.layer_cache.insert(cache_key, layer_ref.clone());

        let mut layer = layer.clone();
        layer.content_uri = layer_ref;
        staged.push(layer);
    }

    Ok(staged)
}

/// Join a manifest URI onto the base directory.
///
/// Leading separators are stripped so URIs never escape to the filesystem root.
pub fn resolve_resource_path(base_dir: &Path, raw: &str) -> PathBuf {
    let trimmed = raw.trim_start_matches(['/', '\\']);
    let trimmed = if trimmed.is_empty() { raw } else { trimmed };
    fs::normalize_path(&base_dir.join(trimmed))
}

/// Locate the sitecustomize file: absolute path, then base dir, then project root.
pub fn resolve_sitecustomize_source(ctx: &StageContext) -> Option<PathBuf> {
    let source = if ctx.sitecustomize_path.trim().is_empty() {
        DEFAULT_SITECUSTOMIZE_SOURCE
    } else {
        ctx.sitecustomize_path.as_str()
    };
    let source = Path::new(source);

    if source.is_absolute() {
        return fs::file_exists(source).then(|| source.to_path_buf());
    }

    [&ctx.base_dir, &ctx.project_root]
        .into_iter()
        .map(|root| fs::normalize_path(&root.join(source)))
        .find(|candidate| fs::file_exists(candidate))
}

/// Directory-safe name for a layer source: its path relative to the base dir
/// with every run of characters outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn layer_staging_name(source: &Path, base_dir: &Path) -> String {
    let source = fs::normalize_path(source);
    let base_dir = fs::normalize_path(base_dir);
    let basename = || {
        source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let mut name = source
        .strip_prefix(&base_dir)
        .map(fs::to_slash)
        .unwrap_or_default()
        .trim_matches('/')
        .to_string();
    if name.is_empty() || name.starts_with("..") {
        name = basename();
    }

    let safe = UNSAFE_LAYER_CHARS.replace_all(&name, "_").into_owned();
    let safe = if safe.is_empty() {
        UNSAFE_LAYER_CHARS.replace_all(&basename(), "_").into_owned()
    } else {
        safe
    };

    match safe.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => safe,
    }
}

fn unique_staged_name(candidate: String, ctx: &StageContext) -> String {
    if !ctx.staged_names.contains(&candidate) {
        return candidate;
    }
    let mut suffix = 2;
    loop {
        let name = format!("{}-{}", candidate, suffix);
        if !ctx.staged_names.contains(&name) {
            return name;
        }
        suffix += 1;
    }
}

fn validate_function_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyFunctionName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ValidationError::InvalidFieldValue {
            field: "FunctionName",
            value: name.to_string(),
            reason: "must be a single path component".to_string(),
        });
    }
    Ok(())
}

fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn ensure_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{}/", value)
    }
}
