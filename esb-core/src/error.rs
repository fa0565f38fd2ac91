// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for esb.
//!
//! Every failure is an explicit enum variant. Validation and configuration
//! errors are fatal where they are detected, filesystem errors abort the stager,
//! and remote errors are collected per resource by the provisioner.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the staging and provisioning pipeline.
#[derive(Debug, Error)]
pub enum EsbError {
    // =========================================================================
    // Validation Errors - Fail-Fast on Bad Input
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Configuration Errors - Malformed Manifest or Config File
    // =========================================================================
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid manifest: {message}")]
    Manifest { message: String },

    // =========================================================================
    // Filesystem Errors - Abort the Current Stager Invocation
    // =========================================================================
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FsError),

    // =========================================================================
    // Remote Errors - Aggregated Per Resource
    // =========================================================================
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Provisioning failed for {failed} of {total} resources: {summary}")]
    Provision {
        failed: usize,
        total: usize,
        summary: String,
    },

    // =========================================================================
    // Process Errors
    // =========================================================================
    #[error("Command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Validation errors are raised before any side effect takes place.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Function name is required")]
    EmptyFunctionName,

    #[error("Endpoint is required for {service}")]
    MissingEndpoint { service: &'static str },

    #[error("ENV_PREFIX is required")]
    EnvPrefixRequired,

    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid bucket name '{name}': {reason}")]
    InvalidBucketName { name: String, reason: String },
}

/// Filesystem failures, always carrying the offending path.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("{operation} failed for {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("Archive entry '{entry}' in {archive} escapes the destination directory")]
    PathTraversal { archive: PathBuf, entry: String },
}

impl FsError {
    /// Wrap an IO error with the operation and path that produced it.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Errors talking to the DynamoDB/S3 compatible endpoints.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Endpoint not found for service {service} (client built for {expected})")]
    EndpointNotFound { service: String, expected: String },

    #[error("{service} {operation} failed for '{resource}': {message}")]
    Service {
        service: &'static str,
        operation: &'static str,
        resource: String,
        message: String,
    },

    #[error("Failed to build {service} request for '{resource}': {message}")]
    Request {
        service: &'static str,
        resource: String,
        message: String,
    },

    #[error("Key schema mismatch for table '{table}': declared [{declared}], existing [{actual}]")]
    KeySchemaMismatch {
        table: String,
        declared: String,
        actual: String,
    },
}

/// Result type alias using EsbError.
pub type EsbResult<T> = Result<T, EsbError>;
