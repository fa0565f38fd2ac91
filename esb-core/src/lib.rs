// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! esb Core Library
//!
//! Staging and provisioning core for the edge serverless box.
//! Parses SAM-style manifests, stages function sources and layers into a
//! build tree, and provisions DynamoDB tables, S3 buckets and layer archives
//! against local emulators.

pub mod aws;
pub mod cni;
pub mod compose;
pub mod config;
pub mod envcompat;
pub mod error;
pub mod fs;
pub mod global;
pub mod manifest;
pub mod orchestrator;
pub mod provision;
pub mod stage;
pub mod types;
pub mod yamlshape;

// Re-export commonly used types
pub use config::{ConfigLoader, ProjectConfig};
pub use error::{EsbError, EsbResult, FsError, RemoteError, ValidationError};
pub use manifest::{Manifest, ManifestParser, ResourcesSpec};
pub use orchestrator::{Orchestrator, ProvisionRequest, ResourceApplier};
pub use provision::{ProvisionReport, Provisioner};
pub use stage::StageContext;
pub use types::{BucketName, Endpoint, RuntimeMode};
