// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! S3 bucket reconciliation.

use super::api::{BucketApi, CreateOutcome};
use super::Applied;
use crate::error::EsbResult;
use crate::manifest::S3Spec;
use crate::types::BucketName;

/// Whether lifecycle configuration is pushed to the S3 endpoint.
///
/// Some emulators reject `PutBucketLifecycleConfiguration`;
/// `ESB_SKIP_S3_LIFECYCLE` turns it off unless `ESB_FORCE_S3_LIFECYCLE` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePolicy {
    #[default]
    Apply,
    Skip,
}

impl LifecyclePolicy {
    pub fn from_env() -> Self {
        let set = |key: &str| {
            std::env::var(key)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
        };
        if set("ESB_FORCE_S3_LIFECYCLE") {
            Self::Apply
        } else if set("ESB_SKIP_S3_LIFECYCLE") {
            Self::Skip
        } else {
            Self::Apply
        }
    }
}

/// Create the bucket if absent and put its lifecycle configuration.
pub(crate) async fn ensure_bucket(
    api: &dyn BucketApi,
    spec: &S3Spec,
    policy: LifecyclePolicy,
) -> EsbResult<Applied> {
    let name = BucketName::new(spec.bucket_name.as_str())?;
    let created = ensure_bucket_exists(api, &name).await?;

    let lifecycle = spec
        .lifecycle_configuration
        .as_ref()
        .filter(|lc| !lc.rules.is_empty());

    let mut updated = false;
    if let Some(lifecycle) = lifecycle {
        match policy {
            LifecyclePolicy::Skip => {
                tracing::info!(bucket = %name, "Skipping lifecycle configuration");
            }
            LifecyclePolicy::Apply => {
                api.put_lifecycle_configuration(name.as_str(), lifecycle)
                    .await?;
                tracing::debug!(bucket = %name, rules = lifecycle.rules.len(), "Applied lifecycle configuration");
                updated = true;
            }
        }
    }

    Ok(match (created, updated) {
        (true, _) => Applied::Created,
        (false, true) => Applied::Updated,
        (false, false) => Applied::Unchanged,
    })
}

/// Head, then create. Returns true when this call created the bucket.
pub(crate) async fn ensure_bucket_exists(api: &dyn BucketApi, name: &BucketName) -> EsbResult<bool> {
    if api.bucket_exists(name.as_str()).await? {
        return Ok(false);
    }
    match api.create_bucket(name.as_str()).await? {
        CreateOutcome::Created => Ok(true),
        CreateOutcome::AlreadyExists => {
            tracing::debug!(bucket = %name, "Bucket already owned");
            Ok(false)
        }
    }
}
