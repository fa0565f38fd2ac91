// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Layer packaging and publishing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use super::api::BucketApi;
use super::buckets::ensure_bucket_exists;
use super::Applied;
use crate::error::{EsbError, EsbResult, FsError};
use crate::fs;
use crate::manifest::LayerSpec;
use crate::types::BucketName;

const DIGEST_PREFIX_LEN: usize = 16;

/// Where an archive ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedLayer {
    pub location: String,
    /// False when identical content was already stored.
    pub uploaded: bool,
}

/// Receives packaged layer archives.
#[async_trait]
pub trait LayerPublisher: Send + Sync {
    async fn publish(
        &self,
        compose_project: &str,
        layer: &LayerSpec,
        archive: Vec<u8>,
    ) -> EsbResult<PublishedLayer>;
}

/// Uploads archives to `<bucket>/<compose_project>/<layer>/<digest>.zip`,
/// skipping keys that already exist.
pub struct S3LayerPublisher {
    buckets: Arc<dyn BucketApi>,
    bucket: BucketName,
    ensured: OnceCell<()>,
}

impl S3LayerPublisher {
    pub fn new(buckets: Arc<dyn BucketApi>, bucket: BucketName) -> Self {
        Self {
            buckets,
            bucket,
            ensured: OnceCell::new(),
        }
    }
}

/// Object key for a layer archive: content-addressed under project and layer.
pub fn layer_object_key(compose_project: &str, layer_name: &str, archive: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(archive));
    let project = if compose_project.trim().is_empty() {
        "default"
    } else {
        compose_project.trim()
    };
    format!(
        "{}/{}/{}.zip",
        project,
        layer_name,
        &digest[..DIGEST_PREFIX_LEN]
    )
}

#[async_trait]
impl LayerPublisher for S3LayerPublisher {
    async fn publish(
        &self,
        compose_project: &str,
        layer: &LayerSpec,
        archive: Vec<u8>,
    ) -> EsbResult<PublishedLayer> {
        self.ensured
            .get_or_try_init(|| async {
                ensure_bucket_exists(self.buckets.as_ref(), &self.bucket)
                    .await
                    .map(|_| ())
            })
            .await?;

        let key = layer_object_key(compose_project, &layer.name, &archive);
        let location = format!("s3://{}/{}", self.bucket, key);
        if self.buckets.object_exists(self.bucket.as_str(), &key).await? {
            tracing::debug!(layer = %layer.name, location = %location, "Layer archive already published");
            return Ok(PublishedLayer {
                location,
                uploaded: false,
            });
        }

        let size = archive.len();
        self.buckets
            .put_object(self.bucket.as_str(), &key, archive)
            .await?;

        tracing::debug!(layer = %layer.name, location = %location, bytes = size, "Published layer");
        Ok(PublishedLayer {
            location,
            uploaded: true,
        })
    }
}

/// Package the staged layer directory and hand it to the publisher.
pub(crate) async fn publish_layer(
    publisher: &dyn LayerPublisher,
    output_dir: &Path,
    compose_project: &str,
    layer: &LayerSpec,
) -> EsbResult<Applied> {
    let staged_dir = output_dir.join(&layer.content_uri);
    if !fs::dir_exists(&staged_dir) {
        tracing::warn!(layer = %layer.name, path = %staged_dir.display(), "Staged layer directory missing");
        return Ok(Applied::Skipped);
    }

    let dir = staged_dir.clone();
    let archive = tokio::task::spawn_blocking(move || fs::zip_dir(&dir))
        .await
        .map_err(|e| {
            EsbError::from(FsError::Archive {
                path: staged_dir,
                message: e.to_string(),
            })
        })??;

    let published = publisher.publish(compose_project, layer, archive).await?;
    Ok(if published.uploaded {
        Applied::Created
    } else {
        Applied::Unchanged
    })
}
