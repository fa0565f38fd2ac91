// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Idempotent provisioning of a staged `ResourcesSpec`.
//!
//! Tables, buckets and layers run as three tasks on a `JoinSet` bounded by a
//! semaphore. Within a kind, resources are applied in declaration order. Failures
//! are recorded per resource and never stop the other resources.

pub mod api;
mod buckets;
mod layers;
mod tables;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use api::{BucketApi, CreateOutcome, TableApi, TableDescription};
pub use buckets::LifecyclePolicy;
pub use layers::{layer_object_key, LayerPublisher, PublishedLayer, S3LayerPublisher};

use crate::error::{EsbError, EsbResult};
use crate::manifest::ResourcesSpec;

pub const DEFAULT_PARALLELISM: usize = 2;

/// What applying a single resource did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Table,
    Bucket,
    Layer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Table => "table",
            Self::Bucket => "bucket",
            Self::Layer => "layer",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Applied(Applied),
    Failed(String),
    Cancelled,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied(Applied::Created) => write!(f, "created"),
            Self::Applied(Applied::Updated) => write!(f, "updated"),
            Self::Applied(Applied::Unchanged) => write!(f, "unchanged"),
            Self::Applied(Applied::Skipped) => write!(f, "skipped"),
            Self::Failed(message) => write!(f, "failed: {}", message),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub status: OutcomeStatus,
}

/// Every resource's outcome, tables first, then buckets, then layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub outcomes: Vec<ResourceOutcome>,
}

impl ProvisionReport {
    pub fn failed(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.status, OutcomeStatus::Applied(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// `Err(EsbError::Provision)` when any resource failed or was cancelled.
    pub fn into_result(self) -> EsbResult<Self> {
        let failed: Vec<String> = self
            .failed()
            .map(|o| format!("{} '{}' {}", o.kind, o.name, o.status))
            .collect();
        if failed.is_empty() {
            return Ok(self);
        }
        Err(EsbError::Provision {
            failed: failed.len(),
            total: self.outcomes.len(),
            summary: failed.join("; "),
        })
    }
}

/// Applies a `ResourcesSpec` against the table and bucket services.
#[derive(Clone)]
pub struct Provisioner {
    tables: Arc<dyn TableApi>,
    buckets: Arc<dyn BucketApi>,
    publisher: Option<Arc<dyn LayerPublisher>>,
    output_dir: PathBuf,
    parallelism: usize,
    lifecycle: LifecyclePolicy,
}

impl Provisioner {
    /// `output_dir` is where staged `ContentUri`s resolve.
    pub fn new(
        tables: Arc<dyn TableApi>,
        buckets: Arc<dyn BucketApi>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tables,
            buckets,
            publisher: None,
            output_dir: output_dir.into(),
            parallelism: DEFAULT_PARALLELISM,
            lifecycle: LifecyclePolicy::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn LayerPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_lifecycle_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.lifecycle = policy;
        self
    }

    /// Apply every resource. Never fails as a whole; see [`ProvisionReport::into_result`].
    pub async fn apply(
        &self,
        spec: &ResourcesSpec,
        compose_project: &str,
        cancel: &CancellationToken,
    ) -> ProvisionReport {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut join_set = JoinSet::new();
        let mut planned: Vec<(ResourceKind, Vec<String>)> = Vec::new();

        if !spec.dynamodb.is_empty() {
            let items: Vec<_> = spec
                .dynamodb
                .iter()
                .map(|t| (t.table_name.clone(), t.clone()))
                .collect();
            planned.push((ResourceKind::Table, names(&items)));
            let api = self.tables.clone();
            let (semaphore, cancel) = (semaphore.clone(), cancel.clone());
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcomes = run_kind(ResourceKind::Table, items, &cancel, |table| {
                    let api = api.clone();
                    async move { tables::ensure_table(api.as_ref(), &table).await }
                })
                .await;
                (ResourceKind::Table, outcomes)
            });
        }

        if !spec.s3.is_empty() {
            let items: Vec<_> = spec
                .s3
                .iter()
                .map(|b| (b.bucket_name.clone(), b.clone()))
                .collect();
            planned.push((ResourceKind::Bucket, names(&items)));
            let api = self.buckets.clone();
            let policy = self.lifecycle;
            let (semaphore, cancel) = (semaphore.clone(), cancel.clone());
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcomes = run_kind(ResourceKind::Bucket, items, &cancel, |bucket| {
                    let api = api.clone();
                    async move { buckets::ensure_bucket(api.as_ref(), &bucket, policy).await }
                })
                .await;
                (ResourceKind::Bucket, outcomes)
            });
        }

        if !spec.layers.is_empty() {
            let items: Vec<_> = spec
                .layers
                .iter()
                .map(|l| (l.name.clone(), l.clone()))
                .collect();
            planned.push((ResourceKind::Layer, names(&items)));
            let publisher = self.publisher.clone();
            let output_dir = self.output_dir.clone();
            let project = compose_project.to_string();
            let (semaphore, cancel) = (semaphore.clone(), cancel.clone());
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcomes = run_kind(ResourceKind::Layer, items, &cancel, |layer| {
                    let publisher = publisher.clone();
                    let output_dir = output_dir.clone();
                    let project = project.clone();
                    async move {
                        match publisher {
                            Some(publisher) => {
                                layers::publish_layer(publisher.as_ref(), &output_dir, &project, &layer)
                                    .await
                            }
                            None => Ok(Applied::Skipped),
                        }
                    }
                })
                .await;
                (ResourceKind::Layer, outcomes)
            });
        }

        let mut finished: Vec<(ResourceKind, Vec<ResourceOutcome>)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => finished.push(result),
                Err(e) => tracing::error!(error = %e, "Provisioning task panicked"),
            }
        }

        let mut report = ProvisionReport::default();
        for (kind, names) in planned {
            match finished.iter().position(|(k, _)| *k == kind) {
                Some(index) => report.outcomes.append(&mut finished[index].1),
                None => report
                    .outcomes
                    .extend(names.into_iter().map(|name| ResourceOutcome {
                        kind,
                        name,
                        status: OutcomeStatus::Failed("provisioning task aborted".to_string()),
                    })),
            }
        }

        tracing::info!(
            resources = report.outcomes.len(),
            failed = report.failed().count(),
            project = %compose_project,
            "Provisioning finished"
        );
        report
    }
}

fn names<T>(items: &[(String, T)]) -> Vec<String> {
    items.iter().map(|(name, _)| name.clone()).collect()
}

/// Apply one kind's resources in order, observing cancellation between and
/// during calls.
async fn run_kind<T, F, Fut>(
    kind: ResourceKind,
    items: Vec<(String, T)>,
    cancel: &CancellationToken,
    mut apply_one: F,
) -> Vec<ResourceOutcome>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = EsbResult<Applied>>,
{
    let mut outcomes = Vec::with_capacity(items.len());

    for (name, item) in items {
        let status = if cancel.is_cancelled() {
            OutcomeStatus::Cancelled
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => OutcomeStatus::Cancelled,
                result = apply_one(item) => match result {
                    Ok(applied) => OutcomeStatus::Applied(applied),
                    Err(e) => OutcomeStatus::Failed(e.to_string()),
                },
            }
        };

        match &status {
            OutcomeStatus::Applied(applied) => {
                tracing::info!(kind = %kind, name = %name, result = ?applied, "Resource applied");
            }
            OutcomeStatus::Failed(message) => {
                tracing::warn!(kind = %kind, name = %name, error = %message, "Resource failed");
            }
            OutcomeStatus::Cancelled => {
                tracing::debug!(kind = %kind, name = %name, "Resource cancelled");
            }
        }

        outcomes.push(ResourceOutcome { kind, name, status });
    }

    outcomes
}
