// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-memory fakes for the provisioner's service traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::api::{BucketApi, CreateOutcome, TableApi, TableDescription};
use super::{LayerPublisher, PublishedLayer};
use crate::error::{EsbResult, RemoteError};
use crate::manifest::{
    AttributeDefinition, AttributeType, BillingMode, DynamoDbSpec, GlobalSecondaryIndexSpec,
    KeySchemaElement, KeyType, LayerSpec, LifecycleConfiguration,
};

pub(crate) fn hash_table(name: &str, key: &str) -> DynamoDbSpec {
    DynamoDbSpec {
        table_name: name.to_string(),
        key_schema: vec![KeySchemaElement {
            attribute_name: key.to_string(),
            key_type: KeyType::Hash,
        }],
        attribute_definitions: vec![AttributeDefinition {
            attribute_name: key.to_string(),
            attribute_type: AttributeType::S,
        }],
        global_secondary_indexes: Vec::new(),
        billing_mode: BillingMode::PayPerRequest,
        provisioned_throughput: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeTables {
    tables: Mutex<HashMap<String, TableDescription>>,
    creates: AtomicUsize,
    racing: bool,
    cancel_after: Option<usize>,
    cancel: CancellationToken,
}

impl FakeTables {
    /// Describe reports absent, create reports ResourceInUse.
    pub(crate) fn racing(mut self) -> Self {
        self.racing = true;
        self
    }

    /// Cancel the token returned by [`FakeTables::cancel_token`] after `n` creates.
    pub(crate) fn cancel_after_create(mut self, n: usize) -> Self {
        self.cancel_after = Some(n);
        self
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn has_table(&self, name: &str) -> bool {
        self.tables.lock().unwrap().contains_key(name)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn indexes(&self, name: &str) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .map(|t| t.index_names.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TableApi for FakeTables {
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, RemoteError> {
        if self.racing {
            return Ok(None);
        }
        Ok(self.tables.lock().unwrap().get(table).cloned())
    }

    async fn create_table(&self, spec: &DynamoDbSpec) -> Result<CreateOutcome, RemoteError> {
        if self.racing {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let created = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.tables.lock().unwrap().insert(
            spec.table_name.clone(),
            TableDescription {
                key_schema: spec.key_schema.clone(),
                index_names: spec
                    .global_secondary_indexes
                    .iter()
                    .map(|i| i.index_name.clone())
                    .collect(),
            },
        );
        if self.cancel_after == Some(created) {
            self.cancel.cancel();
        }
        Ok(CreateOutcome::Created)
    }

    async fn create_global_secondary_index(
        &self,
        spec: &DynamoDbSpec,
        index: &GlobalSecondaryIndexSpec,
        _attributes: &[AttributeDefinition],
    ) -> Result<(), RemoteError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&spec.table_name)
            .ok_or_else(|| RemoteError::Service {
                service: "dynamodb",
                operation: "UpdateTable",
                resource: spec.table_name.clone(),
                message: "ResourceNotFoundException".to_string(),
            })?;
        table.index_names.push(index.index_name.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeBuckets {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    lifecycles: Mutex<HashMap<String, usize>>,
    heads: AtomicUsize,
    creates: AtomicUsize,
    racing: bool,
}

impl FakeBuckets {
    /// Head reports absent, create reports BucketAlreadyOwnedByYou.
    pub(crate) fn racing(mut self) -> Self {
        self.racing = true;
        self
    }

    pub(crate) fn has_bucket(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains_key(name)
    }

    pub(crate) fn objects(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn lifecycle_puts(&self, bucket: &str) -> usize {
        self.lifecycles
            .lock()
            .unwrap()
            .get(bucket)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn head_calls(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BucketApi for FakeBuckets {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.racing {
            return Ok(false);
        }
        Ok(self.buckets.lock().unwrap().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome, RemoteError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.racing {
            return Ok(CreateOutcome::AlreadyExists);
        }
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_string(), BTreeMap::new());
        Ok(CreateOutcome::Created)
    }

    async fn put_lifecycle_configuration(
        &self,
        bucket: &str,
        _lifecycle: &LifecycleConfiguration,
    ) -> Result<(), RemoteError> {
        *self
            .lifecycles
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default() += 1;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, RemoteError> {
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), RemoteError> {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body);
        Ok(())
    }
}

/// Publisher that records `(layer name, archive)` pairs.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub(crate) fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl LayerPublisher for RecordingPublisher {
    async fn publish(
        &self,
        compose_project: &str,
        layer: &LayerSpec,
        archive: Vec<u8>,
    ) -> EsbResult<PublishedLayer> {
        self.published
            .lock()
            .unwrap()
            .push((layer.name.clone(), archive));
        Ok(PublishedLayer {
            location: format!("memory://{}/{}", compose_project, layer.name),
            uploaded: true,
        })
    }
}
