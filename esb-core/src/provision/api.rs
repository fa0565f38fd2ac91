// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Service seams the provisioner talks through.
//!
//! The AWS SDK adapters live in `crate::aws`; tests use in-memory fakes.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::manifest::{
    AttributeDefinition, DynamoDbSpec, GlobalSecondaryIndexSpec, KeySchemaElement,
    LifecycleConfiguration,
};

/// Result of a create call on a resource that may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// What the provisioner needs to know about an existing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
    pub key_schema: Vec<KeySchemaElement>,
    pub index_names: Vec<String>,
}

#[async_trait]
pub trait TableApi: Send + Sync {
    /// `None` when the table does not exist.
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, RemoteError>;

    async fn create_table(&self, spec: &DynamoDbSpec) -> Result<CreateOutcome, RemoteError>;

    async fn create_global_secondary_index(
        &self,
        spec: &DynamoDbSpec,
        index: &GlobalSecondaryIndexSpec,
        attributes: &[AttributeDefinition],
    ) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError>;

    async fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome, RemoteError>;

    async fn put_lifecycle_configuration(
        &self,
        bucket: &str,
        lifecycle: &LifecycleConfiguration,
    ) -> Result<(), RemoteError>;

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, RemoteError>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), RemoteError>;
}
