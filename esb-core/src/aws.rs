// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint-aware DynamoDB/S3 client factory and the SDK adapters behind
//! the provisioner's `TableApi` / `BucketApi` traits.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext as DynamoErrorContext;
use aws_sdk_dynamodb::types as ddb;
use aws_sdk_s3::error::DisplayErrorContext as S3ErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types as s3;

use crate::error::{EsbResult, RemoteError};
use crate::manifest::{
    AttributeDefinition, AttributeType, BillingMode, DynamoDbSpec, GlobalSecondaryIndexSpec,
    KeySchemaElement, KeyType, LifecycleConfiguration, Projection, ProjectionType,
    ProvisionedThroughput, RuleStatus,
};
use crate::provision::api::{BucketApi, CreateOutcome, TableApi, TableDescription};
use crate::types::Endpoint;

pub const DEFAULT_REGION: &str = "ap-northeast-1";
pub const DYNAMODB_SERVICE: &str = "dynamodb";
pub const S3_SERVICE: &str = "s3";

const DEFAULT_DYNAMODB_KEY: &str = "dummy";
const DEFAULT_S3_KEY: &str = "rustfsadmin";
const CREDENTIALS_PROVIDER: &str = "esb-static";

/// Maps a service id to the endpoint a client should talk to.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, service: &str, region: &str) -> Result<Endpoint, RemoteError>;
}

/// Resolver bound to one service; hostnames are used as given.
#[derive(Debug, Clone)]
pub struct StaticEndpointResolver {
    service: &'static str,
    endpoint: Endpoint,
}

impl StaticEndpointResolver {
    pub fn new(service: &'static str, endpoint: Endpoint) -> Self {
        Self { service, endpoint }
    }
}

impl EndpointResolver for StaticEndpointResolver {
    fn resolve(&self, service: &str, _region: &str) -> Result<Endpoint, RemoteError> {
        if service != self.service {
            return Err(RemoteError::EndpointNotFound {
                service: service.to_string(),
                expected: self.service.to_string(),
            });
        }
        Ok(self.endpoint.clone())
    }
}

/// Region, static credentials and timeout for one client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub request_timeout: Duration,
}

impl ClientSettings {
    /// `AWS_REGION` plus `DYNAMODB_ACCESS_KEY` / `DYNAMODB_SECRET_KEY`.
    pub fn dynamodb_from_env(request_timeout: Duration) -> Self {
        Self {
            region: env_or("AWS_REGION", DEFAULT_REGION),
            access_key: env_or("DYNAMODB_ACCESS_KEY", DEFAULT_DYNAMODB_KEY),
            secret_key: env_or("DYNAMODB_SECRET_KEY", DEFAULT_DYNAMODB_KEY),
            request_timeout,
        }
    }

    /// `AWS_REGION` plus `RUSTFS_ACCESS_KEY` / `RUSTFS_SECRET_KEY`.
    pub fn s3_from_env(request_timeout: Duration) -> Self {
        Self {
            region: env_or("AWS_REGION", DEFAULT_REGION),
            access_key: env_or("RUSTFS_ACCESS_KEY", DEFAULT_S3_KEY),
            secret_key: env_or("RUSTFS_SECRET_KEY", DEFAULT_S3_KEY),
            request_timeout,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Build a DynamoDB client for `endpoint`. Blank endpoints are rejected.
pub fn dynamodb_client(endpoint: &str, request_timeout: Duration) -> EsbResult<SdkTables> {
    let settings = ClientSettings::dynamodb_from_env(request_timeout);
    let resolver = StaticEndpointResolver::new(DYNAMODB_SERVICE, Endpoint::new(DYNAMODB_SERVICE, endpoint)?);
    dynamodb_client_with(&resolver, &settings)
}

pub fn dynamodb_client_with(
    resolver: &dyn EndpointResolver,
    settings: &ClientSettings,
) -> EsbResult<SdkTables> {
    use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};

    let endpoint = resolver.resolve(DYNAMODB_SERVICE, &settings.region)?;
    let config = aws_sdk_dynamodb::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()))
        .credentials_provider(Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        ))
        .endpoint_url(endpoint.as_str())
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(settings.request_timeout)
                .build(),
        )
        .build();

    tracing::debug!(endpoint = %endpoint, region = %settings.region, "Built DynamoDB client");
    Ok(SdkTables {
        client: aws_sdk_dynamodb::Client::from_conf(config),
    })
}

/// Build an S3 client for `endpoint` with path-style addressing.
pub fn s3_client(endpoint: &str, request_timeout: Duration) -> EsbResult<SdkBuckets> {
    let settings = ClientSettings::s3_from_env(request_timeout);
    let resolver = StaticEndpointResolver::new(S3_SERVICE, Endpoint::new(S3_SERVICE, endpoint)?);
    s3_client_with(&resolver, &settings)
}

pub fn s3_client_with(
    resolver: &dyn EndpointResolver,
    settings: &ClientSettings,
) -> EsbResult<SdkBuckets> {
    use aws_sdk_s3::config::timeout::TimeoutConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    let endpoint = resolver.resolve(S3_SERVICE, &settings.region)?;
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()))
        .credentials_provider(Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        ))
        .endpoint_url(endpoint.as_str())
        .force_path_style(true)
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(settings.request_timeout)
                .build(),
        )
        .build();

    tracing::debug!(endpoint = %endpoint, region = %settings.region, "Built S3 client");
    Ok(SdkBuckets {
        client: aws_sdk_s3::Client::from_conf(config),
    })
}

// ============================================================================
// DynamoDB adapter
// ============================================================================

#[derive(Debug, Clone)]
pub struct SdkTables {
    client: aws_sdk_dynamodb::Client,
}

fn table_request_error(table: &str, e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Request {
        service: DYNAMODB_SERVICE,
        resource: table.to_string(),
        message: e.to_string(),
    }
}

fn table_service_error(operation: &'static str, table: &str, message: String) -> RemoteError {
    RemoteError::Service {
        service: DYNAMODB_SERVICE,
        operation,
        resource: table.to_string(),
        message,
    }
}

fn sdk_key_schema(table: &str, schema: &[KeySchemaElement]) -> Result<Vec<ddb::KeySchemaElement>, RemoteError> {
    schema
        .iter()
        .map(|k| {
            ddb::KeySchemaElement::builder()
                .attribute_name(&k.attribute_name)
                .key_type(ddb::KeyType::from(k.key_type.as_str()))
                .build()
                .map_err(|e| table_request_error(table, e))
        })
        .collect()
}

fn sdk_attributes(
    table: &str,
    attributes: &[AttributeDefinition],
) -> Result<Vec<ddb::AttributeDefinition>, RemoteError> {
    attributes
        .iter()
        .map(|a| {
            let attribute_type = match a.attribute_type {
                AttributeType::S => ddb::ScalarAttributeType::S,
                AttributeType::N => ddb::ScalarAttributeType::N,
                AttributeType::B => ddb::ScalarAttributeType::B,
            };
            ddb::AttributeDefinition::builder()
                .attribute_name(&a.attribute_name)
                .attribute_type(attribute_type)
                .build()
                .map_err(|e| table_request_error(table, e))
        })
        .collect()
}

fn sdk_throughput(
    table: &str,
    throughput: Option<&ProvisionedThroughput>,
) -> Result<Option<ddb::ProvisionedThroughput>, RemoteError> {
    throughput
        .map(|t| {
            ddb::ProvisionedThroughput::builder()
                .read_capacity_units(t.read_capacity_units)
                .write_capacity_units(t.write_capacity_units)
                .build()
                .map_err(|e| table_request_error(table, e))
        })
        .transpose()
}

fn sdk_projection(projection: &Projection) -> ddb::Projection {
    let projection_type = match projection.projection_type {
        ProjectionType::All => ddb::ProjectionType::All,
        ProjectionType::KeysOnly => ddb::ProjectionType::KeysOnly,
        ProjectionType::Include => ddb::ProjectionType::Include,
    };
    let non_key_attributes = (!projection.non_key_attributes.is_empty())
        .then(|| projection.non_key_attributes.clone());
    ddb::Projection::builder()
        .projection_type(projection_type)
        .set_non_key_attributes(non_key_attributes)
        .build()
}

fn sdk_billing_mode(mode: BillingMode) -> ddb::BillingMode {
    match mode {
        BillingMode::PayPerRequest => ddb::BillingMode::PayPerRequest,
        BillingMode::Provisioned => ddb::BillingMode::Provisioned,
    }
}

fn index_throughput<'a>(
    spec: &DynamoDbSpec,
    index: &'a GlobalSecondaryIndexSpec,
) -> Option<&'a ProvisionedThroughput> {
    (spec.billing_mode == BillingMode::Provisioned)
        .then_some(index.provisioned_throughput.as_ref())
        .flatten()
}

#[async_trait]
impl TableApi for SdkTables {
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, RemoteError> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(output) => {
                let Some(description) = output.table() else {
                    return Ok(Some(TableDescription::default()));
                };
                let key_schema = description
                    .key_schema()
                    .iter()
                    .filter_map(|k| {
                        let key_type = match k.key_type() {
                            ddb::KeyType::Hash => KeyType::Hash,
                            ddb::KeyType::Range => KeyType::Range,
                            _ => return None,
                        };
                        Some(KeySchemaElement {
                            attribute_name: k.attribute_name().to_string(),
                            key_type,
                        })
                    })
                    .collect();
                let index_names = description
                    .global_secondary_indexes()
                    .iter()
                    .filter_map(|gsi| gsi.index_name().map(str::to_string))
                    .collect();
                Ok(Some(TableDescription {
                    key_schema,
                    index_names,
                }))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                Err(table_service_error(
                    "DescribeTable",
                    table,
                    DynamoErrorContext(&err).to_string(),
                ))
            }
        }
    }

    async fn create_table(&self, spec: &DynamoDbSpec) -> Result<CreateOutcome, RemoteError> {
        let table = spec.table_name.as_str();

        let mut indexes = Vec::with_capacity(spec.global_secondary_indexes.len());
        for index in &spec.global_secondary_indexes {
            indexes.push(
                ddb::GlobalSecondaryIndex::builder()
                    .index_name(&index.index_name)
                    .set_key_schema(Some(sdk_key_schema(table, &index.key_schema)?))
                    .projection(sdk_projection(&index.projection))
                    .set_provisioned_throughput(sdk_throughput(
                        table,
                        index_throughput(spec, index),
                    )?)
                    .build()
                    .map_err(|e| table_request_error(table, e))?,
            );
        }

        let result = self
            .client
            .create_table()
            .table_name(table)
            .set_key_schema(Some(sdk_key_schema(table, &spec.key_schema)?))
            .set_attribute_definitions(Some(sdk_attributes(table, &spec.attribute_definitions)?))
            .billing_mode(sdk_billing_mode(spec.billing_mode))
            .set_provisioned_throughput(sdk_throughput(table, spec.provisioned_throughput.as_ref())?)
            .set_global_secondary_indexes((!indexes.is_empty()).then_some(indexes))
            .send()
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_resource_in_use_exception())
                    .unwrap_or(false)
                {
                    return Ok(CreateOutcome::AlreadyExists);
                }
                Err(table_service_error(
                    "CreateTable",
                    table,
                    DynamoErrorContext(&err).to_string(),
                ))
            }
        }
    }

    async fn create_global_secondary_index(
        &self,
        spec: &DynamoDbSpec,
        index: &GlobalSecondaryIndexSpec,
        attributes: &[AttributeDefinition],
    ) -> Result<(), RemoteError> {
        let table = spec.table_name.as_str();
        let action = ddb::CreateGlobalSecondaryIndexAction::builder()
            .index_name(&index.index_name)
            .set_key_schema(Some(sdk_key_schema(table, &index.key_schema)?))
            .projection(sdk_projection(&index.projection))
            .set_provisioned_throughput(sdk_throughput(table, index_throughput(spec, index))?)
            .build()
            .map_err(|e| table_request_error(table, e))?;

        self.client
            .update_table()
            .table_name(table)
            .set_attribute_definitions(Some(sdk_attributes(table, attributes)?))
            .global_secondary_index_updates(
                ddb::GlobalSecondaryIndexUpdate::builder().create(action).build(),
            )
            .send()
            .await
            .map_err(|err| {
                table_service_error("UpdateTable", table, DynamoErrorContext(&err).to_string())
            })?;
        Ok(())
    }
}

// ============================================================================
// S3 adapter
// ============================================================================

#[derive(Debug, Clone)]
pub struct SdkBuckets {
    client: aws_sdk_s3::Client,
}

fn bucket_service_error(operation: &'static str, bucket: &str, message: String) -> RemoteError {
    RemoteError::Service {
        service: S3_SERVICE,
        operation,
        resource: bucket.to_string(),
        message,
    }
}

#[async_trait]
impl BucketApi for SdkBuckets {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    return Ok(false);
                }
                Err(bucket_service_error(
                    "HeadBucket",
                    bucket,
                    S3ErrorContext(&err).to_string(),
                ))
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome, RemoteError> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) => {
                let exists = err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists())
                    .unwrap_or(false);
                if exists {
                    return Ok(CreateOutcome::AlreadyExists);
                }
                Err(bucket_service_error(
                    "CreateBucket",
                    bucket,
                    S3ErrorContext(&err).to_string(),
                ))
            }
        }
    }

    async fn put_lifecycle_configuration(
        &self,
        bucket: &str,
        lifecycle: &LifecycleConfiguration,
    ) -> Result<(), RemoteError> {
        let request_error = |e: aws_sdk_s3::error::BuildError| RemoteError::Request {
            service: S3_SERVICE,
            resource: bucket.to_string(),
            message: e.to_string(),
        };

        let mut rules = Vec::with_capacity(lifecycle.rules.len());
        for rule in &lifecycle.rules {
            let status = match rule.status {
                RuleStatus::Enabled => s3::ExpirationStatus::Enabled,
                RuleStatus::Disabled => s3::ExpirationStatus::Disabled,
            };
            let expiration = rule
                .expiration_in_days
                .map(|days| s3::LifecycleExpiration::builder().days(days).build());
            rules.push(
                s3::LifecycleRule::builder()
                    .set_id(rule.id.clone())
                    .status(status)
                    .filter(s3::LifecycleRuleFilter::builder().prefix(&rule.prefix).build())
                    .set_expiration(expiration)
                    .build()
                    .map_err(request_error)?,
            );
        }

        let configuration = s3::BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(request_error)?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(configuration)
            .send()
            .await
            .map_err(|err| {
                bucket_service_error(
                    "PutBucketLifecycleConfiguration",
                    bucket,
                    S3ErrorContext(&err).to_string(),
                )
            })?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, RemoteError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    return Ok(false);
                }
                Err(bucket_service_error(
                    "HeadObject",
                    bucket,
                    S3ErrorContext(&err).to_string(),
                ))
            }
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), RemoteError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/zip")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                bucket_service_error("PutObject", bucket, S3ErrorContext(&err).to_string())
            })?;
        Ok(())
    }
}
