// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deployment manifest: typed model and the template parser that produces it.

pub mod model;
pub mod parser;

pub use model::{
    describe_key_schema, ApiRoute, AttributeDefinition, AttributeType, BillingMode,
    DynamoDbSpec, FunctionSpec, GlobalSecondaryIndexSpec, KeySchemaElement, KeyType,
    LayerSpec, LifecycleConfiguration, LifecycleRule, Manifest, Projection, ProjectionType,
    ProvisionedThroughput, ResourcesSpec, RuleStatus, S3Spec,
};
pub use parser::{parse_file, ManifestParser};
