// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Typed description of functions, layers, tables and buckets.
//!
//! Field names serialize in the PascalCase the template uses, so the staged
//! `ResourcesSpec` can be written back out for the provisioner container.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A shared code/data bundle attached to one or more functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerSpec {
    pub name: String,
    /// Filesystem reference before staging, `layers/<name>` after.
    pub content_uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatible_architectures: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    Hash,
    Range,
}

impl KeyType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "HASH",
            Self::Range => "RANGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

impl fmt::Display for KeySchemaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.attribute_name, self.key_type.as_str())
    }
}

/// Render a key schema as `attr:ROLE,attr:ROLE` for diagnostics.
pub fn describe_key_schema(schema: &[KeySchemaElement]) -> String {
    schema
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    S,
    N,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionType {
    #[default]
    All,
    KeysOnly,
    Include,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Projection {
    #[serde(default)]
    pub projection_type: ProjectionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_key_attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionedThroughput {
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
}

impl Default for ProvisionedThroughput {
    fn default() -> Self {
        Self {
            read_capacity_units: 1,
            write_capacity_units: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalSecondaryIndexSpec {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(default)]
    pub projection: Projection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<ProvisionedThroughput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    PayPerRequest,
    #[default]
    Provisioned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DynamoDbSpec {
    pub table_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<GlobalSecondaryIndexSpec>,
    #[serde(default)]
    pub billing_mode: BillingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<ProvisionedThroughput>,
}

impl DynamoDbSpec {
    /// Check key schema shape, attribute coverage and the billing/throughput pairing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let context = format!("table '{}'", self.table_name);

        if self.table_name.trim().is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "TableName",
                context,
            });
        }

        validate_key_schema(&self.key_schema, &context)?;

        let defined: HashSet<&str> = self
            .attribute_definitions
            .iter()
            .map(|a| a.attribute_name.as_str())
            .collect();

        let index_keys = self
            .global_secondary_indexes
            .iter()
            .flat_map(|gsi| gsi.key_schema.iter());
        for key in self.key_schema.iter().chain(index_keys) {
            if !defined.contains(key.attribute_name.as_str()) {
                return Err(ValidationError::InvalidFieldValue {
                    field: "AttributeDefinitions",
                    value: key.attribute_name.clone(),
                    reason: format!("key attribute is not defined in {}", context),
                });
            }
        }

        for gsi in &self.global_secondary_indexes {
            validate_key_schema(
                &gsi.key_schema,
                &format!("index '{}' of {}", gsi.index_name, context),
            )?;
        }

        match (self.billing_mode, self.provisioned_throughput) {
            (BillingMode::Provisioned, None) => Err(ValidationError::MissingRequiredField {
                field: "ProvisionedThroughput",
                context,
            }),
            (BillingMode::PayPerRequest, Some(_)) => Err(ValidationError::InvalidFieldValue {
                field: "ProvisionedThroughput",
                value: self.table_name.clone(),
                reason: "throughput is only valid with PROVISIONED billing".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

fn validate_key_schema(schema: &[KeySchemaElement], context: &str) -> Result<(), ValidationError> {
    let valid = match schema {
        [hash] => hash.key_type == KeyType::Hash,
        [hash, range] => hash.key_type == KeyType::Hash && range.key_type == KeyType::Range,
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidFieldValue {
            field: "KeySchema",
            value: describe_key_schema(schema),
            reason: format!(
                "{} needs one HASH key optionally followed by one RANGE key",
                context
            ),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleStatus {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default)]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_in_days: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleConfiguration {
    #[serde(default)]
    pub rules: Vec<LifecycleRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Spec {
    /// Checked against DNS rules by the provisioner, per bucket.
    pub bucket_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_configuration: Option<LifecycleConfiguration>,
}

/// Everything the provisioner applies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourcesSpec {
    #[serde(rename = "Layers", default)]
    pub layers: Vec<LayerSpec>,
    #[serde(rename = "DynamoDB", default)]
    pub dynamodb: Vec<DynamoDbSpec>,
    #[serde(rename = "S3", default)]
    pub s3: Vec<S3Spec>,
}

impl ResourcesSpec {
    /// Enforce unique layer, table and bucket names and valid table shapes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_unique("LayerName", self.layers.iter().map(|l| l.name.as_str()))?;
        ensure_unique(
            "TableName",
            self.dynamodb.iter().map(|t| t.table_name.as_str()),
        )?;
        ensure_unique("BucketName", self.s3.iter().map(|b| b.bucket_name.as_str()))?;
        for table in &self.dynamodb {
            table.validate()?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.dynamodb.is_empty() && self.s3.is_empty()
    }
}

pub(crate) fn ensure_unique<'a>(
    field: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::InvalidFieldValue {
                field,
                value: name.to_string(),
                reason: "duplicate name".to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub path: String,
    pub method: String,
}

impl ApiRoute {
    /// `"<path>:<method>"` identifier used by the gateway routing table.
    pub fn key(&self) -> String {
        let value = serde_yaml::to_value(self).unwrap_or_default();
        crate::yamlshape::route_key(&value)
    }
}

/// A function as the stager sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub logical_id: String,
    pub name: String,
    /// Relative to the manifest base before staging, `functions/<name>/src/` after.
    pub code_uri: String,
    pub handler: String,
    pub runtime: String,
    pub timeout: u64,
    pub memory_size: u64,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub events: Vec<ApiRoute>,
    /// Set by the stager.
    #[serde(default)]
    pub has_requirements: bool,
}

/// Parsed template: functions plus the resources they depend on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub functions: Vec<FunctionSpec>,
    pub resources: ResourcesSpec,
}
