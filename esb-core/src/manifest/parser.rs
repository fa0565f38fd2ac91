// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SAM-style template parser.
//!
//! The document is read as loose YAML, coerced through `yamlshape`, and every
//! resource is converted into the typed model before anything else sees it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_yaml::Value;

use super::model::{
    ensure_unique, ApiRoute, AttributeDefinition, BillingMode, DynamoDbSpec, FunctionSpec,
    GlobalSecondaryIndexSpec, KeySchemaElement, LayerSpec, LifecycleConfiguration,
    LifecycleRule, Manifest, Projection, ProvisionedThroughput, ResourcesSpec, RuleStatus,
    S3Spec,
};
use crate::error::{EsbError, EsbResult};
use crate::yamlshape::{as_map, as_slice, as_string, as_u64, get, untag};

const FUNCTION_TYPE: &str = "AWS::Serverless::Function";
const LAYER_TYPE: &str = "AWS::Serverless::LayerVersion";
const TABLE_TYPE: &str = "AWS::DynamoDB::Table";
const BUCKET_TYPE: &str = "AWS::S3::Bucket";

const DEFAULT_RUNTIME: &str = "python3.12";
const DEFAULT_HANDLER: &str = "lambda_function.lambda_handler";
const DEFAULT_TIMEOUT: u64 = 30;
const DEFAULT_MEMORY_SIZE: u64 = 128;
const DEFAULT_CODE_URI: &str = "./";

static PARAM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(\w+)\}").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct RawTableProperties {
    #[serde(default)]
    key_schema: Vec<KeySchemaElement>,
    #[serde(default)]
    attribute_definitions: Vec<AttributeDefinition>,
    #[serde(default)]
    global_secondary_indexes: Vec<RawGlobalSecondaryIndex>,
    #[serde(default)]
    billing_mode: Option<BillingMode>,
    #[serde(default)]
    provisioned_throughput: Option<ProvisionedThroughput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawGlobalSecondaryIndex {
    index_name: String,
    key_schema: Vec<KeySchemaElement>,
    #[serde(default)]
    projection: Projection,
    #[serde(default)]
    provisioned_throughput: Option<ProvisionedThroughput>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct RawBucketProperties {
    #[serde(default)]
    lifecycle_configuration: Option<RawLifecycleConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLifecycleConfiguration {
    #[serde(default)]
    rules: Vec<RawLifecycleRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLifecycleRule {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<RuleStatus>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    expiration_in_days: Option<i32>,
}

/// Function defaults declared under `Globals.Function`.
struct FunctionDefaults<'a> {
    runtime: String,
    handler: String,
    timeout: u64,
    memory_size: u64,
    layers: Vec<&'a Value>,
}

/// Template parser carrying the `${Param}` substitution table.
#[derive(Debug, Clone, Default)]
pub struct ManifestParser {
    parameters: BTreeMap<String, String>,
}

impl ManifestParser {
    pub fn new(parameters: BTreeMap<String, String>) -> Self {
        Self { parameters }
    }

    /// Load and parse a template file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> EsbResult<Manifest> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(EsbError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| EsbError::Io {
            context: "reading template",
            source: e,
        })?;

        self.parse_str(&content)
    }

    /// Parse a template from a YAML string.
    pub fn parse_str(&self, content: &str) -> EsbResult<Manifest> {
        let root: Value = serde_yaml::from_str(content).map_err(|e| EsbError::Manifest {
            message: format!("YAML parse error: {}", e),
        })?;

        let empty = Value::Null;
        let globals = get(&root, "Globals")
            .and_then(|g| get(g, "Function"))
            .unwrap_or(&empty);
        let defaults = FunctionDefaults {
            runtime: get(globals, "Runtime")
                .and_then(as_string)
                .unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
            handler: get(globals, "Handler")
                .and_then(as_string)
                .unwrap_or_else(|| DEFAULT_HANDLER.to_string()),
            timeout: get(globals, "Timeout").and_then(as_u64).unwrap_or(DEFAULT_TIMEOUT),
            memory_size: get(globals, "MemorySize")
                .and_then(as_u64)
                .unwrap_or(DEFAULT_MEMORY_SIZE),
            layers: get(globals, "Layers").map(as_slice).unwrap_or_default(),
        };

        let resources = get(&root, "Resources").map(as_map).unwrap_or_default();

        // Layers first so functions can resolve their references.
        let mut layers: Vec<LayerSpec> = Vec::new();
        let mut layer_ids: HashMap<String, usize> = HashMap::new();
        let mut tables = Vec::new();
        let mut buckets = Vec::new();

        for (logical_id, resource) in &resources {
            let props = get(resource, "Properties").unwrap_or(&empty);
            match resource_type(resource).as_deref() {
                Some(LAYER_TYPE) => {
                    layer_ids.insert(logical_id.clone(), layers.len());
                    layers.push(self.parse_layer(logical_id, props));
                }
                Some(TABLE_TYPE) => tables.push(self.parse_table(logical_id, props)?),
                Some(BUCKET_TYPE) => buckets.push(self.parse_bucket(logical_id, props)?),
                _ => {}
            }
        }

        let mut functions = Vec::new();
        for (logical_id, resource) in &resources {
            if resource_type(resource).as_deref() != Some(FUNCTION_TYPE) {
                continue;
            }
            let props = get(resource, "Properties").unwrap_or(&empty);
            functions.push(self.parse_function(logical_id, props, &defaults, &layers, &layer_ids)?);
        }

        let resources = ResourcesSpec {
            layers,
            dynamodb: tables,
            s3: buckets,
        };
        resources.validate()?;
        ensure_unique("FunctionName", functions.iter().map(|f| f.name.as_str()))?;

        tracing::debug!(
            functions = functions.len(),
            layers = resources.layers.len(),
            tables = resources.dynamodb.len(),
            buckets = resources.s3.len(),
            "Parsed template"
        );

        Ok(Manifest {
            functions,
            resources,
        })
    }

    fn parse_layer(&self, logical_id: &str, props: &Value) -> LayerSpec {
        let name = get(props, "LayerName")
            .map(|v| self.resolve(v))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| logical_id.to_string());
        let content_uri = get(props, "ContentUri")
            .map(|v| self.resolve(v))
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_CODE_URI.to_string());

        let mut compatible_architectures: Vec<String> = Vec::new();
        for arch in get(props, "CompatibleArchitectures")
            .map(as_slice)
            .unwrap_or_default()
        {
            let arch = self.resolve(arch);
            if !arch.is_empty() && !compatible_architectures.contains(&arch) {
                compatible_architectures.push(arch);
            }
        }

        LayerSpec {
            name,
            content_uri,
            compatible_architectures,
        }
    }

    fn parse_table(&self, logical_id: &str, props: &Value) -> EsbResult<DynamoDbSpec> {
        let table_name = get(props, "TableName")
            .map(|v| self.resolve(v))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| logical_id.to_string());

        let raw: RawTableProperties = decode(props, logical_id)?;
        let billing_mode = raw.billing_mode.unwrap_or_default();
        let provisioned = billing_mode == BillingMode::Provisioned;

        let global_secondary_indexes = raw
            .global_secondary_indexes
            .into_iter()
            .map(|gsi| GlobalSecondaryIndexSpec {
                index_name: gsi.index_name,
                key_schema: gsi.key_schema,
                projection: gsi.projection,
                provisioned_throughput: provisioned
                    .then(|| gsi.provisioned_throughput.unwrap_or_default()),
            })
            .collect();

        Ok(DynamoDbSpec {
            table_name,
            key_schema: raw.key_schema,
            attribute_definitions: raw.attribute_definitions,
            global_secondary_indexes,
            billing_mode,
            provisioned_throughput: provisioned
                .then(|| raw.provisioned_throughput.unwrap_or_default()),
        })
    }

    fn parse_bucket(&self, logical_id: &str, props: &Value) -> EsbResult<S3Spec> {
        let bucket_name = get(props, "BucketName")
            .map(|v| self.resolve(v))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| logical_id.to_lowercase());

        let raw: RawBucketProperties = decode(props, logical_id)?;
        let lifecycle_configuration = raw
            .lifecycle_configuration
            .map(|lc| LifecycleConfiguration {
                rules: lc
                    .rules
                    .into_iter()
                    .map(|rule| LifecycleRule {
                        id: rule.id,
                        status: rule.status.unwrap_or_default(),
                        prefix: rule.prefix.unwrap_or_default(),
                        expiration_in_days: rule.expiration_in_days,
                    })
                    .collect(),
            })
            .filter(|lc| !lc.rules.is_empty());

        Ok(S3Spec {
            bucket_name,
            lifecycle_configuration,
        })
    }

    fn parse_function(
        &self,
        logical_id: &str,
        props: &Value,
        defaults: &FunctionDefaults<'_>,
        layers: &[LayerSpec],
        layer_ids: &HashMap<String, usize>,
    ) -> EsbResult<FunctionSpec> {
        let name = get(props, "FunctionName")
            .map(|v| self.resolve(v))
            .unwrap_or_else(|| logical_id.to_string());
        let code_uri = get(props, "CodeUri")
            .map(|v| self.resolve(v))
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_CODE_URI.to_string());

        let environment = get(props, "Environment")
            .and_then(|e| get(e, "Variables"))
            .map(as_map)
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, self.resolve(value)))
            .collect();

        let events = get(props, "Events")
            .map(as_map)
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, event)| get(event, "Type").and_then(as_string).as_deref() == Some("Api"))
            .filter_map(|(_, event)| {
                let event_props = get(event, "Properties")?;
                let path = get(event_props, "Path").and_then(as_string)?;
                let method = get(event_props, "Method")
                    .and_then(as_string)
                    .unwrap_or_default();
                Some(ApiRoute { path, method })
            })
            .collect();

        let layer_refs = match get(props, "Layers") {
            Some(value) => as_slice(value),
            None => defaults.layers.clone(),
        };
        let mut function_layers = Vec::new();
        for layer_ref in layer_refs {
            let target = reference_target(layer_ref);
            if target.starts_with("arn:") {
                tracing::debug!(function = %name, layer = %target, "Ignoring external layer ARN");
                continue;
            }
            let index = layer_ids
                .get(&target)
                .copied()
                .or_else(|| layers.iter().position(|l| l.name == target));
            match index {
                Some(index) => function_layers.push(layers[index].clone()),
                None => {
                    return Err(EsbError::Manifest {
                        message: format!(
                            "function '{}' references unknown layer '{}'",
                            name, target
                        ),
                    })
                }
            }
        }

        Ok(FunctionSpec {
            logical_id: logical_id.to_string(),
            name,
            code_uri,
            handler: get(props, "Handler")
                .and_then(as_string)
                .unwrap_or_else(|| defaults.handler.clone()),
            runtime: get(props, "Runtime")
                .and_then(as_string)
                .unwrap_or_else(|| defaults.runtime.clone()),
            timeout: get(props, "Timeout").and_then(as_u64).unwrap_or(defaults.timeout),
            memory_size: get(props, "MemorySize")
                .and_then(as_u64)
                .unwrap_or(defaults.memory_size),
            environment,
            layers: function_layers,
            events,
            has_requirements: false,
        })
    }

    /// Resolve an intrinsic-bearing value to a plain string.
    ///
    /// `!Ref Param` / `{Ref: Param}` yield the parameter value when known,
    /// `${Param}` placeholders are substituted, and unknown names stay verbatim.
    fn resolve(&self, value: &Value) -> String {
        if let Value::Tagged(tagged) = value {
            let tag = tagged.tag.to_string();
            if tag.trim_start_matches('!') == "Ref" {
                let target = as_string(&tagged.value).unwrap_or_default();
                return self.parameters.get(&target).cloned().unwrap_or(target);
            }
            return self.resolve(&tagged.value);
        }

        match value {
            Value::Mapping(_) => {
                if let Some(target) = get(value, "Ref").and_then(as_string) {
                    return self.parameters.get(&target).cloned().unwrap_or(target);
                }
                get(value, "Fn::Sub")
                    .map(|inner| self.resolve(inner))
                    .unwrap_or_default()
            }
            // `!Sub [template, {vars}]` form: the template is the first element.
            Value::Sequence(items) => items.first().map(|v| self.resolve(v)).unwrap_or_default(),
            other => self.substitute(&as_string(other).unwrap_or_default()),
        }
    }

    fn substitute(&self, raw: &str) -> String {
        PARAM_PATTERN
            .replace_all(raw, |caps: &Captures<'_>| {
                self.parameters
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn resource_type(resource: &Value) -> Option<String> {
    get(resource, "Type").and_then(as_string)
}

/// Logical id a layer reference points at: `!Ref X`, `{Ref: X}` or plain `X`.
fn reference_target(value: &Value) -> String {
    if let Some(target) = get(value, "Ref").and_then(as_string) {
        return target;
    }
    as_string(untag(value)).unwrap_or_default().trim().to_string()
}

fn decode<T>(props: &Value, logical_id: &str) -> EsbResult<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if props.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(untag(props).clone()).map_err(|e| EsbError::Manifest {
        message: format!("resource '{}': {}", logical_id, e),
    })
}

/// Parse a template file with the given parameters.
pub fn parse_file(path: impl AsRef<Path>, parameters: BTreeMap<String, String>) -> EsbResult<Manifest> {
    ManifestParser::new(parameters).parse_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::model::{KeyType, ProjectionType};

    const TEMPLATE: &str = r#"
AWSTemplateFormatVersion: '2010-09-09'
Transform: AWS::Serverless-2016-10-31
Parameters:
  Prefix:
    Type: String
Globals:
  Function:
    Runtime: python3.11
    Timeout: 15
    Layers:
      - !Ref CommonLayer
Resources:
  CommonLayer:
    Type: AWS::Serverless::LayerVersion
    Properties:
      LayerName: common
      ContentUri: layers/common/
      CompatibleArchitectures: [x86_64, arm64, x86_64]
  HelloFunction:
    Type: AWS::Serverless::Function
    Properties:
      FunctionName: !Sub "${Prefix}-hello"
      CodeUri: functions/hello/
      Handler: app.handler
      Environment:
        Variables:
          TABLE: !Ref OrdersTable
          STAGE: ${Prefix}
      Events:
        Ping:
          Type: Api
          Properties:
            Path: /v1/ping
            Method: get
        Queue:
          Type: SQS
          Properties:
            Queue: q
  WorkerFunction:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: functions/worker
      MemorySize: 256
      Layers: []
  OrdersTable:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: orders
      AttributeDefinitions:
        - AttributeName: pk
          AttributeType: S
        - AttributeName: gsi1
          AttributeType: S
      KeySchema:
        - AttributeName: pk
          KeyType: HASH
      GlobalSecondaryIndexes:
        - IndexName: by-gsi1
          KeySchema:
            - AttributeName: gsi1
              KeyType: HASH
          Projection:
            ProjectionType: KEYS_ONLY
  Assets:
    Type: AWS::S3::Bucket
    Properties:
      LifecycleConfiguration:
        Rules:
          - Id: expire-tmp
            Prefix: tmp/
            ExpirationInDays: 7
"#;

    fn parser() -> ManifestParser {
        let mut params = BTreeMap::new();
        params.insert("Prefix".to_string(), "dev".to_string());
        ManifestParser::new(params)
    }

    #[test]
    fn test_parse_functions() {
        let manifest = parser().parse_str(TEMPLATE).unwrap();
        assert_eq!(manifest.functions.len(), 2);

        let hello = &manifest.functions[0];
        assert_eq!(hello.logical_id, "HelloFunction");
        assert_eq!(hello.name, "dev-hello");
        assert_eq!(hello.code_uri, "functions/hello/");
        assert_eq!(hello.handler, "app.handler");
        assert_eq!(hello.runtime, "python3.11");
        assert_eq!(hello.timeout, 15);
        assert_eq!(hello.memory_size, 128);
        assert_eq!(hello.environment["TABLE"], "OrdersTable");
        assert_eq!(hello.environment["STAGE"], "dev");
        assert_eq!(hello.events.len(), 1);
        assert_eq!(hello.events[0].key(), "/v1/ping:get");
        assert_eq!(hello.layers.len(), 1);
        assert_eq!(hello.layers[0].name, "common");

        let worker = &manifest.functions[1];
        assert_eq!(worker.name, "WorkerFunction");
        assert_eq!(worker.memory_size, 256);
        assert!(worker.layers.is_empty());
    }

    #[test]
    fn test_parse_layers_dedupes_architectures() {
        let manifest = parser().parse_str(TEMPLATE).unwrap();
        let layer = &manifest.resources.layers[0];
        assert_eq!(layer.content_uri, "layers/common/");
        assert_eq!(layer.compatible_architectures, vec!["x86_64", "arm64"]);
    }

    #[test]
    fn test_parse_table_defaults_to_provisioned() {
        let manifest = parser().parse_str(TEMPLATE).unwrap();
        let table = &manifest.resources.dynamodb[0];
        assert_eq!(table.table_name, "orders");
        assert_eq!(table.billing_mode, BillingMode::Provisioned);
        assert_eq!(
            table.provisioned_throughput,
            Some(ProvisionedThroughput::default())
        );
        assert_eq!(table.key_schema[0].key_type, KeyType::Hash);

        let gsi = &table.global_secondary_indexes[0];
        assert_eq!(gsi.projection.projection_type, ProjectionType::KeysOnly);
        assert!(gsi.provisioned_throughput.is_some());
    }

    #[test]
    fn test_parse_bucket_lifecycle() {
        let manifest = parser().parse_str(TEMPLATE).unwrap();
        let bucket = &manifest.resources.s3[0];
        assert_eq!(bucket.bucket_name, "assets");
        let rules = &bucket.lifecycle_configuration.as_ref().unwrap().rules;
        assert_eq!(rules[0].id.as_deref(), Some("expire-tmp"));
        assert_eq!(rules[0].status, RuleStatus::Enabled);
        assert_eq!(rules[0].prefix, "tmp/");
        assert_eq!(rules[0].expiration_in_days, Some(7));
    }

    #[test]
    fn test_unknown_parameter_left_verbatim() {
        let manifest = ManifestParser::default().parse_str(TEMPLATE).unwrap();
        assert_eq!(manifest.functions[0].name, "${Prefix}-hello");
    }

    #[test]
    fn test_unknown_layer_reference_is_error() {
        let yaml = r#"
Resources:
  Fn:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: src
      Layers:
        - !Ref MissingLayer
"#;
        let err = ManifestParser::default().parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("MissingLayer"));
    }

    #[test]
    fn test_arn_layer_reference_ignored() {
        let yaml = r#"
Resources:
  Fn:
    Type: AWS::Serverless::Function
    Properties:
      Layers:
        - arn:aws:lambda:ap-northeast-1:123456789012:layer:ext:1
"#;
        let manifest = ManifestParser::default().parse_str(yaml).unwrap();
        assert!(manifest.functions[0].layers.is_empty());
        assert_eq!(manifest.functions[0].code_uri, "./");
    }

    #[test]
    fn test_api_event_without_method_defaults_to_get() {
        let yaml = r#"
Resources:
  PingFunction:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: functions/ping/
      Events:
        Ping:
          Type: Api
          Properties:
            Path: /v1/ping
        NoPath:
          Type: Api
          Properties:
            Method: post
"#;
        let manifest = ManifestParser::default().parse_str(yaml).unwrap();
        let routes: Vec<String> = manifest.functions[0].events.iter().map(|e| e.key()).collect();
        assert_eq!(routes, vec!["/v1/ping:GET".to_string()]);
    }

    #[test]
    fn test_duplicate_table_names_rejected() {
        let yaml = r#"
Resources:
  A:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: same
      BillingMode: PAY_PER_REQUEST
      AttributeDefinitions: [{AttributeName: id, AttributeType: S}]
      KeySchema: [{AttributeName: id, KeyType: HASH}]
  B:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: same
      BillingMode: PAY_PER_REQUEST
      AttributeDefinitions: [{AttributeName: id, AttributeType: S}]
      KeySchema: [{AttributeName: id, KeyType: HASH}]
"#;
        let err = ManifestParser::default().parse_str(yaml).unwrap_err();
        assert!(matches!(err, EsbError::Validation(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = ManifestParser::default().parse_str("Resources: [").unwrap_err();
        assert!(matches!(err, EsbError::Manifest { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_file("/nonexistent/template.yaml", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, EsbError::ConfigNotFound { .. }));
    }
}
