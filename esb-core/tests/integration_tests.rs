// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end integration tests for esb.
//!
//! These tests drive a project on disk from config and template through
//! staging and provisioning against in-memory services.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use esb_core::error::RemoteError;
use esb_core::manifest::{
    AttributeDefinition, DynamoDbSpec, GlobalSecondaryIndexSpec, LifecycleConfiguration,
};
use esb_core::orchestrator::{ResourceApplier, CONFIG_DIR, RESOURCES_FILE};
use esb_core::provision::{
    Applied, BucketApi, CreateOutcome, OutcomeStatus, ProvisionReport, S3LayerPublisher,
    TableApi, TableDescription,
};
use esb_core::{
    BucketName, ConfigLoader, EsbResult, Orchestrator, ProvisionRequest, Provisioner,
    ResourcesSpec,
};
use serial_test::serial;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TEMPLATE: &str = r#"
AWSTemplateFormatVersion: '2010-09-09'
Transform: AWS::Serverless-2016-10-31
Globals:
  Function:
    Layers:
      - !Ref CommonLayer
Resources:
  CommonLayer:
    Type: AWS::Serverless::LayerVersion
    Properties:
      LayerName: common
      ContentUri: layers/common/
  DepsLayer:
    Type: AWS::Serverless::LayerVersion
    Properties:
      LayerName: deps
      ContentUri: dist/deps.zip
  HelloFunction:
    Type: AWS::Serverless::Function
    Properties:
      FunctionName: !Sub "${Prefix}-hello"
      CodeUri: functions/hello/
      Events:
        Ping:
          Type: Api
          Properties:
            Path: /v1/ping
            Method: get
  WorkerFunction:
    Type: AWS::Serverless::Function
    Properties:
      FunctionName: worker
      CodeUri: functions/worker
      Layers:
        - !Ref CommonLayer
        - !Ref DepsLayer
  OrdersTable:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: orders
      BillingMode: PAY_PER_REQUEST
      AttributeDefinitions:
        - AttributeName: pk
          AttributeType: S
        - AttributeName: status
          AttributeType: S
      KeySchema:
        - AttributeName: pk
          KeyType: HASH
      GlobalSecondaryIndexes:
        - IndexName: by-status
          KeySchema:
            - AttributeName: status
              KeyType: HASH
          Projection:
            ProjectionType: ALL
  AssetsBucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: assets
      LifecycleConfiguration:
        Rules:
          - Id: expire-tmp
            Prefix: tmp/
            ExpirationInDays: 1
"#;

const CONFIG: &str = r#"
docker:
  sitecustomize_source: hooks/sitecustomize.py
parameters:
  Prefix: dev
"#;

const ENV_KEYS: [&str; 9] = [
    "ENV_PREFIX",
    "MODE",
    "ENV",
    "PROJECT_NAME",
    "IMAGE_TAG",
    "ESB_MODE",
    "ESB_PROJECT_NAME",
    "ESB_IMAGE_TAG",
    "ESB_SKIP_S3_LIFECYCLE",
];

fn write(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A project with two functions, a directory layer, a zip layer, a table and a bucket.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(&root.join("esb.yaml"), CONFIG.as_bytes());
    write(&root.join("template.yaml"), TEMPLATE.as_bytes());
    write(&root.join("hooks/sitecustomize.py"), b"# hook\n");
    write(&root.join("functions/hello/app.py"), b"def handler(e, c):\n    return 'hi'\n");
    write(&root.join("functions/hello/requirements.txt"), b"requests\n");
    write(&root.join("functions/worker/app.py"), b"def handler(e, c):\n    pass\n");
    write(&root.join("layers/common/python/common.py"), b"SHARED = True\n");

    let deps_src = root.join("deps-src");
    write(&deps_src.join("python/dep.py"), b"DEP = 1\n");
    let archive = esb_core::fs::zip_dir(&deps_src).unwrap();
    write(&root.join("dist/deps.zip"), &archive);
    tmp
}

#[derive(Default)]
struct MemoryTables {
    tables: Mutex<HashMap<String, TableDescription>>,
}

#[async_trait]
impl TableApi for MemoryTables {
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, RemoteError> {
        Ok(self.tables.lock().unwrap().get(table).cloned())
    }

    async fn create_table(&self, spec: &DynamoDbSpec) -> Result<CreateOutcome, RemoteError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(&spec.table_name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        tables.insert(
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
        Ok(CreateOutcome::Created)
    }

    async fn create_global_secondary_index(
        &self,
        spec: &DynamoDbSpec,
        index: &GlobalSecondaryIndexSpec,
        _attributes: &[AttributeDefinition],
    ) -> Result<(), RemoteError> {
        if let Some(table) = self.tables.lock().unwrap().get_mut(&spec.table_name) {
            table.index_names.push(index.index_name.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBuckets {
    objects: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    lifecycles: Mutex<Vec<String>>,
}

#[async_trait]
impl BucketApi for MemoryBuckets {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        Ok(self.objects.lock().unwrap().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome, RemoteError> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(bucket) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        objects.insert(bucket.to_string(), BTreeMap::new());
        Ok(CreateOutcome::Created)
    }

    async fn put_lifecycle_configuration(
        &self,
        bucket: &str,
        _lifecycle: &LifecycleConfiguration,
    ) -> Result<(), RemoteError> {
        self.lifecycles.lock().unwrap().push(bucket.to_string());
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, RemoteError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), RemoteError> {
        self.objects
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body);
        Ok(())
    }
}

/// Provisions into the in-memory services and publishes layers to `esb-layers`.
#[derive(Default)]
struct MemoryApplier {
    tables: Arc<MemoryTables>,
    buckets: Arc<MemoryBuckets>,
}

#[async_trait]
impl ResourceApplier for MemoryApplier {
    async fn apply(
        &self,
        resources: &ResourcesSpec,
        output_dir: &Path,
        compose_project: &str,
        cancel: &CancellationToken,
    ) -> EsbResult<ProvisionReport> {
        let publisher = Arc::new(S3LayerPublisher::new(
            self.buckets.clone(),
            BucketName::new("esb-layers")?,
        ));
        let provisioner = Provisioner::new(self.tables.clone(), self.buckets.clone(), output_dir)
            .with_publisher(publisher);
        Ok(provisioner.apply(resources, compose_project, cancel).await)
    }
}

fn unset_env() -> [(&'static str, Option<&'static str>); 9] {
    ENV_KEYS.map(|k| (k, None))
}

#[test]
fn test_build_stages_project() {
    let tmp = project();
    let config = ConfigLoader::load_file(tmp.path().join("esb.yaml")).unwrap();
    let orchestrator = Orchestrator::new(config, Arc::new(MemoryApplier::default()));

    let outcome = orchestrator.build(&ProvisionRequest::new("dev")).unwrap();
    let out = tmp.path().join(".esb/dev");
    assert_eq!(outcome.output_dir, out);

    let hello = &outcome.manifest.functions[0];
    assert_eq!(hello.name, "dev-hello");
    assert_eq!(hello.code_uri, "functions/dev-hello/src/");
    assert!(hello.has_requirements);
    assert_eq!(hello.events[0].key(), "/v1/ping:get");
    assert!(out.join("functions/dev-hello/src/app.py").is_file());
    assert!(out.join("functions/dev-hello/sitecustomize.py").is_file());

    let worker = &outcome.manifest.functions[1];
    assert!(!worker.has_requirements);
    let worker_layers: Vec<_> = worker.layers.iter().map(|l| l.content_uri.as_str()).collect();
    assert_eq!(worker_layers, vec!["layers/layers_common", "layers/dist_deps.zip"]);

    // Both functions share one staged copy of the common layer.
    assert_eq!(hello.layers[0].content_uri, worker.layers[0].content_uri);
    assert!(out.join("layers/layers_common/python/common.py").is_file());
    assert!(out.join("layers/dist_deps.zip/python/dep.py").is_file());

    for layer in &outcome.manifest.resources.layers {
        assert!(layer.content_uri.starts_with("layers/"));
        assert!(layer
            .content_uri
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._/-".contains(c)));
    }

    let resources_path = outcome.resources_path.unwrap();
    assert_eq!(resources_path, out.join(CONFIG_DIR).join(RESOURCES_FILE));
    let written: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(resources_path).unwrap()).unwrap();
    let staged: ResourcesSpec = serde_yaml::from_value(written["resources"].clone()).unwrap();
    assert_eq!(staged, outcome.manifest.resources);
}

#[test]
fn test_build_is_repeatable() {
    let tmp = project();
    let config = ConfigLoader::load_file(tmp.path().join("esb.yaml")).unwrap();
    let orchestrator = Orchestrator::new(config, Arc::new(MemoryApplier::default()));
    let request = ProvisionRequest::new("dev");

    let first = orchestrator.build(&request).unwrap();
    let second = orchestrator.build(&request).unwrap();
    assert_eq!(first.manifest, second.manifest);
}

#[test]
fn test_dry_run_matches_real_staging() {
    let tmp = project();
    let config = ConfigLoader::load_file(tmp.path().join("esb.yaml")).unwrap();
    let orchestrator = Orchestrator::new(config, Arc::new(MemoryApplier::default()));

    let mut request = ProvisionRequest::new("dev");
    request.dry_run = true;
    let dry = orchestrator.build(&request).unwrap();
    assert!(!tmp.path().join(".esb").exists());

    request.dry_run = false;
    let real = orchestrator.build(&request).unwrap();
    assert_eq!(
        dry.manifest.functions[1].layers,
        real.manifest.functions[1].layers
    );
}

#[tokio::test]
#[serial]
async fn test_up_provisions_everything() {
    let tmp = project();
    let config = ConfigLoader::load_file(tmp.path().join("esb.yaml")).unwrap();
    let applier = Arc::new(MemoryApplier::default());
    let orchestrator = Orchestrator::new(config, applier.clone());
    let cancel = CancellationToken::new();

    let (_, report) = temp_env::async_with_vars(
        unset_env(),
        orchestrator.up(&ProvisionRequest::new("dev"), &cancel),
    )
    .await
    .unwrap();

    // Tables, then buckets, then layers.
    let summary: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| (o.kind.to_string(), o.name.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("table".to_string(), "orders".to_string()),
            ("bucket".to_string(), "assets".to_string()),
            ("layer".to_string(), "common".to_string()),
            ("layer".to_string(), "deps".to_string()),
        ]
    );
    assert!(report.is_success());

    let tables = applier.tables.tables.lock().unwrap();
    assert_eq!(tables["orders"].index_names, vec!["by-status"]);
    drop(tables);

    assert_eq!(*applier.buckets.lifecycles.lock().unwrap(), vec!["assets"]);
    let objects = applier.buckets.objects.lock().unwrap();
    let keys: Vec<_> = objects["esb-layers"].keys().cloned().collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.starts_with("esb-dev/") && k.ends_with(".zip")));
    assert!(keys.iter().any(|k| k.starts_with("esb-dev/common/")));
}

#[tokio::test]
#[serial]
async fn test_second_up_is_unchanged() {
    let tmp = project();
    let config = ConfigLoader::load_file(tmp.path().join("esb.yaml")).unwrap();
    let applier = Arc::new(MemoryApplier::default());
    let orchestrator = Orchestrator::new(config, applier.clone());
    let cancel = CancellationToken::new();
    let request = ProvisionRequest::new("dev");

    temp_env::async_with_vars(unset_env(), async {
        orchestrator.up(&request, &cancel).await.unwrap();
        let (_, report) = orchestrator.up(&request, &cancel).await.unwrap();

        let table = &report.outcomes[0];
        assert_eq!(table.status, OutcomeStatus::Applied(Applied::Unchanged));
        // Lifecycle rules are re-applied on every run.
        let bucket = &report.outcomes[1];
        assert_eq!(bucket.status, OutcomeStatus::Applied(Applied::Updated));
        // Layer archives are content-addressed, so identical content is not re-uploaded.
        assert!(report.outcomes[2..]
            .iter()
            .all(|o| o.status == OutcomeStatus::Applied(Applied::Unchanged)));
    })
    .await;

    assert_eq!(applier.buckets.lifecycles.lock().unwrap().len(), 2);
    assert_eq!(applier.buckets.objects.lock().unwrap()["esb-layers"].len(), 2);
}

#[tokio::test]
#[serial]
async fn test_cancelled_up_reports_failure() {
    let tmp = project();
    let config = ConfigLoader::load_file(tmp.path().join("esb.yaml")).unwrap();
    let applier = Arc::new(MemoryApplier::default());
    let orchestrator = Orchestrator::new(config, applier.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = temp_env::async_with_vars(
        unset_env(),
        orchestrator.up(&ProvisionRequest::new("dev"), &cancel),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    assert!(applier.tables.tables.lock().unwrap().is_empty());
    // Staging itself is not cancellable.
    assert!(tmp.path().join(".esb/dev/functions/worker/src/app.py").is_file());
}

#[test]
fn test_cni_config_written_for_project() {
    let tmp = TempDir::new().unwrap();
    temp_env::with_vars_unset(["CNI_DNS_SERVER", "CNI_GW_IP"], || {
        let path =
            esb_core::cni::generate_config(tmp.path(), "10.30.0.0/24", "esb-dev", "esb-dev0")
                .unwrap();
        assert!(path.ends_with("10-esb-dev.conflist"));
    });

    let claims = esb_core::cni::collect_subnet_claims(tmp.path(), "other").unwrap();
    assert_eq!(claims["10.30.0.0/24"], "esb-dev");
    assert!(esb_core::cni::collect_subnet_claims(tmp.path(), "esb-dev")
        .unwrap()
        .is_empty());
}
