// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! DynamoDB table reconciliation.

use super::api::{CreateOutcome, TableApi};
use super::Applied;
use crate::error::{EsbResult, RemoteError};
use crate::manifest::{describe_key_schema, AttributeDefinition, DynamoDbSpec};

/// Create the table if absent; otherwise check its key schema and add any
/// declared indexes it lacks. Existing tables are never altered otherwise.
pub(crate) async fn ensure_table(api: &dyn TableApi, spec: &DynamoDbSpec) -> EsbResult<Applied> {
    let Some(existing) = api.describe_table(&spec.table_name).await? else {
        return match api.create_table(spec).await? {
            CreateOutcome::Created => Ok(Applied::Created),
            CreateOutcome::AlreadyExists => {
                tracing::debug!(table = %spec.table_name, "Table created concurrently");
                Ok(Applied::Unchanged)
            }
        };
    };

    if !existing.key_schema.is_empty() && existing.key_schema != spec.key_schema {
        return Err(RemoteError::KeySchemaMismatch {
            table: spec.table_name.clone(),
            declared: describe_key_schema(&spec.key_schema),
            actual: describe_key_schema(&existing.key_schema),
        }
        .into());
    }

    let mut added = 0;
    for index in &spec.global_secondary_indexes {
        if existing.index_names.contains(&index.index_name) {
            continue;
        }
        let attributes = index_attributes(spec, &index.key_schema);
        api.create_global_secondary_index(spec, index, &attributes)
            .await?;
        tracing::info!(table = %spec.table_name, index = %index.index_name, "Added global secondary index");
        added += 1;
    }

    Ok(if added > 0 {
        Applied::Updated
    } else {
        Applied::Unchanged
    })
}

/// Attribute definitions referenced by an index key schema.
fn index_attributes(
    spec: &DynamoDbSpec,
    key_schema: &[crate::manifest::KeySchemaElement],
) -> Vec<AttributeDefinition> {
    spec.attribute_definitions
        .iter()
        .filter(|a| key_schema.iter().any(|k| k.attribute_name == a.attribute_name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::testing::{hash_table, FakeTables};
    use crate::manifest::{GlobalSecondaryIndexSpec, KeySchemaElement, KeyType, Projection};

    #[tokio::test]
    async fn test_absent_table_is_created() {
        let api = FakeTables::default();
        let applied = ensure_table(&api, &hash_table("orders", "id")).await.unwrap();
        assert_eq!(applied, Applied::Created);
        assert!(api.has_table("orders"));
    }

    #[tokio::test]
    async fn test_existing_table_unchanged() {
        let api = FakeTables::default();
        let spec = hash_table("orders", "id");
        ensure_table(&api, &spec).await.unwrap();

        let applied = ensure_table(&api, &spec).await.unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(api.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_race_counts_as_present() {
        let api = FakeTables::default().racing();
        let applied = ensure_table(&api, &hash_table("orders", "id")).await.unwrap();
        assert_eq!(applied, Applied::Unchanged);
    }

    #[tokio::test]
    async fn test_key_schema_mismatch_fails() {
        let api = FakeTables::default();
        ensure_table(&api, &hash_table("orders", "pk")).await.unwrap();

        let err = ensure_table(&api, &hash_table("orders", "id")).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("id:HASH"));
        assert!(msg.contains("pk:HASH"));
    }

    #[tokio::test]
    async fn test_missing_index_is_added() {
        let api = FakeTables::default();
        let mut spec = hash_table("orders", "id");
        ensure_table(&api, &spec).await.unwrap();

        spec.attribute_definitions.push(AttributeDefinition {
            attribute_name: "status".to_string(),
            attribute_type: crate::manifest::AttributeType::S,
        });
        spec.global_secondary_indexes.push(GlobalSecondaryIndexSpec {
            index_name: "by-status".to_string(),
            key_schema: vec![KeySchemaElement {
                attribute_name: "status".to_string(),
                key_type: KeyType::Hash,
            }],
            projection: Projection::default(),
            provisioned_throughput: None,
        });

        let applied = ensure_table(&api, &spec).await.unwrap();
        assert_eq!(applied, Applied::Updated);
        assert_eq!(api.indexes("orders"), vec!["by-status".to_string()]);

        let applied = ensure_table(&api, &spec).await.unwrap();
        assert_eq!(applied, Applied::Unchanged);
    }

    #[test]
    fn test_index_attributes_filters_to_key_schema() {
        let mut spec = hash_table("orders", "id");
        spec.attribute_definitions.push(AttributeDefinition {
            attribute_name: "status".to_string(),
            attribute_type: crate::manifest::AttributeType::S,
        });
        let key = vec![KeySchemaElement {
            attribute_name: "status".to_string(),
            key_type: KeyType::Hash,
        }];
        let attrs = index_attributes(&spec, &key);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].attribute_name, "status");
    }
}
