use std::sync::Arc;

use async_graphql_parser::types::{BaseType, TypeKind, TypeSystemDefinition};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config::model::{Entity, RelationshipConfig, RuntimeConfig};
use crate::connectors::connector_trait::Connector;
use crate::metadata::shape::{ColumnDef, ColumnType, TableShape};
use crate::utils::error::{GatewayResult, MetadataError};

/// Supplies the discovered shape of each entity's physical object.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn describe(&self, entity_name: &str) -> GatewayResult<Arc<TableShape>>;
}

/// Lazy, per-entity metadata discovery memoized for the lifetime of one
/// config snapshot. The cache dies with the snapshot on hot-reload.
pub struct CachedMetadataProvider {
    config: Arc<RuntimeConfig>,
    connector: Arc<dyn Connector>,
    cache: DashMap<String, Arc<TableShape>>,
}

impl CachedMetadataProvider {
    pub fn new(config: Arc<RuntimeConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            cache: DashMap::new(),
        }
    }

    async fn discover(&self, entity_name: &str, entity: &Entity) -> GatewayResult<TableShape> {
        let mut shape = if self.config.data_source.database_type.is_document() {
            self.document_shape(entity_name, entity).await?
        } else {
            debug!(entity = entity_name, object = entity.source_object(), "introspecting backend object");
            self.connector.introspect(entity.source_object()).await?
        };

        // Views and containers cannot report a key of their own; the config
        // supplies one through source.key-fields.
        let declared = entity.declared_key_fields();
        if !declared.is_empty() {
            shape.primary_key = declared.to_vec();
        }

        Ok(shape)
    }

    /// Document containers take their shape from the user-supplied GraphQL
    /// schema file; no database introspection occurs.
    async fn document_shape(&self, entity_name: &str, entity: &Entity) -> GatewayResult<TableShape> {
        let schema_path = self
            .config
            .data_source
            .options
            .schema
            .as_ref()
            .ok_or_else(|| {
                MetadataError::SchemaFileInvalid(
                    "no schema file configured for the document data source".to_string(),
                )
            })?;

        let text = tokio::fs::read_to_string(schema_path).await.map_err(|e| {
            MetadataError::SchemaFileInvalid(format!("cannot read '{schema_path}': {e}"))
        })?;
        let document = async_graphql_parser::parse_schema(&text)
            .map_err(|e| MetadataError::SchemaFileInvalid(e.to_string()))?;

        let type_name = entity.graphql_singular(entity_name);
        for definition in &document.definitions {
            let TypeSystemDefinition::Type(type_definition) = definition else {
                continue;
            };
            let node = &type_definition.node;
            if node.name.node.as_str() != type_name && node.name.node.as_str() != entity_name {
                continue;
            }
            let TypeKind::Object(object) = &node.kind else {
                continue;
            };

            let mut columns = Vec::new();
            for field in &object.fields {
                let field_node = &field.node;
                // Only scalar leaves become columns; list and object fields
                // are navigations handled through relationships.
                if let BaseType::Named(name) = &field_node.ty.node.base {
                    let mut column = ColumnDef::new(
                        field_node.name.node.as_str(),
                        ColumnType::from_graphql_name(name.as_str()),
                    );
                    column.nullable = field_node.ty.node.nullable;
                    columns.push(column);
                }
            }

            let primary_key = if columns.iter().any(|c| c.name == "id") {
                vec!["id".to_string()]
            } else {
                Vec::new()
            };

            return Ok(TableShape {
                columns,
                primary_key,
                foreign_keys: Vec::new(),
                parameters: Vec::new(),
            });
        }

        Err(MetadataError::SchemaFileInvalid(format!(
            "schema file does not define an object type for entity '{entity_name}'"
        ))
        .into())
    }
}

#[async_trait]
impl MetadataProvider for CachedMetadataProvider {
    async fn describe(&self, entity_name: &str) -> GatewayResult<Arc<TableShape>> {
        if let Some(shape) = self.cache.get(entity_name) {
            return Ok(shape.clone());
        }
        let entity = self.config.entity(entity_name)?;
        let shape = Arc::new(self.discover(entity_name, entity).await?);
        self.cache.insert(entity_name.to_string(), shape.clone());
        Ok(shape)
    }
}

/// Resolve the join columns of a relationship as `(source_col, target_col)`
/// pairs. Explicit fields win; otherwise foreign keys between the two
/// objects are consulted. More than one candidate key is an error the
/// config must resolve by spelling the fields out.
pub fn infer_join(
    relationship: &RelationshipConfig,
    source_entity: &str,
    source_object: &str,
    source_shape: &TableShape,
    target_entity: &str,
    target_object: &str,
    target_shape: &TableShape,
) -> GatewayResult<Vec<(String, String)>> {
    if relationship.has_explicit_fields() {
        return Ok(relationship
            .source_fields
            .iter()
            .cloned()
            .zip(relationship.target_fields.iter().cloned())
            .collect());
    }

    let mut candidates: Vec<Vec<(String, String)>> = Vec::new();

    for fk in source_shape.foreign_keys_to(target_object) {
        candidates.push(
            fk.columns
                .iter()
                .cloned()
                .zip(fk.ref_columns.iter().cloned())
                .collect(),
        );
    }
    for fk in target_shape.foreign_keys_to(source_object) {
        candidates.push(
            fk.ref_columns
                .iter()
                .cloned()
                .zip(fk.columns.iter().cloned())
                .collect(),
        );
    }

    match candidates.len() {
        0 => Err(MetadataError::RelationshipUnresolvable {
            source_entity: source_entity.to_string(),
            target: target_entity.to_string(),
        }
        .into()),
        1 => Ok(candidates.remove(0)),
        _ => Err(MetadataError::RelationshipAmbiguous {
            source_entity: source_entity.to_string(),
            target: target_entity.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::shape::ForeignKey;

    fn relationship(json: serde_json::Value) -> RelationshipConfig {
        serde_json::from_value(json).unwrap()
    }

    fn books_shape() -> TableShape {
        TableShape {
            columns: vec![
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("publisher_id", ColumnType::Int),
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![ForeignKey {
                columns: vec!["publisher_id".to_string()],
                ref_object: "publishers".to_string(),
                ref_columns: vec!["id".to_string()],
            }],
            parameters: vec![],
        }
    }

    fn publishers_shape() -> TableShape {
        TableShape {
            columns: vec![
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("name", ColumnType::Text),
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
            parameters: vec![],
        }
    }

    #[test]
    fn test_explicit_fields_win() {
        let rel = relationship(serde_json::json!({
            "cardinality": "one",
            "target.entity": "Publisher",
            "source.fields": ["publisher_id"],
            "target.fields": ["id"]
        }));
        let join = infer_join(
            &rel,
            "Book",
            "books",
            &books_shape(),
            "Publisher",
            "publishers",
            &publishers_shape(),
        )
        .unwrap();
        assert_eq!(join, vec![("publisher_id".to_string(), "id".to_string())]);
    }

    #[test]
    fn test_fk_inference_from_source_side() {
        let rel = relationship(serde_json::json!({
            "cardinality": "one",
            "target.entity": "Publisher"
        }));
        let join = infer_join(
            &rel,
            "Book",
            "books",
            &books_shape(),
            "Publisher",
            "publishers",
            &publishers_shape(),
        )
        .unwrap();
        assert_eq!(join, vec![("publisher_id".to_string(), "id".to_string())]);
    }

    #[test]
    fn test_fk_inference_from_target_side() {
        // Publisher -> Book: the FK lives on books.
        let rel = relationship(serde_json::json!({
            "cardinality": "many",
            "target.entity": "Book"
        }));
        let join = infer_join(
            &rel,
            "Publisher",
            "publishers",
            &publishers_shape(),
            "Book",
            "books",
            &books_shape(),
        )
        .unwrap();
        assert_eq!(join, vec![("id".to_string(), "publisher_id".to_string())]);
    }

    #[test]
    fn test_missing_fk_is_unresolvable() {
        let rel = relationship(serde_json::json!({
            "cardinality": "many",
            "target.entity": "Author"
        }));
        let authors = publishers_shape();
        let result = infer_join(
            &rel,
            "Publisher",
            "publishers",
            &publishers_shape(),
            "Author",
            "authors",
            &authors,
        );
        assert!(matches!(
            result.unwrap_err(),
            crate::utils::error::GatewayError::Metadata(
                MetadataError::RelationshipUnresolvable { .. }
            )
        ));
    }

    #[test]
    fn test_multiple_fks_are_ambiguous() {
        let rel = relationship(serde_json::json!({
            "cardinality": "one",
            "target.entity": "Publisher"
        }));
        let mut shape = books_shape();
        shape.foreign_keys.push(ForeignKey {
            columns: vec!["original_publisher_id".to_string()],
            ref_object: "publishers".to_string(),
            ref_columns: vec!["id".to_string()],
        });
        let result = infer_join(
            &rel,
            "Book",
            "books",
            &shape,
            "Publisher",
            "publishers",
            &publishers_shape(),
        );
        assert!(matches!(
            result.unwrap_err(),
            crate::utils::error::GatewayError::Metadata(
                MetadataError::RelationshipAmbiguous { .. }
            )
        ));
    }
}
