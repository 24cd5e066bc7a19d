use std::collections::BTreeMap;

use crate::config::model::RuntimeConfig;
use crate::metadata::shape::TableShape;
use crate::utils::error::{GatewayResult, PlanError, SchemaError};

/// REST operations derived from HTTP verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestOperation {
    Read,
    Create,
    Upsert,
    UpsertIncremental,
    Delete,
}

impl RestOperation {
    /// Verb-to-operation mapping of the REST surface.
    pub fn from_method(method: &str) -> Option<RestOperation> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(RestOperation::Read),
            "POST" => Some(RestOperation::Create),
            "PUT" => Some(RestOperation::Upsert),
            "PATCH" => Some(RestOperation::UpsertIncremental),
            "DELETE" => Some(RestOperation::Delete),
            _ => None,
        }
    }
}

/// A resolved REST path: the entity plus any raw primary-key segments that
/// followed its path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub entity: String,
    pub key_segments: Vec<String>,
}

/// Maps REST path segments to entities for one config snapshot.
#[derive(Debug, Clone)]
pub struct RouteTable {
    base: String,
    routes: BTreeMap<String, String>,
}

impl RouteTable {
    pub fn build(config: &RuntimeConfig) -> GatewayResult<RouteTable> {
        let base = config
            .runtime
            .rest
            .path
            .trim_matches('/')
            .to_string();

        let mut routes = BTreeMap::new();
        for (name, entity) in &config.entities {
            if !entity.rest_enabled() {
                continue;
            }
            let segment = entity.rest_path(name);
            if routes.insert(segment.clone(), name.clone()).is_some() {
                return Err(SchemaError::DuplicateRestPath(segment).into());
            }
        }

        Ok(RouteTable { base, routes })
    }

    /// Resolve a request path like `/api/Book/id/5` into the entity and its
    /// trailing key segments. `None` when the path does not belong to the
    /// REST surface or names no configured entity.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let mut segments = path.trim_matches('/').split('/').filter(|s| !s.is_empty());

        if !self.base.is_empty() {
            for expected in self.base.split('/') {
                if segments.next()? != expected {
                    return None;
                }
            }
        }

        let entity_segment = segments.next()?;
        let entity = self.routes.get(entity_segment)?.clone();
        let key_segments = segments.map(str::to_string).collect();
        Some(RouteMatch {
            entity,
            key_segments,
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = (&String, &String)> {
        self.routes.iter()
    }
}

/// Pair raw key segments with the entity's primary key columns.
///
/// Segments come either as alternating `col/value` pairs or, for a
/// single-column key, as one bare value.
pub fn bind_key_segments(
    segments: &[String],
    shape: &TableShape,
) -> GatewayResult<Vec<(String, String)>> {
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    if segments.len() == 1 {
        return match shape.primary_key.as_slice() {
            [only] => Ok(vec![(only.clone(), segments[0].clone())]),
            _ => Err(PlanError::InvalidBody(
                "a bare key value requires a single-column primary key".to_string(),
            )
            .into()),
        };
    }

    if segments.len() % 2 != 0 {
        return Err(PlanError::InvalidBody(
            "primary key segments must come in column/value pairs".to_string(),
        )
        .into());
    }

    let mut bindings = Vec::new();
    for pair in segments.chunks(2) {
        let column = &pair[0];
        if !shape.primary_key.contains(column) {
            return Err(PlanError::UnknownField {
                parent: "primary key".to_string(),
                field: column.clone(),
            }
            .into());
        }
        bindings.push((column.clone(), pair[1].clone()));
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::shape::{ColumnDef, ColumnType};

    fn config() -> RuntimeConfig {
        serde_json::from_value(serde_json::json!({
            "data-source": {
                "database-type": "postgresql",
                "connection-string": "postgresql://localhost/app"
            },
            "entities": {
                "Book": {
                    "source": "books",
                    "permissions": [{ "role": "anonymous", "actions": ["read"] }]
                },
                "Publisher": {
                    "source": "publishers",
                    "rest": { "path": "/pubs" },
                    "permissions": [{ "role": "anonymous", "actions": ["read"] }]
                },
                "Audit": {
                    "source": "audit",
                    "rest": false,
                    "permissions": [{ "role": "anonymous", "actions": ["read"] }]
                }
            }
        }))
        .unwrap()
    }

    fn book_shape() -> TableShape {
        TableShape {
            columns: vec![ColumnDef::new("id", ColumnType::Int)],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
            parameters: vec![],
        }
    }

    #[test]
    fn test_verb_mapping() {
        assert_eq!(RestOperation::from_method("get"), Some(RestOperation::Read));
        assert_eq!(
            RestOperation::from_method("POST"),
            Some(RestOperation::Create)
        );
        assert_eq!(
            RestOperation::from_method("PUT"),
            Some(RestOperation::Upsert)
        );
        assert_eq!(
            RestOperation::from_method("PATCH"),
            Some(RestOperation::UpsertIncremental)
        );
        assert_eq!(
            RestOperation::from_method("DELETE"),
            Some(RestOperation::Delete)
        );
        assert_eq!(RestOperation::from_method("TRACE"), None);
    }

    #[test]
    fn test_resolve_entity_and_keys() {
        let table = RouteTable::build(&config()).unwrap();

        let matched = table.resolve("/api/Book/id/5").unwrap();
        assert_eq!(matched.entity, "Book");
        assert_eq!(matched.key_segments, vec!["id", "5"]);

        let matched = table.resolve("/api/Book").unwrap();
        assert!(matched.key_segments.is_empty());
    }

    #[test]
    fn test_resolve_respects_overrides_and_disabled() {
        let table = RouteTable::build(&config()).unwrap();
        assert_eq!(table.resolve("/api/pubs").unwrap().entity, "Publisher");
        assert!(table.resolve("/api/Publisher").is_none());
        assert!(table.resolve("/api/Audit").is_none());
        assert!(table.resolve("/other/Book").is_none());
    }

    #[test]
    fn test_bind_bare_single_key() {
        let bindings =
            bind_key_segments(&["5".to_string()], &book_shape()).unwrap();
        assert_eq!(bindings, vec![("id".to_string(), "5".to_string())]);
    }

    #[test]
    fn test_bind_pairs_validate_column_names() {
        let bindings = bind_key_segments(
            &["id".to_string(), "5".to_string()],
            &book_shape(),
        )
        .unwrap();
        assert_eq!(bindings, vec![("id".to_string(), "5".to_string())]);

        assert!(bind_key_segments(
            &["nope".to_string(), "5".to_string()],
            &book_shape()
        )
        .is_err());
    }

    #[test]
    fn test_duplicate_rest_path_is_rejected() {
        let mut raw = serde_json::to_value(config()).unwrap();
        raw["entities"]["Paperback"] = serde_json::json!({
            "source": "paperbacks",
            "rest": { "path": "Book" },
            "permissions": [{ "role": "anonymous", "actions": ["read"] }]
        });
        let config: RuntimeConfig = serde_json::from_value(raw).unwrap();
        assert!(RouteTable::build(&config).is_err());
    }
}
