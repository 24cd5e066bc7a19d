use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use strata_gateway::config::RuntimeConfig;
use strata_gateway::connectors::FakeConnector;
use strata_gateway::metadata::{ColumnDef, ColumnType, ForeignKey, TableShape};
use strata_gateway::utils::Principal;
use strata_gateway::Gateway;

/// Library catalog config used across the integration suites.
pub fn library_config(mode: &str) -> RuntimeConfig {
    serde_json::from_value(json!({
        "data-source": {
            "database-type": "postgresql",
            "connection-string": "postgresql://localhost/library"
        },
        "runtime": {
            "host": { "mode": mode },
            "graphql": { "multiple-mutations": true }
        },
        "entities": {
            "Book": {
                "source": "books",
                "permissions": [
                    {
                        "role": "anonymous",
                        "actions": [
                            {
                                "action": "read",
                                "fields": { "include": ["*"], "exclude": ["ssn"] }
                            }
                        ]
                    },
                    {
                        "role": "author",
                        "actions": [
                            "read",
                            {
                                "action": "update",
                                "policy": { "database": "@item.author_id eq @claims.sub" }
                            }
                        ]
                    },
                    { "role": "admin", "actions": ["*"] }
                ],
                "relationships": {
                    "publisher": {
                        "cardinality": "one",
                        "target.entity": "Publisher"
                    },
                    "authors": {
                        "cardinality": "many",
                        "target.entity": "Author",
                        "linking.object": "book_authors",
                        "linking.source.fields": ["book_id"],
                        "linking.target.fields": ["author_id"]
                    }
                }
            },
            "Publisher": {
                "source": "publishers",
                "permissions": [
                    { "role": "anonymous", "actions": ["read"] },
                    { "role": "admin", "actions": ["*"] }
                ],
                "relationships": {
                    "books": {
                        "cardinality": "many",
                        "target.entity": "Book"
                    }
                }
            },
            "Author": {
                "source": "authors",
                "permissions": [
                    { "role": "anonymous", "actions": ["read"] },
                    { "role": "admin", "actions": ["*"] }
                ]
            }
        }
    }))
    .unwrap()
}

pub fn books_shape() -> TableShape {
    TableShape {
        columns: vec![
            ColumnDef::new("id", ColumnType::Int).autogenerated(),
            ColumnDef::new("title", ColumnType::Text),
            ColumnDef::new("year", ColumnType::Int).nullable(),
            ColumnDef::new("ssn", ColumnType::Text).nullable(),
            ColumnDef::new("author_id", ColumnType::Int),
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

pub fn publishers_shape() -> TableShape {
    TableShape {
        columns: vec![
            ColumnDef::new("id", ColumnType::Int).autogenerated(),
            ColumnDef::new("name", ColumnType::Text),
        ],
        primary_key: vec!["id".to_string()],
        foreign_keys: vec![],
        parameters: vec![],
    }
}

pub fn authors_shape() -> TableShape {
    TableShape {
        columns: vec![
            ColumnDef::new("id", ColumnType::Int).autogenerated(),
            ColumnDef::new("name", ColumnType::Text),
        ],
        primary_key: vec!["id".to_string()],
        foreign_keys: vec![],
        parameters: vec![],
    }
}

pub fn library_connector() -> Arc<FakeConnector> {
    Arc::new(
        FakeConnector::new(strata_gateway::config::DatabaseKind::PostgreSql)
            .with_shape("books", books_shape())
            .with_shape("publishers", publishers_shape())
            .with_shape("authors", authors_shape()),
    )
}

pub async fn library_gateway(mode: &str) -> (Gateway, Arc<FakeConnector>) {
    let connector = library_connector();
    let gateway = Gateway::new(Arc::new(library_config(mode)), connector.clone())
        .await
        .expect("gateway builds");
    (gateway, connector)
}

pub fn anonymous() -> Principal {
    Principal::anonymous()
}

pub fn principal_with_role(role: &str, claims: &[(&str, JsonValue)]) -> Principal {
    let mut map = HashMap::new();
    for (name, value) in claims {
        map.insert(name.to_string(), value.clone());
    }
    Principal {
        role: role.to_string(),
        claims: map,
        authenticated: true,
    }
}
