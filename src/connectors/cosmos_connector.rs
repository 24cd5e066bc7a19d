use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::config::model::{DataSourceConfig, DatabaseKind};
use crate::connectors::connector_trait::Connector;
use crate::metadata::shape::TableShape;
use crate::utils::error::{ExecuteError, GatewayResult, MetadataError, PlanError};
use crate::utils::types::{MutationOutcome, SqlStatement};

/// Cosmos SQL-API connector over plain HTTPS. Authentication uses a
/// resource token carried in the connection string; container shapes come
/// from the configured schema file, never from the service.
pub struct CosmosConnector {
    http: reqwest::Client,
    endpoint: String,
    auth_token: String,
    database: String,
    container: String,
    kind: DatabaseKind,
}

impl CosmosConnector {
    /// Build a connector from the data source block. The connection string
    /// uses `key=value;` pairs: `AccountEndpoint` and `ResourceToken`.
    pub fn from_data_source(data_source: &DataSourceConfig) -> GatewayResult<Self> {
        let mut pairs = HashMap::new();
        for part in data_source.connection_string.split(';') {
            if let Some((key, value)) = part.split_once('=') {
                pairs.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let endpoint = pairs
            .get("AccountEndpoint")
            .ok_or_else(|| ExecuteError::Driver("AccountEndpoint is required".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let auth_token = pairs
            .get("ResourceToken")
            .ok_or_else(|| ExecuteError::Driver("ResourceToken is required".to_string()))?
            .clone();

        let database = data_source
            .options
            .database
            .clone()
            .ok_or_else(|| ExecuteError::Driver("options.database is required".to_string()))?;
        let container = data_source
            .options
            .container
            .clone()
            .ok_or_else(|| ExecuteError::Driver("options.container is required".to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            auth_token,
            database,
            container,
            kind: data_source.database_type,
        })
    }
}

#[async_trait]
impl Connector for CosmosConnector {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    async fn query_json(&self, statement: &SqlStatement) -> GatewayResult<JsonValue> {
        let url = format!(
            "{}/dbs/{}/colls/{}/docs",
            self.endpoint, self.database, self.container
        );
        let parameters: Vec<JsonValue> = statement
            .parameters
            .iter()
            .map(|parameter| {
                json!({
                    "name": format!("@{}", parameter.name),
                    "value": parameter.value.to_json(),
                })
            })
            .collect();

        debug!(sql = %statement.sql, "executing document query");
        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.auth_token)
            .header("Content-Type", "application/query+json")
            .header("x-ms-version", "2018-12-31")
            .header("x-ms-documentdb-isquery", "True")
            .header("x-ms-documentdb-query-enablecrosspartition", "True")
            .json(&json!({ "query": statement.sql, "parameters": parameters }))
            .send()
            .await
            .map_err(|e| ExecuteError::Driver(e.to_string()))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| ExecuteError::Driver(e.to_string()))?;

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("document query failed")
                .to_string();
            return Err(ExecuteError::Database(message).into());
        }

        Ok(body
            .get("Documents")
            .cloned()
            .unwrap_or(JsonValue::Array(Vec::new())))
    }

    async fn execute_mutation(&self, _statement: &SqlStatement) -> GatewayResult<MutationOutcome> {
        Err(PlanError::Unsupported("mutations on document backends".to_string()).into())
    }

    async fn execute_transaction(
        &self,
        _statements: &[SqlStatement],
    ) -> GatewayResult<Vec<MutationOutcome>> {
        Err(PlanError::Unsupported("transactions on document backends".to_string()).into())
    }

    async fn introspect(&self, object: &str) -> GatewayResult<TableShape> {
        // Container shapes are declared in the schema file.
        Err(MetadataError::IntrospectionFailed {
            object: object.to_string(),
            message: "document containers are described by the configured schema file".to_string(),
        }
        .into())
    }

    async fn close(&self, _grace: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_source(connection_string: &str) -> DataSourceConfig {
        serde_json::from_value(json!({
            "database-type": "cosmos-nosql",
            "connection-string": connection_string,
            "options": { "database": "library", "container": "books", "schema": "schema.graphql" }
        }))
        .unwrap()
    }

    #[test]
    fn test_connection_string_parsing() {
        let connector = CosmosConnector::from_data_source(&data_source(
            "AccountEndpoint=https://example.documents.azure.com:443/;ResourceToken=type%3dresource%26sig%3dabc",
        ))
        .unwrap();
        assert_eq!(connector.endpoint, "https://example.documents.azure.com:443");
        assert_eq!(connector.database, "library");
        assert_eq!(connector.container, "books");
    }

    #[test]
    fn test_missing_endpoint_is_rejected() {
        assert!(CosmosConnector::from_data_source(&data_source("ResourceToken=abc")).is_err());
    }
}
