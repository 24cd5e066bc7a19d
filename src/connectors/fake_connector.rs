use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::model::DatabaseKind;
use crate::connectors::connector_trait::Connector;
use crate::metadata::shape::TableShape;
use crate::utils::error::{GatewayResult, MetadataError};
use crate::utils::types::{MutationOutcome, SqlStatement};

/// In-memory driver stand-in: scripted responses plus full statement
/// capture. Tests assert on the captured SQL and parameters and feed the
/// pipeline canned JSON documents.
pub struct FakeConnector {
    kind: DatabaseKind,
    shapes: Mutex<HashMap<String, TableShape>>,
    query_results: Mutex<VecDeque<JsonValue>>,
    mutation_results: Mutex<VecDeque<MutationOutcome>>,
    captured: Mutex<Vec<SqlStatement>>,
}

impl FakeConnector {
    pub fn new(kind: DatabaseKind) -> Self {
        Self {
            kind,
            shapes: Mutex::new(HashMap::new()),
            query_results: Mutex::new(VecDeque::new()),
            mutation_results: Mutex::new(VecDeque::new()),
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Register the shape introspection reports for a physical object.
    pub fn with_shape(self, object: &str, shape: TableShape) -> Self {
        self.shapes
            .lock()
            .expect("shapes lock")
            .insert(object.to_string(), shape);
        self
    }

    /// Queue the next read result.
    pub fn queue_query(&self, document: JsonValue) {
        self.query_results
            .lock()
            .expect("query lock")
            .push_back(document);
    }

    /// Queue the next mutation outcome.
    pub fn queue_mutation(&self, outcome: MutationOutcome) {
        self.mutation_results
            .lock()
            .expect("mutation lock")
            .push_back(outcome);
    }

    /// Every statement executed so far, in order.
    pub fn captured(&self) -> Vec<SqlStatement> {
        self.captured.lock().expect("capture lock").clone()
    }

    pub fn last_statement(&self) -> Option<SqlStatement> {
        self.captured.lock().expect("capture lock").last().cloned()
    }

    fn record(&self, statement: &SqlStatement) {
        self.captured
            .lock()
            .expect("capture lock")
            .push(statement.clone());
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    async fn query_json(&self, statement: &SqlStatement) -> GatewayResult<JsonValue> {
        self.record(statement);
        Ok(self
            .query_results
            .lock()
            .expect("query lock")
            .pop_front()
            .unwrap_or(JsonValue::Null))
    }

    async fn execute_mutation(&self, statement: &SqlStatement) -> GatewayResult<MutationOutcome> {
        self.record(statement);
        Ok(self
            .mutation_results
            .lock()
            .expect("mutation lock")
            .pop_front()
            .unwrap_or(MutationOutcome {
                rows_affected: 1,
                returned: None,
            }))
    }

    async fn execute_transaction(
        &self,
        statements: &[SqlStatement],
    ) -> GatewayResult<Vec<MutationOutcome>> {
        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            outcomes.push(self.execute_mutation(statement).await?);
        }
        Ok(outcomes)
    }

    async fn introspect(&self, object: &str) -> GatewayResult<TableShape> {
        self.shapes
            .lock()
            .expect("shapes lock")
            .get(object)
            .cloned()
            .ok_or_else(|| {
                MetadataError::IntrospectionFailed {
                    object: object.to_string(),
                    message: "no shape registered".to_string(),
                }
                .into()
            })
    }

    async fn close(&self, _grace: Duration) {}
}
