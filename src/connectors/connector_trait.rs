use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::model::DatabaseKind;
use crate::metadata::shape::TableShape;
use crate::utils::error::GatewayResult;
use crate::utils::types::{MutationOutcome, SqlStatement};

/// Thin connection+execute interface over a backend database.
///
/// The engine compiles every request into a [`SqlStatement`] whose text asks
/// the database for a single JSON document, so `query_json` returns exactly
/// that document. Drivers live behind this trait; tests inject a fake.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The backend kind this connector speaks to.
    fn kind(&self) -> DatabaseKind;

    /// Execute a read statement and return the JSON document produced by the
    /// database's JSON projection. `Null` when no row matched.
    async fn query_json(&self, statement: &SqlStatement) -> GatewayResult<JsonValue>;

    /// Execute a single mutation statement.
    async fn execute_mutation(&self, statement: &SqlStatement) -> GatewayResult<MutationOutcome>;

    /// Execute several mutation statements in one transaction; all-or-nothing.
    async fn execute_transaction(
        &self,
        statements: &[SqlStatement],
    ) -> GatewayResult<Vec<MutationOutcome>>;

    /// Discover the shape of a physical object (columns, keys, foreign keys).
    async fn introspect(&self, object: &str) -> GatewayResult<TableShape>;

    /// Drain and close the underlying pool. Connections still in use get
    /// `grace` to come back before being closed forcibly.
    async fn close(&self, _grace: Duration) {}
}
