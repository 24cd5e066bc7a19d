use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::connectors::connector_trait::Connector;
use crate::utils::error::{ExecuteError, GatewayResult};
use crate::utils::types::{MutationOutcome, SqlStatement};

/// Default per-request statement timeout.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on concurrent database commands per data source.
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// Per-request execution context: deadline plus the client's cancellation
/// token. Cancellation propagates to in-flight commands and partial results
/// are never returned.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub deadline: Instant,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_STATEMENT_TIMEOUT)
    }
}

/// Executes lowered statements against a connector.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a read statement and return its JSON document.
    async fn fetch_json(
        &self,
        statement: &SqlStatement,
        context: &RequestContext,
    ) -> GatewayResult<JsonValue>;

    /// Run a single mutation statement.
    async fn run_mutation(
        &self,
        statement: &SqlStatement,
        context: &RequestContext,
    ) -> GatewayResult<MutationOutcome>;

    /// Run several mutation statements in one transaction.
    async fn run_transaction(
        &self,
        statements: &[SqlStatement],
        context: &RequestContext,
    ) -> GatewayResult<Vec<MutationOutcome>>;
}

/// Default executor: a connector guarded by a per-data-source semaphore,
/// statement timeouts and cancellation.
pub struct DefaultQueryExecutor {
    connector: Arc<dyn Connector>,
    semaphore: Arc<Semaphore>,
    statement_timeout: Duration,
}

impl DefaultQueryExecutor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_limits(connector, DEFAULT_MAX_CONCURRENCY, DEFAULT_STATEMENT_TIMEOUT)
    }

    pub fn with_limits(
        connector: Arc<dyn Connector>,
        max_concurrency: usize,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            statement_timeout,
        }
    }

    /// Drain the underlying pool, giving connections in use a grace period.
    pub async fn shutdown(&self, grace: Duration) {
        self.connector.close(grace).await;
    }

    /// Run `work` under the back-pressure semaphore, the statement timeout
    /// and the request's cancellation token.
    async fn guarded<T, F>(&self, context: &RequestContext, work: F) -> GatewayResult<T>
    where
        F: std::future::Future<Output = GatewayResult<T>>,
    {
        let _permit = tokio::time::timeout(context.remaining(), self.semaphore.acquire())
            .await
            .map_err(|_| {
                warn!("request deadline elapsed while waiting for a database slot");
                ExecuteError::Busy
            })?
            .map_err(|_| ExecuteError::Busy)?;

        let budget = self.statement_timeout.min(context.remaining());
        tokio::select! {
            _ = context.cancellation.cancelled() => Err(ExecuteError::Cancelled.into()),
            outcome = tokio::time::timeout(budget, work) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ExecuteError::Timeout.into()),
            },
        }
    }
}

#[async_trait]
impl QueryExecutor for DefaultQueryExecutor {
    async fn fetch_json(
        &self,
        statement: &SqlStatement,
        context: &RequestContext,
    ) -> GatewayResult<JsonValue> {
        self.guarded(context, self.connector.query_json(statement))
            .await
    }

    async fn run_mutation(
        &self,
        statement: &SqlStatement,
        context: &RequestContext,
    ) -> GatewayResult<MutationOutcome> {
        self.guarded(context, self.connector.execute_mutation(statement))
            .await
    }

    async fn run_transaction(
        &self,
        statements: &[SqlStatement],
        context: &RequestContext,
    ) -> GatewayResult<Vec<MutationOutcome>> {
        self.guarded(context, self.connector.execute_transaction(statements))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::DatabaseKind;
    use crate::metadata::shape::TableShape;

    struct SlowConnector {
        delay: Duration,
    }

    #[async_trait]
    impl Connector for SlowConnector {
        fn kind(&self) -> DatabaseKind {
            DatabaseKind::PostgreSql
        }

        async fn query_json(&self, _statement: &SqlStatement) -> GatewayResult<JsonValue> {
            tokio::time::sleep(self.delay).await;
            Ok(JsonValue::Null)
        }

        async fn execute_mutation(
            &self,
            _statement: &SqlStatement,
        ) -> GatewayResult<MutationOutcome> {
            tokio::time::sleep(self.delay).await;
            Ok(MutationOutcome::default())
        }

        async fn execute_transaction(
            &self,
            statements: &[SqlStatement],
        ) -> GatewayResult<Vec<MutationOutcome>> {
            Ok(vec![MutationOutcome::default(); statements.len()])
        }

        async fn introspect(&self, _object: &str) -> GatewayResult<TableShape> {
            Ok(TableShape::default())
        }
    }

    fn statement() -> SqlStatement {
        SqlStatement::new("SELECT 1", vec![])
    }

    #[tokio::test]
    async fn test_fast_query_succeeds() {
        let executor = DefaultQueryExecutor::with_limits(
            Arc::new(SlowConnector {
                delay: Duration::from_millis(1),
            }),
            2,
            Duration::from_secs(1),
        );
        let context = RequestContext::with_timeout(Duration::from_secs(1));
        assert!(executor.fetch_json(&statement(), &context).await.is_ok());
    }

    #[tokio::test]
    async fn test_statement_timeout_maps_to_timeout_error() {
        let executor = DefaultQueryExecutor::with_limits(
            Arc::new(SlowConnector {
                delay: Duration::from_secs(5),
            }),
            2,
            Duration::from_millis(20),
        );
        let context = RequestContext::with_timeout(Duration::from_secs(5));
        let err = executor
            .fetch_json(&statement(), &context)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::utils::error::GatewayError::Execute(ExecuteError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_query() {
        let executor = DefaultQueryExecutor::with_limits(
            Arc::new(SlowConnector {
                delay: Duration::from_secs(5),
            }),
            2,
            Duration::from_secs(5),
        );
        let context = RequestContext::with_timeout(Duration::from_secs(5));
        context.cancellation.cancel();
        let err = executor
            .fetch_json(&statement(), &context)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::utils::error::GatewayError::Execute(ExecuteError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_exhausted_semaphore_yields_service_busy() {
        let connector = Arc::new(SlowConnector {
            delay: Duration::from_secs(2),
        });
        let executor = Arc::new(DefaultQueryExecutor::with_limits(
            connector,
            1,
            Duration::from_secs(5),
        ));

        let busy_executor = executor.clone();
        let long_running = tokio::spawn(async move {
            let context = RequestContext::with_timeout(Duration::from_secs(5));
            busy_executor.fetch_json(&statement(), &context).await
        });

        // Give the first query time to take the only slot.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let context = RequestContext::with_timeout(Duration::from_millis(50));
        let err = executor
            .fetch_json(&statement(), &context)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::utils::error::GatewayError::Execute(ExecuteError::Busy)
        ));

        let _ = long_running.await;
    }
}
