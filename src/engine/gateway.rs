use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::model::{HostMode, RuntimeConfig};
use crate::config::store::ConfigStore;
use crate::config::ConfigWatcher;
use crate::connectors::connector_trait::Connector;
use crate::engine::dialect::Dialect;
use crate::engine::executor::{DefaultQueryExecutor, QueryExecutor, RequestContext};
use crate::engine::planner::QueryPlanner;
use crate::engine::rest_params::parse_query_string;
use crate::engine::shaper;
use crate::engine::sql_builder::SqlBuilder;
use crate::engine::structure::{
    ConnectionSelection, ExecutePlan, JsonShape, MutationKind, MutationPlan, OperationKind,
    PlannedField, PlannedMutation, PlannedOperation, ProjectedColumn, SourceObject,
    SqlQueryStructure,
};
use crate::metadata::provider::CachedMetadataProvider;
use crate::schema::graphql_schema::GatewaySchema;
use crate::schema::route_table::{RestOperation, RouteTable};
use crate::utils::error::{ExecuteError, GatewayError, GatewayResult, MetadataError, PlanError};
use crate::utils::types::{Expression, LiteralValue, Principal};

/// An inbound GraphQL request.
#[derive(Debug, Clone)]
pub struct GraphQlRequest {
    pub query: String,
    pub variables: Option<Map<String, JsonValue>>,
    pub operation_name: Option<String>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }
}

/// An inbound REST request, already stripped of HTTP framing.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub body: Option<JsonValue>,
}

/// A shaped REST response.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl RestResponse {
    fn ok(body: JsonValue) -> Self {
        Self { status: 200, body }
    }
}

/// Everything derived from one published config: schema, routes, metadata
/// cache and SQL builder. Requests capture one snapshot and never observe a
/// mix of two configs.
struct Snapshot {
    config: Arc<RuntimeConfig>,
    schema: Arc<GatewaySchema>,
    routes: Arc<RouteTable>,
    metadata: Arc<CachedMetadataProvider>,
    dialect: Dialect,
}

/// The request-translation engine: snapshot management plus the GraphQL and
/// REST request boundaries.
pub struct Gateway {
    connector: Arc<dyn Connector>,
    executor: Arc<dyn QueryExecutor>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl Gateway {
    /// Build a gateway over a config and a connector, deriving schema and
    /// routes eagerly so startup failures surface before traffic does.
    pub async fn new(
        config: Arc<RuntimeConfig>,
        connector: Arc<dyn Connector>,
    ) -> GatewayResult<Gateway> {
        let executor: Arc<dyn QueryExecutor> =
            Arc::new(DefaultQueryExecutor::new(connector.clone()));
        Self::with_executor(config, connector, executor).await
    }

    /// Build a gateway with a custom executor (tests inject fakes here).
    pub async fn with_executor(
        config: Arc<RuntimeConfig>,
        connector: Arc<dyn Connector>,
        executor: Arc<dyn QueryExecutor>,
    ) -> GatewayResult<Gateway> {
        let snapshot = Self::derive_snapshot(config, connector.clone()).await?;
        Ok(Gateway {
            connector,
            executor,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    async fn derive_snapshot(
        config: Arc<RuntimeConfig>,
        connector: Arc<dyn Connector>,
    ) -> GatewayResult<Snapshot> {
        let metadata = Arc::new(CachedMetadataProvider::new(config.clone(), connector));
        let schema = Arc::new(GatewaySchema::build(&config, metadata.as_ref()).await?);
        let routes = Arc::new(RouteTable::build(&config)?);
        let dialect = Dialect::for_kind(config.data_source.database_type);
        Ok(Snapshot {
            config,
            schema,
            routes,
            metadata,
            dialect,
        })
    }

    /// Derive and publish a new snapshot. In-flight requests keep the one
    /// they captured; the metadata cache of the old snapshot dies with it.
    pub async fn apply_snapshot(&self, config: Arc<RuntimeConfig>) -> GatewayResult<()> {
        let snapshot = Self::derive_snapshot(config, self.connector.clone()).await?;
        *self.snapshot.write().await = Arc::new(snapshot);
        info!("gateway snapshot rebuilt");
        Ok(())
    }

    /// Wire config-file hot-reload into this gateway.
    pub fn spawn_reload(self: &Arc<Self>, store: Arc<ConfigStore>) -> GatewayResult<ConfigWatcher> {
        let gateway = self.clone();
        ConfigWatcher::spawn(store, move |config| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                if let Err(err) = gateway.apply_snapshot(config).await {
                    error!("reloaded config could not be applied: {err}");
                }
            });
        })
    }

    /// Deterministic SDL of the current snapshot's schema.
    pub async fn sdl(&self) -> String {
        self.snapshot.read().await.schema.sdl()
    }

    async fn capture(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    // ------------------------------------------------------------------
    // GraphQL boundary
    // ------------------------------------------------------------------

    /// Execute a GraphQL request and produce the standard response JSON.
    pub async fn execute_graphql(
        &self,
        request: &GraphQlRequest,
        principal: &Principal,
    ) -> JsonValue {
        let snapshot = self.capture().await;
        let development = snapshot.config.is_development();
        match self.run_graphql(&snapshot, request, principal).await {
            Ok(data) => json!({ "data": data }),
            Err(err) => json!({
                "data": JsonValue::Null,
                "errors": [graphql_error_json(&err, development)],
            }),
        }
    }

    async fn run_graphql(
        &self,
        snapshot: &Snapshot,
        request: &GraphQlRequest,
        principal: &Principal,
    ) -> GatewayResult<JsonValue> {
        if !snapshot.config.runtime.graphql.enabled {
            return Err(PlanError::Unsupported("GraphQL is disabled".to_string()).into());
        }

        let mut planner = QueryPlanner::new(
            &snapshot.config,
            &snapshot.schema,
            snapshot.metadata.as_ref(),
            principal,
        );
        let plan = planner.plan_graphql(
            &request.query,
            request.variables.as_ref(),
            request.operation_name.as_deref(),
        )?;

        let context = RequestContext::default();
        let mut data = Map::new();

        match plan.operation_kind {
            OperationKind::Query => {
                // Sibling root fields compile to independent statements and
                // resolve concurrently.
                let futures: Vec<_> = plan
                    .fields
                    .iter()
                    .map(|field| self.resolve_field(snapshot, field, &context))
                    .collect();
                let results = futures::future::join_all(futures).await;
                for (field, result) in plan.fields.iter().zip(results) {
                    data.insert(field.alias.clone(), result?);
                }
            }
            OperationKind::Mutation => {
                if plan.fields.len() > 1 {
                    self.resolve_mutation_batch(snapshot, &plan.fields, &context, &mut data)
                        .await?;
                } else {
                    for field in &plan.fields {
                        let value = self.resolve_field(snapshot, field, &context).await?;
                        data.insert(field.alias.clone(), value);
                    }
                }
            }
        }

        Ok(JsonValue::Object(data))
    }

    async fn resolve_field(
        &self,
        snapshot: &Snapshot,
        field: &PlannedField,
        context: &RequestContext,
    ) -> GatewayResult<JsonValue> {
        let builder = SqlBuilder::new(snapshot.dialect);
        match &field.operation {
            PlannedOperation::Query(structure) => {
                let statement = builder.build_select(structure)?;
                let document = self.executor.fetch_json(&statement, context).await?;
                match structure.shape {
                    JsonShape::Array => {
                        let page = shaper::shape_list(structure, document)?;
                        let selection = field.connection.unwrap_or(ConnectionSelection {
                            items: true,
                            has_next_page: true,
                            end_cursor: true,
                        });
                        Ok(shaper::connection_object(page, selection))
                    }
                    JsonShape::Object => Ok(shaper::shape_object(structure, document)?
                        .unwrap_or(JsonValue::Null)),
                }
            }
            PlannedOperation::GroupBy(structure) => {
                let statement = builder.build_select(structure)?;
                let document = self.executor.fetch_json(&statement, context).await?;
                Ok(JsonValue::Array(shaper::shape_group_by(structure, document)?))
            }
            PlannedOperation::Mutation(planned) => {
                self.resolve_mutation(snapshot, planned, context).await
            }
            PlannedOperation::Execute(plan) => self.resolve_execute(snapshot, plan, context).await,
        }
    }

    async fn resolve_mutation(
        &self,
        snapshot: &Snapshot,
        planned: &PlannedMutation,
        context: &RequestContext,
    ) -> GatewayResult<JsonValue> {
        let builder = SqlBuilder::new(snapshot.dialect);
        let statement = builder.build_mutation(&planned.plan)?;
        let outcome = self.executor.run_mutation(&statement, context).await?;
        self.shape_mutation_outcome(snapshot, planned, outcome.rows_affected, outcome.returned, context)
            .await
    }

    /// Multiple mutations run inside one transaction; all-or-nothing.
    async fn resolve_mutation_batch(
        &self,
        snapshot: &Snapshot,
        fields: &[PlannedField],
        context: &RequestContext,
        data: &mut Map<String, JsonValue>,
    ) -> GatewayResult<()> {
        let builder = SqlBuilder::new(snapshot.dialect);
        let mut statements = Vec::new();
        let mut planned_mutations = Vec::new();
        for field in fields {
            match &field.operation {
                PlannedOperation::Mutation(planned) => {
                    statements.push(builder.build_mutation(&planned.plan)?);
                    planned_mutations.push(planned);
                }
                _ => {
                    return Err(PlanError::Unsupported(
                        "only entity mutations may be batched".to_string(),
                    )
                    .into())
                }
            }
        }

        let outcomes = self.executor.run_transaction(&statements, context).await?;
        for ((field, planned), outcome) in
            fields.iter().zip(planned_mutations).zip(outcomes)
        {
            let value = self
                .shape_mutation_outcome(
                    snapshot,
                    planned,
                    outcome.rows_affected,
                    outcome.returned,
                    context,
                )
                .await?;
            data.insert(field.alias.clone(), value);
        }
        Ok(())
    }

    async fn shape_mutation_outcome(
        &self,
        snapshot: &Snapshot,
        planned: &PlannedMutation,
        rows_affected: u64,
        returned: Option<JsonValue>,
        context: &RequestContext,
    ) -> GatewayResult<JsonValue> {
        let plan = &planned.plan;

        if rows_affected == 0
            && matches!(plan.kind, MutationKind::Update | MutationKind::Delete)
        {
            return Err(self.missing_row_error(snapshot, plan, context).await);
        }

        match plan.kind {
            MutationKind::Delete => {
                let row = returned_row(returned).unwrap_or(JsonValue::Object(Map::new()));
                Ok(mask_flat_row(row, &plan.mask))
            }
            _ => {
                let Some(mut read) = planned.read.clone() else {
                    let row = returned_row(returned).unwrap_or(JsonValue::Null);
                    return Ok(mask_flat_row(row, &plan.mask));
                };

                // Creates learn the key only from the returned row; updates
                // and upserts planned it in already.
                if plan.kind == MutationKind::Create {
                    let row = returned_row(returned).ok_or_else(|| {
                        GatewayError::Internal(
                            "the database returned no key for the mutated row".to_string(),
                        )
                    })?;
                    for column in &plan.returning {
                        let value = row.get(column).and_then(LiteralValue::from_json).ok_or_else(
                            || {
                                GatewayError::Internal(format!(
                                    "returned row is missing key column '{column}'"
                                ))
                            },
                        )?;
                        read.predicates
                            .push(Expression::column_eq(column.clone(), value));
                    }
                }

                let builder = SqlBuilder::new(snapshot.dialect);
                let statement = builder.build_select(&read)?;
                let document = self.executor.fetch_json(&statement, context).await?;
                Ok(shaper::shape_object(&read, document)?.unwrap_or(JsonValue::Null))
            }
        }
    }

    /// Zero rows from an update or delete: the row is missing, or the auth
    /// predicate filtered it. Development mode runs a key-only probe to tell
    /// the two apart; production collapses both to not-found.
    async fn missing_row_error(
        &self,
        snapshot: &Snapshot,
        plan: &MutationPlan,
        context: &RequestContext,
    ) -> GatewayError {
        if snapshot.config.runtime.host.mode == HostMode::Development && plan.predicate.is_some() {
            let probe = existence_probe(plan);
            let builder = SqlBuilder::new(snapshot.dialect);
            if let Ok(statement) = builder.build_select(&probe) {
                if let Ok(document) = self.executor.fetch_json(&statement, context).await {
                    if !document.is_null() {
                        return crate::utils::error::AuthError::RowNotPermitted(
                            plan.entity.clone(),
                        )
                        .into();
                    }
                }
            }
        }
        ExecuteError::NotFound.into()
    }

    async fn resolve_execute(
        &self,
        snapshot: &Snapshot,
        plan: &ExecutePlan,
        context: &RequestContext,
    ) -> GatewayResult<JsonValue> {
        let builder = SqlBuilder::new(snapshot.dialect);
        let (statement, via_query) = builder.build_procedure(plan)?;
        let document = if via_query {
            self.executor.fetch_json(&statement, context).await?
        } else {
            let outcome = self.executor.run_mutation(&statement, context).await?;
            outcome.returned.unwrap_or(JsonValue::Array(Vec::new()))
        };

        let rows = match document {
            JsonValue::Null => Vec::new(),
            JsonValue::Array(rows) => rows,
            row => vec![row],
        };
        let shaped = rows
            .into_iter()
            .map(|row| mask_procedure_row(row, plan))
            .collect();
        Ok(JsonValue::Array(shaped))
    }

    // ------------------------------------------------------------------
    // REST boundary
    // ------------------------------------------------------------------

    /// Execute a REST request and produce the status + JSON body.
    pub async fn execute_rest(&self, request: &RestRequest, principal: &Principal) -> RestResponse {
        let snapshot = self.capture().await;
        let development = snapshot.config.is_development();
        match self.run_rest(&snapshot, request, principal).await {
            Ok(response) => response,
            Err(err) => RestResponse {
                status: err.status(),
                body: json!({
                    "error": {
                        "code": err.sub_code().as_str(),
                        "status": err.status(),
                        "message": err.client_message(development),
                    }
                }),
            },
        }
    }

    async fn run_rest(
        &self,
        snapshot: &Snapshot,
        request: &RestRequest,
        principal: &Principal,
    ) -> GatewayResult<RestResponse> {
        if !snapshot.config.runtime.rest.enabled {
            return Err(MetadataError::UnknownEntity(request.path.clone()).into());
        }

        let route = snapshot
            .routes
            .resolve(&request.path)
            .ok_or_else(|| MetadataError::UnknownEntity(request.path.clone()))?;
        let operation = RestOperation::from_method(&request.method)
            .ok_or_else(|| PlanError::Unsupported(format!("method {}", request.method)))?;
        let query = parse_query_string(&request.query_string)?;

        let mut planner = QueryPlanner::new(
            &snapshot.config,
            &snapshot.schema,
            snapshot.metadata.as_ref(),
            principal,
        );
        let planned = planner
            .plan_rest(
                &route.entity,
                operation,
                &route.key_segments,
                &query,
                request.body.as_ref(),
            )
            .await?;

        let context = RequestContext::default();
        let builder = SqlBuilder::new(snapshot.dialect);

        match planned {
            PlannedOperation::Query(structure) => {
                let statement = builder.build_select(&structure)?;
                let document = self.executor.fetch_json(&statement, &context).await?;
                match structure.shape {
                    JsonShape::Array => {
                        let page = shaper::shape_list(&structure, document)?;
                        Ok(RestResponse::ok(shaper::rest_envelope(page, &request.path)))
                    }
                    JsonShape::Object => match shaper::shape_object(&structure, document)? {
                        Some(row) => Ok(RestResponse::ok(json!({ "value": [row] }))),
                        None => Err(ExecuteError::NotFound.into()),
                    },
                }
            }
            PlannedOperation::Mutation(planned) => {
                let kind = planned.plan.kind;
                let statement = builder.build_mutation(&planned.plan)?;
                let outcome = self.executor.run_mutation(&statement, &context).await?;
                let value = self
                    .shape_mutation_outcome(
                        snapshot,
                        &planned,
                        outcome.rows_affected,
                        outcome.returned,
                        &context,
                    )
                    .await?;
                match kind {
                    MutationKind::Delete => Ok(RestResponse {
                        status: 204,
                        body: JsonValue::Null,
                    }),
                    MutationKind::Create => Ok(RestResponse {
                        status: 201,
                        body: json!({ "value": [value] }),
                    }),
                    _ => Ok(RestResponse::ok(json!({ "value": [value] }))),
                }
            }
            PlannedOperation::Execute(_) | PlannedOperation::GroupBy(_) => Err(
                PlanError::Unsupported("operation not available over REST".to_string()).into(),
            ),
        }
    }
}

/// Builder threading explicit dependencies into a [`Gateway`].
pub struct GatewayBuilder {
    config: Option<Arc<RuntimeConfig>>,
    connector: Option<Arc<dyn Connector>>,
    executor: Option<Arc<dyn QueryExecutor>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            connector: None,
            executor: None,
        }
    }

    pub fn with_config(mut self, config: Arc<RuntimeConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub async fn build(self) -> GatewayResult<Gateway> {
        let config = self
            .config
            .ok_or_else(|| GatewayError::Internal("a config is required".to_string()))?;
        let connector = self
            .connector
            .ok_or_else(|| GatewayError::Internal("a connector is required".to_string()))?;
        match self.executor {
            Some(executor) => Gateway::with_executor(config, connector, executor).await,
            None => Gateway::new(config, connector).await,
        }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn graphql_error_json(err: &GatewayError, development: bool) -> JsonValue {
    json!({
        "message": err.client_message(development),
        "extensions": {
            "code": err.sub_code().as_str(),
            "status": err.status(),
        }
    })
}

/// First returned row of a mutation outcome.
fn returned_row(returned: Option<JsonValue>) -> Option<JsonValue> {
    match returned {
        Some(JsonValue::Array(rows)) => rows.into_iter().next(),
        Some(JsonValue::Object(map)) => Some(JsonValue::Object(map)),
        _ => None,
    }
}

fn mask_flat_row(row: JsonValue, mask: &std::collections::BTreeSet<String>) -> JsonValue {
    match row {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(key, _)| mask.contains(key))
                .collect(),
        ),
        other => other,
    }
}

fn mask_procedure_row(row: JsonValue, plan: &ExecutePlan) -> JsonValue {
    match row {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(key, _)| {
                    plan.mask.contains(key)
                        && (plan.requested_columns.is_empty()
                            || plan.requested_columns.iter().any(|c| c == key))
                })
                .collect(),
        ),
        other => other,
    }
}

/// Key-only probe distinguishing a missing row from a policy-filtered one.
fn existence_probe(plan: &MutationPlan) -> SqlQueryStructure {
    let mut probe = SqlQueryStructure::new(
        plan.entity.clone(),
        SourceObject {
            object: plan.source.object.clone(),
            alias: "probe".to_string(),
        },
        JsonShape::Object,
    );
    for (column, value) in &plan.key {
        probe
            .columns
            .push(ProjectedColumn::requested(column, column));
        probe.mask.insert(column.clone());
        probe
            .predicates
            .push(Expression::column_eq(column.clone(), value.clone()));
    }
    probe.limit = Some(1);
    probe
}
