use std::collections::BTreeSet;

use crate::config::model::Cardinality;
use crate::utils::types::{Expression, LiteralValue, OrderDirection};

/// A physical object reference with the alias it carries inside one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub object: String,
    pub alias: String,
}

/// One projected column. `alias` is the JSON key in the produced document;
/// columns projected only for joins, ordering or cursor encoding carry
/// `requested = false` and are stripped by the response shaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub column: String,
    pub alias: String,
    pub requested: bool,
}

impl ProjectedColumn {
    pub fn requested(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: alias.into(),
            requested: true,
        }
    }

    pub fn internal(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            alias: column.clone(),
            column,
            requested: false,
        }
    }
}

/// ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByColumn {
    pub column: String,
    pub direction: OrderDirection,
}

/// Whether a (sub)query produces a JSON object or a JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Object,
    Array,
}

/// Which connection sub-fields the caller selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSelection {
    pub items: bool,
    pub has_next_page: bool,
    pub end_cursor: bool,
}

/// Link-table traversal of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkThrough {
    pub object: String,
    pub alias: String,
    /// Columns on the parent entity matched against the link table.
    pub parent_columns: Vec<String>,
    /// Link-table columns referencing the parent side.
    pub parent_link_columns: Vec<String>,
    /// Link-table columns referencing the child side.
    pub child_link_columns: Vec<String>,
    /// Columns on the child entity matched against the link table.
    pub child_columns: Vec<String>,
}

/// A nested selection compiled as a correlated subquery of its parent.
#[derive(Debug, Clone)]
pub struct NestedQuery {
    /// JSON key of the navigation field in the parent document.
    pub field: String,
    pub cardinality: Cardinality,
    /// `(parent column, child column)` equality pairs; empty when the
    /// relationship goes through a link table.
    pub join_on: Vec<(String, String)>,
    pub link: Option<LinkThrough>,
    /// Connection sub-field selection for to-many navigations.
    pub connection: Option<ConnectionSelection>,
    pub query: SqlQueryStructure,
}

/// Aggregation functions available under groupBy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    CountDistinct,
}

impl AggregationFn {
    pub fn from_name(name: &str) -> Option<AggregationFn> {
        match name {
            "count" => Some(AggregationFn::Count),
            "sum" => Some(AggregationFn::Sum),
            "avg" => Some(AggregationFn::Avg),
            "min" => Some(AggregationFn::Min),
            "max" => Some(AggregationFn::Max),
            "countDistinct" => Some(AggregationFn::CountDistinct),
            _ => None,
        }
    }
}

/// One requested aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub function: AggregationFn,
    pub column: String,
    pub alias: String,
}

/// GROUP BY clause of an aggregation query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupByClause {
    pub by: Vec<String>,
    pub aggregations: Vec<Aggregation>,
}

/// The compiled form of one read: a rooted tree mirroring the requested
/// selection, lowered to SQL by the dialect-aware builder.
#[derive(Debug, Clone)]
pub struct SqlQueryStructure {
    pub entity: String,
    pub source: SourceObject,
    pub columns: Vec<ProjectedColumn>,
    /// AND-combined WHERE predicates, authorization predicate included.
    pub predicates: Vec<Expression>,
    pub order_by: Vec<OrderByColumn>,
    /// Row limit as sent to the database (`first + 1` when paginating).
    pub limit: Option<u64>,
    /// Page size the caller asked for.
    pub first: Option<u64>,
    pub children: Vec<NestedQuery>,
    pub shape: JsonShape,
    /// Authorized column mask of this entity, applied by the shaper.
    pub mask: BTreeSet<String>,
    pub group_by: Option<GroupByClause>,
}

impl SqlQueryStructure {
    pub fn new(entity: impl Into<String>, source: SourceObject, shape: JsonShape) -> Self {
        Self {
            entity: entity.into(),
            source,
            columns: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            first: None,
            children: Vec::new(),
            shape,
            mask: BTreeSet::new(),
            group_by: None,
        }
    }

    /// Project a column for internal use unless an equally-named projection
    /// already exists.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c.alias == column) {
            self.columns.push(ProjectedColumn::internal(column));
        }
    }
}

/// Mutation kinds the planner produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Upsert,
    UpsertIncremental,
}

/// The compiled form of one mutation statement.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    pub kind: MutationKind,
    pub entity: String,
    pub source: SourceObject,
    /// Column assignments for INSERT / UPDATE.
    pub values: Vec<(String, LiteralValue)>,
    /// Primary key bindings identifying the target row.
    pub key: Vec<(String, LiteralValue)>,
    /// Authorization predicate conjoined into the WHERE clause.
    pub predicate: Option<Expression>,
    /// Columns the statement returns (primary key).
    pub returning: Vec<String>,
    pub mask: BTreeSet<String>,
}

/// A planned stored procedure invocation.
#[derive(Debug, Clone)]
pub struct ExecutePlan {
    pub entity: String,
    pub object: String,
    pub parameters: Vec<(String, LiteralValue)>,
    pub requested_columns: Vec<String>,
    pub mask: BTreeSet<String>,
}

/// A mutation plus the read that shapes its response.
#[derive(Debug, Clone)]
pub struct PlannedMutation {
    pub plan: MutationPlan,
    /// Re-select through the read path; for creates the key predicates are
    /// injected from the returned row before lowering.
    pub read: Option<SqlQueryStructure>,
}

/// One planned root operation.
#[derive(Debug, Clone)]
pub enum PlannedOperation {
    Query(SqlQueryStructure),
    GroupBy(SqlQueryStructure),
    Mutation(PlannedMutation),
    Execute(ExecutePlan),
}

/// Root operation type of a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// A planned top-level GraphQL field.
#[derive(Debug, Clone)]
pub struct PlannedField {
    /// Output key (alias or field name).
    pub alias: String,
    pub field_name: String,
    pub operation: PlannedOperation,
    /// Present for connection-returning fields.
    pub connection: Option<ConnectionSelection>,
}

/// A fully planned GraphQL request.
#[derive(Debug, Clone)]
pub struct GraphQlPlan {
    pub operation_kind: OperationKind,
    pub fields: Vec<PlannedField>,
}
