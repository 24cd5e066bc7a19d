use std::collections::HashMap;

use async_graphql_parser::types::{
    DocumentOperations, Field, OperationDefinition, OperationType, Selection, SelectionSet,
};
use async_graphql_parser::{parse_query, Positioned};
use async_graphql_value::{ConstValue, Name};
use serde_json::Value as JsonValue;

use self::args::ArgMap;

use crate::auth::resolver::{authorize, Decision};
use crate::config::model::{ActionKind, Cardinality, RelationshipConfig, RuntimeConfig};
use crate::engine::cursor::{decode_cursor, seek_predicate};
use crate::engine::rest_params::RestQuery;
use crate::engine::structure::{
    Aggregation, AggregationFn, ConnectionSelection, ExecutePlan, GraphQlPlan, GroupByClause,
    JsonShape, LinkThrough, MutationKind, MutationPlan, NestedQuery, OperationKind, OrderByColumn,
    PlannedField, PlannedMutation, PlannedOperation, ProjectedColumn, SourceObject,
    SqlQueryStructure,
};
use crate::metadata::provider::{infer_join, MetadataProvider};
use crate::metadata::shape::ColumnType;
use crate::schema::graphql_schema::{EntitySchema, GatewaySchema, RootField, RootFieldKind};
use crate::schema::route_table::{bind_key_segments, RestOperation};
use crate::utils::error::{GatewayResult, PlanError};
use crate::utils::types::{
    Expression, LiteralValue, OrderDirection, Principal, MAX_PAGE_SIZE,
};

/// Argument lists keep source order, which matters for composite orderBy.
mod args {
    use super::*;

    /// Small ordered map over a field's const-resolved arguments.
    #[derive(Debug, Default)]
    pub struct ArgMap {
        entries: Vec<(String, ConstValue)>,
    }

    impl ArgMap {
        pub fn insert(&mut self, name: String, value: ConstValue) {
            self.entries.push((name, value));
        }

        pub fn get(&self, name: &str) -> Option<&ConstValue> {
            self.entries
                .iter()
                .find(|(entry, _)| entry == name)
                .map(|(_, value)| value)
        }

        pub fn names(&self) -> impl Iterator<Item = &str> {
            self.entries.iter().map(|(name, _)| name.as_str())
        }

        pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstValue)> {
            self.entries
                .iter()
                .map(|(name, value)| (name.as_str(), value))
        }
    }
}

/// Compiles GraphQL selections and REST requests into query structures.
/// One planner instance serves one request against one config snapshot.
pub struct QueryPlanner<'a> {
    config: &'a RuntimeConfig,
    schema: &'a GatewaySchema,
    metadata: &'a dyn MetadataProvider,
    principal: &'a Principal,
    alias_counter: usize,
    variables: HashMap<String, ConstValue>,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(
        config: &'a RuntimeConfig,
        schema: &'a GatewaySchema,
        metadata: &'a dyn MetadataProvider,
        principal: &'a Principal,
    ) -> Self {
        Self {
            config,
            schema,
            metadata,
            principal,
            alias_counter: 0,
            variables: HashMap::new(),
        }
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.alias_counter);
        self.alias_counter += 1;
        alias
    }

    fn next_link_alias(&mut self) -> String {
        let alias = format!("l{}", self.alias_counter);
        self.alias_counter += 1;
        alias
    }

    // ------------------------------------------------------------------
    // GraphQL planning
    // ------------------------------------------------------------------

    /// Plan a GraphQL document against the synthesized schema.
    pub fn plan_graphql(
        &mut self,
        query_source: &str,
        variables: Option<&serde_json::Map<String, JsonValue>>,
        operation_name: Option<&str>,
    ) -> GatewayResult<GraphQlPlan> {
        let document =
            parse_query(query_source).map_err(|e| PlanError::DocumentSyntax(e.to_string()))?;

        if !document.fragments.is_empty() {
            return Err(PlanError::Unsupported("fragment definitions".to_string()).into());
        }

        let operation = select_operation(&document.operations, operation_name)?;

        let operation_kind = match operation.ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => {
                return Err(PlanError::Unsupported("subscriptions".to_string()).into())
            }
        };

        self.check_depth(&operation.selection_set.node)?;

        self.variables = self.resolve_variable_values(operation, variables)?;

        let mut fields = Vec::new();
        for item in &operation.selection_set.node.items {
            let field = expect_field(item)?;
            let field_name = field.name.node.as_str();

            if field_name.starts_with("__") {
                return Err(self.introspection_error());
            }

            let roots = match operation_kind {
                OperationKind::Query => &self.schema.query_fields,
                OperationKind::Mutation => &self.schema.mutation_fields,
            };
            let root = roots.get(field_name).ok_or_else(|| PlanError::UnknownField {
                parent: match operation_kind {
                    OperationKind::Query => "Query".to_string(),
                    OperationKind::Mutation => "Mutation".to_string(),
                },
                field: field_name.to_string(),
            })?;

            let alias = field
                .alias
                .as_ref()
                .map(|a| a.node.to_string())
                .unwrap_or_else(|| field_name.to_string());

            let root = root.clone();
            let (operation_plan, connection) = self.plan_root_field(field, &root)?;
            fields.push(PlannedField {
                alias,
                field_name: field_name.to_string(),
                operation: operation_plan,
                connection,
            });
        }

        if operation_kind == OperationKind::Mutation
            && fields.len() > 1
            && !self.config.runtime.graphql.multiple_mutations
        {
            return Err(PlanError::MultipleMutationsDisabled.into());
        }

        Ok(GraphQlPlan {
            operation_kind,
            fields,
        })
    }

    fn introspection_error(&self) -> crate::utils::error::GatewayError {
        let allowed = self.config.runtime.graphql.allow_introspection
            || self.config.is_development();
        if allowed {
            // Full introspection documents are answered by the host GraphQL
            // engine from the rendered SDL, not compiled to SQL.
            PlanError::Unsupported("introspection is served by the host engine".to_string()).into()
        } else {
            PlanError::IntrospectionDisabled.into()
        }
    }

    fn check_depth(&self, selection_set: &SelectionSet) -> GatewayResult<()> {
        if let Some(limit) = self.config.runtime.graphql.depth_limit {
            if limit != -1 {
                let depth = selection_depth(selection_set);
                if depth > limit as u32 {
                    return Err(PlanError::DepthLimitExceeded { depth, limit }.into());
                }
            }
        }
        Ok(())
    }

    fn resolve_variable_values(
        &self,
        operation: &OperationDefinition,
        provided: Option<&serde_json::Map<String, JsonValue>>,
    ) -> GatewayResult<HashMap<String, ConstValue>> {
        let mut values = HashMap::new();
        for definition in &operation.variable_definitions {
            let name = definition.node.name.node.to_string();
            if let Some(raw) = provided.and_then(|map| map.get(&name)) {
                let value = ConstValue::from_json(raw.clone())
                    .map_err(|e| PlanError::DocumentSyntax(e.to_string()))?;
                values.insert(name, value);
            } else if let Some(default) = &definition.node.default_value {
                values.insert(name, default.node.clone());
            }
        }
        Ok(values)
    }

    fn const_args(&self, field: &Field) -> GatewayResult<ArgMap> {
        let mut args = ArgMap::default();
        for (name, value) in &field.arguments {
            let resolved = value
                .node
                .clone()
                .into_const_with(|variable: Name| {
                    self.variables.get(variable.as_str()).cloned().ok_or_else(|| {
                        crate::utils::error::GatewayError::from(PlanError::VariableMissing(
                            variable.to_string(),
                        ))
                    })
                })?;
            args.insert(name.node.to_string(), resolved);
        }
        Ok(args)
    }

    fn plan_root_field(
        &mut self,
        field: &Field,
        root: &RootField,
    ) -> GatewayResult<(PlannedOperation, Option<ConnectionSelection>)> {
        let entity_schema = self
            .schema
            .entity(&root.entity)
            .expect("root fields always reference a schema entity")
            .clone();
        let args = self.const_args(field)?;

        match root.kind {
            RootFieldKind::PkQuery => {
                let plan = self.plan_pk_query(&entity_schema, &args, &field.selection_set.node)?;
                Ok((PlannedOperation::Query(plan), None))
            }
            RootFieldKind::ListQuery => {
                let (plan, connection) =
                    self.plan_list_query(&entity_schema, &args, &field.selection_set.node)?;
                Ok((PlannedOperation::Query(plan), Some(connection)))
            }
            RootFieldKind::GroupBy => {
                let plan = self.plan_group_by(&entity_schema, &args, &field.selection_set.node)?;
                Ok((PlannedOperation::GroupBy(plan), None))
            }
            RootFieldKind::Create => {
                let plan = self.plan_create(&entity_schema, &args, &field.selection_set.node)?;
                Ok((PlannedOperation::Mutation(plan), None))
            }
            RootFieldKind::Update => {
                let plan = self.plan_update(&entity_schema, &args, &field.selection_set.node)?;
                Ok((PlannedOperation::Mutation(plan), None))
            }
            RootFieldKind::Delete => {
                let plan = self.plan_delete(&entity_schema, &args)?;
                Ok((PlannedOperation::Mutation(plan), None))
            }
            RootFieldKind::Execute => {
                let plan = self.plan_execute(&entity_schema, &args, &field.selection_set.node)?;
                Ok((PlannedOperation::Execute(plan), None))
            }
        }
    }

    fn plan_pk_query(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
        selection_set: &SelectionSet,
    ) -> GatewayResult<SqlQueryStructure> {
        let mut structure = self.build_selection(entity_schema, selection_set, JsonShape::Object)?;
        structure.limit = Some(1);
        let key = self.pk_args(entity_schema, args)?;
        for (column, value) in key {
            structure
                .predicates
                .insert(0, Expression::column_eq(column, value));
        }
        Ok(structure)
    }

    fn plan_list_query(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
        selection_set: &SelectionSet,
    ) -> GatewayResult<(SqlQueryStructure, ConnectionSelection)> {
        let (connection, items) = connection_selection(entity_schema, selection_set)?;
        let mut structure = match items {
            Some(items) => self.build_selection(entity_schema, items, JsonShape::Array)?,
            None => self.build_selection_empty(entity_schema, JsonShape::Array)?,
        };
        self.apply_list_args(&mut structure, entity_schema, args)?;
        Ok((structure, connection))
    }

    /// Walk an entity selection set into a query structure: leaf scalars
    /// become projected columns, navigation fields become correlated child
    /// subqueries, and the entity's own authorization decision is applied.
    fn build_selection(
        &mut self,
        entity_schema: &EntitySchema,
        selection_set: &SelectionSet,
        shape: JsonShape,
    ) -> GatewayResult<SqlQueryStructure> {
        let alias = self.next_alias();
        let mut structure = SqlQueryStructure::new(
            entity_schema.entity.clone(),
            SourceObject {
                object: self.source_object_of(entity_schema),
                alias,
            },
            shape,
        );

        let mut requested_columns: Vec<String> = Vec::new();
        let mut navigations: Vec<(&Positioned<Field>, &RelationshipConfig)> = Vec::new();

        for item in &selection_set.items {
            let field = expect_field(item)?;
            let name = field.name.node.as_str();
            if name.starts_with("__") {
                return Err(self.introspection_error());
            }
            if entity_schema.shape.has_column(name) {
                let output = field
                    .alias
                    .as_ref()
                    .map(|a| a.node.to_string())
                    .unwrap_or_else(|| name.to_string());
                requested_columns.push(name.to_string());
                structure
                    .columns
                    .push(ProjectedColumn::requested(name, output));
            } else if let Some(relationship) = entity_schema.relationship(name) {
                let Selection::Field(positioned) = &item.node else {
                    unreachable!("expect_field returned a field");
                };
                navigations.push((positioned, relationship));
            } else {
                return Err(PlanError::UnknownField {
                    parent: entity_schema.type_name.clone(),
                    field: name.to_string(),
                }
                .into());
            }
        }

        let decision = self.authorize_entity(entity_schema, ActionKind::Read, &requested_columns)?;
        structure.mask = decision.mask;
        if let Some(predicate) = decision.predicate {
            structure.predicates.push(predicate);
        }

        // Keys are always projected for cursors and stable ordering.
        let pk_columns = entity_schema.shape.primary_key.clone();
        for pk in &pk_columns {
            structure.ensure_column(pk);
        }
        if structure.columns.is_empty() {
            if let Some(first_column) = entity_schema.shape.columns.first() {
                structure.ensure_column(&first_column.name.clone());
            }
        }

        for (field, relationship) in navigations {
            let nested = self.build_navigation(entity_schema, &mut structure, field, relationship)?;
            structure.children.push(nested);
        }

        Ok(structure)
    }

    fn build_selection_empty(
        &mut self,
        entity_schema: &EntitySchema,
        shape: JsonShape,
    ) -> GatewayResult<SqlQueryStructure> {
        let empty = SelectionSet::default();
        self.build_selection(entity_schema, &empty, shape)
    }

    fn build_navigation(
        &mut self,
        parent_schema: &EntitySchema,
        parent: &mut SqlQueryStructure,
        field: &Positioned<Field>,
        relationship: &RelationshipConfig,
    ) -> GatewayResult<NestedQuery> {
        let target_schema = self
            .schema
            .entity(&relationship.target_entity)
            .ok_or_else(|| PlanError::UnknownField {
                parent: parent_schema.type_name.clone(),
                field: field.node.name.node.to_string(),
            })?
            .clone();

        let output = field
            .node
            .alias
            .as_ref()
            .map(|a| a.node.to_string())
            .unwrap_or_else(|| field.node.name.node.to_string());

        let (nested_structure, join_on, link, connection) = match relationship.cardinality {
            Cardinality::One => {
                let mut child = self.build_selection(
                    &target_schema,
                    &field.node.selection_set.node,
                    JsonShape::Object,
                )?;
                child.limit = Some(1);
                let join_on = self.join_columns(parent_schema, relationship, &target_schema)?;
                (child, join_on, None, None)
            }
            Cardinality::Many => {
                let args = self.const_args(&field.node)?;
                let (connection, items) =
                    connection_selection(&target_schema, &field.node.selection_set.node)?;
                let mut child = match items {
                    Some(items) => {
                        self.build_selection(&target_schema, items, JsonShape::Array)?
                    }
                    None => self.build_selection_empty(&target_schema, JsonShape::Array)?,
                };
                self.apply_list_args(&mut child, &target_schema, &args)?;

                if relationship.is_linking() {
                    let link = self.link_through(parent_schema, relationship, &target_schema)?;
                    for column in &link.parent_columns {
                        parent.ensure_column(column);
                    }
                    (child, Vec::new(), Some(link), Some(connection))
                } else {
                    let join_on =
                        self.join_columns(parent_schema, relationship, &target_schema)?;
                    (child, join_on, None, Some(connection))
                }
            }
        };

        for (parent_column, _) in &join_on {
            parent.ensure_column(parent_column);
        }

        Ok(NestedQuery {
            field: output,
            cardinality: relationship.cardinality,
            join_on,
            link,
            connection,
            query: nested_structure,
        })
    }

    fn join_columns(
        &self,
        parent_schema: &EntitySchema,
        relationship: &RelationshipConfig,
        target_schema: &EntitySchema,
    ) -> GatewayResult<Vec<(String, String)>> {
        infer_join(
            relationship,
            &parent_schema.entity,
            &self.source_object_of(parent_schema),
            &parent_schema.shape,
            &target_schema.entity,
            &self.source_object_of(target_schema),
            &target_schema.shape,
        )
    }

    fn link_through(
        &mut self,
        parent_schema: &EntitySchema,
        relationship: &RelationshipConfig,
        target_schema: &EntitySchema,
    ) -> GatewayResult<LinkThrough> {
        let object = relationship
            .linking_object
            .clone()
            .expect("is_linking checked by the caller");

        let parent_columns = if relationship.source_fields.is_empty() {
            parent_schema.shape.primary_key.clone()
        } else {
            relationship.source_fields.clone()
        };
        let child_columns = if relationship.target_fields.is_empty() {
            target_schema.shape.primary_key.clone()
        } else {
            relationship.target_fields.clone()
        };

        Ok(LinkThrough {
            object,
            alias: self.next_link_alias(),
            parent_columns,
            parent_link_columns: relationship.linking_source_fields.clone(),
            child_link_columns: relationship.linking_target_fields.clone(),
            child_columns,
        })
    }

    /// Apply `first` / `after` / `filter` / `orderBy` to a list structure.
    fn apply_list_args(
        &mut self,
        structure: &mut SqlQueryStructure,
        entity_schema: &EntitySchema,
        args: &ArgMap,
    ) -> GatewayResult<()> {
        for name in args.names() {
            if !matches!(name, "first" | "after" | "filter" | "orderBy") {
                return Err(PlanError::UnknownArgument(name.to_string()).into());
            }
        }

        if let Some(filter) = args.get("filter") {
            let predicates = self.lower_filter(entity_schema, filter)?;
            structure.predicates.extend(predicates);
        }

        let mut order = match args.get("orderBy") {
            Some(value) => self.lower_order_by(entity_schema, value)?,
            None => Vec::new(),
        };
        // The primary key is appended so keyset pagination stays stable
        // regardless of what the caller ordered by.
        for pk in &entity_schema.shape.primary_key {
            if !order.iter().any(|entry| &entry.column == pk) {
                order.push(OrderByColumn {
                    column: pk.clone(),
                    direction: OrderDirection::Asc,
                });
            }
        }
        for entry in &order {
            structure.ensure_column(&entry.column);
        }
        structure.order_by = order;

        if let Some(first) = args.get("first") {
            let value = match first {
                ConstValue::Number(n) => n.as_i64().unwrap_or(-1),
                _ => -1,
            };
            if value < 1 || value as u64 > MAX_PAGE_SIZE {
                return Err(PlanError::FirstOutOfRange {
                    given: value,
                    cap: MAX_PAGE_SIZE,
                }
                .into());
            }
            structure.first = Some(value as u64);
            // One extra row detects hasNextPage.
            structure.limit = Some(value as u64 + 1);
        }

        if let Some(after) = args.get("after") {
            let ConstValue::String(cursor) = after else {
                return Err(PlanError::InvalidCursor("cursor must be a string".to_string()).into());
            };
            let decoded = decode_cursor(cursor, &structure.order_by)?;
            if let Some(predicate) = seek_predicate(&decoded) {
                structure.predicates.push(predicate);
            }
        }

        Ok(())
    }

    fn lower_filter(
        &self,
        entity_schema: &EntitySchema,
        value: &ConstValue,
    ) -> GatewayResult<Vec<Expression>> {
        let ConstValue::Object(map) = value else {
            return Err(PlanError::InvalidFilter("filter must be an object".to_string()).into());
        };

        let mut predicates = Vec::new();
        for (key, entry) in map {
            match key.as_str() {
                "and" => {
                    let items = expect_list(entry, "and")?;
                    let mut combined = Vec::new();
                    for item in items {
                        combined.extend(self.lower_filter(entity_schema, item)?);
                    }
                    if let Some(expression) = Expression::and_all(combined) {
                        predicates.push(expression);
                    }
                }
                "or" => {
                    let items = expect_list(entry, "or")?;
                    let mut alternatives = Vec::new();
                    for item in items {
                        let combined = self.lower_filter(entity_schema, item)?;
                        if let Some(expression) = Expression::and_all(combined) {
                            alternatives.push(expression);
                        }
                    }
                    if !alternatives.is_empty() {
                        predicates.push(Expression::Or(alternatives));
                    }
                }
                "not" => {
                    let combined = self.lower_filter(entity_schema, entry)?;
                    if let Some(expression) = Expression::and_all(combined) {
                        predicates.push(Expression::Not(Box::new(expression)));
                    }
                }
                column => {
                    let column_def = entity_schema.shape.column(column).ok_or_else(|| {
                        PlanError::InvalidFilter(format!("unknown filter field '{column}'"))
                    })?;
                    if column_def.ty.filter_input().is_none() {
                        return Err(PlanError::InvalidFilter(format!(
                            "column '{column}' does not admit filtering"
                        ))
                        .into());
                    }
                    predicates.extend(lower_scalar_filter(column, entry)?);
                }
            }
        }
        Ok(predicates)
    }

    fn lower_order_by(
        &self,
        entity_schema: &EntitySchema,
        value: &ConstValue,
    ) -> GatewayResult<Vec<OrderByColumn>> {
        let ConstValue::Object(map) = value else {
            return Err(PlanError::InvalidOrderBy("orderBy must be an object".to_string()).into());
        };

        let mut order = Vec::new();
        for (column, direction) in map {
            let column_def = entity_schema.shape.column(column.as_str()).ok_or_else(|| {
                PlanError::InvalidOrderBy(format!("unknown orderBy field '{column}'"))
            })?;
            // Ordering is a metadata operation: the column may lie outside
            // the caller's mask, it just never shows up in output.
            if !column_def.ty.admits_ordering() {
                return Err(PlanError::InvalidOrderBy(format!(
                    "column '{column}' does not admit ordering"
                ))
                .into());
            }
            let direction = match direction {
                ConstValue::Enum(name) if name.as_str() == "ASC" => OrderDirection::Asc,
                ConstValue::Enum(name) if name.as_str() == "DESC" => OrderDirection::Desc,
                ConstValue::String(text) if text == "ASC" => OrderDirection::Asc,
                ConstValue::String(text) if text == "DESC" => OrderDirection::Desc,
                other => {
                    return Err(PlanError::InvalidOrderBy(format!(
                        "direction for '{column}' must be ASC or DESC, got {other}"
                    ))
                    .into())
                }
            };
            order.push(OrderByColumn {
                column: column.to_string(),
                direction,
            });
        }
        Ok(order)
    }

    fn plan_group_by(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
        selection_set: &SelectionSet,
    ) -> GatewayResult<SqlQueryStructure> {
        for item in &selection_set.items {
            let field = expect_field(item)?;
            let name = field.name.node.as_str();
            if !matches!(name, "fields" | "aggregations") {
                return Err(PlanError::UnknownField {
                    parent: "GroupByResult".to_string(),
                    field: name.to_string(),
                }
                .into());
            }
        }

        let by_arg = args
            .get("by")
            .ok_or_else(|| PlanError::UnknownArgument("groupBy requires 'by'".to_string()))?;
        let by_items = expect_list(by_arg, "by")?;
        let mut by = Vec::new();
        for item in by_items {
            let name = match item {
                ConstValue::Enum(name) => name.to_string(),
                ConstValue::String(text) => text.clone(),
                other => {
                    return Err(
                        PlanError::InvalidFilter(format!("invalid groupBy field {other}")).into(),
                    )
                }
            };
            if !entity_schema.shape.has_column(&name) {
                return Err(PlanError::UnknownField {
                    parent: entity_schema.group_by_field_enum(),
                    field: name,
                }
                .into());
            }
            by.push(name);
        }

        let mut aggregations = Vec::new();
        if let Some(aggregations_arg) = args.get("aggregations") {
            for item in expect_list(aggregations_arg, "aggregations")? {
                let ConstValue::Object(map) = item else {
                    return Err(PlanError::InvalidFilter(
                        "aggregation entries must be objects".to_string(),
                    )
                    .into());
                };
                let function_name = match map.get("fn") {
                    Some(ConstValue::Enum(name)) => name.to_string(),
                    Some(ConstValue::String(text)) => text.clone(),
                    _ => {
                        return Err(PlanError::InvalidFilter(
                            "aggregation requires 'fn'".to_string(),
                        )
                        .into())
                    }
                };
                let function = AggregationFn::from_name(&function_name).ok_or_else(|| {
                    PlanError::InvalidFilter(format!("unknown aggregation '{function_name}'"))
                })?;
                let column = match map.get("field") {
                    Some(ConstValue::String(text)) => text.clone(),
                    Some(ConstValue::Enum(name)) => name.to_string(),
                    _ => {
                        return Err(PlanError::InvalidFilter(
                            "aggregation requires 'field'".to_string(),
                        )
                        .into())
                    }
                };
                if !entity_schema.shape.has_column(&column) {
                    return Err(PlanError::UnknownField {
                        parent: entity_schema.type_name.clone(),
                        field: column,
                    }
                    .into());
                }
                let alias = match map.get("alias") {
                    Some(ConstValue::String(text)) => text.clone(),
                    _ => format!("{function_name}_{column}"),
                };
                aggregations.push(Aggregation {
                    function,
                    column,
                    alias,
                });
            }
        }

        // Aggregated columns reveal data, so they are authorized like reads.
        let mut touched: Vec<String> = by.clone();
        touched.extend(aggregations.iter().map(|a| a.column.clone()));
        let decision = self.authorize_entity(entity_schema, ActionKind::Read, &touched)?;

        let alias = self.next_alias();
        let mut structure = SqlQueryStructure::new(
            entity_schema.entity.clone(),
            SourceObject {
                object: self.source_object_of(entity_schema),
                alias,
            },
            JsonShape::Array,
        );
        structure.mask = decision.mask;
        if let Some(predicate) = decision.predicate {
            structure.predicates.push(predicate);
        }
        if let Some(filter) = args.get("filter") {
            let predicates = self.lower_filter(entity_schema, filter)?;
            structure.predicates.extend(predicates);
        }
        structure.group_by = Some(GroupByClause { by, aggregations });
        Ok(structure)
    }

    fn plan_create(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
        selection_set: &SelectionSet,
    ) -> GatewayResult<PlannedMutation> {
        let item = args
            .get("item")
            .ok_or_else(|| PlanError::InvalidBody("'item' argument is required".to_string()))?;
        let values = self.item_values(entity_schema, item, true)?;
        let write_columns: Vec<String> = values.iter().map(|(column, _)| column.clone()).collect();
        let decision =
            self.authorize_entity(entity_schema, ActionKind::Create, &write_columns)?;

        let plan = MutationPlan {
            kind: MutationKind::Create,
            entity: entity_schema.entity.clone(),
            source: SourceObject {
                object: self.source_object_of(entity_schema),
                alias: self.next_alias(),
            },
            values,
            key: Vec::new(),
            // Insert statements have no existing row to evaluate a policy
            // against; read-back goes through the read path below.
            predicate: None,
            returning: entity_schema.shape.primary_key.clone(),
            mask: decision.mask,
        };

        let mut read = self.build_selection(entity_schema, selection_set, JsonShape::Object)?;
        read.limit = Some(1);
        Ok(PlannedMutation {
            plan,
            read: Some(read),
        })
    }

    fn plan_update(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
        selection_set: &SelectionSet,
    ) -> GatewayResult<PlannedMutation> {
        let key = self.pk_args(entity_schema, args)?;
        let item = args
            .get("item")
            .ok_or_else(|| PlanError::InvalidBody("'item' argument is required".to_string()))?;
        let values = self.item_values(entity_schema, item, false)?;
        if values.is_empty() {
            return Err(PlanError::InvalidBody("no columns to update".to_string()).into());
        }
        let write_columns: Vec<String> = values.iter().map(|(column, _)| column.clone()).collect();
        let decision =
            self.authorize_entity(entity_schema, ActionKind::Update, &write_columns)?;

        let plan = MutationPlan {
            kind: MutationKind::Update,
            entity: entity_schema.entity.clone(),
            source: SourceObject {
                object: self.source_object_of(entity_schema),
                alias: self.next_alias(),
            },
            values,
            key: key.clone(),
            predicate: decision.predicate,
            returning: entity_schema.shape.primary_key.clone(),
            mask: decision.mask,
        };

        let mut read = self.build_selection(entity_schema, selection_set, JsonShape::Object)?;
        read.limit = Some(1);
        for (column, value) in key {
            read.predicates
                .insert(0, Expression::column_eq(column, value));
        }
        Ok(PlannedMutation {
            plan,
            read: Some(read),
        })
    }

    fn plan_delete(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
    ) -> GatewayResult<PlannedMutation> {
        let key = self.pk_args(entity_schema, args)?;
        let decision = self.authorize_entity(entity_schema, ActionKind::Delete, &[])?;

        let plan = MutationPlan {
            kind: MutationKind::Delete,
            entity: entity_schema.entity.clone(),
            source: SourceObject {
                object: self.source_object_of(entity_schema),
                alias: self.next_alias(),
            },
            values: Vec::new(),
            key,
            predicate: decision.predicate,
            returning: entity_schema.shape.primary_key.clone(),
            mask: decision.mask,
        };
        Ok(PlannedMutation { plan, read: None })
    }

    fn plan_execute(
        &mut self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
        selection_set: &SelectionSet,
    ) -> GatewayResult<ExecutePlan> {
        let entity = self.config.entity(&entity_schema.entity)?;

        let mut parameters: Vec<(String, LiteralValue)> = Vec::new();
        if let Some(defaults) = entity.source_parameters() {
            for (name, value) in defaults {
                let literal = LiteralValue::from_json(value).ok_or_else(|| {
                    PlanError::InvalidBody(format!("parameter '{name}' is not a scalar"))
                })?;
                parameters.push((name.clone(), literal));
            }
        }
        for (name, value) in args.iter() {
            let literal = const_to_literal(value).ok_or_else(|| {
                PlanError::InvalidBody(format!("parameter '{name}' is not a scalar"))
            })?;
            match parameters.iter_mut().find(|(existing, _)| existing == name) {
                Some(slot) => slot.1 = literal,
                None => parameters.push((name.to_string(), literal)),
            }
        }

        let mut requested_columns = Vec::new();
        for item in &selection_set.items {
            let field = expect_field(item)?;
            let name = field.name.node.as_str();
            if !entity_schema.shape.has_column(name) {
                return Err(PlanError::UnknownField {
                    parent: entity_schema.type_name.clone(),
                    field: name.to_string(),
                }
                .into());
            }
            requested_columns.push(name.to_string());
        }

        let decision =
            self.authorize_entity(entity_schema, ActionKind::Execute, &requested_columns)?;

        Ok(ExecutePlan {
            entity: entity_schema.entity.clone(),
            object: self.source_object_of(entity_schema),
            parameters,
            requested_columns,
            mask: decision.mask,
        })
    }

    // ------------------------------------------------------------------
    // REST planning
    // ------------------------------------------------------------------

    /// Plan one REST request. Returns the planned operation plus the
    /// connection marker for list reads.
    pub async fn plan_rest(
        &mut self,
        entity_name: &str,
        operation: RestOperation,
        key_segments: &[String],
        query: &RestQuery,
        body: Option<&JsonValue>,
    ) -> GatewayResult<PlannedOperation> {
        let entity_schema = match self.schema.entity(entity_name) {
            Some(schema) => schema.clone(),
            None => {
                // REST-only entities are not part of the GraphQL schema;
                // their shape still comes from the metadata provider.
                let entity = self.config.entity(entity_name)?;
                let shape = self.metadata.describe(entity_name).await?;
                EntitySchema {
                    entity: entity_name.to_string(),
                    type_name: entity.graphql_singular(entity_name),
                    singular_field: entity.graphql_singular(entity_name),
                    plural_field: entity.graphql_plural(entity_name),
                    shape,
                    relationships: entity.relationships.clone(),
                    is_stored_procedure: entity.is_stored_procedure(),
                }
            }
        };

        let key = self.rest_key(&entity_schema, key_segments)?;

        match operation {
            RestOperation::Read => {
                if key.is_empty() {
                    self.plan_rest_list(&entity_schema, query).map(PlannedOperation::Query)
                } else {
                    self.plan_rest_pk_read(&entity_schema, key, &query.select)
                        .map(PlannedOperation::Query)
                }
            }
            RestOperation::Create => {
                let body = body.ok_or_else(|| {
                    PlanError::InvalidBody("a JSON body is required".to_string())
                })?;
                let values = self.body_values(&entity_schema, body, true)?;
                let write_columns: Vec<String> =
                    values.iter().map(|(column, _)| column.clone()).collect();
                let decision =
                    self.authorize_entity(&entity_schema, ActionKind::Create, &write_columns)?;
                let plan = MutationPlan {
                    kind: MutationKind::Create,
                    entity: entity_schema.entity.clone(),
                    source: SourceObject {
                        object: self.source_object_of(&entity_schema),
                        alias: self.next_alias(),
                    },
                    values,
                    key: Vec::new(),
                    predicate: None,
                    returning: entity_schema.shape.primary_key.clone(),
                    mask: decision.mask,
                };
                let read = self.rest_read_back(&entity_schema, Vec::new())?;
                Ok(PlannedOperation::Mutation(PlannedMutation {
                    plan,
                    read: Some(read),
                }))
            }
            RestOperation::Upsert | RestOperation::UpsertIncremental => {
                if key.is_empty() {
                    return Err(PlanError::InvalidBody(
                        "upserts require the primary key in the path".to_string(),
                    )
                    .into());
                }
                let body = body.ok_or_else(|| {
                    PlanError::InvalidBody("a JSON body is required".to_string())
                })?;
                let mut values = self.body_values(&entity_schema, body, false)?;
                values.retain(|(column, _)| !key.iter().any(|(k, _)| k == column));
                let write_columns: Vec<String> =
                    values.iter().map(|(column, _)| column.clone()).collect();

                // The branch taken is unknowable before execution, so both
                // create and update must be permitted.
                let create_decision =
                    self.authorize_entity(&entity_schema, ActionKind::Create, &write_columns)?;
                let update_decision =
                    self.authorize_entity(&entity_schema, ActionKind::Update, &write_columns)?;
                let mask: std::collections::BTreeSet<String> = create_decision
                    .mask
                    .intersection(&update_decision.mask)
                    .cloned()
                    .collect();

                let kind = match operation {
                    RestOperation::Upsert => MutationKind::Upsert,
                    _ => MutationKind::UpsertIncremental,
                };
                let plan = MutationPlan {
                    kind,
                    entity: entity_schema.entity.clone(),
                    source: SourceObject {
                        object: self.source_object_of(&entity_schema),
                        alias: self.next_alias(),
                    },
                    values,
                    key: key.clone(),
                    predicate: update_decision.predicate,
                    returning: entity_schema.shape.primary_key.clone(),
                    mask,
                };
                let read = self.rest_read_back(&entity_schema, key)?;
                Ok(PlannedOperation::Mutation(PlannedMutation {
                    plan,
                    read: Some(read),
                }))
            }
            RestOperation::Delete => {
                if key.is_empty() {
                    return Err(PlanError::InvalidBody(
                        "deletes require the primary key in the path".to_string(),
                    )
                    .into());
                }
                let decision = self.authorize_entity(&entity_schema, ActionKind::Delete, &[])?;
                let plan = MutationPlan {
                    kind: MutationKind::Delete,
                    entity: entity_schema.entity.clone(),
                    source: SourceObject {
                        object: self.source_object_of(&entity_schema),
                        alias: self.next_alias(),
                    },
                    values: Vec::new(),
                    key,
                    predicate: decision.predicate,
                    returning: entity_schema.shape.primary_key.clone(),
                    mask: decision.mask,
                };
                Ok(PlannedOperation::Mutation(PlannedMutation {
                    plan,
                    read: None,
                }))
            }
        }
    }

    fn plan_rest_list(
        &mut self,
        entity_schema: &EntitySchema,
        query: &RestQuery,
    ) -> GatewayResult<SqlQueryStructure> {
        let decision =
            self.authorize_entity(entity_schema, ActionKind::Read, &query.select)?;
        let mut structure = self.rest_projection(entity_schema, &query.select, &decision)?;
        structure.shape = JsonShape::Array;

        if let Some(filter) = &query.filter {
            structure.predicates.push(filter.clone());
        }
        if let Some(predicate) = decision.predicate {
            structure.predicates.push(predicate);
        }

        let mut order = query.order_by.clone();
        for pk in &entity_schema.shape.primary_key {
            if !order.iter().any(|entry| &entry.column == pk) {
                order.push(OrderByColumn {
                    column: pk.clone(),
                    direction: OrderDirection::Asc,
                });
            }
        }
        for entry in &order {
            structure.ensure_column(&entry.column);
        }
        structure.order_by = order;

        if let Some(first) = query.first {
            if first < 1 || first > MAX_PAGE_SIZE {
                return Err(PlanError::FirstOutOfRange {
                    given: first as i64,
                    cap: MAX_PAGE_SIZE,
                }
                .into());
            }
            structure.first = Some(first);
            structure.limit = Some(first + 1);
        }

        if let Some(after) = &query.after {
            let decoded = decode_cursor(after, &structure.order_by)?;
            if let Some(predicate) = seek_predicate(&decoded) {
                structure.predicates.push(predicate);
            }
        }

        Ok(structure)
    }

    fn plan_rest_pk_read(
        &mut self,
        entity_schema: &EntitySchema,
        key: Vec<(String, LiteralValue)>,
        select: &[String],
    ) -> GatewayResult<SqlQueryStructure> {
        let decision = self.authorize_entity(entity_schema, ActionKind::Read, select)?;
        let mut structure = self.rest_projection(entity_schema, select, &decision)?;
        structure.shape = JsonShape::Object;
        structure.limit = Some(1);
        for (column, value) in key {
            structure.predicates.push(Expression::column_eq(column, value));
        }
        if let Some(predicate) = decision.predicate {
            structure.predicates.push(predicate);
        }
        Ok(structure)
    }

    /// Build the flat projection of a REST read: `$select` when present,
    /// otherwise every column inside the caller's mask.
    fn rest_projection(
        &mut self,
        entity_schema: &EntitySchema,
        select: &[String],
        decision: &Decision,
    ) -> GatewayResult<SqlQueryStructure> {
        let alias = self.next_alias();
        let mut structure = SqlQueryStructure::new(
            entity_schema.entity.clone(),
            SourceObject {
                object: self.source_object_of(entity_schema),
                alias,
            },
            JsonShape::Array,
        );
        structure.mask = decision.mask.clone();

        if select.is_empty() {
            for column in &entity_schema.shape.columns {
                if decision.mask.contains(&column.name) {
                    structure
                        .columns
                        .push(ProjectedColumn::requested(&column.name, &column.name));
                }
            }
        } else {
            for column in select {
                if !entity_schema.shape.has_column(column) {
                    return Err(PlanError::UnknownField {
                        parent: entity_schema.entity.clone(),
                        field: column.clone(),
                    }
                    .into());
                }
                structure
                    .columns
                    .push(ProjectedColumn::requested(column, column));
            }
        }
        for pk in &entity_schema.shape.primary_key {
            structure.ensure_column(pk);
        }
        if structure.columns.is_empty() {
            if let Some(first_column) = entity_schema.shape.columns.first() {
                structure.ensure_column(&first_column.name.clone());
            }
        }
        Ok(structure)
    }

    /// Re-select a mutated row with every masked column.
    fn rest_read_back(
        &mut self,
        entity_schema: &EntitySchema,
        key: Vec<(String, LiteralValue)>,
    ) -> GatewayResult<SqlQueryStructure> {
        let decision = self.authorize_entity(entity_schema, ActionKind::Read, &[])?;
        let mut structure = self.rest_projection(entity_schema, &[], &decision)?;
        structure.shape = JsonShape::Object;
        structure.limit = Some(1);
        for (column, value) in key {
            structure.predicates.push(Expression::column_eq(column, value));
        }
        if let Some(predicate) = decision.predicate {
            structure.predicates.push(predicate);
        }
        Ok(structure)
    }

    fn rest_key(
        &self,
        entity_schema: &EntitySchema,
        key_segments: &[String],
    ) -> GatewayResult<Vec<(String, LiteralValue)>> {
        let raw = bind_key_segments(key_segments, &entity_schema.shape)?;
        raw.into_iter()
            .map(|(column, text)| {
                let ty = entity_schema
                    .shape
                    .column(&column)
                    .map(|c| c.ty)
                    .unwrap_or(ColumnType::Text);
                let value = coerce_text(&text, ty).ok_or_else(|| {
                    PlanError::InvalidBody(format!("key value '{text}' is not a valid {ty:?}"))
                })?;
                Ok((column, value))
            })
            .collect()
    }

    fn body_values(
        &self,
        entity_schema: &EntitySchema,
        body: &JsonValue,
        creating: bool,
    ) -> GatewayResult<Vec<(String, LiteralValue)>> {
        let JsonValue::Object(map) = body else {
            return Err(PlanError::InvalidBody("body must be a JSON object".to_string()).into());
        };
        let strict = self.config.runtime.rest.request_body_strict;
        let mut values = Vec::new();
        for (column, raw) in map {
            let Some(column_def) = entity_schema.shape.column(column) else {
                if strict {
                    return Err(PlanError::InvalidBody(format!(
                        "unknown column '{column}' in request body"
                    ))
                    .into());
                }
                continue;
            };
            if creating && column_def.autogenerated {
                return Err(PlanError::InvalidBody(format!(
                    "column '{column}' is auto-generated"
                ))
                .into());
            }
            let value = LiteralValue::from_json(raw).ok_or_else(|| {
                PlanError::InvalidBody(format!("column '{column}' must be a scalar"))
            })?;
            values.push((column.clone(), value));
        }
        if values.is_empty() {
            return Err(PlanError::InvalidBody("body has no usable columns".to_string()).into());
        }
        Ok(values)
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn authorize_entity(
        &self,
        entity_schema: &EntitySchema,
        action: ActionKind,
        requested_columns: &[String],
    ) -> GatewayResult<Decision> {
        let entity = self.config.entity(&entity_schema.entity)?;
        authorize(
            self.principal,
            entity,
            action,
            requested_columns,
            &entity_schema.shape,
        )
    }

    fn source_object_of(&self, entity_schema: &EntitySchema) -> String {
        self.config
            .entities
            .get(&entity_schema.entity)
            .map(|entity| entity.source_object().to_string())
            .unwrap_or_else(|| entity_schema.entity.clone())
    }

    fn pk_args(
        &self,
        entity_schema: &EntitySchema,
        args: &ArgMap,
    ) -> GatewayResult<Vec<(String, LiteralValue)>> {
        let mut key = Vec::new();
        for pk in &entity_schema.shape.primary_key {
            let value = args.get(pk).ok_or_else(|| {
                PlanError::UnknownArgument(format!("missing primary key argument '{pk}'"))
            })?;
            let literal = const_to_literal(value).ok_or_else(|| {
                PlanError::InvalidBody(format!("key argument '{pk}' must be a scalar"))
            })?;
            key.push((pk.clone(), literal));
        }
        for name in args.names() {
            if name != "item" && !entity_schema.shape.primary_key.iter().any(|pk| pk == name) {
                return Err(PlanError::UnknownArgument(name.to_string()).into());
            }
        }
        Ok(key)
    }

    fn item_values(
        &self,
        entity_schema: &EntitySchema,
        item: &ConstValue,
        creating: bool,
    ) -> GatewayResult<Vec<(String, LiteralValue)>> {
        let ConstValue::Object(map) = item else {
            return Err(PlanError::InvalidBody("'item' must be an object".to_string()).into());
        };
        let mut values = Vec::new();
        for (column, raw) in map {
            let column_def = entity_schema.shape.column(column.as_str()).ok_or_else(|| {
                PlanError::UnknownField {
                    parent: entity_schema.type_name.clone(),
                    field: column.to_string(),
                }
            })?;
            if creating && column_def.autogenerated {
                return Err(PlanError::InvalidBody(format!(
                    "column '{column}' is auto-generated"
                ))
                .into());
            }
            if !creating && entity_schema.shape.primary_key.iter().any(|pk| pk == column.as_str()) {
                return Err(PlanError::InvalidBody(format!(
                    "key column '{column}' cannot be updated"
                ))
                .into());
            }
            let value = const_to_literal(raw).ok_or_else(|| {
                PlanError::InvalidBody(format!("column '{column}' must be a scalar"))
            })?;
            values.push((column.to_string(), value));
        }
        Ok(values)
    }
}

fn select_operation<'d>(
    operations: &'d DocumentOperations,
    operation_name: Option<&str>,
) -> GatewayResult<&'d OperationDefinition> {
    match operations {
        DocumentOperations::Single(operation) => Ok(&operation.node),
        DocumentOperations::Multiple(map) => match operation_name {
            Some(name) => map
                .iter()
                .find(|(candidate, _)| candidate.as_str() == name)
                .map(|(_, operation)| &operation.node)
                .ok_or_else(|| {
                    PlanError::DocumentSyntax(format!("unknown operation '{name}'")).into()
                }),
            None => {
                if map.len() == 1 {
                    Ok(&map.iter().next().expect("len checked").1.node)
                } else {
                    Err(PlanError::DocumentSyntax(
                        "operationName is required for multi-operation documents".to_string(),
                    )
                    .into())
                }
            }
        },
    }
}

fn expect_field(item: &Positioned<Selection>) -> GatewayResult<&Field> {
    match &item.node {
        Selection::Field(field) => Ok(&field.node),
        _ => Err(PlanError::Unsupported("fragment selections".to_string()).into()),
    }
}

fn selection_depth(selection_set: &SelectionSet) -> u32 {
    selection_set
        .items
        .iter()
        .map(|item| match &item.node {
            Selection::Field(field) => 1 + selection_depth(&field.node.selection_set.node),
            _ => 1,
        })
        .max()
        .unwrap_or(0)
}

/// Split a connection selection (`items` / `hasNextPage` / `endCursor`) from
/// the entity selection inside `items`.
fn connection_selection<'s>(
    entity_schema: &EntitySchema,
    selection_set: &'s SelectionSet,
) -> GatewayResult<(ConnectionSelection, Option<&'s SelectionSet>)> {
    let mut connection = ConnectionSelection::default();
    let mut items = None;
    for item in &selection_set.items {
        let field = expect_field(item)?;
        match field.name.node.as_str() {
            "items" => {
                connection.items = true;
                items = Some(&field.selection_set.node);
            }
            "hasNextPage" => connection.has_next_page = true,
            "endCursor" => connection.end_cursor = true,
            other => {
                return Err(PlanError::UnknownField {
                    parent: entity_schema.connection_type(),
                    field: other.to_string(),
                }
                .into())
            }
        }
    }
    Ok((connection, items))
}

fn lower_scalar_filter(column: &str, value: &ConstValue) -> GatewayResult<Vec<Expression>> {
    use crate::utils::types::{CompareOp, LikeKind, Operand};

    let ConstValue::Object(map) = value else {
        return Err(PlanError::InvalidFilter(format!(
            "filter for '{column}' must be an object"
        ))
        .into());
    };

    let mut predicates = Vec::new();
    for (op_name, raw) in map {
        let expression = match op_name.as_str() {
            "eq" | "neq" | "gt" | "gte" | "lt" | "lte" => {
                let literal = const_to_literal(raw).ok_or_else(|| {
                    PlanError::InvalidFilter(format!("'{op_name}' needs a scalar value"))
                })?;
                let op = match op_name.as_str() {
                    "eq" => CompareOp::Eq,
                    "neq" => CompareOp::Ne,
                    "gt" => CompareOp::Gt,
                    "gte" => CompareOp::Ge,
                    "lt" => CompareOp::Lt,
                    _ => CompareOp::Le,
                };
                Expression::Compare {
                    left: Operand::Column(column.to_string()),
                    op,
                    right: Operand::Literal(literal),
                }
            }
            "contains" | "startsWith" | "endsWith" => {
                let ConstValue::String(text) = raw else {
                    return Err(PlanError::InvalidFilter(format!(
                        "'{op_name}' needs a string value"
                    ))
                    .into());
                };
                let kind = match op_name.as_str() {
                    "contains" => LikeKind::Contains,
                    "startsWith" => LikeKind::StartsWith,
                    _ => LikeKind::EndsWith,
                };
                Expression::Like {
                    column: column.to_string(),
                    kind,
                    value: text.clone(),
                }
            }
            "in" => {
                let items = expect_list(raw, "in")?;
                let values = items
                    .iter()
                    .map(const_to_literal)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        PlanError::InvalidFilter("'in' needs scalar values".to_string())
                    })?;
                Expression::In {
                    column: column.to_string(),
                    values,
                }
            }
            "isNull" => {
                let ConstValue::Boolean(negated_null) = raw else {
                    return Err(PlanError::InvalidFilter(
                        "'isNull' needs a boolean".to_string(),
                    )
                    .into());
                };
                Expression::IsNull {
                    column: column.to_string(),
                    negated: !negated_null,
                }
            }
            other => {
                return Err(PlanError::InvalidFilter(format!(
                    "unknown filter operator '{other}'"
                ))
                .into())
            }
        };
        predicates.push(expression);
    }
    Ok(predicates)
}

fn expect_list<'v>(value: &'v ConstValue, name: &str) -> GatewayResult<&'v Vec<ConstValue>> {
    match value {
        ConstValue::List(items) => Ok(items),
        _ => Err(PlanError::InvalidFilter(format!("'{name}' must be a list")).into()),
    }
}

fn const_to_literal(value: &ConstValue) -> Option<LiteralValue> {
    match value {
        ConstValue::Null => Some(LiteralValue::Null),
        ConstValue::Boolean(b) => Some(LiteralValue::Bool(*b)),
        ConstValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(LiteralValue::Int(i))
            } else {
                n.as_f64().map(LiteralValue::Float)
            }
        }
        ConstValue::String(s) => Some(LiteralValue::String(s.clone())),
        ConstValue::Enum(name) => Some(LiteralValue::String(name.to_string())),
        _ => None,
    }
}

/// Coerce a path segment into the column's type.
fn coerce_text(text: &str, ty: ColumnType) -> Option<LiteralValue> {
    match ty {
        ColumnType::Int | ColumnType::BigInt => {
            text.parse::<i64>().ok().map(LiteralValue::Int)
        }
        ColumnType::Float | ColumnType::Decimal => {
            text.parse::<f64>().ok().map(LiteralValue::Float)
        }
        ColumnType::Bool => text.parse::<bool>().ok().map(LiteralValue::Bool),
        _ => Some(LiteralValue::String(text.to_string())),
    }
}
