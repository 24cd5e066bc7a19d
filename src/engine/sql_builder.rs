use crate::config::model::{Cardinality, DatabaseKind};
use crate::engine::dialect::{Dialect, LimitStyle, ReturningStyle};
use crate::engine::structure::{
    Aggregation, AggregationFn, ExecutePlan, JsonShape, MutationKind, MutationPlan, NestedQuery,
    SqlQueryStructure,
};
use crate::utils::error::{GatewayError, GatewayResult, PlanError};
use crate::utils::types::{Expression, LiteralValue, Operand, SqlParameter, SqlStatement};

/// Lowers compiled query structures to dialect SQL. Every literal becomes a
/// numbered bind parameter; rendering happens strictly in SQL text order so
/// positional placeholders line up.
pub struct SqlBuilder {
    dialect: Dialect,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Build the single read statement for a query structure. The emitted
    /// SQL instructs the database to return one ready-shaped JSON document.
    pub fn build_select(&self, query: &SqlQueryStructure) -> GatewayResult<SqlStatement> {
        let mut parameters = Vec::new();
        let sql = if self.dialect.is_document() {
            self.render_cosmos_select(query, &mut parameters)?
        } else {
            self.render_root(query, &mut parameters)?
        };
        Ok(SqlStatement::new(sql, parameters))
    }

    /// Build one mutation statement.
    pub fn build_mutation(&self, plan: &MutationPlan) -> GatewayResult<SqlStatement> {
        if self.dialect.is_document() {
            return Err(PlanError::Unsupported(
                "mutations on document backends".to_string(),
            )
            .into());
        }
        let mut parameters = Vec::new();
        let sql = match plan.kind {
            MutationKind::Create => self.render_insert(plan, &mut parameters)?,
            MutationKind::Update => self.render_update(plan, &mut parameters)?,
            MutationKind::Delete => self.render_delete(plan, &mut parameters)?,
            MutationKind::Upsert | MutationKind::UpsertIncremental => {
                self.render_upsert(plan, &mut parameters)?
            }
        };
        Ok(SqlStatement::new(sql, parameters))
    }

    /// Build a stored procedure invocation. The boolean says whether the
    /// statement flows through the JSON query path (`true`) or the mutation
    /// path whose returned rows carry the result (`false`).
    pub fn build_procedure(&self, plan: &ExecutePlan) -> GatewayResult<(SqlStatement, bool)> {
        let mut parameters = Vec::new();
        let object = self.dialect.quote_ident(&plan.object);
        match self.dialect.kind {
            DatabaseKind::PostgreSql => {
                let placeholders = plan
                    .parameters
                    .iter()
                    .map(|(_, value)| self.bind(value.clone(), &mut parameters))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT COALESCE(json_agg(to_jsonb(\"t\")), '[]'::json) AS \"data\" FROM {object}({placeholders}) AS \"t\""
                );
                Ok((SqlStatement::new(sql, parameters), true))
            }
            DatabaseKind::MsSql | DatabaseKind::DwSql => {
                let args = plan
                    .parameters
                    .iter()
                    .map(|(name, value)| {
                        let placeholder = self.bind(value.clone(), &mut parameters);
                        format!("@{name} = {placeholder}")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = if args.is_empty() {
                    format!("EXEC {object}")
                } else {
                    format!("EXEC {object} {args}")
                };
                Ok((SqlStatement::new(sql, parameters), false))
            }
            DatabaseKind::MySql => {
                let placeholders = plan
                    .parameters
                    .iter()
                    .map(|(_, value)| self.bind(value.clone(), &mut parameters))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!("CALL {object}({placeholders})");
                Ok((SqlStatement::new(sql, parameters), false))
            }
            DatabaseKind::CosmosSql | DatabaseKind::CosmosNoSql => Err(PlanError::Unsupported(
                "stored procedures on document backends".to_string(),
            )
            .into()),
        }
    }

    fn bind(&self, value: LiteralValue, parameters: &mut Vec<SqlParameter>) -> String {
        let placeholder = self.dialect.placeholder(parameters.len());
        parameters.push(SqlParameter::new(parameters.len(), value));
        placeholder
    }

    /// JSON keys of a structure's output: projected aliases then child field
    /// names, in projection order.
    fn output_keys(query: &SqlQueryStructure) -> Vec<String> {
        let mut keys: Vec<String> = query.columns.iter().map(|c| c.alias.clone()).collect();
        keys.extend(query.children.iter().map(|c| c.field.clone()));
        keys
    }

    fn render_root(
        &self,
        query: &SqlQueryStructure,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let core = self.render_core(query, None, parameters)?;
        let sub = format!("{}_agg", query.source.alias);
        let sub_q = self.dialect.quote_ident(&sub);

        Ok(match self.dialect.kind {
            DatabaseKind::PostgreSql => match query.shape {
                JsonShape::Array => format!(
                    "SELECT COALESCE(json_agg(to_jsonb({sub_q})), '[]'::json) AS \"data\" FROM ({core}) AS {sub_q}"
                ),
                JsonShape::Object => {
                    format!("SELECT to_jsonb({sub_q}) AS \"data\" FROM ({core}) AS {sub_q}")
                }
            },
            DatabaseKind::MsSql | DatabaseKind::DwSql => match query.shape {
                JsonShape::Array => format!("{core} FOR JSON PATH, INCLUDE_NULL_VALUES"),
                JsonShape::Object => {
                    format!("{core} FOR JSON PATH, WITHOUT_ARRAY_WRAPPER, INCLUDE_NULL_VALUES")
                }
            },
            DatabaseKind::MySql => {
                let object = self.mysql_json_object(&Self::output_keys(query), &sub);
                match query.shape {
                    JsonShape::Array => format!(
                        "SELECT COALESCE(JSON_ARRAYAGG({object}), JSON_ARRAY()) AS data FROM ({core}) AS {sub_q}"
                    ),
                    JsonShape::Object => {
                        format!("SELECT {object} AS data FROM ({core}) AS {sub_q}")
                    }
                }
            }
            _ => unreachable!("document kinds are rendered by render_cosmos_select"),
        })
    }

    fn mysql_json_object(&self, keys: &[String], sub: &str) -> String {
        let sub_q = self.dialect.quote_ident(sub);
        let pairs = keys
            .iter()
            .map(|key| format!("'{key}', {sub_q}.{}", self.dialect.quote_ident(key)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("JSON_OBJECT({pairs})")
    }

    /// Render the bare SELECT of one structure: projection, source, WHERE,
    /// GROUP BY, ORDER BY and limit. `correlation` carries the parent alias
    /// join of a nested subquery.
    fn render_core(
        &self,
        query: &SqlQueryStructure,
        correlation: Option<(&NestedQuery, &str)>,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let alias = &query.source.alias;
        let alias_q = self.dialect.quote_ident(alias);
        let mut select_list: Vec<String> = Vec::new();

        if let Some(group_by) = &query.group_by {
            for column in &group_by.by {
                select_list.push(format!(
                    "{alias_q}.{} AS {}",
                    self.dialect.quote_ident(column),
                    self.dialect.quote_ident(column)
                ));
            }
            for aggregation in &group_by.aggregations {
                select_list.push(format!(
                    "{} AS {}",
                    self.aggregation_sql(aggregation, &alias_q),
                    self.dialect.quote_ident(&aggregation.alias)
                ));
            }
        } else {
            for column in &query.columns {
                select_list.push(format!(
                    "{alias_q}.{} AS {}",
                    self.dialect.quote_ident(&column.column),
                    self.dialect.quote_ident(&column.alias)
                ));
            }
            for child in &query.children {
                let expression = self.render_child(query, child, parameters)?;
                select_list.push(format!(
                    "{expression} AS {}",
                    self.dialect.quote_ident(&child.field)
                ));
            }
        }

        if select_list.is_empty() {
            return Err(GatewayError::Internal(
                "query projects no columns".to_string(),
            ));
        }

        let top = match (self.dialect.limit_style(), query.limit) {
            (LimitStyle::Top, Some(limit)) => format!("TOP ({limit}) "),
            _ => String::new(),
        };

        let mut sql = format!(
            "SELECT {top}{} FROM {} AS {alias_q}",
            select_list.join(", "),
            self.dialect.quote_ident(&query.source.object)
        );

        // Link-table traversal joins the child to the link inside the
        // subquery; the parent correlation then targets the link columns.
        if let Some((nested, _)) = correlation {
            if let Some(link) = &nested.link {
                let link_q = self.dialect.quote_ident(&link.alias);
                let on = link
                    .child_link_columns
                    .iter()
                    .zip(link.child_columns.iter())
                    .map(|(link_col, child_col)| {
                        format!(
                            "{link_q}.{} = {alias_q}.{}",
                            self.dialect.quote_ident(link_col),
                            self.dialect.quote_ident(child_col)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                sql.push_str(&format!(
                    " INNER JOIN {} AS {link_q} ON {on}",
                    self.dialect.quote_ident(&link.object)
                ));
            }
        }

        let mut conditions: Vec<String> = Vec::new();
        if let Some((nested, parent_alias)) = correlation {
            let parent_q = self.dialect.quote_ident(parent_alias);
            match &nested.link {
                Some(link) => {
                    let link_q = self.dialect.quote_ident(&link.alias);
                    for (parent_col, link_col) in link
                        .parent_columns
                        .iter()
                        .zip(link.parent_link_columns.iter())
                    {
                        conditions.push(format!(
                            "{link_q}.{} = {parent_q}.{}",
                            self.dialect.quote_ident(link_col),
                            self.dialect.quote_ident(parent_col)
                        ));
                    }
                }
                None => {
                    for (parent_col, child_col) in &nested.join_on {
                        conditions.push(format!(
                            "{alias_q}.{} = {parent_q}.{}",
                            self.dialect.quote_ident(child_col),
                            self.dialect.quote_ident(parent_col)
                        ));
                    }
                }
            }
        }
        for predicate in &query.predicates {
            conditions.push(self.render_expression(predicate, Some(alias), parameters)?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if let Some(group_by) = &query.group_by {
            let columns = group_by
                .by
                .iter()
                .map(|column| format!("{alias_q}.{}", self.dialect.quote_ident(column)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" GROUP BY {columns}"));
        }

        if !query.order_by.is_empty() {
            let columns = query
                .order_by
                .iter()
                .map(|entry| {
                    format!(
                        "{alias_q}.{} {}",
                        self.dialect.quote_ident(&entry.column),
                        entry.direction.as_sql()
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {columns}"));
        }

        if self.dialect.limit_style() == LimitStyle::LimitSuffix {
            if let Some(limit) = query.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }

        Ok(sql)
    }

    /// Render a nested navigation as a correlated JSON subquery expression.
    fn render_child(
        &self,
        parent: &SqlQueryStructure,
        child: &NestedQuery,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let sub = format!("{}_agg", child.query.source.alias);
        let sub_q = self.dialect.quote_ident(&sub);

        Ok(match self.dialect.kind {
            DatabaseKind::PostgreSql => {
                let core =
                    self.render_core(&child.query, Some((child, &parent.source.alias)), parameters)?;
                match child.cardinality {
                    Cardinality::Many => format!(
                        "(SELECT COALESCE(json_agg(to_jsonb({sub_q})), '[]'::json) FROM ({core}) AS {sub_q})"
                    ),
                    Cardinality::One => {
                        format!("(SELECT to_jsonb({sub_q}) FROM ({core}) AS {sub_q})")
                    }
                }
            }
            DatabaseKind::MsSql | DatabaseKind::DwSql => {
                let core =
                    self.render_core(&child.query, Some((child, &parent.source.alias)), parameters)?;
                match child.cardinality {
                    Cardinality::Many => {
                        format!("JSON_QUERY(({core} FOR JSON PATH, INCLUDE_NULL_VALUES))")
                    }
                    Cardinality::One => format!(
                        "JSON_QUERY(({core} FOR JSON PATH, WITHOUT_ARRAY_WRAPPER, INCLUDE_NULL_VALUES))"
                    ),
                }
            }
            DatabaseKind::MySql => {
                let core =
                    self.render_core(&child.query, Some((child, &parent.source.alias)), parameters)?;
                let object = self.mysql_json_object(&Self::output_keys(&child.query), &sub);
                match child.cardinality {
                    Cardinality::Many => format!(
                        "(SELECT COALESCE(JSON_ARRAYAGG({object}), JSON_ARRAY()) FROM ({core}) AS {sub_q})"
                    ),
                    Cardinality::One => {
                        format!("(SELECT {object} FROM ({core}) AS {sub_q})")
                    }
                }
            }
            _ => {
                return Err(PlanError::Unsupported(
                    "nested navigations on document backends".to_string(),
                )
                .into())
            }
        })
    }

    fn aggregation_sql(&self, aggregation: &Aggregation, alias_q: &str) -> String {
        let column = format!("{alias_q}.{}", self.dialect.quote_ident(&aggregation.column));
        match aggregation.function {
            AggregationFn::Count => format!("COUNT({column})"),
            AggregationFn::Sum => format!("SUM({column})"),
            AggregationFn::Avg => format!("AVG({column})"),
            AggregationFn::Min => format!("MIN({column})"),
            AggregationFn::Max => format!("MAX({column})"),
            AggregationFn::CountDistinct => format!("COUNT(DISTINCT {column})"),
        }
    }

    /// Render a predicate tree. Columns are qualified with `alias` when one
    /// is given; literals always become bind parameters.
    pub fn render_expression(
        &self,
        expression: &Expression,
        alias: Option<&str>,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        Ok(match expression {
            Expression::Compare { left, op, right } => {
                let left = self.render_operand(left, alias, parameters)?;
                let right = self.render_operand(right, alias, parameters)?;
                format!("{left} {} {right}", op.as_sql())
            }
            Expression::IsNull { column, negated } => {
                let column = self.qualify(column, alias);
                if *negated {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                }
            }
            Expression::In { column, values } => {
                if values.is_empty() {
                    // An empty IN list matches nothing.
                    "1 = 0".to_string()
                } else {
                    let column = self.qualify(column, alias);
                    let placeholders = values
                        .iter()
                        .map(|value| self.bind(value.clone(), parameters))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{column} IN ({placeholders})")
                }
            }
            Expression::Like {
                column,
                kind,
                value,
            } => {
                let column = self.qualify(column, alias);
                let placeholder = self.bind(
                    LiteralValue::String(kind.to_pattern(value)),
                    parameters,
                );
                format!("{column} LIKE {placeholder}{}", self.dialect.like_escape())
            }
            Expression::And(items) => {
                let rendered = items
                    .iter()
                    .map(|item| self.render_expression(item, alias, parameters))
                    .collect::<GatewayResult<Vec<_>>>()?;
                format!("({})", rendered.join(" AND "))
            }
            Expression::Or(items) => {
                let rendered = items
                    .iter()
                    .map(|item| self.render_expression(item, alias, parameters))
                    .collect::<GatewayResult<Vec<_>>>()?;
                format!("({})", rendered.join(" OR "))
            }
            Expression::Not(inner) => {
                format!(
                    "NOT ({})",
                    self.render_expression(inner, alias, parameters)?
                )
            }
        })
    }

    fn render_operand(
        &self,
        operand: &Operand,
        alias: Option<&str>,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        match operand {
            Operand::Column(column) => Ok(self.qualify(column, alias)),
            Operand::Literal(value) => Ok(self.bind(value.clone(), parameters)),
            Operand::Claim(name) => Err(GatewayError::Internal(format!(
                "unbound claim reference '@claims.{name}' reached SQL lowering"
            ))),
        }
    }

    fn qualify(&self, column: &str, alias: Option<&str>) -> String {
        match alias {
            Some(alias) => format!(
                "{}.{}",
                self.dialect.quote_ident(alias),
                self.dialect.quote_ident(column)
            ),
            None => self.dialect.quote_ident(column),
        }
    }

    fn render_insert(
        &self,
        plan: &MutationPlan,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let object = self.dialect.quote_ident(&plan.source.object);
        let columns = plan
            .values
            .iter()
            .map(|(column, _)| self.dialect.quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let returning = self.returning_list(&plan.returning, "INSERTED");

        Ok(match self.dialect.returning_style() {
            ReturningStyle::Output => {
                let placeholders = self.value_placeholders(plan, parameters);
                format!(
                    "INSERT INTO {object} ({columns}) OUTPUT {returning} VALUES ({placeholders})"
                )
            }
            ReturningStyle::Returning => {
                let placeholders = self.value_placeholders(plan, parameters);
                format!(
                    "INSERT INTO {object} ({columns}) VALUES ({placeholders}) RETURNING {returning}"
                )
            }
            ReturningStyle::None => {
                let placeholders = self.value_placeholders(plan, parameters);
                format!("INSERT INTO {object} ({columns}) VALUES ({placeholders})")
            }
        })
    }

    fn render_update(
        &self,
        plan: &MutationPlan,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let object = self.dialect.quote_ident(&plan.source.object);
        let assignments = plan
            .values
            .iter()
            .map(|(column, value)| {
                let placeholder = self.bind(value.clone(), parameters);
                format!("{} = {placeholder}", self.dialect.quote_ident(column))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let returning = self.returning_list(&plan.returning, "INSERTED");

        let mut sql = match self.dialect.returning_style() {
            ReturningStyle::Output => {
                format!("UPDATE {object} SET {assignments} OUTPUT {returning}")
            }
            _ => format!("UPDATE {object} SET {assignments}"),
        };
        sql.push_str(&self.render_mutation_where(plan, parameters)?);
        if self.dialect.returning_style() == ReturningStyle::Returning {
            sql.push_str(&format!(" RETURNING {returning}"));
        }
        Ok(sql)
    }

    fn render_delete(
        &self,
        plan: &MutationPlan,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let object = self.dialect.quote_ident(&plan.source.object);
        let returning = self.returning_list(&plan.returning, "DELETED");

        let mut sql = match self.dialect.returning_style() {
            ReturningStyle::Output => format!("DELETE FROM {object} OUTPUT {returning}"),
            _ => format!("DELETE FROM {object}"),
        };
        sql.push_str(&self.render_mutation_where(plan, parameters)?);
        if self.dialect.returning_style() == ReturningStyle::Returning {
            sql.push_str(&format!(" RETURNING {returning}"));
        }
        Ok(sql)
    }

    fn render_upsert(
        &self,
        plan: &MutationPlan,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let object = self.dialect.quote_ident(&plan.source.object);
        let insert_columns: Vec<(&String, &LiteralValue)> = plan
            .key
            .iter()
            .map(|(c, v)| (c, v))
            .chain(plan.values.iter().map(|(c, v)| (c, v)))
            .collect();
        let column_list = insert_columns
            .iter()
            .map(|(column, _)| self.dialect.quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let returning = self.returning_list(&plan.returning, "INSERTED");

        match self.dialect.kind {
            DatabaseKind::PostgreSql => {
                let placeholders = insert_columns
                    .iter()
                    .map(|(_, value)| self.bind((*value).clone(), parameters))
                    .collect::<Vec<_>>()
                    .join(", ");
                let conflict_columns = plan
                    .key
                    .iter()
                    .map(|(column, _)| self.dialect.quote_ident(column))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql = format!(
                    "INSERT INTO {object} ({column_list}) VALUES ({placeholders}) ON CONFLICT ({conflict_columns})"
                );
                if plan.values.is_empty() {
                    sql.push_str(" DO NOTHING");
                } else {
                    let updates = plan
                        .values
                        .iter()
                        .map(|(column, _)| {
                            let quoted = self.dialect.quote_ident(column);
                            format!("{quoted} = EXCLUDED.{quoted}")
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(&format!(" DO UPDATE SET {updates}"));
                    if let Some(predicate) = &plan.predicate {
                        let rendered =
                            self.render_expression(predicate, Some(&plan.source.object), parameters)?;
                        sql.push_str(&format!(" WHERE {rendered}"));
                    }
                }
                sql.push_str(&format!(" RETURNING {returning}"));
                Ok(sql)
            }
            DatabaseKind::MsSql | DatabaseKind::DwSql => {
                let source_columns = insert_columns
                    .iter()
                    .map(|(column, value)| {
                        let placeholder = self.bind((*value).clone(), parameters);
                        format!("{placeholder} AS {}", self.dialect.quote_ident(column))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let on = plan
                    .key
                    .iter()
                    .map(|(column, _)| {
                        let quoted = self.dialect.quote_ident(column);
                        format!("[T].{quoted} = [S].{quoted}")
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                let matched_guard = match &plan.predicate {
                    Some(predicate) => format!(
                        " AND {}",
                        self.render_expression(predicate, Some("T"), parameters)?
                    ),
                    None => String::new(),
                };
                let updates = plan
                    .values
                    .iter()
                    .map(|(column, _)| {
                        let quoted = self.dialect.quote_ident(column);
                        format!("{quoted} = [S].{quoted}")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let insert_list = insert_columns
                    .iter()
                    .map(|(column, _)| self.dialect.quote_ident(column))
                    .collect::<Vec<_>>()
                    .join(", ");
                let insert_values = insert_columns
                    .iter()
                    .map(|(column, _)| format!("[S].{}", self.dialect.quote_ident(column)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let matched_clause = if plan.values.is_empty() {
                    String::new()
                } else {
                    format!(" WHEN MATCHED{matched_guard} THEN UPDATE SET {updates}")
                };
                Ok(format!(
                    "MERGE INTO {object} AS [T] USING (SELECT {source_columns}) AS [S] ON {on}{matched_clause} WHEN NOT MATCHED THEN INSERT ({insert_list}) VALUES ({insert_values}) OUTPUT {returning};"
                ))
            }
            DatabaseKind::MySql => {
                let placeholders = insert_columns
                    .iter()
                    .map(|(_, value)| self.bind((*value).clone(), parameters))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql =
                    format!("INSERT INTO {object} ({column_list}) VALUES ({placeholders})");
                if !plan.values.is_empty() {
                    let updates = plan
                        .values
                        .iter()
                        .map(|(column, _)| {
                            let quoted = self.dialect.quote_ident(column);
                            format!("{quoted} = VALUES({quoted})")
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(&format!(" ON DUPLICATE KEY UPDATE {updates}"));
                }
                Ok(sql)
            }
            _ => Err(PlanError::Unsupported(
                "upserts on document backends".to_string(),
            )
            .into()),
        }
    }

    fn render_mutation_where(
        &self,
        plan: &MutationPlan,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        let mut conditions = Vec::new();
        for (column, value) in &plan.key {
            let placeholder = self.bind(value.clone(), parameters);
            conditions.push(format!(
                "{} = {placeholder}",
                self.dialect.quote_ident(column)
            ));
        }
        if let Some(predicate) = &plan.predicate {
            conditions.push(self.render_expression(predicate, None, parameters)?);
        }
        if conditions.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", conditions.join(" AND ")))
        }
    }

    fn value_placeholders(
        &self,
        plan: &MutationPlan,
        parameters: &mut Vec<SqlParameter>,
    ) -> String {
        plan.values
            .iter()
            .map(|(_, value)| self.bind(value.clone(), parameters))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn returning_list(&self, columns: &[String], prefix: &str) -> String {
        match self.dialect.returning_style() {
            ReturningStyle::Output => columns
                .iter()
                .map(|column| format!("{prefix}.{}", self.dialect.quote_ident(column)))
                .collect::<Vec<_>>()
                .join(", "),
            _ => columns
                .iter()
                .map(|column| self.dialect.quote_ident(column))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Minimal SQL-API select for document containers: flat projection,
    /// filters, ordering and TOP.
    fn render_cosmos_select(
        &self,
        query: &SqlQueryStructure,
        parameters: &mut Vec<SqlParameter>,
    ) -> GatewayResult<String> {
        if !query.children.is_empty() {
            return Err(PlanError::Unsupported(
                "nested navigations on document backends".to_string(),
            )
            .into());
        }
        if query.group_by.is_some() {
            return Err(PlanError::Unsupported(
                "groupBy on document backends".to_string(),
            )
            .into());
        }

        let projection = query
            .columns
            .iter()
            .map(|column| format!("c.{} AS {}", column.column, column.alias))
            .collect::<Vec<_>>()
            .join(", ");
        let top = match query.limit {
            Some(limit) => format!("TOP {limit} "),
            None => String::new(),
        };
        let mut sql = format!("SELECT {top}{projection} FROM c");

        let mut conditions = Vec::new();
        for predicate in &query.predicates {
            conditions.push(self.render_expression(predicate, Some("c"), parameters)?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !query.order_by.is_empty() {
            let columns = query
                .order_by
                .iter()
                .map(|entry| format!("c.{} {}", entry.column, entry.direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {columns}"));
        }

        Ok(sql)
    }
}
