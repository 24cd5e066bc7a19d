use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use serde_json::{Map, Value as JsonValue};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row as PgRow};
use tracing::{debug, warn};
use url::Url;

use crate::config::model::DatabaseKind;
use crate::connectors::connector_trait::Connector;
use crate::metadata::shape::{ColumnDef, ColumnType, ForeignKey, TableShape};
use crate::utils::error::{ExecuteError, GatewayResult, MetadataError};
use crate::utils::types::{LiteralValue, MutationOutcome, SqlStatement};

/// PostgreSQL connector over a deadpool connection pool.
pub struct PostgresConnector {
    pool: Pool,
}

impl PostgresConnector {
    /// Build the pool from a `postgresql://` connection string.
    pub fn connect(connection_string: &str, max_connections: usize) -> GatewayResult<Self> {
        let url = Url::parse(connection_string)
            .map_err(|e| ExecuteError::Driver(format!("invalid connection string: {e}")))?;

        let mut config = PoolConfig::new();
        config.host = url.host_str().map(str::to_string);
        config.port = url.port();
        if !url.username().is_empty() {
            config.user = Some(url.username().to_string());
        }
        config.password = url.password().map(str::to_string);
        let dbname = url.path().trim_start_matches('/');
        if !dbname.is_empty() {
            config.dbname = Some(dbname.to_string());
        }
        config.pool = Some(deadpool_postgres::PoolConfig::new(max_connections));

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ExecuteError::Driver(format!("failed to create pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn client(&self) -> GatewayResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ExecuteError::Driver(format!("failed to get connection: {e}")).into())
    }

    fn bind_values(statement: &SqlStatement) -> Vec<Box<dyn ToSql + Sync + Send>> {
        statement
            .parameters
            .iter()
            .map(|parameter| match &parameter.value {
                LiteralValue::Int(i) => Box::new(*i) as Box<dyn ToSql + Sync + Send>,
                LiteralValue::Float(f) => Box::new(*f),
                LiteralValue::String(s) => Box::new(s.clone()),
                LiteralValue::Bool(b) => Box::new(*b),
                LiteralValue::Null => Box::new(Option::<String>::None),
            })
            .collect()
    }

    fn classify(err: tokio_postgres::Error) -> ExecuteError {
        if let Some(db_error) = err.as_db_error() {
            if db_error.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION {
                return ExecuteError::UniqueViolation(db_error.message().to_string());
            }
            return ExecuteError::Database(db_error.message().to_string());
        }
        ExecuteError::Driver(err.to_string())
    }

    /// Convert a RETURNING row into a JSON object, keyed by column name.
    fn row_to_json(row: &PgRow) -> JsonValue {
        let mut object = Map::new();
        for (index, column) in row.columns().iter().enumerate() {
            let value = match *column.type_() {
                tokio_postgres::types::Type::INT2 => row
                    .try_get::<_, Option<i16>>(index)
                    .ok()
                    .flatten()
                    .map(|v| JsonValue::from(v as i64)),
                tokio_postgres::types::Type::INT4 => row
                    .try_get::<_, Option<i32>>(index)
                    .ok()
                    .flatten()
                    .map(|v| JsonValue::from(v as i64)),
                tokio_postgres::types::Type::INT8 => row
                    .try_get::<_, Option<i64>>(index)
                    .ok()
                    .flatten()
                    .map(JsonValue::from),
                tokio_postgres::types::Type::FLOAT4 => row
                    .try_get::<_, Option<f32>>(index)
                    .ok()
                    .flatten()
                    .map(|v| JsonValue::from(v as f64)),
                tokio_postgres::types::Type::FLOAT8 => row
                    .try_get::<_, Option<f64>>(index)
                    .ok()
                    .flatten()
                    .map(JsonValue::from),
                tokio_postgres::types::Type::BOOL => row
                    .try_get::<_, Option<bool>>(index)
                    .ok()
                    .flatten()
                    .map(JsonValue::from),
                tokio_postgres::types::Type::JSON | tokio_postgres::types::Type::JSONB => {
                    row.try_get::<_, Option<JsonValue>>(index).ok().flatten()
                }
                _ => row
                    .try_get::<_, Option<String>>(index)
                    .ok()
                    .flatten()
                    .map(JsonValue::from),
            };
            object.insert(column.name().to_string(), value.unwrap_or(JsonValue::Null));
        }
        JsonValue::Object(object)
    }

    /// Shape of a stored procedure / function: IN parameters plus the OUT
    /// columns of its result set.
    async fn introspect_routine(
        &self,
        client: &deadpool_postgres::Object,
        object: &str,
        schema: &str,
        routine: &str,
    ) -> GatewayResult<TableShape> {
        let rows = client
            .query(
                "SELECT p.parameter_name, p.data_type, p.parameter_mode \
                 FROM information_schema.parameters p \
                 JOIN information_schema.routines r \
                   ON r.specific_schema = p.specific_schema \
                  AND r.specific_name = p.specific_name \
                 WHERE r.routine_schema = $1 AND r.routine_name = $2 \
                 ORDER BY p.ordinal_position",
                &[&schema, &routine],
            )
            .await
            .map_err(|e| MetadataError::IntrospectionFailed {
                object: object.to_string(),
                message: e.to_string(),
            })?;

        if rows.is_empty() {
            return Err(MetadataError::IntrospectionFailed {
                object: object.to_string(),
                message: "object does not exist or has no columns".to_string(),
            }
            .into());
        }

        let mut parameters = Vec::new();
        let mut columns = Vec::new();
        for row in &rows {
            let name: Option<String> = row.get(0);
            let data_type: String = row.get(1);
            let mode: String = row.get(2);
            let Some(name) = name else { continue };
            let mut def = ColumnDef::new(name, ColumnType::from_sql_type(&data_type));
            def.nullable = true;
            match mode.as_str() {
                "IN" | "INOUT" => parameters.push(def),
                _ => columns.push(def),
            }
        }

        Ok(TableShape {
            columns,
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            parameters,
        })
    }

    fn split_object(object: &str) -> (String, String) {
        match object.split_once('.') {
            Some((schema, table)) => (schema.to_string(), table.to_string()),
            None => ("public".to_string(), object.to_string()),
        }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::PostgreSql
    }

    async fn query_json(&self, statement: &SqlStatement) -> GatewayResult<JsonValue> {
        let client = self.client().await?;
        let values = Self::bind_values(statement);
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v.as_ref() as &(dyn ToSql + Sync)).collect();

        debug!(sql = %statement.sql, "executing read statement");
        let rows = client
            .query(&statement.sql, &params)
            .await
            .map_err(Self::classify)?;

        match rows.first() {
            Some(row) => {
                let document: Option<JsonValue> =
                    row.try_get(0).map_err(|e| ExecuteError::Driver(e.to_string()))?;
                Ok(document.unwrap_or(JsonValue::Null))
            }
            None => Ok(JsonValue::Null),
        }
    }

    async fn execute_mutation(&self, statement: &SqlStatement) -> GatewayResult<MutationOutcome> {
        let client = self.client().await?;
        let values = Self::bind_values(statement);
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v.as_ref() as &(dyn ToSql + Sync)).collect();

        debug!(sql = %statement.sql, "executing mutation statement");
        let rows = client
            .query(&statement.sql, &params)
            .await
            .map_err(Self::classify)?;

        let returned: Vec<JsonValue> = rows.iter().map(Self::row_to_json).collect();
        Ok(MutationOutcome {
            rows_affected: rows.len() as u64,
            returned: if returned.is_empty() {
                None
            } else {
                Some(JsonValue::Array(returned))
            },
        })
    }

    async fn execute_transaction(
        &self,
        statements: &[SqlStatement],
    ) -> GatewayResult<Vec<MutationOutcome>> {
        let mut client = self.client().await?;
        let transaction = client
            .transaction()
            .await
            .map_err(|e| ExecuteError::Driver(e.to_string()))?;

        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            let values = Self::bind_values(statement);
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v.as_ref() as &(dyn ToSql + Sync)).collect();
            let rows = transaction
                .query(&statement.sql, &params)
                .await
                .map_err(Self::classify)?;
            let returned: Vec<JsonValue> = rows.iter().map(Self::row_to_json).collect();
            outcomes.push(MutationOutcome {
                rows_affected: rows.len() as u64,
                returned: if returned.is_empty() {
                    None
                } else {
                    Some(JsonValue::Array(returned))
                },
            });
        }

        transaction
            .commit()
            .await
            .map_err(|e| ExecuteError::Driver(e.to_string()))?;
        Ok(outcomes)
    }

    async fn introspect(&self, object: &str) -> GatewayResult<TableShape> {
        let client = self.client().await.map_err(|e| {
            MetadataError::IntrospectionFailed {
                object: object.to_string(),
                message: e.to_string(),
            }
        })?;
        let (schema, table) = Self::split_object(object);

        let failed = |e: tokio_postgres::Error| MetadataError::IntrospectionFailed {
            object: object.to_string(),
            message: e.to_string(),
        };

        let column_rows = client
            .query(
                "SELECT column_name, data_type, is_nullable, column_default, is_identity \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await
            .map_err(failed)?;

        if column_rows.is_empty() {
            // Not a table or view; try the routine catalog so stored
            // procedures get their parameter and result lists.
            return self.introspect_routine(&client, object, &schema, &table).await;
        }

        let mut columns = Vec::new();
        for row in &column_rows {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let nullable: String = row.get(2);
            let default: Option<String> = row.get(3);
            let identity: String = row.get(4);
            let autogenerated = identity == "YES"
                || default
                    .as_deref()
                    .map(|d| d.starts_with("nextval("))
                    .unwrap_or(false);
            columns.push(ColumnDef {
                name,
                ty: ColumnType::from_sql_type(&data_type),
                nullable: nullable == "YES",
                default: default.map(JsonValue::String),
                autogenerated,
            });
        }

        let pk_rows = client
            .query(
                "SELECT kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON kcu.constraint_name = tc.constraint_name \
                  AND kcu.table_schema = tc.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2 \
                 ORDER BY kcu.ordinal_position",
                &[&schema, &table],
            )
            .await
            .map_err(failed)?;
        let primary_key = pk_rows.iter().map(|row| row.get(0)).collect();

        let fk_rows = client
            .query(
                "SELECT tc.constraint_name, kcu.column_name, \
                        ccu.table_schema, ccu.table_name, ccu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON kcu.constraint_name = tc.constraint_name \
                  AND kcu.table_schema = tc.table_schema \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON ccu.constraint_name = tc.constraint_name \
                  AND ccu.table_schema = tc.table_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2 \
                 ORDER BY tc.constraint_name, kcu.ordinal_position",
                &[&schema, &table],
            )
            .await
            .map_err(failed)?;

        let mut foreign_keys: Vec<ForeignKey> = Vec::new();
        let mut last_constraint = String::new();
        for row in &fk_rows {
            let constraint: String = row.get(0);
            let column: String = row.get(1);
            let ref_schema: String = row.get(2);
            let ref_table: String = row.get(3);
            let ref_column: String = row.get(4);
            let ref_object = if ref_schema == "public" {
                ref_table
            } else {
                format!("{ref_schema}.{ref_table}")
            };
            if constraint != last_constraint {
                foreign_keys.push(ForeignKey {
                    columns: Vec::new(),
                    ref_object,
                    ref_columns: Vec::new(),
                });
                last_constraint = constraint;
            }
            let fk = foreign_keys.last_mut().expect("pushed above");
            fk.columns.push(column);
            fk.ref_columns.push(ref_column);
        }

        Ok(TableShape {
            columns,
            primary_key,
            foreign_keys,
            parameters: Vec::new(),
        })
    }

    async fn close(&self, grace: Duration) {
        // Let borrowed connections come back before closing the pool.
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let status = self.pool.status();
            if status.size == status.available || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.pool.status().size != self.pool.status().available {
            warn!("closing postgres pool with connections still in use");
        }
        self.pool.close();
    }
}
