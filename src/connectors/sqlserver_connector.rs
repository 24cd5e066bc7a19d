use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tiberius::{Client, ColumnData, Config, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::config::model::DatabaseKind;
use crate::connectors::connector_trait::Connector;
use crate::metadata::shape::{ColumnDef, ColumnType, ForeignKey, TableShape};
use crate::utils::error::{ExecuteError, GatewayResult, MetadataError};
use crate::utils::types::{LiteralValue, MutationOutcome, SqlStatement};

/// SQL Server error numbers raised by unique constraint violations.
const UNIQUE_VIOLATION_CODES: [u32; 2] = [2601, 2627];

/// SQL Server connector using tiberius over a compat TcpStream.
pub struct SqlServerConnector {
    client: Mutex<Client<Compat<TcpStream>>>,
}

/// Bind adapter mapping engine literals onto tiberius parameters.
struct BoundParam<'a>(&'a LiteralValue);

impl ToSql for BoundParam<'_> {
    fn to_sql(&self) -> ColumnData<'_> {
        match self.0 {
            LiteralValue::Int(i) => ColumnData::I64(Some(*i)),
            LiteralValue::Float(f) => ColumnData::F64(Some(*f)),
            LiteralValue::String(s) => ColumnData::String(Some(Cow::Borrowed(s))),
            LiteralValue::Bool(b) => ColumnData::Bit(Some(*b)),
            LiteralValue::Null => ColumnData::String(None),
        }
    }
}

impl SqlServerConnector {
    /// Connect using an ADO-style connection string.
    pub async fn connect(connection_string: &str) -> GatewayResult<Self> {
        let config = Config::from_ado_string(connection_string)
            .map_err(|e| ExecuteError::Driver(format!("invalid connection string: {e}")))?;

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ExecuteError::Driver(format!("connection failed: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| ExecuteError::Driver(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ExecuteError::Driver(format!("login failed: {e}")))?;

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn classify(err: tiberius::error::Error) -> ExecuteError {
        if let tiberius::error::Error::Server(token) = &err {
            if UNIQUE_VIOLATION_CODES.contains(&token.code()) {
                return ExecuteError::UniqueViolation(token.message().to_string());
            }
            return ExecuteError::Database(token.message().to_string());
        }
        ExecuteError::Driver(err.to_string())
    }

    /// Convert a data row to a JSON object. Types funnel through the small
    /// set the engine projects: integers, floats, bits and strings.
    fn row_to_json(row: &tiberius::Row) -> JsonValue {
        let mut object = Map::new();
        let names: Vec<String> = row
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        for (index, name) in names.into_iter().enumerate() {
            let value = if let Ok(Some(v)) = row.try_get::<i64, _>(index) {
                JsonValue::from(v)
            } else if let Ok(Some(v)) = row.try_get::<i32, _>(index) {
                JsonValue::from(v as i64)
            } else if let Ok(Some(v)) = row.try_get::<f64, _>(index) {
                JsonValue::from(v)
            } else if let Ok(Some(v)) = row.try_get::<bool, _>(index) {
                JsonValue::from(v)
            } else if let Ok(Some(v)) = row.try_get::<&str, _>(index) {
                JsonValue::from(v)
            } else {
                JsonValue::Null
            };
            object.insert(name, value);
        }
        JsonValue::Object(object)
    }

    async fn run_statement(
        &self,
        statement: &SqlStatement,
    ) -> GatewayResult<Vec<tiberius::Row>> {
        let params: Vec<BoundParam<'_>> = statement
            .parameters
            .iter()
            .map(|parameter| BoundParam(&parameter.value))
            .collect();
        let param_refs: Vec<&dyn ToSql> =
            params.iter().map(|p| p as &dyn ToSql).collect();

        let mut client = self.client.lock().await;
        debug!(sql = %statement.sql, "executing statement");
        let stream = client
            .query(&statement.sql, &param_refs)
            .await
            .map_err(Self::classify)?;
        stream
            .into_first_result()
            .await
            .map_err(Self::classify)
            .map_err(Into::into)
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MsSql
    }

    async fn query_json(&self, statement: &SqlStatement) -> GatewayResult<JsonValue> {
        let rows = self.run_statement(statement).await?;

        // FOR JSON output streams as NVARCHAR chunks split across rows.
        let mut document = String::new();
        for row in &rows {
            if let Ok(Some(chunk)) = row.try_get::<&str, _>(0) {
                document.push_str(chunk);
            }
        }
        if document.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&document)
            .map_err(|e| ExecuteError::Driver(format!("malformed JSON from server: {e}")).into())
    }

    async fn execute_mutation(&self, statement: &SqlStatement) -> GatewayResult<MutationOutcome> {
        let rows = self.run_statement(statement).await?;
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
        {
            let mut client = self.client.lock().await;
            client
                .simple_query("BEGIN TRANSACTION")
                .await
                .map_err(Self::classify)?
                .into_results()
                .await
                .map_err(Self::classify)?;
        }

        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            match self.execute_mutation(statement).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    let mut client = self.client.lock().await;
                    let _ = client.simple_query("ROLLBACK TRANSACTION").await;
                    return Err(err);
                }
            }
        }

        let mut client = self.client.lock().await;
        client
            .simple_query("COMMIT TRANSACTION")
            .await
            .map_err(Self::classify)?
            .into_results()
            .await
            .map_err(Self::classify)?;
        Ok(outcomes)
    }

    async fn introspect(&self, object: &str) -> GatewayResult<TableShape> {
        let failed = |message: String| MetadataError::IntrospectionFailed {
            object: object.to_string(),
            message,
        };

        let columns_statement = SqlStatement::new(
            "SELECT c.name, t.name AS type_name, c.is_nullable, c.is_identity, \
                    object_definition(c.default_object_id) AS default_text \
             FROM sys.columns c \
             JOIN sys.types t ON t.user_type_id = c.user_type_id \
             WHERE c.object_id = OBJECT_ID(@P1) \
             ORDER BY c.column_id",
            vec![crate::utils::types::SqlParameter::new(
                0,
                LiteralValue::String(object.to_string()),
            )],
        );
        let rows = self.run_statement(&columns_statement).await?;
        if rows.is_empty() {
            return self.introspect_procedure(object).await;
        }

        let mut columns = Vec::new();
        for row in &rows {
            let name: &str = row
                .try_get::<&str, _>(0)
                .ok()
                .flatten()
                .ok_or_else(|| failed("missing column name".to_string()))?;
            let type_name: &str = row.try_get::<&str, _>(1).ok().flatten().unwrap_or("nvarchar");
            let nullable = row.try_get::<bool, _>(2).ok().flatten().unwrap_or(false);
            let identity = row.try_get::<bool, _>(3).ok().flatten().unwrap_or(false);
            let default_text = row.try_get::<&str, _>(4).ok().flatten();
            columns.push(ColumnDef {
                name: name.to_string(),
                ty: ColumnType::from_sql_type(type_name),
                nullable,
                default: default_text.map(|text| JsonValue::String(text.to_string())),
                autogenerated: identity,
            });
        }

        let pk_statement = SqlStatement::new(
            "SELECT col.name \
             FROM sys.indexes i \
             JOIN sys.index_columns ic \
               ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             JOIN sys.columns col \
               ON col.object_id = ic.object_id AND col.column_id = ic.column_id \
             WHERE i.object_id = OBJECT_ID(@P1) AND i.is_primary_key = 1 \
             ORDER BY ic.key_ordinal",
            vec![crate::utils::types::SqlParameter::new(
                0,
                LiteralValue::String(object.to_string()),
            )],
        );
        let pk_rows = self.run_statement(&pk_statement).await?;
        let primary_key = pk_rows
            .iter()
            .filter_map(|row| row.try_get::<&str, _>(0).ok().flatten())
            .map(str::to_string)
            .collect();

        let fk_statement = SqlStatement::new(
            "SELECT fk.name, pc.name AS column_name, \
                    schema_name(rt.schema_id) + '.' + rt.name AS ref_object, \
                    rc.name AS ref_column \
             FROM sys.foreign_keys fk \
             JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
             JOIN sys.columns pc \
               ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id \
             JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id \
             JOIN sys.columns rc \
               ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id \
             WHERE fk.parent_object_id = OBJECT_ID(@P1) \
             ORDER BY fk.name, fkc.constraint_column_id",
            vec![crate::utils::types::SqlParameter::new(
                0,
                LiteralValue::String(object.to_string()),
            )],
        );
        let fk_rows = self.run_statement(&fk_statement).await?;

        let mut foreign_keys: Vec<ForeignKey> = Vec::new();
        let mut last_constraint = String::new();
        for row in &fk_rows {
            let constraint = row
                .try_get::<&str, _>(0)
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
            let column = row
                .try_get::<&str, _>(1)
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
            let ref_object = row
                .try_get::<&str, _>(2)
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
            let ref_column = row
                .try_get::<&str, _>(3)
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
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

    async fn close(&self, _grace: Duration) {
        // A single client carries no pool to drain; dropping it closes the
        // TDS session.
    }
}

impl SqlServerConnector {
    /// Shape of a stored procedure: declared parameters plus the columns of
    /// its first result set.
    async fn introspect_procedure(&self, object: &str) -> GatewayResult<TableShape> {
        let params_statement = SqlStatement::new(
            "SELECT p.name, TYPE_NAME(p.user_type_id) AS type_name \
             FROM sys.parameters p \
             WHERE p.object_id = OBJECT_ID(@P1) \
             ORDER BY p.parameter_id",
            vec![crate::utils::types::SqlParameter::new(
                0,
                LiteralValue::String(object.to_string()),
            )],
        );
        let param_rows = self.run_statement(&params_statement).await?;

        let mut parameters = Vec::new();
        for row in &param_rows {
            let name = row.try_get::<&str, _>(0).ok().flatten().unwrap_or_default();
            let type_name = row.try_get::<&str, _>(1).ok().flatten().unwrap_or("nvarchar");
            let mut def = ColumnDef::new(
                name.trim_start_matches('@'),
                ColumnType::from_sql_type(type_name),
            );
            def.nullable = true;
            parameters.push(def);
        }

        let describe_statement = SqlStatement::new(
            "SELECT name, system_type_name, is_nullable \
             FROM sys.dm_exec_describe_first_result_set(@P1, NULL, 0) \
             WHERE name IS NOT NULL \
             ORDER BY column_ordinal",
            vec![crate::utils::types::SqlParameter::new(
                0,
                LiteralValue::String(format!("EXEC {object}")),
            )],
        );
        let column_rows = self.run_statement(&describe_statement).await?;

        if parameters.is_empty() && column_rows.is_empty() {
            return Err(MetadataError::IntrospectionFailed {
                object: object.to_string(),
                message: "object does not exist or has no columns".to_string(),
            }
            .into());
        }

        let mut columns = Vec::new();
        for row in &column_rows {
            let name = row.try_get::<&str, _>(0).ok().flatten().unwrap_or_default();
            let type_name = row.try_get::<&str, _>(1).ok().flatten().unwrap_or("nvarchar");
            let nullable = row.try_get::<bool, _>(2).ok().flatten().unwrap_or(true);
            let mut def = ColumnDef::new(name, ColumnType::from_sql_type(type_name));
            def.nullable = nullable;
            columns.push(def);
        }

        Ok(TableShape {
            columns,
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            parameters,
        })
    }
}
