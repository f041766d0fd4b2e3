//! PostgreSQL sink: one connection, one transaction per batch.
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Postgres};
use std::str::FromStr;
use tracing::{debug, info};

use super::loader::BatchSink;
use super::schema::{SqlType, TableSchema, generate_ddl, quote_identifier};
use super::target::DatabaseTarget;
use super::values::{ColumnValues, SqlValue};
use crate::config::MAX_BIND_PARAMS;
use crate::error::IngestError;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

pub struct PgSink {
    conn: PgConnection,
}

impl PgSink {
    /// Open the connection used for the whole run
    ///
    /// Unreachable hosts and rejected credentials are both connection errors.
    pub async fn connect(target: &DatabaseTarget) -> Result<Self, IngestError> {
        let uri = target.connection_uri()?;
        info!("Connecting to {}", target.redacted_uri());

        let options = PgConnectOptions::from_str(uri.as_str())
            .map_err(|e| IngestError::connection(format!("invalid connection URI {}", target.redacted_uri()), e))?
            // Multi-row INSERTs are far too large to log
            .disable_statement_logging();

        let conn = options.connect().await.map_err(|e| {
            IngestError::connection(format!("cannot connect to {}", target.redacted_uri()), e)
        })?;

        info!("Database connection successful.");
        Ok(Self { conn })
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, IngestError> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.tables
                WHERE table_schema = current_schema()
                AND table_name = $1
            )
        "#;

        sqlx::query_scalar::<_, bool>(query)
            .bind(table)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| IngestError::load(format!("failed to look up table '{}'", table), e))
    }

    pub async fn close(self) -> Result<(), IngestError> {
        self.conn
            .close()
            .await
            .map_err(|e| IngestError::load("failed to close database connection", e))
    }
}

#[async_trait]
impl BatchSink for PgSink {
    async fn ensure_table(&mut self, table: &str, schema: &TableSchema) -> Result<bool, IngestError> {
        if self.table_exists(table).await? {
            debug!(table, "Table exists, appending");
            return Ok(false);
        }

        let ddl = generate_ddl(table, schema);
        debug!(%ddl, "Creating table");
        sqlx::query(&ddl)
            .execute(&mut self.conn)
            .await
            .map_err(|e| IngestError::load(format!("failed to create table '{}'", table), e))?;
        Ok(true)
    }

    async fn append(
        &mut self,
        table: &str,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64, IngestError> {
        let num_rows = batch.num_rows();
        if num_rows == 0 {
            return Ok(0);
        }

        let columns = schema
            .columns
            .iter()
            .zip(batch.columns())
            .map(|(column, array)| ColumnValues::new(column, array))
            .collect::<Result<Vec<_>, IngestError>>()?;

        let chunk_rows = rows_per_statement(schema.columns.len());
        debug!(
            rows = num_rows,
            rows_per_statement = chunk_rows,
            "Writing batch"
        );

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| IngestError::load("failed to start transaction", e))?;

        for start in (0..num_rows).step_by(chunk_rows) {
            let end = (start + chunk_rows).min(num_rows);
            let sql = insert_statement(table, schema, end - start);

            let mut query = sqlx::query(&sql);
            for row in start..end {
                for (column, values) in schema.columns.iter().zip(&columns) {
                    query = bind_value(query, values.value(row, column.sql_type)?);
                }
            }

            query.execute(&mut *tx).await.map_err(|e| {
                IngestError::load(format!("insert into '{}' failed at row {}", table, start), e)
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| IngestError::load("failed to commit batch", e))?;

        Ok(num_rows as u64)
    }
}

/// Rows that fit in one statement without exceeding the bind parameter limit
pub(crate) fn rows_per_statement(num_columns: usize) -> usize {
    (MAX_BIND_PARAMS / num_columns.max(1)).max(1)
}

/// `INSERT INTO "table" ("c1", ...) VALUES ($1, ...), ...` for `rows` rows
pub(crate) fn insert_statement(table: &str, schema: &TableSchema, rows: usize) -> String {
    let column_list: Vec<String> = schema.column_names().map(quote_identifier).collect();

    let mut value_groups = Vec::with_capacity(rows);
    let mut param_idx = 1;
    for _ in 0..rows {
        let placeholders: Vec<String> = schema
            .columns
            .iter()
            .map(|col| {
                let placeholder = format!("${}", param_idx);
                param_idx += 1;
                if col.sql_type.needs_cast() {
                    format!("CAST({} AS {})", placeholder, col.sql_type.to_postgres())
                } else {
                    placeholder
                }
            })
            .collect();
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(table),
        column_list.join(", "),
        value_groups.join(", ")
    )
}

fn bind_value(query: PgQuery<'_>, value: SqlValue) -> PgQuery<'_> {
    match value {
        SqlValue::Null(sql_type) => bind_null(query, sql_type),
        SqlValue::Boolean(v) => query.bind(v),
        SqlValue::SmallInt(v) => query.bind(v),
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::BigInt(v) => query.bind(v),
        SqlValue::Real(v) => query.bind(v),
        SqlValue::DoublePrecision(v) => query.bind(v),
        SqlValue::Numeric(v) | SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytea(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
        SqlValue::TimestampTz(v) => query.bind(v),
    }
}

/// Bind NULL with the parameter type of its column
fn bind_null(query: PgQuery<'_>, sql_type: SqlType) -> PgQuery<'_> {
    match sql_type {
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::SmallInt => query.bind(None::<i16>),
        SqlType::Integer => query.bind(None::<i32>),
        SqlType::BigInt => query.bind(None::<i64>),
        SqlType::Real => query.bind(None::<f32>),
        SqlType::DoublePrecision => query.bind(None::<f64>),
        SqlType::Numeric | SqlType::Text => query.bind(None::<String>),
        SqlType::Bytea => query.bind(None::<Vec<u8>>),
        SqlType::Date => query.bind(None::<chrono::NaiveDate>),
        SqlType::Time => query.bind(None::<chrono::NaiveTime>),
        SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
        SqlType::TimestampTz => query.bind(None::<chrono::DateTime<chrono::Utc>>),
    }
}
