use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

use super::schema::TableSchema;
use crate::error::IngestError;
use crate::formats::parquet::{coerce_datetime_columns, unpack_dictionaries};
use crate::telemetry::BatchReport;

/// Destination for transformed batches
///
/// The production implementation is [`super::postgres::PgSink`]; tests use an
/// in-memory recorder.
#[async_trait]
pub trait BatchSink: Send {
    /// Create `table` from `schema` unless it already exists
    ///
    /// Returns `true` if the table was created by this call.
    async fn ensure_table(&mut self, table: &str, schema: &TableSchema) -> Result<bool, IngestError>;

    /// Append every row of `batch`, returning the number of rows written
    async fn append(
        &mut self,
        table: &str,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64, IngestError>;
}

/// Transforms batches and appends them to one table
///
/// The table layout is resolved from the first batch; later batches must map
/// onto the same columns.
pub struct Loader<S> {
    sink: S,
    table: String,
    datetime_columns: Vec<String>,
    schema: Option<TableSchema>,
    table_created: bool,
    batches_loaded: usize,
}

impl<S: BatchSink> Loader<S> {
    pub fn new(sink: S, table: impl Into<String>, datetime_columns: Vec<String>) -> Self {
        Self {
            sink,
            table: table.into(),
            datetime_columns,
            schema: None,
            table_created: false,
            batches_loaded: 0,
        }
    }

    /// Coerce, then append one batch
    pub async fn load_batch(&mut self, batch: RecordBatch) -> Result<BatchReport, IngestError> {
        let start = Instant::now();
        let index = self.batches_loaded;

        let (batch, coerced_nulls) = coerce_datetime_columns(batch, &self.datetime_columns)?;
        if coerced_nulls > 0 {
            debug!(
                batch = index,
                coerced_nulls, "Replaced unparseable datetime values with null"
            );
        }
        let batch = unpack_dictionaries(batch)?;

        if let Some(schema) = &self.schema {
            schema.ensure_compatible(&batch.schema())?;
        } else {
            let schema = TableSchema::from_arrow(&batch.schema())?;
            if self.sink.ensure_table(&self.table, &schema).await? {
                info!(table = %self.table, columns = schema.columns.len(), "Created table");
                self.table_created = true;
            }
            self.schema = Some(schema);
        }

        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| IngestError::load_msg("table schema was not resolved"))?;
        let rows = self.sink.append(&self.table, schema, &batch).await?;

        self.batches_loaded += 1;
        Ok(BatchReport {
            index,
            rows,
            coerced_nulls,
            duration: start.elapsed(),
        })
    }

    /// Whether this run created the table
    pub fn table_created(&self) -> bool {
        self.table_created
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
