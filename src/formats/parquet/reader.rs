//! Sequential Parquet batch reader.

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::StreamExt;
use futures::stream::BoxStream;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use parquet::errors::ParquetError;
use std::collections::VecDeque;
use std::path::Path;
use tokio::fs::File;
use tracing::debug;

use crate::error::IngestError;

/// Metadata read from the Parquet footer when the file is opened
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_size_bytes: u64,
    pub total_rows: u64,
    pub row_groups: usize,
    pub schema: SchemaRef,
}

/// Reads a local Parquet file as a finite, single-pass sequence of batches
///
/// Every batch holds exactly `batch_size` rows except the last one, which
/// holds whatever remains. The decoder yields batches that stop at row-group
/// boundaries, so they are re-sliced here before being handed out.
pub struct ParquetBatchReader {
    stream: BoxStream<'static, Result<RecordBatch, ParquetError>>,
    metadata: FileMetadata,
    rebatcher: Rebatcher,
    exhausted: bool,
}

impl ParquetBatchReader {
    /// Open `path` and read its footer
    pub async fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self, IngestError> {
        let path = path.as_ref();
        if batch_size == 0 {
            return Err(IngestError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }

        let file = File::open(path)
            .await
            .map_err(|e| IngestError::format(format!("cannot open {}", path.display()), e))?;
        let file_size_bytes = file
            .metadata()
            .await
            .map_err(|e| IngestError::format(format!("cannot stat {}", path.display()), e))?
            .len();

        let builder = ParquetRecordBatchStreamBuilder::new(file)
            .await
            .map_err(|e| IngestError::format("failed to read Parquet metadata", e))?;

        let parquet_metadata = builder.metadata();
        let metadata = FileMetadata {
            file_size_bytes,
            total_rows: parquet_metadata.file_metadata().num_rows().max(0) as u64,
            row_groups: parquet_metadata.num_row_groups(),
            schema: builder.schema().clone(),
        };

        let stream = builder
            .with_batch_size(batch_size)
            .build()
            .map_err(|e| IngestError::format("failed to build Parquet stream", e))?;

        Ok(Self {
            stream: stream.boxed(),
            metadata,
            rebatcher: Rebatcher::new(batch_size),
            exhausted: false,
        })
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Next batch in file order, or `Ok(None)` once every row has been returned
    ///
    /// After the end has been reached every further call returns `Ok(None)`.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>, IngestError> {
        loop {
            if let Some(batch) = self.rebatcher.pop_full()? {
                return Ok(Some(batch));
            }

            if self.exhausted {
                return self.rebatcher.flush();
            }

            match self.stream.next().await {
                Some(Ok(batch)) => self.rebatcher.push(batch),
                Some(Err(e)) => {
                    return Err(IngestError::format("failed to decode record batch", e));
                }
                None => self.exhausted = true,
            }
        }
    }
}

/// Re-slices a sequence of arbitrarily sized batches into batches of exactly
/// `target_rows` rows (the final remainder excepted), preserving row order.
struct Rebatcher {
    target_rows: usize,
    pending: VecDeque<RecordBatch>,
    pending_rows: usize,
}

impl Rebatcher {
    fn new(target_rows: usize) -> Self {
        Self {
            target_rows,
            pending: VecDeque::new(),
            pending_rows: 0,
        }
    }

    fn push(&mut self, batch: RecordBatch) {
        if batch.num_rows() == 0 {
            return;
        }
        self.pending_rows += batch.num_rows();
        self.pending.push_back(batch);
    }

    /// Take one full batch if enough rows are buffered
    fn pop_full(&mut self) -> Result<Option<RecordBatch>, IngestError> {
        if self.pending_rows < self.target_rows {
            return Ok(None);
        }

        let mut parts = Vec::new();
        let mut needed = self.target_rows;
        while needed > 0 {
            let Some(front) = self.pending.pop_front() else {
                break;
            };
            if front.num_rows() <= needed {
                needed -= front.num_rows();
                parts.push(front);
            } else {
                parts.push(front.slice(0, needed));
                self.pending
                    .push_front(front.slice(needed, front.num_rows() - needed));
                needed = 0;
            }
        }
        self.pending_rows -= self.target_rows;

        Self::combine(parts).map(Some)
    }

    /// Drain whatever is left as one final (possibly short) batch
    fn flush(&mut self) -> Result<Option<RecordBatch>, IngestError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let parts: Vec<RecordBatch> = self.pending.drain(..).collect();
        self.pending_rows = 0;
        Self::combine(parts).map(Some)
    }

    fn combine(mut parts: Vec<RecordBatch>) -> Result<RecordBatch, IngestError> {
        if parts.len() == 1 {
            return parts
                .pop()
                .ok_or_else(|| IngestError::load_msg("empty batch assembly"));
        }
        debug!(parts = parts.len(), "stitching batch across row groups");
        let schema = parts[0].schema();
        concat_batches(&schema, &parts)
            .map_err(|e| IngestError::format("failed to assemble record batch", e))
    }
}
