//! High-level runner API for the ingest pipeline.
//!
//! This module wires the stages together: download the source file, connect
//! to PostgreSQL, then read and load batches until the file is exhausted.
//!
//! This is the primary API for the CLI.

use derive_builder::Builder;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_OUTPUT_PATH, default_datetime_columns};
use crate::db::{BatchSink, Loader, PgSink};
use crate::formats::ParquetBatchReader;
use crate::io::{SourceUrl, download_file};
use crate::telemetry::LoadStats;

pub use crate::db::DatabaseTarget;
pub use crate::error::IngestError;

/// Arguments for one ingest run
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct IngestConfig {
    /// HTTP(S) location of the Parquet file
    pub url: String,
    pub target: DatabaseTarget,
    /// Where the download is written; replaced on every run
    #[builder(default = "PathBuf::from(DEFAULT_OUTPUT_PATH)")]
    pub output_path: PathBuf,
    /// Maximum rows per batch
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,
    /// Columns coerced to timestamps when present
    #[builder(default = "default_datetime_columns()")]
    pub datetime_columns: Vec<String>,
}

/// Result of a completed ingest run
#[derive(Debug)]
pub struct IngestSummary {
    pub run_id: String,
    pub table: String,
    pub table_created: bool,
    pub bytes_downloaded: u64,
    pub batches: usize,
    pub rows_loaded: u64,
    pub coerced_nulls: u64,
    pub duration: Duration,
    pub batch_p50_ms: Option<u64>,
    pub batch_p90_ms: Option<u64>,
    pub batch_p99_ms: Option<u64>,
}

/// Run a full ingest: download, connect, then load every batch
///
/// Stages run strictly in sequence and the first error ends the run. Batches
/// committed before a failure stay in the table.
///
/// # Example
///
/// ```no_run
/// use pg_parquet_ingest::runner::{DatabaseTarget, IngestConfigBuilder, run_ingest};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = IngestConfigBuilder::default()
///     .url("https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2021-01.parquet")
///     .target(DatabaseTarget {
///         user: "root".to_string(),
///         password: "root".to_string(),
///         host: "localhost".to_string(),
///         port: 5432,
///         database: "ny_taxi".to_string(),
///         table: "yellow_taxi_data".to_string(),
///     })
///     .build()?;
///
/// let summary = run_ingest(config).await?;
/// println!("Loaded {} rows in {:?}", summary.rows_loaded, summary.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_ingest(config: IngestConfig) -> Result<IngestSummary, IngestError> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("ingest", run_id = %run_id, table = %config.target.table);
    execute(config, run_id).instrument(span).await
}

async fn execute(config: IngestConfig, run_id: String) -> Result<IngestSummary, IngestError> {
    let start = Instant::now();

    let url = SourceUrl::parse(&config.url)?;
    let bytes_downloaded = download_file(&url, &config.output_path).await?;

    let sink = PgSink::connect(&config.target).await?;

    let mut reader = ParquetBatchReader::open(&config.output_path, config.batch_size).await?;
    let metadata = reader.metadata();
    info!(
        rows = metadata.total_rows,
        row_groups = metadata.row_groups,
        columns = metadata.schema.fields().len(),
        "Reading Parquet file"
    );

    let mut loader = Loader::new(
        sink,
        config.target.table.clone(),
        config.datetime_columns.clone(),
    );
    let stats = load_batches(&mut reader, &mut loader).await?;
    let table_created = loader.table_created();

    if let Err(e) = loader.into_sink().close().await {
        warn!(error = %e, "Database connection did not close cleanly");
    }

    let (batch_p50_ms, batch_p90_ms, batch_p99_ms) = stats.latency_percentiles();
    Ok(IngestSummary {
        run_id,
        table: config.target.table,
        table_created,
        bytes_downloaded,
        batches: stats.batches,
        rows_loaded: stats.rows_loaded,
        coerced_nulls: stats.coerced_nulls,
        duration: start.elapsed(),
        batch_p50_ms,
        batch_p90_ms,
        batch_p99_ms,
    })
}

/// Log target for per-batch progress lines, kept at `info` whatever `RUST_LOG` says
pub const PROGRESS_TARGET: &str = "pg_parquet_ingest::progress";

/// Drain `reader` into `loader`, one batch at a time
pub(crate) async fn load_batches<S: BatchSink>(
    reader: &mut ParquetBatchReader,
    loader: &mut Loader<S>,
) -> Result<LoadStats, IngestError> {
    let mut stats = LoadStats::new();

    while let Some(batch) = reader.next_batch().await? {
        let report = loader.load_batch(batch).await?;
        info!(
            target: PROGRESS_TARGET,
            "Inserted {} rows, took {:.3} seconds",
            report.rows,
            report.duration.as_secs_f64()
        );
        stats.record(&report);
    }

    info!(
        target: PROGRESS_TARGET,
        batches = stats.batches,
        rows = stats.rows_loaded,
        coerced_nulls = stats.coerced_nulls,
        "Finished ingesting data into the postgres database"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> DatabaseTarget {
        DatabaseTarget {
            user: "root".to_string(),
            password: "root".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "ny_taxi".to_string(),
            table: "yellow_taxi_data".to_string(),
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = IngestConfigBuilder::default()
            .url("https://example.com/yellow_tripdata_2021-01.parquet")
            .target(target())
            .build()
            .unwrap();

        assert_eq!(config.output_path, PathBuf::from("output.parquet"));
        assert_eq!(config.batch_size, 100_000);
        assert_eq!(
            config.datetime_columns,
            vec!["tpep_pickup_datetime", "tpep_dropoff_datetime"]
        );
    }

    #[test]
    fn test_builder_requires_url_and_target() {
        assert!(IngestConfigBuilder::default().target(target()).build().is_err());
        assert!(
            IngestConfigBuilder::default()
                .url("https://example.com/data.parquet")
                .build()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_download_error() {
        let config = IngestConfigBuilder::default()
            .url("s3://bucket/data.parquet")
            .target(target())
            .build()
            .unwrap();

        let err = run_ingest(config).await.unwrap_err();
        assert!(matches!(err, IngestError::Download { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
