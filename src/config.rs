//! Configuration constants for the ingest pipeline
//!
//! This module centralizes the tunable parameters used throughout the
//! application. Runtime values that vary per run live in
//! [`crate::runner::IngestConfig`].

// ============================================================================
// Download Configuration
// ============================================================================

/// Size of the write buffer used while streaming the HTTP body to disk
pub const CHUNK_SIZE: usize = 8192; // 8 KB

/// Local file the downloaded Parquet data is written to (overwritten each run)
pub const DEFAULT_OUTPUT_PATH: &str = "output.parquet";

// ============================================================================
// Batch Configuration
// ============================================================================

/// Maximum number of rows handed to the loader at once
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Columns coerced to timestamps before loading, when present in the file
pub const DATETIME_COLUMNS: [&str; 2] = ["tpep_pickup_datetime", "tpep_dropoff_datetime"];

// ============================================================================
// Database Configuration
// ============================================================================

/// PostgreSQL's limit on bind parameters in a single statement
///
/// Multi-row INSERT statements are split so that `rows * columns` never
/// exceeds this value.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub(crate) fn default_datetime_columns() -> Vec<String> {
    DATETIME_COLUMNS.iter().map(|c| c.to_string()).collect()
}
