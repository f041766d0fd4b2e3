//! Parquet support for the ingest pipeline.
//!
//! - `reader`: sequential, exact-size batches over a local Parquet file
//! - `conversion`: per-batch column transforms (datetime coercion, dictionary unpacking)

mod conversion;
mod reader;

pub use conversion::{coerce_datetime_columns, format_decimal, unpack_dictionaries};
pub use reader::ParquetBatchReader;
