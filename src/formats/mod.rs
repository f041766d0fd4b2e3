//! File format readers

pub mod parquet;

pub use parquet::ParquetBatchReader;
