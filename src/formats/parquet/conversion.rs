//! Column transforms applied to each batch before it is written.
//!
//! The datetime columns are coerced leniently: a value that cannot be read as
//! a timestamp becomes null and the row is kept. Dictionary-encoded columns are
//! unpacked so that the writer only ever sees plain arrays.

use arrow::array::{Array, ArrayRef, AsArray, TimestampMicrosecondArray, new_null_array};
use arrow::compute::{CastOptions, can_cast_types, cast, cast_with_options};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::sync::Arc;

use crate::error::IngestError;

/// Timestamp layouts tried, in order, for string values
const TIMESTAMP_FORMATS: [&str; 9] = [
    "%Y-%m-%d %H:%M:%S%.f", // 2021-01-01 00:30:10 (fraction optional)
    "%Y-%m-%dT%H:%M:%S%.f", // 2021-01-01T00:30:10
    "%Y-%m-%d %H:%M",       // Without seconds
    "%Y-%m-%dT%H:%M",       // ISO 8601 without seconds
    "%Y/%m/%d %H:%M:%S",    // Slashed ISO
    "%m/%d/%Y %H:%M:%S",    // US format with time
    "%m/%d/%Y %I:%M:%S %p", // US format, 12-hour clock
    "%d-%m-%Y %H:%M:%S",    // European format with time
    "%d/%m/%Y %H:%M:%S",    // European format with time
];

/// Date-only layouts, read as midnight
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];

/// Coerce the named columns of `batch` to microsecond timestamps
///
/// Columns that are absent from the batch are ignored. Returns the new batch
/// together with the number of values that were non-null before coercion and
/// null after it.
pub fn coerce_datetime_columns(
    batch: RecordBatch,
    columns: &[String],
) -> Result<(RecordBatch, u64), IngestError> {
    let schema = batch.schema();
    let targets: Vec<usize> = columns
        .iter()
        .filter_map(|name| schema.index_of(name).ok())
        .collect();

    if targets.is_empty() {
        return Ok((batch, 0));
    }

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();
    let mut nulled = 0u64;

    for idx in targets {
        let original = &arrays[idx];
        let coerced = coerce_to_timestamp(original);
        nulled += coerced
            .logical_null_count()
            .saturating_sub(original.logical_null_count()) as u64;

        fields[idx] = fields[idx]
            .clone()
            .with_data_type(coerced.data_type().clone())
            .with_nullable(true);
        arrays[idx] = coerced;
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let batch = RecordBatch::try_new(schema, arrays)
        .map_err(|e| IngestError::load("failed to rebuild batch after datetime coercion", e))?;

    Ok((batch, nulled))
}

/// Convert one column to `Timestamp(Microsecond, tz)`, nulling what cannot be read
fn coerce_to_timestamp(array: &ArrayRef) -> ArrayRef {
    let naive_micros = DataType::Timestamp(TimeUnit::Microsecond, None);

    match array.data_type() {
        DataType::Timestamp(TimeUnit::Microsecond, _) => Arc::clone(array),
        DataType::Timestamp(_, tz) => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, tz.clone());
            lenient_cast(array, &target)
        }
        DataType::Utf8 => parse_strings(array.as_string::<i32>().iter()),
        DataType::LargeUtf8 => parse_strings(array.as_string::<i64>().iter()),
        DataType::Utf8View => parse_strings(array.as_string_view().iter()),
        DataType::Dictionary(_, value_type)
            if matches!(
                value_type.as_ref(),
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
            ) =>
        {
            match cast(array.as_ref(), &DataType::Utf8) {
                Ok(strings) => coerce_to_timestamp(&strings),
                Err(_) => new_null_array(&naive_micros, array.len()),
            }
        }
        // Numbers are epoch nanoseconds, dates are midnight
        _ => {
            let nanos = DataType::Timestamp(TimeUnit::Nanosecond, None);
            let as_nanos = lenient_cast(array, &nanos);
            lenient_cast(&as_nanos, &naive_micros)
        }
    }
}

/// Cast that turns unconvertible values (or whole unconvertible columns) into nulls
fn lenient_cast(array: &ArrayRef, target: &DataType) -> ArrayRef {
    if !can_cast_types(array.data_type(), target) {
        return new_null_array(target, array.len());
    }

    let options = CastOptions {
        safe: true,
        ..Default::default()
    };
    cast_with_options(array.as_ref(), target, &options)
        .unwrap_or_else(|_| new_null_array(target, array.len()))
}

fn parse_strings<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    let parsed: TimestampMicrosecondArray = values
        .map(|value| value.and_then(parse_timestamp).map(|ts| ts.and_utc().timestamp_micros()))
        .collect();
    Arc::new(parsed)
}

/// Read a timestamp from text, returning `None` when no known layout matches
pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(with_offset.naive_utc());
    }

    for format in &TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Replace dictionary-encoded columns with their plain value arrays
pub fn unpack_dictionaries(batch: RecordBatch) -> Result<RecordBatch, IngestError> {
    let schema = batch.schema();
    if !schema
        .fields()
        .iter()
        .any(|f| matches!(f.data_type(), DataType::Dictionary(_, _)))
    {
        return Ok(batch);
    }

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut arrays = Vec::with_capacity(schema.fields().len());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        if let DataType::Dictionary(_, value_type) = field.data_type() {
            let values = cast(array.as_ref(), value_type).map_err(|e| {
                IngestError::load(
                    format!("cannot unpack dictionary column '{}'", field.name()),
                    e,
                )
            })?;
            fields.push(field.as_ref().clone().with_data_type(value_type.as_ref().clone()));
            arrays.push(values);
        } else {
            fields.push(field.as_ref().clone());
            arrays.push(Arc::clone(array));
        }
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(schema, arrays)
        .map_err(|e| IngestError::load("failed to rebuild batch after unpacking dictionaries", e))
}

/// Render an unscaled decimal integer with `scale` fractional digits
///
/// Works from the integer's decimal text so it serves both Decimal128 and
/// Decimal256 values.
pub fn format_decimal(unscaled: &str, scale: i8) -> String {
    let (negative, digits) = match unscaled.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, unscaled),
    };
    let sign = if negative { "-" } else { "" };

    if scale <= 0 {
        let zeros = "0".repeat(scale.unsigned_abs() as usize);
        if digits == "0" {
            return "0".to_string();
        }
        return format!("{}{}{}", sign, digits, zeros);
    }

    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits.to_string()
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);

    format!("{}{}.{}", sign, int_part, frac_part)
}
