//! Typed cell values pulled out of Arrow columns for binding.

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Decimal128Array,
    Decimal256Array, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, StringArray,
    Time64MicrosecondArray, TimestampMicrosecondArray, new_null_array,
};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{
    DataType, Date32Type, Decimal128Type, Decimal256Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Time64MicrosecondType, TimeUnit, TimestampMicrosecondType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use super::schema::{Column, SqlType};
use crate::error::IngestError;
use crate::formats::parquet::format_decimal;

/// One cell, converted to the Rust type its column binds as
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlType),
    Boolean(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    DoublePrecision(f64),
    /// Decimal text, cast to NUMERIC by the statement
    Numeric(String),
    Text(String),
    Bytea(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

/// A batch column normalised to the single Arrow layout used for its SQL type
pub enum ColumnValues {
    Boolean(BooleanArray),
    SmallInt(Int16Array),
    Integer(Int32Array),
    BigInt(Int64Array),
    Real(Float32Array),
    DoublePrecision(Float64Array),
    Decimal128 { values: Decimal128Array, scale: i8 },
    Decimal256 { values: Decimal256Array, scale: i8 },
    Text(StringArray),
    Bytea(BinaryArray),
    Date(Date32Array),
    Time(Time64MicrosecondArray),
    Timestamp(TimestampMicrosecondArray),
    TimestampTz(TimestampMicrosecondArray),
}

impl ColumnValues {
    /// Normalise `array` for `column`
    ///
    /// Integer narrowing is checked, so a UInt64 value above `i64::MAX` fails
    /// here rather than wrapping.
    pub fn new(column: &Column, array: &ArrayRef) -> Result<Self, IngestError> {
        let mismatch = || {
            IngestError::load_msg(format!(
                "column '{}' of type {} cannot be stored as {}",
                column.name,
                array.data_type(),
                column.sql_type.to_postgres()
            ))
        };

        let values = match column.sql_type {
            SqlType::Boolean => {
                let array = convert(column, array, &DataType::Boolean)?;
                ColumnValues::Boolean(array.as_boolean_opt().ok_or_else(mismatch)?.clone())
            }
            SqlType::SmallInt => {
                let array = convert(column, array, &DataType::Int16)?;
                ColumnValues::SmallInt(
                    array.as_primitive_opt::<Int16Type>().ok_or_else(mismatch)?.clone(),
                )
            }
            SqlType::Integer => {
                let array = convert(column, array, &DataType::Int32)?;
                ColumnValues::Integer(
                    array.as_primitive_opt::<Int32Type>().ok_or_else(mismatch)?.clone(),
                )
            }
            SqlType::BigInt => {
                let array = convert(column, array, &DataType::Int64)?;
                ColumnValues::BigInt(
                    array.as_primitive_opt::<Int64Type>().ok_or_else(mismatch)?.clone(),
                )
            }
            SqlType::Real => {
                let array = convert(column, array, &DataType::Float32)?;
                ColumnValues::Real(
                    array.as_primitive_opt::<Float32Type>().ok_or_else(mismatch)?.clone(),
                )
            }
            SqlType::DoublePrecision => {
                let array = convert(column, array, &DataType::Float64)?;
                ColumnValues::DoublePrecision(
                    array.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?.clone(),
                )
            }
            SqlType::Numeric => match array.data_type() {
                DataType::Decimal128(_, scale) => ColumnValues::Decimal128 {
                    values: array
                        .as_primitive_opt::<Decimal128Type>()
                        .ok_or_else(mismatch)?
                        .clone(),
                    scale: *scale,
                },
                DataType::Decimal256(_, scale) => ColumnValues::Decimal256 {
                    values: array
                        .as_primitive_opt::<Decimal256Type>()
                        .ok_or_else(mismatch)?
                        .clone(),
                    scale: *scale,
                },
                _ => return Err(mismatch()),
            },
            SqlType::Text => {
                let array = if array.data_type() == &DataType::Null {
                    new_null_array(&DataType::Utf8, array.len())
                } else {
                    convert(column, array, &DataType::Utf8)?
                };
                ColumnValues::Text(array.as_string_opt::<i32>().ok_or_else(mismatch)?.clone())
            }
            SqlType::Bytea => {
                let array = convert(column, array, &DataType::Binary)?;
                ColumnValues::Bytea(array.as_binary_opt::<i32>().ok_or_else(mismatch)?.clone())
            }
            SqlType::Date => {
                let array = convert(column, array, &DataType::Date32)?;
                ColumnValues::Date(
                    array.as_primitive_opt::<Date32Type>().ok_or_else(mismatch)?.clone(),
                )
            }
            SqlType::Time => {
                let array = convert(column, array, &DataType::Time64(TimeUnit::Microsecond))?;
                ColumnValues::Time(
                    array
                        .as_primitive_opt::<Time64MicrosecondType>()
                        .ok_or_else(mismatch)?
                        .clone(),
                )
            }
            SqlType::Timestamp | SqlType::TimestampTz => {
                let tz = match array.data_type() {
                    DataType::Timestamp(_, tz) => tz.clone(),
                    _ => None,
                };
                let array = convert(column, array, &DataType::Timestamp(TimeUnit::Microsecond, tz))?;
                let values = array
                    .as_primitive_opt::<TimestampMicrosecondType>()
                    .ok_or_else(mismatch)?
                    .clone();
                if column.sql_type == SqlType::Timestamp {
                    ColumnValues::Timestamp(values)
                } else {
                    ColumnValues::TimestampTz(values)
                }
            }
        };

        Ok(values)
    }

    /// Value at `row`, or a typed null
    pub fn value(&self, row: usize, sql_type: SqlType) -> Result<SqlValue, IngestError> {
        if self.is_null(row) {
            return Ok(SqlValue::Null(sql_type));
        }

        let out_of_range =
            || IngestError::load_msg(format!("{} value out of range at row {}", sql_type.to_postgres(), row));

        let value = match self {
            ColumnValues::Boolean(a) => SqlValue::Boolean(a.value(row)),
            ColumnValues::SmallInt(a) => SqlValue::SmallInt(a.value(row)),
            ColumnValues::Integer(a) => SqlValue::Integer(a.value(row)),
            ColumnValues::BigInt(a) => SqlValue::BigInt(a.value(row)),
            ColumnValues::Real(a) => SqlValue::Real(a.value(row)),
            ColumnValues::DoublePrecision(a) => SqlValue::DoublePrecision(a.value(row)),
            ColumnValues::Decimal128 { values, scale } => {
                SqlValue::Numeric(format_decimal(&values.value(row).to_string(), *scale))
            }
            ColumnValues::Decimal256 { values, scale } => {
                SqlValue::Numeric(format_decimal(&values.value(row).to_string(), *scale))
            }
            ColumnValues::Text(a) => SqlValue::Text(a.value(row).to_string()),
            ColumnValues::Bytea(a) => SqlValue::Bytea(a.value(row).to_vec()),
            ColumnValues::Date(a) => SqlValue::Date(a.value_as_date(row).ok_or_else(out_of_range)?),
            ColumnValues::Time(a) => SqlValue::Time(a.value_as_time(row).ok_or_else(out_of_range)?),
            ColumnValues::Timestamp(a) => {
                SqlValue::Timestamp(a.value_as_datetime(row).ok_or_else(out_of_range)?)
            }
            ColumnValues::TimestampTz(a) => {
                SqlValue::TimestampTz(a.value_as_datetime(row).ok_or_else(out_of_range)?.and_utc())
            }
        };

        Ok(value)
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnValues::Boolean(a) => a.is_null(row),
            ColumnValues::SmallInt(a) => a.is_null(row),
            ColumnValues::Integer(a) => a.is_null(row),
            ColumnValues::BigInt(a) => a.is_null(row),
            ColumnValues::Real(a) => a.is_null(row),
            ColumnValues::DoublePrecision(a) => a.is_null(row),
            ColumnValues::Decimal128 { values, .. } => values.is_null(row),
            ColumnValues::Decimal256 { values, .. } => values.is_null(row),
            ColumnValues::Text(a) => a.is_null(row),
            ColumnValues::Bytea(a) => a.is_null(row),
            ColumnValues::Date(a) => a.is_null(row),
            ColumnValues::Time(a) => a.is_null(row),
            ColumnValues::Timestamp(a) | ColumnValues::TimestampTz(a) => a.is_null(row),
        }
    }
}

/// Strict cast: a value that does not fit its target fails the batch
fn convert(column: &Column, array: &ArrayRef, target: &DataType) -> Result<ArrayRef, IngestError> {
    if array.data_type() == target {
        return Ok(array.clone());
    }

    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array.as_ref(), target, &options).map_err(|e| {
        IngestError::load(
            format!(
                "column '{}' cannot be converted to {}",
                column.name,
                column.sql_type.to_postgres()
            ),
            e,
        )
    })
}
