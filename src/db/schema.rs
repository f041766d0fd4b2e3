use arrow::datatypes::{DataType, Schema};

use crate::error::IngestError;

/// SQL data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Bytea,
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Bytea => "BYTEA",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
        }
    }

    /// Column type used to store an Arrow type, or `None` if it has no mapping
    ///
    /// Unsigned types widen to the next signed type so every value fits,
    /// except UInt64 which shares BIGINT and fails per value on overflow.
    pub fn from_arrow(data_type: &DataType) -> Option<SqlType> {
        let sql_type = match data_type {
            DataType::Boolean => SqlType::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::UInt8 => SqlType::SmallInt,
            DataType::Int32 | DataType::UInt16 => SqlType::Integer,
            DataType::Int64 | DataType::UInt32 | DataType::UInt64 => SqlType::BigInt,
            DataType::Float16 | DataType::Float32 => SqlType::Real,
            DataType::Float64 => SqlType::DoublePrecision,
            DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => SqlType::Numeric,
            // All-null columns carry no type of their own
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
                SqlType::Text
            }
            DataType::Binary
            | DataType::LargeBinary
            | DataType::FixedSizeBinary(_)
            | DataType::BinaryView => SqlType::Bytea,
            DataType::Date32 | DataType::Date64 => SqlType::Date,
            DataType::Time32(_) | DataType::Time64(_) => SqlType::Time,
            DataType::Timestamp(_, None) => SqlType::Timestamp,
            DataType::Timestamp(_, Some(_)) => SqlType::TimestampTz,
            DataType::Dictionary(_, value_type) => return SqlType::from_arrow(value_type),
            _ => return None,
        };
        Some(sql_type)
    }

    /// Whether values of this type are bound as text and cast server-side
    pub fn needs_cast(&self) -> bool {
        matches!(self, SqlType::Numeric)
    }
}

/// A column in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// Column layout of the target table, resolved from the first batch of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Map every field of an Arrow schema to a SQL column
    ///
    /// Fails with a load error naming the first column whose type has no
    /// mapping.
    pub fn from_arrow(schema: &Schema) -> Result<Self, IngestError> {
        if schema.fields().is_empty() {
            return Err(IngestError::load_msg("batch has no columns"));
        }

        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let sql_type = SqlType::from_arrow(field.data_type()).ok_or_else(|| {
                    IngestError::load_msg(format!(
                        "column '{}' has unsupported type {}",
                        field.name(),
                        field.data_type()
                    ))
                })?;
                Ok(Column {
                    name: field.name().clone(),
                    sql_type,
                    nullable: field.is_nullable(),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        Ok(Self { columns })
    }

    /// Check that a later batch maps onto the same columns and types
    pub fn ensure_compatible(&self, schema: &Schema) -> Result<(), IngestError> {
        let other = TableSchema::from_arrow(schema)?;

        if other.columns.len() != self.columns.len() {
            return Err(IngestError::load_msg(format!(
                "batch has {} columns, expected {}",
                other.columns.len(),
                self.columns.len()
            )));
        }

        for (expected, actual) in self.columns.iter().zip(&other.columns) {
            if expected.name != actual.name || expected.sql_type != actual.sql_type {
                return Err(IngestError::load_msg(format!(
                    "column '{}' ({}) does not match expected '{}' ({})",
                    actual.name,
                    actual.sql_type.to_postgres(),
                    expected.name,
                    expected.sql_type.to_postgres()
                )));
            }
        }

        Ok(())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Double-quote an identifier, doubling any embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate a CREATE TABLE statement for `schema`
///
/// Every column is created nullable: datetime coercion may introduce nulls
/// into any of the coerced columns, and later files may carry nulls the first
/// batch did not.
pub fn generate_ddl(table_name: &str, schema: &TableSchema) -> String {
    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n",
        quote_identifier(table_name)
    );

    let column_defs: Vec<String> = schema
        .columns
        .iter()
        .map(|col| format!("  {} {}", quote_identifier(&col.name), col.sql_type.to_postgres()))
        .collect();

    ddl.push_str(&column_defs.join(",\n"));
    ddl.push_str("\n);");

    ddl
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    fn trip_schema() -> Schema {
        Schema::new(vec![
            Field::new("VendorID", DataType::Int64, true),
            Field::new(
                "tpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("passenger_count", DataType::Float64, true),
            Field::new(
                "store_and_fwd_flag",
                DataType::Dictionary(Box::new(DataType::Int8), Box::new(DataType::Utf8)),
                true,
            ),
            Field::new("fare_amount", DataType::Decimal128(10, 2), false),
        ])
    }

    #[test]
    fn test_arrow_type_mapping() {
        let test_cases = [
            (DataType::Boolean, Some(SqlType::Boolean)),
            (DataType::Int8, Some(SqlType::SmallInt)),
            (DataType::UInt8, Some(SqlType::SmallInt)),
            (DataType::UInt16, Some(SqlType::Integer)),
            (DataType::Int32, Some(SqlType::Integer)),
            (DataType::UInt32, Some(SqlType::BigInt)),
            (DataType::UInt64, Some(SqlType::BigInt)),
            (DataType::Float16, Some(SqlType::Real)),
            (DataType::Float64, Some(SqlType::DoublePrecision)),
            (DataType::Decimal256(40, 4), Some(SqlType::Numeric)),
            (DataType::LargeUtf8, Some(SqlType::Text)),
            (DataType::FixedSizeBinary(16), Some(SqlType::Bytea)),
            (DataType::Date64, Some(SqlType::Date)),
            (DataType::Time64(TimeUnit::Nanosecond), Some(SqlType::Time)),
            (
                DataType::Timestamp(TimeUnit::Second, None),
                Some(SqlType::Timestamp),
            ),
            (
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                Some(SqlType::TimestampTz),
            ),
            (
                DataType::Dictionary(Box::new(DataType::Int8), Box::new(DataType::Utf8)),
                Some(SqlType::Text),
            ),
            (DataType::Null, Some(SqlType::Text)),
            (
                DataType::List(std::sync::Arc::new(Field::new("item", DataType::Int32, true))),
                None,
            ),
        ];

        for (arrow_type, expected) in test_cases {
            assert_eq!(SqlType::from_arrow(&arrow_type), expected, "{}", arrow_type);
        }
    }

    #[test]
    fn test_schema_from_arrow() {
        let schema = TableSchema::from_arrow(&trip_schema()).unwrap();

        assert_eq!(schema.columns.len(), 5);
        assert_eq!(schema.columns[0].name, "VendorID");
        assert_eq!(schema.columns[0].sql_type, SqlType::BigInt);
        assert_eq!(schema.columns[1].sql_type, SqlType::Timestamp);
        assert_eq!(schema.columns[3].sql_type, SqlType::Text);
        assert_eq!(schema.columns[4].sql_type, SqlType::Numeric);
        assert!(!schema.columns[4].nullable);
        assert_eq!(
            schema.column_names().collect::<Vec<_>>(),
            vec![
                "VendorID",
                "tpep_pickup_datetime",
                "passenger_count",
                "store_and_fwd_flag",
                "fare_amount"
            ]
        );
    }

    #[test]
    fn test_unsupported_column_is_load_error() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new(
                "tags",
                DataType::List(std::sync::Arc::new(Field::new("item", DataType::Utf8, true))),
                true,
            ),
        ]);

        let err = TableSchema::from_arrow(&schema).unwrap_err();
        assert!(matches!(err, IngestError::Load { .. }));
        assert!(err.to_string().contains("'tags'"));
    }

    #[test]
    fn test_ensure_compatible() {
        let resolved = TableSchema::from_arrow(&trip_schema()).unwrap();

        // Nullability and dictionary encoding do not matter
        let same = Schema::new(vec![
            Field::new("VendorID", DataType::Int64, false),
            Field::new(
                "tpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Nanosecond, None),
                true,
            ),
            Field::new("passenger_count", DataType::Float64, true),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Field::new("fare_amount", DataType::Decimal128(12, 4), true),
        ]);
        assert!(resolved.ensure_compatible(&same).is_ok());

        let retyped = Schema::new(vec![
            Field::new("VendorID", DataType::Utf8, true),
            Field::new(
                "tpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("passenger_count", DataType::Float64, true),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Field::new("fare_amount", DataType::Decimal128(10, 2), true),
        ]);
        let err = resolved.ensure_compatible(&retyped).unwrap_err();
        assert!(err.to_string().contains("VendorID"));

        let narrower = Schema::new(vec![Field::new("VendorID", DataType::Int64, true)]);
        assert!(resolved.ensure_compatible(&narrower).is_err());
    }

    #[test]
    fn test_generate_ddl() {
        let schema = TableSchema {
            columns: vec![
                Column {
                    name: "id".to_string(),
                    sql_type: SqlType::BigInt,
                    nullable: false,
                },
                Column {
                    name: "tpep_pickup_datetime".to_string(),
                    sql_type: SqlType::Timestamp,
                    nullable: true,
                },
                Column {
                    name: "fare_amount".to_string(),
                    sql_type: SqlType::Numeric,
                    nullable: true,
                },
            ],
        };

        let ddl = generate_ddl("yellow_taxi_data", &schema);

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"yellow_taxi_data\" (\n  \"id\" BIGINT,\n  \"tpep_pickup_datetime\" TIMESTAMP,\n  \"fare_amount\" NUMERIC\n);"
        );
        assert!(!ddl.contains("NOT NULL"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("VendorID"), "\"VendorID\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }
}
