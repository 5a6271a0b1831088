//! # SQL Type Mapping & Identifier Quoting
//!
//! The pure projection from a schema field to its SQL column type, plus the
//! identifier quoting styles of the dialects the bridge targets.
//!
//! ## Type Projection
//!
//! | Schema type | SQL type |
//! |-------------|----------|
//! | time-point (any primitive) | `TIMESTAMP` |
//! | i8, u8, i16, u16, i32 | `INTEGER` |
//! | u32, i64 | `BIGINT` |
//! | double | `REAL` |
//! | decimal128 | `NUMERIC` |
//! | bytes[N] (byte string) | `VARCHAR(N)` |
//! | offset string | `VARCHAR` |
//!
//! u64, raw blobs and anything structured have no lossless SQL image and are
//! rejected. The `sql.column-type` option overrides the projection verbatim.

use crate::scheme::{Field, FieldType, SubType};
use eyre::{bail, Result};

/// Identifier quoting style of the target dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteMode {
    /// Backticks (SQLite, MySQL).
    Sqlite,
    /// Double quotes (PostgreSQL, the standard).
    #[default]
    Psql,
    /// Square brackets (Sybase, MSSQL).
    Sybase,
    /// No quoting at all.
    None,
}

impl QuoteMode {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "sqlite" => QuoteMode::Sqlite,
            "psql" => QuoteMode::Psql,
            "sybase" => QuoteMode::Sybase,
            "none" => QuoteMode::None,
            _ => bail!("unknown quote mode '{}'", s),
        })
    }

    pub fn quote(&self, name: &str) -> String {
        match self {
            QuoteMode::Sqlite => format!("`{}`", name),
            QuoteMode::Psql => format!("\"{}\"", name),
            QuoteMode::Sybase => format!("[{}]", name),
            QuoteMode::None => name.to_owned(),
        }
    }

    /// Quotes a table name; a single dot splits it into schema and table,
    /// each quoted on its own.
    pub fn quote_table(&self, table: &str) -> String {
        if table.bytes().filter(|&b| b == b'.').count() == 1 {
            let (schema, name) = table.split_once('.').unwrap_or((table, ""));
            format!("{}.{}", self.quote(schema), self.quote(name))
        } else {
            self.quote(table)
        }
    }
}

/// Projects a schema field onto its SQL column type.
pub fn column_type(field: &Field) -> Result<String> {
    if let Some(t) = field.option("sql.column-type") {
        return Ok(t.to_owned());
    }

    if field.time_resolution().is_some() {
        return Ok("TIMESTAMP".to_owned());
    }

    Ok(match field.field_type() {
        FieldType::Int8
        | FieldType::UInt8
        | FieldType::Int16
        | FieldType::UInt16
        | FieldType::Int32 => "INTEGER".to_owned(),
        FieldType::UInt32 | FieldType::Int64 => "BIGINT".to_owned(),
        FieldType::UInt64 => bail!("field {}: u64 is not supported", field.name()),
        FieldType::Double => "REAL".to_owned(),
        FieldType::Decimal128 => "NUMERIC".to_owned(),
        FieldType::Bytes => {
            if field.sub_type() == SubType::ByteString {
                format!("VARCHAR({})", field.size())
            } else {
                bail!("field {}: blobs are not supported", field.name())
            }
        }
        FieldType::OffsetString => "VARCHAR".to_owned(),
    })
}
