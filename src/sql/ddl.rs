//! # DDL Synthesizer
//!
//! Assembles `CREATE TABLE` and `CREATE INDEX` statements from a schema
//! message. The create mode decides whether the statements are guarded with
//! `IF NOT EXISTS` (`checked`) or left bare so an existing table fails the
//! open (`always`).
//!
//! Column order is the implicit `_tll_seq INTEGER NOT NULL` (unless
//! `sql.with-seq=false`) followed by the schema fields in declaration order,
//! excluding the presence bitmap. Optional fields drop the `NOT NULL`;
//! `sql.primary-key` (on the field or, for pointers, the pointee) appends
//! `PRIMARY KEY`.

use crate::scheme::field::option_bool;
use crate::scheme::{Field, Message};
use crate::sql::types::{column_type, QuoteMode};
use eyre::{bail, Result, WrapErr};

/// Column name of the implicit sequence slot.
pub const SEQ_COLUMN: &str = "_tll_seq";

/// Table creation policy at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    /// Never issue DDL; the tables must already exist.
    No,
    /// `CREATE TABLE IF NOT EXISTS`: open succeeds either way.
    #[default]
    Checked,
    /// Bare `CREATE TABLE`: open fails when the table already exists.
    Always,
}

impl CreateMode {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "no" => CreateMode::No,
            "checked" => CreateMode::Checked,
            "always" => CreateMode::Always,
            _ => bail!("unknown create mode '{}'", s),
        })
    }

    fn if_not_exists(&self) -> &'static str {
        match self {
            CreateMode::Checked => "IF NOT EXISTS ",
            _ => "",
        }
    }
}

/// Index request parsed from an `sql.index` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    #[default]
    No,
    Yes,
    Unique,
}

impl IndexMode {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "no" => IndexMode::No,
            "yes" => IndexMode::Yes,
            "unique" => IndexMode::Unique,
            _ => bail!("unknown index mode '{}'", s),
        })
    }
}

fn primary_key(field: &Field) -> Result<bool> {
    match field.option_or_pointee("sql.primary-key") {
        Some(v) => option_bool(v)
            .wrap_err_with(|| format!("field {}: invalid sql.primary-key", field.name())),
        None => Ok(false),
    }
}

/// Synthesizes the `CREATE TABLE` statement for a message.
pub fn create_table(
    message: &Message,
    table: &str,
    quote: QuoteMode,
    mode: CreateMode,
    with_seq: bool,
) -> Result<String> {
    let mut columns = Vec::with_capacity(message.data_field_count() + 1);
    if with_seq {
        columns.push(format!("{} INTEGER NOT NULL", quote.quote(SEQ_COLUMN)));
    }
    for (_, field) in message.data_fields() {
        let sql_type = column_type(field)
            .wrap_err_with(|| format!("message {} field {}", message.name(), field.name()))?;
        let mut column = format!("{} {}", quote.quote(field.name()), sql_type);
        if !field.is_optional() {
            column.push_str(" NOT NULL");
        }
        if primary_key(field)? {
            column.push_str(" PRIMARY KEY");
        }
        columns.push(column);
    }

    Ok(format!(
        "CREATE TABLE {}{} ({})",
        mode.if_not_exists(),
        quote.quote_table(table),
        columns.join(", ")
    ))
}

fn create_index(
    table: &str,
    column: &str,
    quote: QuoteMode,
    mode: CreateMode,
    unique: bool,
) -> String {
    let name = format!("_tll_{}_{}", table, column);
    format!(
        "CREATE {}INDEX {}{} on {}({})",
        if unique { "UNIQUE " } else { "" },
        mode.if_not_exists(),
        quote.quote(&name),
        quote.quote_table(table),
        quote.quote(column)
    )
}

/// Synthesizes the `CREATE INDEX` statements for a message: the seq index
/// (message-level `sql.index`, defaulting to `seq_default` when the seq
/// column exists) and one per field with `sql.index`.
pub fn create_indexes(
    message: &Message,
    table: &str,
    quote: QuoteMode,
    mode: CreateMode,
    with_seq: bool,
    seq_default: IndexMode,
) -> Result<Vec<String>> {
    let mut out = Vec::new();

    if with_seq {
        let seq_index = match message.option("sql.index") {
            Some(v) => IndexMode::parse(v)
                .wrap_err_with(|| format!("message {}: invalid sql.index", message.name()))?,
            None => seq_default,
        };
        if seq_index != IndexMode::No {
            out.push(create_index(
                table,
                SEQ_COLUMN,
                quote,
                mode,
                seq_index == IndexMode::Unique,
            ));
        }
    }

    for (_, field) in message.data_fields() {
        let index = match field.option("sql.index") {
            Some(v) => IndexMode::parse(v).wrap_err_with(|| {
                format!(
                    "message {} field {}: invalid sql.index",
                    message.name(),
                    field.name()
                )
            })?,
            None => IndexMode::No,
        };
        if index != IndexMode::No {
            out.push(create_index(
                table,
                field.name(),
                quote,
                mode,
                index == IndexMode::Unique,
            ));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{Field, FieldType, Message};

    fn trade() -> Message {
        Message::builder("Trade", 1)
            .field(Field::scalar("price", FieldType::Decimal128))
            .field(Field::byte_string("symbol", 8))
            .build()
            .unwrap()
    }

    #[test]
    fn checked_mode_guards_with_if_not_exists() {
        let sql = create_table(&trade(), "Trade", QuoteMode::Psql, CreateMode::Checked, true)
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"Trade\" (\"_tll_seq\" INTEGER NOT NULL, \
             \"price\" NUMERIC NOT NULL, \"symbol\" VARCHAR(8) NOT NULL)"
        );
    }

    #[test]
    fn always_mode_creates_bare() {
        let sql =
            create_table(&trade(), "Trade", QuoteMode::Psql, CreateMode::Always, true).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"Trade\" ("));
    }

    #[test]
    fn optional_fields_drop_not_null() {
        let msg = Message::builder("Order", 2)
            .pmap_field("_pmap", 1)
            .field(Field::scalar("id", FieldType::Int64))
            .field(Field::byte_string("note", 16).optional(0))
            .build()
            .unwrap();
        let sql =
            create_table(&msg, "Order", QuoteMode::Psql, CreateMode::Checked, true).unwrap();
        assert!(sql.contains("\"id\" BIGINT NOT NULL"));
        assert!(sql.contains("\"note\" VARCHAR(16),") || sql.ends_with("\"note\" VARCHAR(16))"));
        assert!(!sql.contains("_pmap"), "pmap SHOULD NOT become a column");
    }

    #[test]
    fn primary_key_option_appends() {
        let msg = Message::builder("M", 3)
            .field(Field::scalar("id", FieldType::Int64).with_option("sql.primary-key", "yes"))
            .build()
            .unwrap();
        let sql = create_table(&msg, "M", QuoteMode::Psql, CreateMode::Checked, true).unwrap();
        assert!(sql.contains("\"id\" BIGINT NOT NULL PRIMARY KEY"));
    }

    #[test]
    fn with_seq_false_drops_the_seq_column() {
        let sql =
            create_table(&trade(), "Trade", QuoteMode::Psql, CreateMode::Checked, false).unwrap();
        assert!(!sql.contains(SEQ_COLUMN));
    }

    #[test]
    fn seq_index_uses_the_default_mode() {
        let ddl = create_indexes(
            &trade(),
            "Trade",
            QuoteMode::Sqlite,
            CreateMode::Checked,
            true,
            IndexMode::Unique,
        )
        .unwrap();
        assert_eq!(
            ddl,
            vec![
                "CREATE UNIQUE INDEX IF NOT EXISTS `_tll_Trade__tll_seq` on `Trade`(`_tll_seq`)"
                    .to_owned()
            ]
        );
    }

    #[test]
    fn field_indexes_follow_options() {
        let msg = Message::builder("M", 4)
            .field(Field::scalar("a", FieldType::Int32).with_option("sql.index", "yes"))
            .field(Field::scalar("b", FieldType::Int32).with_option("sql.index", "unique"))
            .field(Field::scalar("c", FieldType::Int32))
            .build()
            .unwrap();
        let ddl = create_indexes(
            &msg,
            "M",
            QuoteMode::Psql,
            CreateMode::Checked,
            false,
            IndexMode::No,
        )
        .unwrap();
        assert_eq!(
            ddl,
            vec![
                "CREATE INDEX IF NOT EXISTS \"_tll_M_a\" on \"M\"(\"a\")".to_owned(),
                "CREATE UNIQUE INDEX IF NOT EXISTS \"_tll_M_b\" on \"M\"(\"b\")".to_owned(),
            ]
        );
    }
}
