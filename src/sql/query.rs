//! # Query Synthesizer
//!
//! Assembles the per-message statement templates (insert, function call,
//! procedure call, raw query) and the ad-hoc `SELECT` a `Query` control
//! message turns into.
//!
//! Parameter order is always the implicit seq slot first (when enabled for
//! the message) followed by the data fields in declaration order; a
//! procedure with default options is therefore called as
//! `CALL t(seq, f0, f1, ...)`.

use crate::control::Expr;
use crate::scheme::Message;
use crate::sql::ddl::SEQ_COLUMN;
use crate::sql::types::QuoteMode;
use eyre::{bail, ensure, Result};

/// Statement template of a message, selected by `sql.template`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Template {
    /// No prepared statement (or an author-supplied `sql.query`).
    None,
    #[default]
    Insert,
    /// `SELECT ... FROM f(...)` returning rows of the output message.
    Function,
    /// `CALL p(...)`.
    Procedure,
}

impl Template {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "none" => Template::None,
            "insert" => Template::Insert,
            "function" => Template::Function,
            "procedure" => Template::Procedure,
            _ => bail!("unknown template '{}'", s),
        })
    }
}

/// Shape of a function-call select, selected by `function-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionMode {
    /// `SELECT <output columns> FROM f(...)`.
    #[default]
    Fields,
    /// `SELECT f(...)`.
    Empty,
}

impl FunctionMode {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "fields" => FunctionMode::Fields,
            "empty" => FunctionMode::Empty,
            _ => bail!("unknown function mode '{}'", s),
        })
    }
}

/// Quoted column list: the seq slot (when present) followed by the data
/// fields in declaration order.
fn column_names(message: &Message, quote: QuoteMode, with_seq: bool) -> Vec<String> {
    let mut names = Vec::with_capacity(message.data_field_count() + 1);
    if with_seq {
        names.push(quote.quote(SEQ_COLUMN));
    }
    for (_, field) in message.data_fields() {
        names.push(quote.quote(field.name()));
    }
    names
}

fn placeholders(count: usize) -> String {
    let mut s = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}

/// `INSERT INTO t(cols) VALUES (?, ...)`.
pub fn insert(message: &Message, table: &str, quote: QuoteMode, with_seq: bool) -> String {
    let names = column_names(message, quote, with_seq);
    format!(
        "INSERT INTO {}({}) VALUES ({})",
        quote.quote_table(table),
        names.join(", "),
        placeholders(names.len())
    )
}

/// Function-call select; the input message supplies the placeholders, the
/// output message the selected columns.
pub fn function(
    input: &Message,
    output: &Message,
    table: &str,
    quote: QuoteMode,
    with_seq: bool,
    output_with_seq: bool,
    mode: FunctionMode,
) -> String {
    let args = placeholders(input.data_field_count() + usize::from(with_seq));
    match mode {
        FunctionMode::Fields => {
            let names = column_names(output, quote, output_with_seq);
            format!(
                "SELECT {} FROM {}({})",
                names.join(", "),
                quote.quote_table(table),
                args
            )
        }
        FunctionMode::Empty => format!("SELECT {}({})", quote.quote_table(table), args),
    }
}

/// `CALL p(?, ...)`.
pub fn procedure(message: &Message, table: &str, quote: QuoteMode, with_seq: bool) -> String {
    format!(
        "CALL {}({})",
        quote.quote_table(table),
        placeholders(message.data_field_count() + usize::from(with_seq))
    )
}

/// Ad-hoc select for a `Query` control message: all columns of the target
/// message, with an AND-joined comparison per expression. Expression fields
/// must exist in the message.
pub fn select(
    message: &Message,
    table: &str,
    quote: QuoteMode,
    with_seq: bool,
    expressions: &[Expr],
) -> Result<String> {
    for expr in expressions {
        ensure!(
            message.field_by_name(&expr.field).is_some(),
            "no field '{}' in message {}",
            expr.field,
            message.name()
        );
    }

    let names = column_names(message, quote, with_seq);
    let mut sql = format!(
        "SELECT {} FROM {}",
        names.join(", "),
        quote.quote_table(table)
    );
    if !expressions.is_empty() {
        let clauses: Vec<String> = expressions
            .iter()
            .map(|e| format!("{} {} ?", quote.quote(&e.field), e.op.as_sql()))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Literal, Operator};
    use crate::scheme::{Field, FieldType, Message};

    fn msg() -> Message {
        Message::builder("Query", 10)
            .field(Field::scalar("f0", FieldType::Int64))
            .field(Field::scalar("f1", FieldType::Double))
            .field(Field::offset_string("f2"))
            .build()
            .unwrap()
    }

    #[test]
    fn insert_lists_seq_then_fields() {
        assert_eq!(
            insert(&msg(), "Query", QuoteMode::Psql, true),
            "INSERT INTO \"Query\"(\"_tll_seq\", \"f0\", \"f1\", \"f2\") VALUES (?, ?, ?, ?)"
        );
    }

    #[test]
    fn insert_without_seq() {
        assert_eq!(
            insert(&msg(), "Query", QuoteMode::Psql, false),
            "INSERT INTO \"Query\"(\"f0\", \"f1\", \"f2\") VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn function_fields_mode_selects_output_columns() {
        let input = Message::builder("Input", 10)
            .field(Field::scalar("a", FieldType::Int32))
            .field(Field::scalar("b", FieldType::Double))
            .build()
            .unwrap();
        let output = Message::builder("Output", 20)
            .field(Field::scalar("a", FieldType::Double))
            .field(Field::scalar("b", FieldType::Int32))
            .build()
            .unwrap();
        assert_eq!(
            function(
                &input,
                &output,
                "fn_foo",
                QuoteMode::Psql,
                false,
                false,
                FunctionMode::Fields
            ),
            "SELECT \"a\", \"b\" FROM \"fn_foo\"(?, ?)"
        );
        assert_eq!(
            function(
                &input,
                &output,
                "fn_foo",
                QuoteMode::Psql,
                false,
                false,
                FunctionMode::Empty
            ),
            "SELECT \"fn_foo\"(?, ?)"
        );
    }

    #[test]
    fn procedure_takes_seq_by_default() {
        let input = Message::builder("Input", 10)
            .field(Field::scalar("a", FieldType::Int32))
            .field(Field::scalar("b", FieldType::Double))
            .build()
            .unwrap();
        assert_eq!(
            procedure(&input, "TestProcedure", QuoteMode::Psql, true),
            "CALL \"TestProcedure\"(?, ?, ?)"
        );
    }

    #[test]
    fn select_without_expressions_has_no_where() {
        assert_eq!(
            select(&msg(), "Query", QuoteMode::Psql, true, &[]).unwrap(),
            "SELECT \"_tll_seq\", \"f0\", \"f1\", \"f2\" FROM \"Query\""
        );
    }

    #[test]
    fn select_joins_expressions_with_and() {
        let exprs = vec![
            Expr {
                field: "f0".to_owned(),
                op: Operator::Gt,
                value: Literal::Int(1000),
            },
            Expr {
                field: "f1".to_owned(),
                op: Operator::Le,
                value: Literal::Float(500.0),
            },
        ];
        assert_eq!(
            select(&msg(), "Query", QuoteMode::Psql, true, &exprs).unwrap(),
            "SELECT \"_tll_seq\", \"f0\", \"f1\", \"f2\" FROM \"Query\" \
             WHERE \"f0\" > ? AND \"f1\" <= ?"
        );
    }

    #[test]
    fn select_rejects_unknown_fields() {
        let exprs = vec![Expr {
            field: "nope".to_owned(),
            op: Operator::Eq,
            value: Literal::Int(1),
        }];
        let err = select(&msg(), "Query", QuoteMode::Psql, true, &exprs).unwrap_err();
        assert!(err.to_string().contains("no field 'nope'"));
    }
}
