//! End-to-end checks of the SQL text the bridge sends to the driver: table
//! and index DDL, the per-template statements, and the ad-hoc selects built
//! from `Query` control messages. Expected strings are written out in full,
//! computed from the documented rules rather than from the code.

use sqlbus::control::{Literal, Operator, Query};
use sqlbus::scheme::{Field, FieldType, Message, TimeResolution};
use sqlbus::sql::{ddl, query, CreateMode, IndexMode, QuoteMode};

fn trade() -> Message {
    Message::builder("Trade", 1)
        .field(Field::scalar("price", FieldType::Decimal128))
        .field(Field::byte_string("symbol", 8))
        .build()
        .unwrap()
}

mod ddl_tests {
    use super::*;

    #[test]
    fn trade_table_matches_the_documented_layout() {
        let sql =
            ddl::create_table(&trade(), "Trade", QuoteMode::Psql, CreateMode::Checked, true)
                .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"Trade\" (\"_tll_seq\" INTEGER NOT NULL, \
             \"price\" NUMERIC NOT NULL, \"symbol\" VARCHAR(8) NOT NULL)"
        );
    }

    #[test]
    fn time_points_become_timestamp_columns_at_any_resolution() {
        for resolution in [
            TimeResolution::Ns,
            TimeResolution::Ms,
            TimeResolution::Second,
            TimeResolution::Day,
        ] {
            let msg = Message::builder("Event", 5)
                .field(Field::time_point("ts", FieldType::Int64, resolution))
                .build()
                .unwrap();
            let sql =
                ddl::create_table(&msg, "Event", QuoteMode::Psql, CreateMode::Checked, true)
                    .unwrap();
            assert!(
                sql.contains("\"ts\" TIMESTAMP NOT NULL"),
                "resolution {:?} SHOULD map to TIMESTAMP: {}",
                resolution,
                sql
            );
        }
    }

    #[test]
    fn quote_modes_cover_all_dialects() {
        let msg = Message::builder("M", 2)
            .field(Field::scalar("a", FieldType::Int32))
            .build()
            .unwrap();
        let expected = [
            (QuoteMode::Sqlite, "CREATE TABLE `M` (`_tll_seq` INTEGER NOT NULL, `a` INTEGER NOT NULL)"),
            (QuoteMode::Psql, "CREATE TABLE \"M\" (\"_tll_seq\" INTEGER NOT NULL, \"a\" INTEGER NOT NULL)"),
            (QuoteMode::Sybase, "CREATE TABLE [M] ([_tll_seq] INTEGER NOT NULL, [a] INTEGER NOT NULL)"),
            (QuoteMode::None, "CREATE TABLE M (_tll_seq INTEGER NOT NULL, a INTEGER NOT NULL)"),
        ];
        for (mode, want) in expected {
            let sql = ddl::create_table(&msg, "M", mode, CreateMode::Always, true).unwrap();
            assert_eq!(sql, want);
        }
    }

    #[test]
    fn dotted_table_names_split_into_schema_and_table() {
        let sql = ddl::create_table(
            &trade(),
            "market.Trade",
            QuoteMode::Psql,
            CreateMode::Always,
            false,
        )
        .unwrap();
        assert!(sql.starts_with("CREATE TABLE \"market\".\"Trade\" ("));
    }

    #[test]
    fn index_ddl_uses_the_reserved_name_pattern() {
        let msg = Message::builder("M", 3)
            .field(Field::scalar("a", FieldType::Int32).with_option("sql.index", "unique"))
            .build()
            .unwrap();
        let ddl = ddl::create_indexes(
            &msg,
            "M",
            QuoteMode::Psql,
            CreateMode::Checked,
            true,
            IndexMode::Unique,
        )
        .unwrap();
        assert_eq!(
            ddl,
            vec![
                "CREATE UNIQUE INDEX IF NOT EXISTS \"_tll_M__tll_seq\" on \"M\"(\"_tll_seq\")"
                    .to_owned(),
                "CREATE UNIQUE INDEX IF NOT EXISTS \"_tll_M_a\" on \"M\"(\"a\")".to_owned(),
            ]
        );
    }

    #[test]
    fn unsupported_field_types_fail_table_synthesis() {
        let msg = Message::builder("Bad", 4)
            .field(Field::scalar("x", FieldType::UInt64))
            .build()
            .unwrap();
        assert!(
            ddl::create_table(&msg, "Bad", QuoteMode::Psql, CreateMode::Checked, true).is_err()
        );
    }
}

mod template_tests {
    use super::*;
    use sqlbus::sql::FunctionMode;

    #[test]
    fn insert_template_binds_seq_then_fields() {
        assert_eq!(
            query::insert(&trade(), "Trade", QuoteMode::Psql, true),
            "INSERT INTO \"Trade\"(\"_tll_seq\", \"price\", \"symbol\") VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn function_template_selects_the_output_message() {
        let input = Message::builder("ReqFoo", 100)
            .field(Field::scalar("x", FieldType::Int32))
            .build()
            .unwrap();
        let output = Message::builder("RespFoo", 101)
            .field(Field::scalar("y", FieldType::Int32))
            .build()
            .unwrap();
        assert_eq!(
            query::function(
                &input,
                &output,
                "fn_foo",
                QuoteMode::Psql,
                false,
                false,
                FunctionMode::Fields
            ),
            "SELECT \"y\" FROM \"fn_foo\"(?)"
        );
        assert_eq!(
            query::function(
                &input,
                &output,
                "fn_foo",
                QuoteMode::Psql,
                false,
                false,
                FunctionMode::Empty
            ),
            "SELECT \"fn_foo\"(?)"
        );
    }

    #[test]
    fn procedure_template_includes_the_seq_argument_by_default() {
        let input = Message::builder("Input", 10)
            .field(Field::scalar("a", FieldType::Int32))
            .field(Field::scalar("b", FieldType::Double))
            .build()
            .unwrap();
        assert_eq!(
            query::procedure(&input, "TestProcedure", QuoteMode::Psql, true),
            "CALL \"TestProcedure\"(?, ?, ?)"
        );
        assert_eq!(
            query::procedure(&input, "TestProcedure", QuoteMode::Psql, false),
            "CALL \"TestProcedure\"(?, ?)"
        );
    }
}

mod select_tests {
    use super::*;

    fn query_msg() -> Message {
        Message::builder("Query", 10)
            .field(Field::scalar("f0", FieldType::Int64))
            .field(Field::scalar("f1", FieldType::Double))
            .field(Field::offset_string("f2"))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_expression_selects_everything() {
        assert_eq!(
            query::select(&query_msg(), "Query", QuoteMode::Psql, true, &[]).unwrap(),
            "SELECT \"_tll_seq\", \"f0\", \"f1\", \"f2\" FROM \"Query\""
        );
    }

    #[test]
    fn every_operator_spells_out_correctly() {
        let cases = [
            (Operator::Eq, "\"f0\" = ?"),
            (Operator::Ne, "\"f0\" != ?"),
            (Operator::Gt, "\"f0\" > ?"),
            (Operator::Ge, "\"f0\" >= ?"),
            (Operator::Lt, "\"f0\" < ?"),
            (Operator::Le, "\"f0\" <= ?"),
        ];
        for (op, clause) in cases {
            let q = Query::new(10).with_expr("f0", op, Literal::Int(1000));
            let sql =
                query::select(&query_msg(), "Query", QuoteMode::Psql, true, &q.expression)
                    .unwrap();
            assert!(sql.ends_with(&format!("WHERE {}", clause)), "{}", sql);
        }
    }

    #[test]
    fn conjunctions_join_with_and() {
        let q = Query::new(10)
            .with_expr("f0", Operator::Gt, Literal::Int(1000))
            .with_expr("f1", Operator::Le, Literal::Float(500.0))
            .with_expr("f2", Operator::Eq, Literal::Str("2".to_owned()));
        let sql =
            query::select(&query_msg(), "Query", QuoteMode::Psql, true, &q.expression).unwrap();
        assert_eq!(
            sql,
            "SELECT \"_tll_seq\", \"f0\", \"f1\", \"f2\" FROM \"Query\" \
             WHERE \"f0\" > ? AND \"f1\" <= ? AND \"f2\" = ?"
        );
    }

    #[test]
    fn query_roundtrips_through_the_wire_format() {
        let q = Query::new(10)
            .with_expr("f0", Operator::Ge, Literal::Int(8000))
            .with_expr("f2", Operator::Eq, Literal::Str("x".to_owned()));
        let decoded = Query::decode(&q.encode().unwrap()).unwrap();
        assert_eq!(decoded, q);
        let sql =
            query::select(&query_msg(), "Query", QuoteMode::Psql, true, &decoded.expression)
                .unwrap();
        assert!(sql.contains("\"f0\" >= ? AND \"f2\" = ?"));
    }

    #[test]
    fn unknown_expression_field_is_a_schema_error() {
        let q = Query::new(10).with_expr("missing", Operator::Eq, Literal::Int(0));
        assert!(
            query::select(&query_msg(), "Query", QuoteMode::Psql, true, &q.expression).is_err()
        );
    }
}
