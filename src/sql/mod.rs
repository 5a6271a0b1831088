//! # SQL Synthesis
//!
//! Text-side half of the binding engine: the type projection, identifier
//! quoting, and the DDL / query string builders. Everything here is pure —
//! the driver sees these strings only through the prepare/execute calls in
//! [`crate::bridge`].
//!
//! - `types`: field → column type projection, quoting styles
//! - `ddl`: CREATE TABLE / CREATE INDEX assembly
//! - `query`: INSERT / function / procedure templates and ad-hoc SELECT

pub mod ddl;
pub mod query;
pub mod types;

pub use ddl::{CreateMode, IndexMode, SEQ_COLUMN};
pub use query::{FunctionMode, Template};
pub use types::{column_type, QuoteMode};
