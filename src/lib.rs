//! # sqlbus - Message Bus to SQL Bridge over ODBC
//!
//! sqlbus bridges a message-oriented data bus and a SQL database reached
//! through an ODBC driver. Every schema message with a non-zero id maps to a
//! table (or a stored function/procedure call): posted data frames become
//! rows, and `Query` control frames become prepared `SELECT`s whose rows
//! stream back as data frames, reconstructed in the schema's binary layout.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              Bridge (cursor FSM)                 │
//! ├──────────────────────────────────────────────────┤
//! │  Registry: msgid → prepared stmt + binding plan  │
//! ├───────────────────────┬──────────────────────────┤
//! │  SQL synthesis        │  Converters              │
//! │  (DDL, templates,     │  param + column binding, │
//! │   ad-hoc SELECT)      │  row decode              │
//! ├───────────────────────┴──────────────────────────┤
//! │        Owned ODBC handles (env/dbc/stmt)         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlbus::{Bridge, Config, Frame};
//! use sqlbus::scheme::{Field, FieldType, Message, Scheme};
//!
//! let scheme = Scheme::new(vec![Message::builder("Trade", 1)
//!     .field(Field::scalar("price", FieldType::Decimal128))
//!     .field(Field::byte_string("symbol", 8))
//!     .build()?])?;
//! let config = Config::new().with_driver("SQLite3").with_database("trades.db");
//!
//! let mut bridge = Bridge::open(config, scheme)?;
//! bridge.post(&Frame::data(1, 7, payload))?;
//! ```
//!
//! ## Concurrency
//!
//! The bridge is single-threaded and cooperative: one connection, one open
//! cursor, one row per [`Bridge::process`] call. There is no locking because
//! there is no sharing across threads.

pub mod bridge;
pub mod config;
pub mod control;
pub mod heartbeat;
pub mod odbc;
pub mod scheme;
pub mod sql;
pub mod value;

pub use bridge::{Bridge, Frame, FrameType};
pub use config::{Config, Direction};
pub use control::{Expr, Literal, Operator, Query};
pub use heartbeat::{Heartbeat, Poster};
pub use scheme::{Field, FieldType, Message, Scheme, SubType, TimeResolution};
pub use sql::{CreateMode, FunctionMode, QuoteMode, Template};
