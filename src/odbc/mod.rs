//! # ODBC Surface
//!
//! The driver-facing half of the binding engine: owned handles over the
//! env → connection → statement hierarchy, the diagnostics drain, and the
//! per-field converters that stage values between the payload layout and
//! the driver's C types.
//!
//! - `handle`: RAII handle wrappers, free-on-drop in leaf-first order
//! - `diag`: diagnostic-record drain and fatal-state classification
//! - `convert`: tagged converters with owned scratch (C2 bind / C3 decode)

pub mod convert;
pub mod diag;
pub mod handle;

pub use convert::{Converter, ConvertKind};
pub use diag::{Diag, SQLSTATE_CONNECTION_LOST};
pub use handle::{Connection, Environment, Statement};
