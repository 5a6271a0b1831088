//! # Value Conversion
//!
//! Pure codecs between the payload's wire values and the forms the SQL side
//! binds: unpacked 128-bit decimals and calendar timestamps.
//!
//! - `decimal`: IEEE decimal128 (BID) pack/unpack
//! - `timepoint`: resolution scaling and UTC civil-calendar conversion

pub mod decimal;
pub mod timepoint;

pub use decimal::Unpacked;
pub use timepoint::{Civil, TimeValue};
