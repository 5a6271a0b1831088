//! # Schema Model
//!
//! The external schema a channel is opened with: typed fields at fixed
//! payload offsets, messages with numeric ids, and the payload view helpers
//! the binding engine reads and writes through.
//!
//! - `field`: `Field`, `FieldType`, `SubType`, `TimeResolution`
//! - `message`: `Message` builder with offset assignment, `Scheme`
//! - `view`: scalar/offset-pointer/presence-bitmap payload access

pub mod field;
pub mod message;
pub mod view;

pub use field::{Field, FieldType, Options, SubType, TimeResolution, OFFSET_PTR_SIZE};
pub use message::{Message, MessageBuilder, Scheme};
pub use view::OffsetPtr;
