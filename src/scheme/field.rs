//! # Schema Field Model
//!
//! This module defines the typed shape of a single schema field: its
//! primitive type, optional sub-type, byte placement inside the message
//! payload, and the per-field options that drive SQL generation.
//!
//! ## Field Categories
//!
//! | Category | Types | Payload width |
//! |----------|-------|---------------|
//! | **Integer** | Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32 | 1-8 bytes |
//! | **Float** | Double | 8 bytes |
//! | **Decimal** | Decimal128 | 16 bytes |
//! | **Fixed bytes** | Bytes (size N from the schema) | N bytes |
//! | **Offset string** | OffsetString | 8-byte pointer header |
//!
//! `UInt64` exists only to be rejected: the SQL side has no lossless
//! representation for it.
//!
//! ## Sub-types
//!
//! A sub-type refines how the primitive is interpreted:
//!
//! - `ByteString`: a `Bytes` field holding NUL-padded text
//! - `TimePoint(resolution)`: an integer or double counting units since the
//!   Unix epoch
//!
//! ## Optionality
//!
//! A field with a presence-bitmap index is optional: the bit at that index
//! inside the message's pmap field says whether the value is present. Fields
//! without an index are required and map to `NOT NULL` columns.

use hashbrown::HashMap;

/// Per-message / per-field option map (`sql.table`, `sql.index`, ...).
pub type Options = HashMap<String, String>;

/// Parses a boolean option value (`yes`/`no`/`true`/`false`).
pub fn option_bool(value: &str) -> eyre::Result<bool> {
    match value {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => eyre::bail!("invalid boolean option value '{}'", value),
    }
}

/// Primitive type of a schema field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    Int64 = 3,
    UInt8 = 4,
    UInt16 = 5,
    UInt32 = 6,
    UInt64 = 7,
    Double = 8,
    Decimal128 = 9,
    Bytes = 10,
    OffsetString = 11,
}

impl FieldType {
    /// Returns the fixed payload width for this type, or None when the width
    /// comes from the schema (`Bytes`).
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::Int8 | FieldType::UInt8 => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 => Some(4),
            FieldType::Int64 | FieldType::UInt64 => Some(8),
            FieldType::Double => Some(8),
            FieldType::Decimal128 => Some(16),
            FieldType::OffsetString => Some(OFFSET_PTR_SIZE),
            FieldType::Bytes => None,
        }
    }

    /// Returns true for the integer primitives (signed and unsigned).
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::UInt8
                | FieldType::UInt16
                | FieldType::UInt32
                | FieldType::UInt64
        )
    }
}

/// Size of the inline offset-pointer header (see [`crate::scheme::view`]).
pub const OFFSET_PTR_SIZE: usize = 8;

/// Time-point resolution: the unit one raw tick represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeResolution {
    Ns,
    Us,
    Ms,
    Second,
    Minute,
    Hour,
    Day,
}

/// Sub-type refinement of a field's primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubType {
    None,
    ByteString,
    TimePoint(TimeResolution),
}

/// A single schema field with its placement inside the message payload.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    field_type: FieldType,
    sub_type: SubType,
    /// Byte offset inside the message payload, assigned by the message
    /// builder in declaration order.
    offset: usize,
    size: usize,
    pmap_index: Option<u32>,
    options: Options,
    /// Options attached to the pointee of an offset string; `sql.primary-key`
    /// may live there instead of on the pointer itself.
    pointee_options: Options,
}

impl Field {
    fn raw(name: impl Into<String>, field_type: FieldType, size: usize) -> Self {
        Self {
            name: name.into(),
            field_type,
            sub_type: SubType::None,
            offset: 0,
            size,
            pmap_index: None,
            options: Options::new(),
            pointee_options: Options::new(),
        }
    }

    /// A scalar field (integer, double or decimal128).
    pub fn scalar(name: impl Into<String>, field_type: FieldType) -> Self {
        let size = field_type.fixed_size().unwrap_or(0);
        Self::raw(name, field_type, size)
    }

    /// A fixed-width NUL-padded byte string of `size` bytes.
    pub fn byte_string(name: impl Into<String>, size: usize) -> Self {
        let mut f = Self::raw(name, FieldType::Bytes, size);
        f.sub_type = SubType::ByteString;
        f
    }

    /// A raw `bytes[N]` field without the string sub-type. Unsupported by the
    /// SQL mapper; exists so schemas carrying blobs fail with a clear error.
    pub fn bytes(name: impl Into<String>, size: usize) -> Self {
        Self::raw(name, FieldType::Bytes, size)
    }

    /// A variable-length string stored through an inline offset pointer.
    pub fn offset_string(name: impl Into<String>) -> Self {
        let mut f = Self::raw(name, FieldType::OffsetString, OFFSET_PTR_SIZE);
        f.sub_type = SubType::ByteString;
        f
    }

    /// A time-point counting `resolution` units since the Unix epoch, stored
    /// in the given integer or double primitive.
    pub fn time_point(
        name: impl Into<String>,
        field_type: FieldType,
        resolution: TimeResolution,
    ) -> Self {
        let size = field_type.fixed_size().unwrap_or(0);
        let mut f = Self::raw(name, field_type, size);
        f.sub_type = SubType::TimePoint(resolution);
        f
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_pointee_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.pointee_options.insert(key.into(), value.into());
        self
    }

    /// Marks the field optional, tracked by the given presence-bitmap bit.
    pub fn optional(mut self, pmap_index: u32) -> Self {
        self.pmap_index = Some(pmap_index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn sub_type(&self) -> SubType {
        self.sub_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pmap_index(&self) -> Option<u32> {
        self.pmap_index
    }

    pub fn is_optional(&self) -> bool {
        self.pmap_index.is_some()
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Option lookup that falls back to the pointee options for offset
    /// strings, where schema authors attach `sql.primary-key`.
    pub fn option_or_pointee(&self, key: &str) -> Option<&str> {
        self.option(key)
            .or_else(|| self.pointee_options.get(key).map(String::as_str))
    }

    /// Returns true for `Bytes` fields carrying NUL-padded text.
    pub fn is_fixed_string(&self) -> bool {
        self.field_type == FieldType::Bytes && self.sub_type == SubType::ByteString
    }

    /// Returns true for offset-pointer strings.
    pub fn is_offset_string(&self) -> bool {
        self.field_type == FieldType::OffsetString && self.sub_type == SubType::ByteString
    }

    /// Returns the time resolution when the field is a time point.
    pub fn time_resolution(&self) -> Option<TimeResolution> {
        match self.sub_type {
            SubType::TimePoint(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sizes_match_payload_widths() {
        assert_eq!(FieldType::Int8.fixed_size(), Some(1));
        assert_eq!(FieldType::UInt16.fixed_size(), Some(2));
        assert_eq!(FieldType::Int32.fixed_size(), Some(4));
        assert_eq!(FieldType::Int64.fixed_size(), Some(8));
        assert_eq!(FieldType::Double.fixed_size(), Some(8));
        assert_eq!(FieldType::Decimal128.fixed_size(), Some(16));
        assert_eq!(FieldType::OffsetString.fixed_size(), Some(8));
        assert_eq!(FieldType::Bytes.fixed_size(), None);
    }

    #[test]
    fn builders_set_sub_types() {
        let f = Field::byte_string("symbol", 8);
        assert!(f.is_fixed_string());
        assert_eq!(f.size(), 8);

        let f = Field::offset_string("text");
        assert!(f.is_offset_string());
        assert_eq!(f.size(), OFFSET_PTR_SIZE);

        let f = Field::time_point("ts", FieldType::Int64, TimeResolution::Ms);
        assert_eq!(f.time_resolution(), Some(TimeResolution::Ms));
        assert_eq!(f.size(), 8);
    }

    #[test]
    fn pointee_options_back_primary_key_lookup() {
        let f = Field::offset_string("id").with_pointee_option("sql.primary-key", "yes");
        assert_eq!(f.option("sql.primary-key"), None);
        assert_eq!(f.option_or_pointee("sql.primary-key"), Some("yes"));
    }
}
