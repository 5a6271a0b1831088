//! # Payload Views
//!
//! Bounds-checked accessors over a message payload: little-endian scalars at
//! field offsets, the inline offset-pointer header for variable-length
//! strings, and presence-bitmap bit operations.
//!
//! ## Offset-Pointer Header
//!
//! A variable-length string is stored as an 8-byte header inside the fixed
//! region pointing into the tail region past the message size:
//!
//! ```text
//! +-------------+----------------------+------------+
//! | offset: u32 | size: u24            | entity: u8 |
//! +-------------+----------------------+------------+
//! ```
//!
//! - `offset` is relative to the header's own position in the payload
//! - `size` counts bytes for strings (including the trailing NUL) or
//!   elements for lists
//! - `entity` is the element width (1 for strings, 0 for the null pointer)

use crate::scheme::field::{Field, FieldType};
use eyre::{bail, ensure, eyre, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Inline offset-pointer header, little-endian on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct OffsetPtr {
    offset: U32,
    size_entity: U32,
}

impl OffsetPtr {
    pub fn new(offset: u32, size: u32, entity: u8) -> Self {
        Self {
            offset: U32::new(offset),
            size_entity: U32::new((size & 0x00FF_FFFF) | (u32::from(entity) << 24)),
        }
    }

    /// The all-zero pointer marking an absent value.
    pub fn null() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn offset(&self) -> u32 {
        self.offset.get()
    }

    pub fn size(&self) -> u32 {
        self.size_entity.get() & 0x00FF_FFFF
    }

    pub fn entity(&self) -> u8 {
        (self.size_entity.get() >> 24) as u8
    }
}

/// Reads the offset-pointer header at byte position `at`.
pub fn read_offset_ptr(payload: &[u8], at: usize) -> Result<OffsetPtr> {
    ensure!(
        at + 8 <= payload.len(),
        "offset pointer at {} out of bounds ({} bytes)",
        at,
        payload.len()
    );
    OffsetPtr::read_from_bytes(&payload[at..at + 8])
        .map_err(|_| eyre!("offset pointer read failed at {}", at))
}

/// Writes the offset-pointer header at byte position `at`.
pub fn write_offset_ptr(payload: &mut [u8], at: usize, ptr: OffsetPtr) -> Result<()> {
    ensure!(
        at + 8 <= payload.len(),
        "offset pointer at {} out of bounds ({} bytes)",
        at,
        payload.len()
    );
    ptr.write_to(&mut payload[at..at + 8])
        .map_err(|_| eyre!("offset pointer write failed at {}", at))
}

/// Returns the string region an offset pointer at `at` refers to, including
/// the trailing NUL. `None` for the null pointer.
pub fn read_string_region(payload: &[u8], at: usize) -> Result<Option<&[u8]>> {
    let ptr = read_offset_ptr(payload, at)?;
    if ptr.size() == 0 {
        return Ok(None);
    }
    let start = at + ptr.offset() as usize;
    let end = start + ptr.size() as usize;
    ensure!(
        end <= payload.len(),
        "offset string at {} points past the payload ({}..{} of {})",
        at,
        start,
        end,
        payload.len()
    );
    Ok(Some(&payload[start..end]))
}

/// Appends `text` (NUL-terminated) to the payload tail and writes the
/// pointer header at `at`. An empty string writes the null pointer.
pub fn append_string(payload: &mut Vec<u8>, at: usize, text: &[u8]) -> Result<()> {
    if text.is_empty() {
        return write_offset_ptr(payload, at, OffsetPtr::null());
    }
    let tail = payload.len();
    ensure!(tail >= at + 8, "string append before the header position");
    let ptr = OffsetPtr::new((tail - at) as u32, text.len() as u32 + 1, 1);
    write_offset_ptr(payload, at, ptr)?;
    payload.extend_from_slice(text);
    payload.push(0);
    Ok(())
}

fn field_slice<'a>(payload: &'a [u8], field: &Field) -> Result<&'a [u8]> {
    let start = field.offset();
    let end = start + field.size();
    ensure!(
        end <= payload.len(),
        "field {} at {}..{} out of bounds ({} bytes)",
        field.name(),
        start,
        end,
        payload.len()
    );
    Ok(&payload[start..end])
}

fn field_slice_mut<'a>(payload: &'a mut [u8], field: &Field) -> Result<&'a mut [u8]> {
    let start = field.offset();
    let end = start + field.size();
    ensure!(
        end <= payload.len(),
        "field {} at {}..{} out of bounds ({} bytes)",
        field.name(),
        start,
        end,
        payload.len()
    );
    Ok(&mut payload[start..end])
}

/// Reads an integer field, sign- or zero-extended to i64 per its type.
pub fn read_int(payload: &[u8], field: &Field) -> Result<i64> {
    let b = field_slice(payload, field)?;
    Ok(match field.field_type() {
        FieldType::Int8 => b[0] as i8 as i64,
        FieldType::Int16 => i16::from_le_bytes([b[0], b[1]]) as i64,
        FieldType::Int32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        FieldType::Int64 => i64::from_le_bytes(b.try_into()?),
        FieldType::UInt8 => b[0] as i64,
        FieldType::UInt16 => u16::from_le_bytes([b[0], b[1]]) as i64,
        FieldType::UInt32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        other => bail!("field {} is not an integer: {:?}", field.name(), other),
    })
}

/// Writes an integer field, checking the value fits the payload width.
pub fn write_int(payload: &mut [u8], field: &Field, value: i64) -> Result<()> {
    let name = field.name().to_owned();
    let b = field_slice_mut(payload, field)?;
    match field.field_type() {
        FieldType::Int8 => {
            let v = i8::try_from(value).map_err(|_| eyre!("{}: {} overflows i8", name, value))?;
            b[0] = v as u8;
        }
        FieldType::Int16 => {
            let v = i16::try_from(value).map_err(|_| eyre!("{}: {} overflows i16", name, value))?;
            b.copy_from_slice(&v.to_le_bytes());
        }
        FieldType::Int32 => {
            let v = i32::try_from(value).map_err(|_| eyre!("{}: {} overflows i32", name, value))?;
            b.copy_from_slice(&v.to_le_bytes());
        }
        FieldType::Int64 => b.copy_from_slice(&value.to_le_bytes()),
        FieldType::UInt8 => {
            let v = u8::try_from(value).map_err(|_| eyre!("{}: {} overflows u8", name, value))?;
            b[0] = v;
        }
        FieldType::UInt16 => {
            let v = u16::try_from(value).map_err(|_| eyre!("{}: {} overflows u16", name, value))?;
            b.copy_from_slice(&v.to_le_bytes());
        }
        FieldType::UInt32 => {
            let v = u32::try_from(value).map_err(|_| eyre!("{}: {} overflows u32", name, value))?;
            b.copy_from_slice(&v.to_le_bytes());
        }
        other => bail!("field {} is not an integer: {:?}", name, other),
    }
    Ok(())
}

pub fn read_f64(payload: &[u8], field: &Field) -> Result<f64> {
    let b = field_slice(payload, field)?;
    ensure!(b.len() == 8, "field {} is not a double", field.name());
    Ok(f64::from_le_bytes(b.try_into()?))
}

pub fn write_f64(payload: &mut [u8], field: &Field, value: f64) -> Result<()> {
    let name = field.name().to_owned();
    let b = field_slice_mut(payload, field)?;
    ensure!(b.len() == 8, "field {} is not a double", name);
    b.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

pub fn read_u128(payload: &[u8], field: &Field) -> Result<u128> {
    let b = field_slice(payload, field)?;
    ensure!(b.len() == 16, "field {} is not 128 bits wide", field.name());
    Ok(u128::from_le_bytes(b.try_into()?))
}

pub fn write_u128(payload: &mut [u8], field: &Field, value: u128) -> Result<()> {
    let name = field.name().to_owned();
    let b = field_slice_mut(payload, field)?;
    ensure!(b.len() == 16, "field {} is not 128 bits wide", name);
    b.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Zeroes the whole presence bitmap region.
pub fn pmap_zero(payload: &mut [u8], pmap: &Field) -> Result<()> {
    field_slice_mut(payload, pmap)?.fill(0);
    Ok(())
}

pub fn pmap_get(payload: &[u8], pmap: &Field, bit: u32) -> Result<bool> {
    let b = field_slice(payload, pmap)?;
    let byte = (bit / 8) as usize;
    ensure!(byte < b.len(), "pmap bit {} out of range", bit);
    Ok(b[byte] & (1 << (bit % 8)) != 0)
}

pub fn pmap_set(payload: &mut [u8], pmap: &Field, bit: u32) -> Result<()> {
    let b = field_slice_mut(payload, pmap)?;
    let byte = (bit / 8) as usize;
    ensure!(byte < b.len(), "pmap bit {} out of range", bit);
    b[byte] |= 1 << (bit % 8);
    Ok(())
}
