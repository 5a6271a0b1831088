//! # Field Converters
//!
//! One converter per bound field, dispatched by a kind tag:
//!
//! | Kind | Parameter side | Column side |
//! |------|----------------|-------------|
//! | `Plain` | binds the payload slot directly | driver writes the payload slot |
//! | `String` | binds the offset-string region | receives into 1 KiB scratch, decode appends to the tail |
//! | `Numeric` | stages a `SQL_NUMERIC_STRUCT` | receives the struct, decode repacks the decimal |
//! | `Timestamp` | stages a `TIMESTAMP_STRUCT` in UTC | receives the struct, decode rejoins the epoch |
//!
//! Each converter owns one boxed scratch block holding the SQLLEN indicator
//! cell and the kind-specific buffer, so every pointer handed to the driver
//! stays valid for the entry's lifetime. Bindings are refreshed at execute
//! boundaries; the scratch is not.
//!
//! NUMERIC parameters additionally write type/precision/scale/data-ptr into
//! the statement's application parameter descriptor, because drivers ignore
//! the precision passed to the bind call for that type.

use crate::odbc::handle::{succeeded, Statement};
use crate::scheme::view::{self, OffsetPtr};
use crate::scheme::{Field, FieldType};
use crate::value::decimal::{self, Unpacked};
use crate::value::timepoint::{self, TimeValue};
use eyre::{bail, ensure, Result};
use odbc_sys as sys;
use std::ptr;

/// SQLLEN value marking an absent parameter or column.
pub const NULL_DATA: sys::Len = -1;
/// Receive buffer size for variable-length string columns.
pub const STRING_SCRATCH: usize = 1024;
/// SQL_MAX_NUMERIC_LEN: mantissa bytes in a `SQL_NUMERIC_STRUCT`.
pub const MAX_NUMERIC_LEN: usize = 16;

/// `SQL_NUMERIC_STRUCT`: sign is 1 for positive, 0 for negative; `val` is
/// the little-endian mantissa.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlNumeric {
    pub precision: u8,
    pub scale: i8,
    pub sign: u8,
    pub val: [u8; MAX_NUMERIC_LEN],
}

impl SqlNumeric {
    fn zeroed() -> Self {
        Self {
            precision: 0,
            scale: 0,
            sign: 0,
            val: [0; MAX_NUMERIC_LEN],
        }
    }
}

/// Converter dispatch tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertKind {
    Plain,
    String,
    Numeric,
    Timestamp,
}

enum ScratchData {
    None,
    Chars([u8; STRING_SCRATCH]),
    Numeric(SqlNumeric),
    Timestamp(sys::Timestamp),
}

/// Indicator cell plus kind-specific buffer; boxed so the addresses the
/// driver keeps stay put however the owning collections move.
struct Scratch {
    ind: sys::Len,
    data: ScratchData,
}

pub struct Converter {
    /// Index of the bound field inside the message's field list.
    pub field: usize,
    pub kind: ConvertKind,
    scratch: Box<Scratch>,
}

fn classify(field: &Field) -> Result<ConvertKind> {
    if field.time_resolution().is_some() {
        ensure!(
            field.field_type().is_integer() || field.field_type() == FieldType::Double,
            "field {}: time point needs an integer or double primitive",
            field.name()
        );
        ensure!(
            field.field_type() != FieldType::UInt64,
            "field {}: u64 is not supported",
            field.name()
        );
        return Ok(ConvertKind::Timestamp);
    }
    Ok(match field.field_type() {
        FieldType::Decimal128 => ConvertKind::Numeric,
        FieldType::OffsetString => ConvertKind::String,
        FieldType::UInt64 => bail!("field {}: u64 is not supported", field.name()),
        FieldType::Bytes => {
            if field.is_fixed_string() {
                ConvertKind::Plain
            } else {
                bail!("field {}: blobs are not supported", field.name())
            }
        }
        _ => ConvertKind::Plain,
    })
}

/// C/SQL type pair for a plain scalar or byte-string field.
fn plain_types(field: &Field) -> Result<(sys::CDataType, sys::SqlDataType)> {
    Ok(match field.field_type() {
        FieldType::Int8 => (sys::CDataType::STinyInt, sys::SqlDataType::SMALLINT),
        FieldType::Int16 => (sys::CDataType::SShort, sys::SqlDataType::INTEGER),
        FieldType::Int32 => (sys::CDataType::SLong, sys::SqlDataType::INTEGER),
        FieldType::Int64 => (sys::CDataType::SBigInt, sys::SqlDataType::EXT_BIG_INT),
        FieldType::UInt8 => (sys::CDataType::UTinyInt, sys::SqlDataType::SMALLINT),
        FieldType::UInt16 => (sys::CDataType::UShort, sys::SqlDataType::INTEGER),
        FieldType::UInt32 => (sys::CDataType::ULong, sys::SqlDataType::EXT_BIG_INT),
        FieldType::Double => (sys::CDataType::Double, sys::SqlDataType::DOUBLE),
        FieldType::Bytes => (sys::CDataType::Char, sys::SqlDataType::VARCHAR),
        other => bail!("field {}: no plain binding for {:?}", field.name(), other),
    })
}

/// Stages a time-point payload value into an ODBC timestamp struct (UTC).
pub fn stage_timestamp(field: &Field, payload: &[u8]) -> Result<sys::Timestamp> {
    let resolution = field
        .time_resolution()
        .ok_or_else(|| eyre::eyre!("field {} is not a time point", field.name()))?;
    let value = if field.field_type() == FieldType::Double {
        TimeValue::Float(view::read_f64(payload, field)?)
    } else {
        TimeValue::Int(view::read_int(payload, field)?)
    };
    let (sec, nano) = timepoint::split_epoch(value, resolution)?;
    let civil = timepoint::civil_from_epoch(sec, nano);
    ensure!(
        civil.year >= i16::MIN as i64 && civil.year <= i16::MAX as i64,
        "field {}: year {} does not fit an ODBC timestamp",
        field.name(),
        civil.year
    );
    let mut ts = sys::Timestamp::default();
    ts.year = civil.year as i16;
    ts.month = u16::from(civil.month);
    ts.day = u16::from(civil.day);
    ts.hour = u16::from(civil.hour);
    ts.minute = u16::from(civil.minute);
    ts.second = u16::from(civil.second);
    ts.fraction = civil.nanosecond;
    Ok(ts)
}

/// Writes a fetched timestamp struct back into the payload at the field's
/// resolution and width.
pub fn timestamp_to_payload(
    ts: &sys::Timestamp,
    field: &Field,
    payload: &mut [u8],
) -> Result<()> {
    let resolution = field
        .time_resolution()
        .ok_or_else(|| eyre::eyre!("field {} is not a time point", field.name()))?;
    let civil = timepoint::Civil {
        year: i64::from(ts.year),
        month: ts.month as u8,
        day: ts.day as u8,
        hour: ts.hour as u8,
        minute: ts.minute as u8,
        second: ts.second as u8,
        nanosecond: ts.fraction,
    };
    let (sec, nano) = timepoint::epoch_from_civil(&civil)?;
    if field.field_type() == FieldType::Double {
        view::write_f64(payload, field, timepoint::join_epoch_f64(sec, nano, resolution))
    } else {
        view::write_int(
            payload,
            field,
            timepoint::join_epoch_int(sec, nano, resolution)?,
        )
    }
}

/// Stages a 128-bit decimal payload value into a `SQL_NUMERIC_STRUCT`.
pub fn stage_numeric(field: &Field, payload: &[u8]) -> Result<SqlNumeric> {
    let unpacked = decimal::unpack(view::read_u128(payload, field)?)?;
    let scale = -unpacked.exponent;
    ensure!(
        scale >= i8::MIN as i32 && scale <= i8::MAX as i32,
        "field {}: decimal exponent {} does not fit a numeric scale",
        field.name(),
        unpacked.exponent
    );
    let mut num = SqlNumeric::zeroed();
    num.precision = decimal::PRECISION;
    num.scale = scale as i8;
    num.sign = u8::from(!unpacked.negative);
    num.val = unpacked.mantissa.to_le_bytes();
    Ok(num)
}

/// Repacks a fetched numeric struct into the payload's 128-bit decimal.
pub fn numeric_to_payload(num: &SqlNumeric, field: &Field, payload: &mut [u8]) -> Result<()> {
    let unpacked = Unpacked::new(
        num.sign == 0,
        u128::from_le_bytes(num.val),
        -i32::from(num.scale),
    );
    view::write_u128(payload, field, decimal::pack(&unpacked)?)
}

impl Converter {
    pub fn new(field_index: usize, field: &Field) -> Result<Self> {
        let kind = classify(field)?;
        let data = match kind {
            ConvertKind::Plain => ScratchData::None,
            ConvertKind::String => ScratchData::Chars([0; STRING_SCRATCH]),
            ConvertKind::Numeric => ScratchData::Numeric(SqlNumeric::zeroed()),
            ConvertKind::Timestamp => ScratchData::Timestamp(sys::Timestamp::default()),
        };
        Ok(Self {
            field: field_index,
            kind,
            scratch: Box::new(Scratch { ind: 0, data }),
        })
    }

    fn chars(&mut self) -> Result<&mut [u8; STRING_SCRATCH]> {
        match &mut self.scratch.data {
            ScratchData::Chars(b) => Ok(b),
            _ => bail!("converter scratch is not a string buffer"),
        }
    }

    fn numeric(&mut self) -> Result<&mut SqlNumeric> {
        match &mut self.scratch.data {
            ScratchData::Numeric(n) => Ok(n),
            _ => bail!("converter scratch is not a numeric struct"),
        }
    }

    fn timestamp(&mut self) -> Result<&mut sys::Timestamp> {
        match &mut self.scratch.data {
            ScratchData::Timestamp(t) => Ok(t),
            _ => bail!("converter scratch is not a timestamp struct"),
        }
    }

    fn scratch_ptr(&mut self) -> sys::Pointer {
        match &mut self.scratch.data {
            ScratchData::None => ptr::null_mut(),
            ScratchData::Chars(b) => b.as_mut_ptr() as sys::Pointer,
            ScratchData::Numeric(n) => n as *mut SqlNumeric as sys::Pointer,
            ScratchData::Timestamp(t) => t as *mut sys::Timestamp as sys::Pointer,
        }
    }

    /// Encodes the field value and binds it as input parameter `index`.
    /// Plain scalars bind the payload slot directly; tagged kinds stage into
    /// their scratch first.
    pub fn bind_param(
        &mut self,
        stmt: &Statement,
        index: u16,
        field: &Field,
        payload: &[u8],
    ) -> Result<()> {
        ensure!(
            field.offset() + field.size() <= payload.len(),
            "field {} out of payload bounds",
            field.name()
        );
        let slot = unsafe { payload.as_ptr().add(field.offset()) } as sys::Pointer;

        let (c_type, sql_type, data_ptr, column_size, digits) = match self.kind {
            ConvertKind::Plain => {
                let (c, sql) = plain_types(field)?;
                if field.is_fixed_string() {
                    let region = &payload[field.offset()..field.offset() + field.size()];
                    let len = region.iter().position(|&b| b == 0).unwrap_or(field.size());
                    self.scratch.ind = len as sys::Len;
                } else {
                    self.scratch.ind = field.size() as sys::Len;
                }
                (c, sql, slot, 0usize, 0i16)
            }
            ConvertKind::String => {
                match view::read_string_region(payload, field.offset())? {
                    Some(region) => {
                        self.scratch.ind = (region.len() - 1) as sys::Len;
                        let ptr = region.as_ptr() as sys::Pointer;
                        (sys::CDataType::Char, sys::SqlDataType::VARCHAR, ptr, 0, 0)
                    }
                    None => {
                        // Empty literal: point at the (zeroed) scratch.
                        self.scratch.ind = 0;
                        self.chars()?[0] = 0;
                        let ptr = self.scratch_ptr();
                        (sys::CDataType::Char, sys::SqlDataType::VARCHAR, ptr, 0, 0)
                    }
                }
            }
            ConvertKind::Numeric => {
                let staged = stage_numeric(field, payload)?;
                let scale = staged.scale;
                *self.numeric()? = staged;
                self.scratch.ind = std::mem::size_of::<SqlNumeric>() as sys::Len;
                let ptr = self.scratch_ptr();
                (
                    sys::CDataType::Numeric,
                    sys::SqlDataType::NUMERIC,
                    ptr,
                    decimal::PRECISION as usize,
                    i16::from(scale),
                )
            }
            ConvertKind::Timestamp => {
                *self.timestamp()? = stage_timestamp(field, payload)?;
                self.scratch.ind = std::mem::size_of::<sys::Timestamp>() as sys::Len;
                let ptr = self.scratch_ptr();
                (
                    sys::CDataType::TypeTimestamp,
                    sys::SqlDataType::TIMESTAMP,
                    ptr,
                    0,
                    0,
                )
            }
        };

        let r = unsafe {
            sys::SQLBindParameter(
                stmt.raw(),
                index,
                sys::ParamType::Input,
                c_type,
                sql_type,
                column_size,
                digits,
                data_ptr,
                0,
                &mut self.scratch.ind,
            )
        };
        if !succeeded(r) {
            bail!(
                "failed to bind parameter {} ({}):{}",
                index,
                field.name(),
                stmt.diag().text
            );
        }

        if self.kind == ConvertKind::Numeric && self.scratch.ind != NULL_DATA {
            let scale = self.numeric()?.scale;
            let data_ptr = self.scratch_ptr();
            apply_numeric_descriptor(stmt, index, scale, data_ptr)?;
        }
        Ok(())
    }

    /// Binds an absent optional field: a typed placeholder with
    /// `SQL_NULL_DATA` length, so the driver knows the slot is nullable.
    /// The pointer target is the scratch (or the payload slot for plain
    /// converters, which carry none) and is never dereferenced.
    pub fn bind_param_null(
        &mut self,
        stmt: &Statement,
        index: u16,
        field: &Field,
        payload: &[u8],
    ) -> Result<()> {
        ensure!(
            field.offset() + field.size() <= payload.len(),
            "field {} out of payload bounds",
            field.name()
        );
        let (c_type, sql_type) = match self.kind {
            ConvertKind::Plain => plain_types(field)?,
            ConvertKind::String => (sys::CDataType::Char, sys::SqlDataType::VARCHAR),
            ConvertKind::Numeric => (sys::CDataType::Numeric, sys::SqlDataType::NUMERIC),
            ConvertKind::Timestamp => {
                (sys::CDataType::TypeTimestamp, sys::SqlDataType::TIMESTAMP)
            }
        };
        self.scratch.ind = NULL_DATA;
        let data_ptr = match self.kind {
            ConvertKind::Plain => {
                (unsafe { payload.as_ptr().add(field.offset()) }) as sys::Pointer
            }
            _ => self.scratch_ptr(),
        };
        let r = unsafe {
            sys::SQLBindParameter(
                stmt.raw(),
                index,
                sys::ParamType::Input,
                c_type,
                sql_type,
                0,
                0,
                data_ptr,
                0,
                &mut self.scratch.ind,
            )
        };
        if !succeeded(r) {
            bail!(
                "failed to bind NULL parameter {} ({}):{}",
                index,
                field.name(),
                stmt.diag().text
            );
        }
        Ok(())
    }

    /// Registers the column receiver for result position `index`. Plain
    /// converters receive straight into the row buffer; tagged ones into
    /// their scratch.
    pub fn bind_column(
        &mut self,
        stmt: &Statement,
        index: u16,
        field: &Field,
        row: *mut u8,
        row_len: usize,
    ) -> Result<()> {
        ensure!(
            field.offset() + field.size() <= row_len,
            "field {} out of row bounds",
            field.name()
        );
        let (c_type, target, len) = match self.kind {
            ConvertKind::Plain => {
                let (c, _) = plain_types(field)?;
                let target = unsafe { row.add(field.offset()) } as sys::Pointer;
                (c, target, field.size())
            }
            ConvertKind::String => (
                sys::CDataType::Char,
                self.scratch_ptr(),
                STRING_SCRATCH,
            ),
            ConvertKind::Numeric => (
                sys::CDataType::Numeric,
                self.scratch_ptr(),
                std::mem::size_of::<SqlNumeric>(),
            ),
            ConvertKind::Timestamp => (
                sys::CDataType::TypeTimestamp,
                self.scratch_ptr(),
                std::mem::size_of::<sys::Timestamp>(),
            ),
        };
        let r = unsafe {
            sys::SQLBindCol(
                stmt.raw(),
                index,
                c_type,
                target,
                len as sys::Len,
                &mut self.scratch.ind,
            )
        };
        if !succeeded(r) {
            bail!(
                "failed to bind column {} ({}):{}",
                index,
                field.name(),
                stmt.diag().text
            );
        }
        Ok(())
    }

    /// Materializes the fetched value into the row. Returns false when the
    /// column was NULL (the slot is zeroed, the pmap bit stays clear).
    pub fn decode(&mut self, field: &Field, fixed: &mut [u8], tail: &mut Vec<u8>) -> Result<bool> {
        if self.scratch.ind == NULL_DATA {
            let start = field.offset();
            fixed[start..start + field.size()].fill(0);
            return Ok(false);
        }
        match self.kind {
            ConvertKind::Plain => {}
            ConvertKind::String => {
                let size = (self.scratch.ind.max(0) as usize).min(STRING_SCRATCH - 1);
                if size == 0 {
                    view::write_offset_ptr(fixed, field.offset(), OffsetPtr::null())?;
                } else {
                    let position = fixed.len() + tail.len();
                    let header = OffsetPtr::new(
                        (position - field.offset()) as u32,
                        size as u32 + 1,
                        1,
                    );
                    view::write_offset_ptr(fixed, field.offset(), header)?;
                    let chars = self.chars()?;
                    tail.extend_from_slice(&chars[..size]);
                    tail.push(0);
                }
            }
            ConvertKind::Numeric => {
                let num = *self.numeric()?;
                numeric_to_payload(&num, field, fixed)?;
            }
            ConvertKind::Timestamp => {
                let ts = *self.timestamp()?;
                timestamp_to_payload(&ts, field, fixed)?;
            }
        }
        Ok(true)
    }

    /// Post-fetch indicator value, as the driver left it.
    pub fn indicator(&self) -> sys::Len {
        self.scratch.ind
    }

    #[cfg(test)]
    pub(crate) fn set_indicator(&mut self, ind: sys::Len) {
        self.scratch.ind = ind;
    }

    #[cfg(test)]
    pub(crate) fn scratch_chars(&mut self) -> &mut [u8; STRING_SCRATCH] {
        match &mut self.scratch.data {
            ScratchData::Chars(b) => b,
            _ => panic!("not a string converter"),
        }
    }

    #[cfg(test)]
    pub(crate) fn scratch_numeric(&mut self) -> &mut SqlNumeric {
        match &mut self.scratch.data {
            ScratchData::Numeric(n) => n,
            _ => panic!("not a numeric converter"),
        }
    }

    #[cfg(test)]
    pub(crate) fn scratch_timestamp(&mut self) -> &mut sys::Timestamp {
        match &mut self.scratch.data {
            ScratchData::Timestamp(t) => t,
            _ => panic!("not a timestamp converter"),
        }
    }
}

/// Writes type/precision/scale/data-ptr into the application parameter
/// descriptor at `index`; drivers ignore the precision and scale passed to
/// the bind call for NUMERIC.
fn apply_numeric_descriptor(
    stmt: &Statement,
    index: u16,
    scale: i8,
    data_ptr: sys::Pointer,
) -> Result<()> {
    let mut desc: sys::Handle = ptr::null_mut();
    let r = unsafe {
        sys::SQLGetStmtAttr(
            stmt.raw(),
            sys::StatementAttribute::AppParamDesc,
            &mut desc as *mut sys::Handle as sys::Pointer,
            0,
            ptr::null_mut(),
        )
    };
    if !succeeded(r) {
        bail!(
            "failed to read the parameter descriptor:{}",
            stmt.diag().text
        );
    }

    let fields = [
        (sys::Desc::Type, sys::CDataType::Numeric as isize),
        (sys::Desc::Precision, decimal::PRECISION as isize),
        (sys::Desc::Scale, scale as isize),
    ];
    for (id, value) in fields {
        let r = unsafe {
            sys::SQLSetDescField(desc as sys::HDesc, index as i16, id, value as sys::Pointer, 0)
        };
        if !succeeded(r) {
            bail!(
                "failed to set descriptor field {:?} for parameter {}:{}",
                id,
                index,
                stmt.diag().text
            );
        }
    }
    // DataPtr last: setting it validates the record.
    let r = unsafe {
        sys::SQLSetDescField(desc as sys::HDesc, index as i16, sys::Desc::DataPtr, data_ptr, 0)
    };
    if !succeeded(r) {
        bail!(
            "failed to set the data pointer for parameter {}:{}",
            index,
            stmt.diag().text
        );
    }
    Ok(())
}
