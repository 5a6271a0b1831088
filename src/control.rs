//! # Control Messages
//!
//! The control-plane vocabulary of the bridge and its binary codec. Control
//! frames share the payload conventions of data messages (little-endian
//! scalars, inline offset pointers), so hosts on the bus can produce them
//! with the same machinery.
//!
//! ## Messages
//!
//! | Message | Id | Payload |
//! |---------|----|---------|
//! | Begin | 10 | empty |
//! | Commit | 20 | empty |
//! | Rollback | 30 | empty |
//! | Query | 40 | target message id + expression list |
//! | EndOfData | 50 | empty |
//!
//! ## Query Layout
//!
//! ```text
//! Query (12 bytes fixed):
//!   0  message: i32
//!   4  expression: offset list of Expression
//!
//! Expression (18 bytes):
//!   0  field: offset string
//!   8  op: i8
//!   9  value: union { 0: i64, 1: f64, 2: offset string } (tag + 8 bytes)
//! ```

use crate::scheme::view::{
    append_string, read_offset_ptr, read_string_region, write_offset_ptr, OffsetPtr,
};
use eyre::{bail, ensure, Result};

/// Control message ids.
pub mod msgid {
    pub const BEGIN: i32 = 10;
    pub const COMMIT: i32 = 20;
    pub const ROLLBACK: i32 = 30;
    pub const QUERY: i32 = 40;
    pub const END_OF_DATA: i32 = 50;
}

const QUERY_SIZE: usize = 12;
const EXPR_SIZE: usize = 18;

/// Comparison operator of a query expression.
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq = 0,
    Ne = 1,
    Gt = 2,
    Ge = 3,
    Lt = 4,
    Le = 5,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }
}

impl TryFrom<i8> for Operator {
    type Error = eyre::Report;

    fn try_from(value: i8) -> Result<Self> {
        Ok(match value {
            0 => Operator::Eq,
            1 => Operator::Ne,
            2 => Operator::Gt,
            3 => Operator::Ge,
            4 => Operator::Lt,
            5 => Operator::Le,
            _ => bail!("invalid operator {}", value),
        })
    }
}

/// Literal operand of a query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

/// One `field <op> literal` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub field: String,
    pub op: Operator,
    pub value: Literal,
}

/// Decoded `Query` control message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub message: i32,
    pub expression: Vec<Expr>,
}

impl Query {
    pub fn new(message: i32) -> Self {
        Self {
            message,
            expression: Vec::new(),
        }
    }

    pub fn with_expr(mut self, field: impl Into<String>, op: Operator, value: Literal) -> Self {
        self.expression.push(Expr {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; QUERY_SIZE];
        buf[0..4].copy_from_slice(&self.message.to_le_bytes());

        if self.expression.is_empty() {
            return Ok(buf);
        }

        let list = OffsetPtr::new(
            (buf.len() - 4) as u32,
            self.expression.len() as u32,
            EXPR_SIZE as u8,
        );
        write_offset_ptr(&mut buf, 4, list)?;
        let base = buf.len();
        buf.resize(base + self.expression.len() * EXPR_SIZE, 0);

        for (i, expr) in self.expression.iter().enumerate() {
            let pos = base + i * EXPR_SIZE;
            append_string(&mut buf, pos, expr.field.as_bytes())?;
            buf[pos + 8] = expr.op as i8 as u8;
            match &expr.value {
                Literal::Int(v) => {
                    buf[pos + 9] = 0;
                    buf[pos + 10..pos + 18].copy_from_slice(&v.to_le_bytes());
                }
                Literal::Float(v) => {
                    buf[pos + 9] = 1;
                    buf[pos + 10..pos + 18].copy_from_slice(&v.to_le_bytes());
                }
                Literal::Str(s) => {
                    buf[pos + 9] = 2;
                    append_string(&mut buf, pos + 10, s.as_bytes())?;
                }
            }
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Query> {
        ensure!(
            data.len() >= QUERY_SIZE,
            "query control message too short: {} bytes",
            data.len()
        );
        let message = i32::from_le_bytes(data[0..4].try_into()?);

        let list = read_offset_ptr(data, 4)?;
        let count = list.size() as usize;
        if count == 0 {
            return Ok(Query {
                message,
                expression: Vec::new(),
            });
        }
        let entity = match list.entity() {
            0 => EXPR_SIZE,
            n => n as usize,
        };
        ensure!(
            entity >= EXPR_SIZE,
            "expression element size {} too small",
            entity
        );
        let base = 4 + list.offset() as usize;
        ensure!(
            base + count * entity <= data.len(),
            "expression list out of bounds"
        );

        let mut expression = Vec::with_capacity(count);
        for i in 0..count {
            let pos = base + i * entity;
            let field = match read_string_region(data, pos)? {
                Some(region) => std::str::from_utf8(&region[..region.len() - 1])?.to_owned(),
                None => bail!("expression {} has an empty field name", i),
            };
            let op = Operator::try_from(data[pos + 8] as i8)?;
            let value = match data[pos + 9] {
                0 => Literal::Int(i64::from_le_bytes(data[pos + 10..pos + 18].try_into()?)),
                1 => Literal::Float(f64::from_le_bytes(data[pos + 10..pos + 18].try_into()?)),
                2 => match read_string_region(data, pos + 10)? {
                    Some(region) => {
                        Literal::Str(std::str::from_utf8(&region[..region.len() - 1])?.to_owned())
                    }
                    None => Literal::Str(String::new()),
                },
                t => bail!("expression {} has an invalid value tag {}", i, t),
            };
            expression.push(Expr { field, op, value });
        }

        Ok(Query {
            message,
            expression,
        })
    }
}
