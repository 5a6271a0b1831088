//! # Message & Scheme Model
//!
//! A `Message` is an ordered list of fields with pre-computed payload
//! offsets, an optional presence-bitmap field, and the option map driving SQL
//! generation. A `Scheme` is the set of messages one channel serves, looked
//! up by numeric id or by name.
//!
//! Offsets are assigned in declaration order by the builder; the message
//! size is the sum of field widths (offset strings contribute their 8-byte
//! pointer header, their text lives in the tail region past `size`).

use crate::scheme::field::{Field, FieldType, Options};
use eyre::{bail, ensure, Result};

#[derive(Debug, Clone)]
pub struct Message {
    id: i32,
    name: String,
    size: usize,
    fields: Vec<Field>,
    /// Index into `fields` of the presence-bitmap field, when the message
    /// has optional fields.
    pmap: Option<usize>,
    options: Options,
}

impl Message {
    pub fn builder(name: impl Into<String>, id: i32) -> MessageBuilder {
        MessageBuilder {
            name: name.into(),
            id,
            fields: Vec::new(),
            pmap: None,
            options: Options::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total payload size of the fixed region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn field_by_name(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name() == name)
    }

    /// Index of the presence-bitmap field, if any.
    pub fn pmap(&self) -> Option<usize> {
        self.pmap
    }

    pub fn pmap_field(&self) -> Option<&Field> {
        self.pmap.map(|idx| &self.fields[idx])
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Fields that take part in SQL binding: everything except the pmap.
    pub fn data_fields(&self) -> impl Iterator<Item = (usize, &Field)> {
        let pmap = self.pmap;
        self.fields
            .iter()
            .enumerate()
            .filter(move |(idx, _)| Some(*idx) != pmap)
    }

    pub fn data_field_count(&self) -> usize {
        self.fields.len() - usize::from(self.pmap.is_some())
    }
}

pub struct MessageBuilder {
    name: String,
    id: i32,
    fields: Vec<Field>,
    pmap: Option<usize>,
    options: Options,
}

impl MessageBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a `bytes[size]` presence bitmap covering `size * 8` optional
    /// fields. At most one per message.
    pub fn pmap_field(mut self, name: impl Into<String>, size: usize) -> Self {
        self.pmap = Some(self.fields.len());
        self.fields.push(Field::bytes(name, size));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Assigns offsets and validates the layout.
    pub fn build(self) -> Result<Message> {
        ensure!(!self.name.is_empty(), "message name must not be empty");

        let mut fields = self.fields;
        let mut offset = 0usize;
        let mut pmap_bits = 0usize;

        for field in fields.iter_mut() {
            ensure!(
                !field.name().is_empty(),
                "message {}: field name must not be empty",
                self.name
            );
            if field.field_type() == FieldType::Bytes {
                ensure!(
                    field.size() > 0,
                    "message {} field {}: zero-size bytes field",
                    self.name,
                    field.name()
                );
            }
            field.set_offset(offset);
            offset += field.size();
        }

        for (idx, field) in fields.iter().enumerate() {
            for other in &fields[..idx] {
                ensure!(
                    other.name() != field.name(),
                    "message {}: duplicate field name {}",
                    self.name,
                    field.name()
                );
            }
        }

        if let Some(pmap) = self.pmap {
            pmap_bits = fields[pmap].size() * 8;
            ensure!(
                fields[pmap].field_type() == FieldType::Bytes,
                "message {}: pmap field must be a bytes field",
                self.name
            );
        }

        for field in &fields {
            if let Some(bit) = field.pmap_index() {
                if self.pmap.is_none() {
                    bail!(
                        "message {} field {}: optional field without a pmap",
                        self.name,
                        field.name()
                    );
                }
                ensure!(
                    (bit as usize) < pmap_bits,
                    "message {} field {}: pmap bit {} out of range ({} bits)",
                    self.name,
                    field.name(),
                    bit,
                    pmap_bits
                );
            }
        }

        Ok(Message {
            id: self.id,
            name: self.name,
            size: offset,
            fields,
            pmap: self.pmap,
            options: self.options,
        })
    }
}

/// The set of messages served by one channel.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    messages: Vec<Message>,
}

impl Scheme {
    pub fn new(messages: Vec<Message>) -> Result<Self> {
        for (idx, m) in messages.iter().enumerate() {
            for other in &messages[..idx] {
                ensure!(
                    other.name() != m.name(),
                    "duplicate message name {}",
                    m.name()
                );
                ensure!(
                    m.id() == 0 || other.id() != m.id(),
                    "duplicate message id {}",
                    m.id()
                );
            }
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn lookup(&self, id: i32) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn lookup_name(&self, name: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.name() == name)
    }
}
