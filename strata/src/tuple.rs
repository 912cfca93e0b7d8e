//! Tuples and the schemas that describe them.
//!
//! Tuples are fixed-size: every field type has a known on-disk length, so a
//! page can address its slots by plain arithmetic.

use crate::error::DbError;
use crate::page::PageId;
use std::fmt;

/// Byte budget for a string field's payload on disk.
pub const STRING_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Str,
}

impl FieldType {
    /// Number of bytes a field of this type occupies on disk.
    pub fn len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str => STRING_LEN + 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Appends the big-endian on-disk form of this field.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Field::Str(s) => {
                let bytes = s.as_bytes();
                let n = bytes.len().min(STRING_LEN);
                out.extend_from_slice(&(n as u32).to_be_bytes());
                out.extend_from_slice(&bytes[..n]);
                out.resize(out.len() + (STRING_LEN - n), 0);
            }
        }
    }

    pub fn decode(field_type: FieldType, buf: &[u8]) -> Result<Field, DbError> {
        if buf.len() < field_type.len() {
            return Err(DbError::InvalidPage(format!(
                "field needs {} bytes, found {}",
                field_type.len(),
                buf.len()
            )));
        }
        match field_type {
            FieldType::Int => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&buf[..4]);
                Ok(Field::Int(i32::from_be_bytes(raw)))
            }
            FieldType::Str => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&buf[..4]);
                let n = u32::from_be_bytes(raw) as usize;
                if n > STRING_LEN {
                    return Err(DbError::InvalidPage(format!(
                        "string length {n} exceeds the {STRING_LEN}-byte budget"
                    )));
                }
                let s = String::from_utf8_lossy(&buf[4..4 + n]).into_owned();
                Ok(Field::Str(s))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Str(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone)]
struct TdItem {
    field_type: FieldType,
    name: String,
}

/// Schema of a tuple: ordered, named field types.
///
/// Two schemas are compatible when their types line up; names are labels.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new<S: Into<String>>(fields: Vec<(FieldType, S)>) -> Self {
        TupleDesc {
            items: fields
                .into_iter()
                .map(|(field_type, name)| TdItem {
                    field_type,
                    name: name.into(),
                })
                .collect(),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> FieldType {
        self.items[i].field_type
    }

    pub fn field_name(&self, i: usize) -> &str {
        &self.items[i].name
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == name)
    }

    /// Bytes one tuple of this schema occupies on disk.
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.len()).sum()
    }

    /// Type-wise compatibility; field names do not participate.
    pub fn matches(&self, other: &TupleDesc) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}({})", item.field_type, item.name)?;
        }
        Ok(())
    }
}

/// Where a stored tuple lives: its page and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub pid: PageId,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct Tuple {
    td: TupleDesc,
    fields: Vec<Field>,
    rid: Option<RecordId>,
}

impl Tuple {
    pub fn new(td: TupleDesc, fields: Vec<Field>) -> Result<Self, DbError> {
        if fields.len() != td.num_fields()
            || fields
                .iter()
                .enumerate()
                .any(|(i, f)| f.field_type() != td.field_type(i))
        {
            return Err(DbError::SchemaMismatch(format!(
                "fields do not fit schema [{td}]"
            )));
        }
        Ok(Tuple {
            td,
            fields,
            rid: None,
        })
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.td.size());
        for field in &self.fields {
            field.encode(&mut out);
        }
        out
    }

    pub fn decode(td: &TupleDesc, buf: &[u8]) -> Result<Tuple, DbError> {
        let mut fields = Vec::with_capacity(td.num_fields());
        let mut offset = 0;
        for i in 0..td.num_fields() {
            let field_type = td.field_type(i);
            fields.push(Field::decode(field_type, &buf[offset..])?);
            offset += field_type.len();
        }
        Ok(Tuple {
            td: td.clone(),
            fields,
            rid: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}
