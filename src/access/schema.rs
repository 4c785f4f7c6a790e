//! Column and schema definitions with their persisted encoding.

use crate::access::error::{RecordError, RecordResult};
use crate::access::value::{ensure_remaining, Field, TypeId};
use bytes::{Buf, BufMut};

pub const COLUMN_MAGIC_NUM: u32 = 210928;
pub const SCHEMA_MAGIC_NUM: u32 = 200715;

pub(crate) fn check_magic(buf: &mut impl Buf, what: &'static str, expected: u32) -> RecordResult<()> {
    ensure_remaining(buf, 4)?;
    let actual = buf.get_u32_le();
    if actual != expected {
        return Err(RecordError::MagicMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn get_string(buf: &mut impl Buf) -> RecordResult<String> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_u32_le() as usize;
    ensure_remaining(buf, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| RecordError::InvalidUtf8)
}

pub(crate) fn put_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_id: TypeId,
    /// Storage length: 4 for numeric types, the maximum byte length for `Char`.
    pub len: u32,
    /// Position of the column in its table.
    pub table_ind: u32,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    /// Numeric column. Use [`Column::new_char`] for `Char`.
    pub fn new(name: impl Into<String>, type_id: TypeId, table_ind: u32, nullable: bool, unique: bool) -> Self {
        debug_assert!(type_id.fixed_len().is_some(), "wrong constructor for {:?}", type_id);
        Self {
            name: name.into(),
            type_id,
            len: type_id.fixed_len().unwrap_or(0),
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn new_char(name: impl Into<String>, len: u32, table_ind: u32, nullable: bool, unique: bool) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::Char,
            len,
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn serialized_size(&self) -> usize {
        4 + 4 + self.name.len() + 1 + 4 + 4 + 1 + 1
    }

    pub fn serialize_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(COLUMN_MAGIC_NUM);
        put_string(buf, &self.name);
        buf.put_u8(self.type_id as u8);
        buf.put_u32_le(self.len);
        buf.put_u32_le(self.table_ind);
        buf.put_u8(self.nullable as u8);
        buf.put_u8(self.unique as u8);
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> RecordResult<Self> {
        check_magic(buf, "column", COLUMN_MAGIC_NUM)?;
        let name = get_string(buf)?;
        ensure_remaining(buf, 1 + 4 + 4 + 1 + 1)?;
        let type_id = TypeId::from_u8(buf.get_u8())?;
        let len = buf.get_u32_le();
        let table_ind = buf.get_u32_le();
        let nullable = buf.get_u8() != 0;
        let unique = buf.get_u8() != 0;
        Ok(Self {
            name,
            type_id,
            len,
            table_ind,
            nullable,
            unique,
        })
    }

    /// Check that `field` can be stored in this column.
    pub fn check_field(&self, field: &Field) -> RecordResult<()> {
        match field {
            Field::Null(_) => Ok(()),
            Field::Char(s) if self.type_id == TypeId::Char => {
                if s.len() > self.len as usize {
                    return Err(RecordError::ValueTooLong {
                        column: self.name.clone(),
                        len: s.len(),
                        max: self.len,
                    });
                }
                Ok(())
            }
            other if other.type_id() == self.type_id => Ok(()),
            other => Err(RecordError::TypeMismatch {
                expected: self.type_id,
                actual: other.type_id(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Independent copy of the schema.
    pub fn deep_copy(&self) -> Schema {
        self.clone()
    }

    /// Schema made of the columns at `indices`, in that order.
    pub fn key_schema(&self, indices: &[u32]) -> RecordResult<Schema> {
        let columns = indices
            .iter()
            .map(|&i| {
                self.columns
                    .get(i as usize)
                    .cloned()
                    .ok_or(RecordError::ColumnOutOfRange(i as usize))
            })
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Schema { columns })
    }

    /// Width of the index key built from this schema's columns.
    pub fn key_width(&self) -> usize {
        self.columns
            .iter()
            .map(|c| Field::key_width(c.type_id, c.len))
            .sum()
    }

    /// Check a full row of fields against the columns.
    pub fn check_fields(&self, fields: &[Field]) -> RecordResult<()> {
        if fields.len() != self.columns.len() {
            return Err(RecordError::FieldCountMismatch {
                expected: self.columns.len(),
                actual: fields.len(),
            });
        }
        self.columns
            .iter()
            .zip(fields)
            .try_for_each(|(column, field)| column.check_field(field))
    }

    pub fn serialized_size(&self) -> usize {
        8 + self
            .columns
            .iter()
            .map(|c| 4 + c.serialized_size())
            .sum::<usize>()
    }

    pub fn serialize_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(SCHEMA_MAGIC_NUM);
        buf.put_u32_le(self.columns.len() as u32);
        for column in &self.columns {
            buf.put_u32_le(column.serialized_size() as u32);
            column.serialize_to(buf);
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> RecordResult<Self> {
        check_magic(buf, "schema", SCHEMA_MAGIC_NUM)?;
        ensure_remaining(buf, 4)?;
        let count = buf.get_u32_le() as usize;
        let mut columns = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ensure_remaining(buf, 4)?;
            let _size = buf.get_u32_le();
            columns.push(Column::deserialize_from(buf)?);
        }
        Ok(Self { columns })
    }
}
