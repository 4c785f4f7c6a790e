use crate::access::error::{RecordError, RecordResult};
use crate::access::schema::Schema;
use crate::access::value::{ensure_remaining, Field};
use crate::storage::page::PageId;
use bytes::{Buf, BufMut};
use std::fmt;

/// Location of a row: the table page holding it and the slot within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RowId {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// A row of fields. `rid` is set once the row has been stored in or read from a table heap.
///
/// Layout: `field_count (u32) | one null byte per field | non-null fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rid: Option<RowId>,
    pub fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { rid: None, fields }
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn serialized_size(&self) -> usize {
        4 + self.fields.len() + self.fields.iter().map(Field::serialized_size).sum::<usize>()
    }

    pub fn serialize_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.fields.len() as u32);
        for field in &self.fields {
            buf.put_u8(field.is_null() as u8);
        }
        for field in &self.fields {
            field.serialize_to(buf);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.serialize_to(&mut buf);
        buf
    }

    /// Decode a row whose fields follow `schema`.
    pub fn deserialize_from(buf: &mut impl Buf, schema: &Schema) -> RecordResult<Self> {
        ensure_remaining(buf, 4)?;
        let count = buf.get_u32_le() as usize;
        if count != schema.column_count() {
            return Err(RecordError::FieldCountMismatch {
                expected: schema.column_count(),
                actual: count,
            });
        }
        ensure_remaining(buf, count)?;
        let mut nulls = vec![0u8; count];
        buf.copy_to_slice(&mut nulls);

        let fields = schema
            .columns()
            .iter()
            .zip(nulls)
            .map(|(column, null)| {
                if null != 0 {
                    Ok(Field::Null(column.type_id))
                } else {
                    Field::deserialize_from(buf, column.type_id)
                }
            })
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Self { rid: None, fields })
    }

    /// Project the fields at `key_indices` into a new row, e.g. to build an index key.
    pub fn key_row(&self, key_indices: &[u32]) -> RecordResult<Row> {
        let fields = key_indices
            .iter()
            .map(|&i| {
                self.fields
                    .get(i as usize)
                    .cloned()
                    .ok_or(RecordError::ColumnOutOfRange(i as usize))
            })
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Row { rid: self.rid, fields })
    }

    /// Order-preserving key bytes of this row's fields laid out by `key_schema`.
    pub fn encode_key(&self, key_schema: &Schema) -> Vec<u8> {
        let mut out = Vec::with_capacity(key_schema.key_width());
        for (field, column) in self.fields.iter().zip(key_schema.columns()) {
            field.encode_key(column.len, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::Column;
    use crate::access::value::TypeId;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, true),
            Column::new_char("name", 8, 1, true, false),
            Column::new("score", TypeId::Float, 2, true, false),
        ])
    }

    #[test]
    fn test_row_id_ordering() {
        let a = RowId::new(PageId(1), 5);
        let b = RowId::new(PageId(1), 10);
        let c = RowId::new(PageId(2), 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(format!("{}", a), "(1, 5)");
    }

    #[test]
    fn test_row_serialization_with_nulls() -> RecordResult<()> {
        let row = Row::new(vec![
            Field::Int(7),
            Field::Null(TypeId::Char),
            Field::Float(1.5),
        ]);
        let bytes = row.to_bytes();
        assert_eq!(bytes.len(), row.serialized_size());
        assert_eq!(&bytes[4..7], &[0, 1, 0]);

        let decoded = Row::deserialize_from(&mut &bytes[..], &schema())?;
        assert_eq!(decoded.fields, row.fields);
        assert_eq!(decoded.rid, None);
        Ok(())
    }

    #[test]
    fn test_row_field_count_mismatch() {
        let row = Row::new(vec![Field::Int(1)]);
        let bytes = row.to_bytes();
        assert!(matches!(
            Row::deserialize_from(&mut &bytes[..], &schema()),
            Err(RecordError::FieldCountMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_key_row() -> RecordResult<()> {
        let row = Row::new(vec![
            Field::Int(7),
            Field::Char("ann".into()),
            Field::Float(1.5),
        ]);
        let key = row.key_row(&[1, 0])?;
        assert_eq!(key.fields, vec![Field::Char("ann".into()), Field::Int(7)]);

        let key_schema = schema().key_schema(&[1, 0])?;
        assert_eq!(key.encode_key(&key_schema).len(), key_schema.key_width());
        assert!(row.key_row(&[3]).is_err());
        Ok(())
    }
}
