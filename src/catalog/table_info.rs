//! Table metadata and the catalog's handle on an open table.

use crate::access::error::RecordResult;
use crate::access::schema::{check_magic, get_string, put_string};
use crate::access::value::ensure_remaining;
use crate::access::{Schema, TableHeap};
use crate::catalog::TableId;
use crate::storage::page::PageId;
use bytes::{Buf, BufMut};

pub const TABLE_METADATA_MAGIC_NUM: u32 = 344528;

/// Persisted description of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub table_id: TableId,
    pub name: String,
    pub first_page_id: PageId,
    pub schema: Schema,
}

impl TableMetadata {
    pub fn serialized_size(&self) -> usize {
        4 + 4 + 4 + self.name.len() + 4 + self.schema.serialized_size()
    }

    pub fn serialize_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(TABLE_METADATA_MAGIC_NUM);
        buf.put_u32_le(self.table_id.0);
        put_string(buf, &self.name);
        buf.put_u32_le(self.first_page_id.0);
        self.schema.serialize_to(buf);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.serialize_to(&mut buf);
        buf
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> RecordResult<Self> {
        check_magic(buf, "table metadata", TABLE_METADATA_MAGIC_NUM)?;
        ensure_remaining(buf, 4)?;
        let table_id = TableId(buf.get_u32_le());
        let name = get_string(buf)?;
        ensure_remaining(buf, 4)?;
        let first_page_id = PageId(buf.get_u32_le());
        let schema = Schema::deserialize_from(buf)?;
        Ok(Self {
            table_id,
            name,
            first_page_id,
            schema,
        })
    }
}

/// An open table: its metadata plus the heap holding its rows.
pub struct TableInfo {
    meta: TableMetadata,
    heap: TableHeap,
}

impl TableInfo {
    pub(crate) fn new(meta: TableMetadata, heap: TableHeap) -> Self {
        Self { meta, heap }
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn schema(&self) -> &Schema {
        &self.meta.schema
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.meta
    }

    pub fn heap(&self) -> &TableHeap {
        &self.heap
    }

    pub(crate) fn into_heap(self) -> TableHeap {
        self.heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Column, RecordError, TypeId};

    fn metadata() -> TableMetadata {
        TableMetadata {
            table_id: TableId(3),
            name: "accounts".to_string(),
            first_page_id: PageId(12),
            schema: Schema::new(vec![
                Column::new("id", TypeId::Int, 0, false, true),
                Column::new_char("owner", 32, 1, true, false),
            ]),
        }
    }

    #[test]
    fn test_serialize_deserialize() -> anyhow::Result<()> {
        let meta = metadata();
        let bytes = meta.to_bytes();
        assert_eq!(bytes.len(), meta.serialized_size());
        assert_eq!(TableMetadata::deserialize_from(&mut bytes.as_slice())?, meta);
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut bytes = metadata().to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            TableMetadata::deserialize_from(&mut bytes.as_slice()),
            Err(RecordError::MagicMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_record() {
        let bytes = metadata().to_bytes();
        assert!(TableMetadata::deserialize_from(&mut &bytes[..bytes.len() - 3]).is_err());
    }
}
