use crate::access::tuple::RowId;
use crate::storage::PageId;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt::Debug;

/// Fixed-width, totally ordered key stored in B+tree pages.
pub trait IndexKey: Ord + Copy + Debug + Send + Sync + 'static {
    const ENCODED_LEN: usize;

    /// Write exactly `ENCODED_LEN` bytes into `buf`.
    fn encode(&self, buf: &mut [u8]);

    fn decode(buf: &[u8]) -> Self;
}

/// Fixed-width payload stored next to each key in a leaf.
pub trait IndexValue: Copy + Debug + PartialEq + Send + Sync + 'static {
    const ENCODED_LEN: usize;

    fn encode(&self, buf: &mut [u8]);

    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for i32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl IndexKey for i64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl IndexValue for i32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl IndexValue for i64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl IndexValue for PageId {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, self.0);
    }

    fn decode(buf: &[u8]) -> Self {
        PageId(LittleEndian::read_u32(buf))
    }
}

impl IndexValue for RowId {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.page_id.0);
        LittleEndian::write_u32(&mut buf[4..8], self.slot);
    }

    fn decode(buf: &[u8]) -> Self {
        RowId::new(
            PageId(LittleEndian::read_u32(&buf[0..4])),
            LittleEndian::read_u32(&buf[4..8]),
        )
    }
}

/// Byte-string key compared lexicographically.
///
/// Built from [`Field::encode_key`](crate::access::value::Field::encode_key), whose encoding
/// preserves the ordering of the typed values, so byte order is key order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    /// Copy `bytes` into a zero-padded key. Returns None if it does not fit.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > N {
            return None;
        }
        let mut data = [0u8; N];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.data
    }
}

impl<const N: usize> Debug for GenericKey<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GenericKey<{}>(", N)?;
        for b in &self.data {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const ENCODED_LEN: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_key_ordering() {
        let a = GenericKey::<8>::from_bytes(&[0x00, 0x01]).unwrap();
        let b = GenericKey::<8>::from_bytes(&[0x00, 0x02]).unwrap();
        let c = GenericKey::<8>::from_bytes(&[0x01]).unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(GenericKey::<4>::from_bytes(&[1, 2, 3, 4, 5]).is_none());
    }

    #[test]
    fn test_row_id_codec() {
        let rid = RowId::new(PageId(17), 3);
        let mut buf = [0u8; 8];
        rid.encode(&mut buf);
        assert_eq!(RowId::decode(&buf), rid);
    }
}
