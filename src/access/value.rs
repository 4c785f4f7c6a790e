use crate::access::error::{RecordError, RecordResult};
use bytes::{Buf, BufMut};
use std::cmp::Ordering;
use std::fmt;

/// Column types supported by the record format
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeId {
    Invalid = 0,
    Int = 1,
    Float = 2,
    Char = 3,
}

impl TypeId {
    pub fn from_u8(value: u8) -> RecordResult<Self> {
        match value {
            0 => Ok(TypeId::Invalid),
            1 => Ok(TypeId::Int),
            2 => Ok(TypeId::Float),
            3 => Ok(TypeId::Char),
            _ => Err(RecordError::UnknownType(value)),
        }
    }

    /// Fixed storage length of the type; `Char` columns carry their own length.
    pub fn fixed_len(self) -> Option<u32> {
        match self {
            TypeId::Int | TypeId::Float => Some(4),
            TypeId::Invalid | TypeId::Char => None,
        }
    }
}

/// Fail with `Truncated` unless `buf` holds at least `needed` more bytes.
pub(crate) fn ensure_remaining(buf: &mut impl Buf, needed: usize) -> RecordResult<()> {
    if buf.remaining() < needed {
        return Err(RecordError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// A typed value stored in a row. Nulls remember the type of their column.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null(TypeId),
    Int(i32),
    Float(f32),
    Char(String),
}

impl Field {
    pub fn type_id(&self) -> TypeId {
        match self {
            Field::Null(type_id) => *type_id,
            Field::Int(_) => TypeId::Int,
            Field::Float(_) => TypeId::Float,
            Field::Char(_) => TypeId::Char,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null(_))
    }

    /// Bytes written by [`serialize_to`](Self::serialize_to). Nulls take no space; the row's
    /// null map records them.
    pub fn serialized_size(&self) -> usize {
        match self {
            Field::Null(_) => 0,
            Field::Int(_) | Field::Float(_) => 4,
            Field::Char(s) => 4 + s.len(),
        }
    }

    pub fn serialize_to(&self, buf: &mut impl BufMut) {
        match self {
            Field::Null(_) => {}
            Field::Int(v) => buf.put_i32_le(*v),
            Field::Float(v) => buf.put_f32_le(*v),
            Field::Char(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf, type_id: TypeId) -> RecordResult<Self> {
        match type_id {
            TypeId::Int => {
                ensure_remaining(buf, 4)?;
                Ok(Field::Int(buf.get_i32_le()))
            }
            TypeId::Float => {
                ensure_remaining(buf, 4)?;
                Ok(Field::Float(buf.get_f32_le()))
            }
            TypeId::Char => {
                ensure_remaining(buf, 4)?;
                let len = buf.get_u32_le() as usize;
                ensure_remaining(buf, len)?;
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                String::from_utf8(bytes)
                    .map(Field::Char)
                    .map_err(|_| RecordError::InvalidUtf8)
            }
            TypeId::Invalid => Err(RecordError::UnknownType(TypeId::Invalid as u8)),
        }
    }

    /// Width of the key segment produced by [`encode_key`](Self::encode_key) for a column of
    /// `type_id` and length `len`: one null marker byte plus the payload.
    pub fn key_width(type_id: TypeId, len: u32) -> usize {
        1 + type_id.fixed_len().unwrap_or(len) as usize
    }

    /// Append a fixed-width encoding whose byte order matches the value order. Nulls sort
    /// first; `Char` values are zero padded (or cut) to `len` bytes.
    pub fn encode_key(&self, len: u32, out: &mut Vec<u8>) {
        match self {
            Field::Null(type_id) => {
                out.push(0);
                out.resize(out.len() + Self::key_width(*type_id, len) - 1, 0);
            }
            Field::Int(v) => {
                out.push(1);
                out.put_u32((*v as u32) ^ 0x8000_0000);
            }
            Field::Float(v) => {
                let bits = v.to_bits();
                let ordered = if bits & 0x8000_0000 != 0 {
                    !bits
                } else {
                    bits ^ 0x8000_0000
                };
                out.push(1);
                out.put_u32(ordered);
            }
            Field::Char(s) => {
                let len = len as usize;
                let bytes = &s.as_bytes()[..s.len().min(len)];
                out.push(1);
                out.extend_from_slice(bytes);
                out.resize(out.len() + len - bytes.len(), 0);
            }
        }
    }
}

impl PartialOrd for Field {
    /// Values of the same type compare naturally, nulls before everything else.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Field::Null(_), Field::Null(_)) => Some(Ordering::Equal),
            (Field::Null(_), _) => Some(Ordering::Less),
            (_, Field::Null(_)) => Some(Ordering::Greater),
            (Field::Int(a), Field::Int(b)) => a.partial_cmp(b),
            (Field::Float(a), Field::Float(b)) => a.partial_cmp(b),
            (Field::Char(a), Field::Char(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Null(_) => write!(f, "NULL"),
            Field::Int(v) => write!(f, "{}", v),
            Field::Float(v) => write!(f, "{}", v),
            Field::Char(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_conversion() -> RecordResult<()> {
        assert_eq!(TypeId::from_u8(1)?, TypeId::Int);
        assert_eq!(TypeId::from_u8(3)?, TypeId::Char);
        assert_eq!(TypeId::from_u8(9), Err(RecordError::UnknownType(9)));
        Ok(())
    }

    #[test]
    fn test_serialize_fields() -> RecordResult<()> {
        let fields = [
            Field::Int(-42),
            Field::Float(2.5),
            Field::Char("hello".to_string()),
        ];
        let mut buf = Vec::new();
        for field in &fields {
            field.serialize_to(&mut buf);
        }
        assert_eq!(buf.len(), 4 + 4 + 9);

        let mut reader = &buf[..];
        for field in &fields {
            assert_eq!(&Field::deserialize_from(&mut reader, field.type_id())?, field);
        }
        assert!(!reader.has_remaining());
        Ok(())
    }

    #[test]
    fn test_truncated_char() {
        let mut buf = Vec::new();
        Field::Char("abcdef".to_string()).serialize_to(&mut buf);
        let mut reader = &buf[..6];
        assert!(matches!(
            Field::deserialize_from(&mut reader, TypeId::Char),
            Err(RecordError::Truncated { .. })
        ));
    }

    fn key(field: &Field, len: u32) -> Vec<u8> {
        let mut out = Vec::new();
        field.encode_key(len, &mut out);
        out
    }

    #[test]
    fn test_key_encoding_preserves_order() {
        let ints = [i32::MIN, -100, -1, 0, 1, 7, i32::MAX];
        for pair in ints.windows(2) {
            assert!(key(&Field::Int(pair[0]), 4) < key(&Field::Int(pair[1]), 4));
        }

        let floats = [-1.0e9f32, -2.5, -0.5, 0.0, 0.25, 3.0, 1.0e9];
        for pair in floats.windows(2) {
            assert!(key(&Field::Float(pair[0]), 4) < key(&Field::Float(pair[1]), 4));
        }

        let chars = ["", "a", "ab", "b", "ba"];
        for pair in chars.windows(2) {
            let a = key(&Field::Char(pair[0].to_string()), 8);
            let b = key(&Field::Char(pair[1].to_string()), 8);
            assert_eq!(a.len(), 9);
            assert!(a < b);
        }

        assert!(key(&Field::Null(TypeId::Int), 4) < key(&Field::Int(i32::MIN), 4));
        assert_eq!(Field::key_width(TypeId::Int, 0), 5);
        assert_eq!(Field::key_width(TypeId::Char, 16), 17);
    }

    #[test]
    fn test_field_ordering() {
        assert!(Field::Int(1) < Field::Int(2));
        assert!(Field::Null(TypeId::Int) < Field::Int(i32::MIN));
        assert_eq!(Field::Int(1).partial_cmp(&Field::Char("1".into())), None);
    }
}
