//! Row encoding. A tuple is a single contiguous byte string:
//!
//! ```text
//! | u32 headerSize | {u32 type, u32 offset, u32 size} x N | payload bytes |
//! ```
//!
//! Column data for slot `i` lives at `payload[offset_i .. offset_i + size_i]`.
//! The rowid is not part of the encoding; it rides alongside as the key of the
//! table sub-store and is exposed as a synthetic column 0.

use crate::error::MiniError;
use crate::types::INT8_OID;
use std::borrow::Cow;

/// Size of the fixed part of the header (the headerSize field itself).
const HEADER_FIXED: usize = 4;
/// Size of one per-column meta slot.
const META_SIZE: usize = 12;

/// One column for `Tuple::construct`, and the view returned by `get_meta`:
/// a type id and the raw column bytes.
#[derive(Debug, Clone, Copy)]
pub struct TupleMeta<'a> {
    pub type_oid: u32,
    pub data: &'a [u8],
}

impl<'a> TupleMeta<'a> {
    pub fn new(type_oid: u32, data: &'a [u8]) -> TupleMeta<'a> {
        TupleMeta { type_oid, data }
    }
}

/// Integer types readable through `Tuple::get_basic`.
pub trait BasicType: Copy {
    const WIDTH: usize;
    fn from_le_slice(data: &[u8]) -> Self;
}

macro_rules! impl_basic_type {
    ($($t:ty),*) => {
        $(impl BasicType for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();
            fn from_le_slice(data: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(data);
                <$t>::from_le_bytes(buf)
            }
        })*
    };
}

impl_basic_type!(i8, u8, i16, u16, i32, u32, i64, u64);

/// A decoded-on-demand row. Either borrows the bytes handed out by the KV
/// layer or owns its buffer (`construct`, `copy`, `parse_owned`).
#[derive(Debug, Clone)]
pub struct Tuple<'a> {
    rowid_le: [u8; 8],
    data: Cow<'a, [u8]>,
}

impl<'a> Tuple<'a> {
    /// Builds a fresh tuple from column values. At least one column is
    /// required; zero-sized column payloads are legal.
    pub fn construct(rowid: i64, entries: &[TupleMeta<'_>]) -> Result<Tuple<'static>, MiniError> {
        if entries.is_empty() {
            return Err(MiniError::Invalid("tuple must have at least one column".into()));
        }
        let header_len = HEADER_FIXED + entries.len() * META_SIZE;
        let total_len = header_len + entries.iter().map(|e| e.data.len()).sum::<usize>();

        let mut buf = Vec::with_capacity(total_len);
        buf.extend_from_slice(&(header_len as u32).to_le_bytes());
        let mut offset = 0u32;
        for entry in entries {
            buf.extend_from_slice(&entry.type_oid.to_le_bytes());
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            offset += entry.data.len() as u32;
        }
        for entry in entries {
            buf.extend_from_slice(entry.data);
        }

        Ok(Tuple {
            rowid_le: rowid.to_le_bytes(),
            data: Cow::Owned(buf),
        })
    }

    /// Wraps KV-supplied bytes without copying them.
    pub fn parse(data: &'a [u8]) -> Result<Tuple<'a>, MiniError> {
        Self::validate(data)?;
        Ok(Tuple {
            rowid_le: [0u8; 8],
            data: Cow::Borrowed(data),
        })
    }

    /// Takes ownership of a value buffer read from the KV layer.
    pub fn parse_owned(data: Vec<u8>) -> Result<Tuple<'static>, MiniError> {
        Self::validate(&data)?;
        Ok(Tuple {
            rowid_le: [0u8; 8],
            data: Cow::Owned(data),
        })
    }

    fn validate(data: &[u8]) -> Result<(), MiniError> {
        if data.len() < HEADER_FIXED + META_SIZE {
            return Err(MiniError::Corrupt(format!(
                "tuple too short: {} bytes",
                data.len()
            )));
        }
        let header = Self::header_size_of(data);
        if header < HEADER_FIXED + META_SIZE
            || header > data.len()
            || (header - HEADER_FIXED) % META_SIZE != 0
        {
            return Err(MiniError::Corrupt(format!("bad tuple header size {header}")));
        }
        Ok(())
    }

    fn header_size_of(data: &[u8]) -> usize {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&data[..4]);
        u32::from_le_bytes(buf) as usize
    }

    fn header_size(&self) -> usize {
        Self::header_size_of(&self.data)
    }

    /// Number of addressable columns, counting the synthetic rowid column 0.
    pub fn columns(&self) -> usize {
        1 + (self.header_size() - HEADER_FIXED) / META_SIZE
    }

    pub fn rowid(&self) -> i64 {
        i64::from_le_bytes(self.rowid_le)
    }

    pub fn set_rowid(&mut self, rowid: i64) {
        self.rowid_le = rowid.to_le_bytes();
    }

    /// A stored row always has a positive rowid; 0 means "not attached".
    pub fn has_rowid(&self) -> bool {
        self.rowid() > 0
    }

    /// The full encoded form, as written to the KV layer.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Column accessor. `attno` 0 yields the synthetic rowid column; real
    /// columns start at 1.
    pub fn get_meta(&self, attno: usize) -> Result<TupleMeta<'_>, MiniError> {
        if attno == 0 {
            return Ok(TupleMeta::new(INT8_OID, &self.rowid_le));
        }
        let index = attno - 1;
        let header = self.header_size();
        if header < HEADER_FIXED + attno * META_SIZE {
            return Err(MiniError::Corrupt(format!("column {attno} out of range")));
        }

        let slot = &self.data[HEADER_FIXED + index * META_SIZE..HEADER_FIXED + attno * META_SIZE];
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&slot[0..4]);
        let type_oid = u32::from_le_bytes(buf);
        buf.copy_from_slice(&slot[4..8]);
        let offset = u32::from_le_bytes(buf) as usize;
        buf.copy_from_slice(&slot[8..12]);
        let size = u32::from_le_bytes(buf) as usize;

        let start = header + offset;
        if start + size > self.data.len() {
            return Err(MiniError::Corrupt(format!(
                "column {attno} data [{offset}, +{size}] outside tuple"
            )));
        }
        Ok(TupleMeta::new(type_oid, &self.data[start..start + size]))
    }

    pub fn get_type(&self, attno: usize) -> Result<u32, MiniError> {
        Ok(self.get_meta(attno)?.type_oid)
    }

    /// Raw column bytes; empty for zero-sized (null-like) columns.
    pub fn get_slice(&self, attno: usize) -> Result<&[u8], MiniError> {
        Ok(self.get_meta(attno)?.data)
    }

    /// Reads a fixed-width integer column, insisting the stored size matches.
    pub fn get_basic<T: BasicType>(&self, attno: usize) -> Result<T, MiniError> {
        let meta = self.get_meta(attno)?;
        if meta.data.len() != T::WIDTH {
            return Err(MiniError::Corrupt(format!(
                "column {attno} has size {}, expected {}",
                meta.data.len(),
                T::WIDTH
            )));
        }
        Ok(T::from_le_slice(meta.data))
    }

    /// Deep copy into an owned buffer, keeping the attached rowid.
    pub fn copy(&self) -> Tuple<'static> {
        Tuple {
            rowid_le: self.rowid_le,
            data: Cow::Owned(self.data.to_vec()),
        }
    }

    pub fn into_owned(self) -> Tuple<'static> {
        Tuple {
            rowid_le: self.rowid_le,
            data: Cow::Owned(self.data.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CHAR_OID, INT2_OID, INT4_OID, INT8_OID, TEXT_OID};

    #[test]
    fn test_construct() -> Result<(), MiniError> {
        let v1 = u8::MAX;
        let v2 = u16::MAX.to_le_bytes();
        let v3 = u32::MAX.to_le_bytes();
        let v4 = u64::MAX.to_le_bytes();
        let v5 = b"i am v5";
        let v6 = b"i am v6";

        let entries = [
            TupleMeta::new(CHAR_OID, std::slice::from_ref(&v1)),
            TupleMeta::new(INT2_OID, &v2),
            TupleMeta::new(INT4_OID, &v3),
            TupleMeta::new(INT8_OID, &v4),
            TupleMeta::new(TEXT_OID, v5),
            TupleMeta::new(TEXT_OID, v6),
        ];
        let tuple = Tuple::construct(0, &entries)?;

        assert_eq!(tuple.columns(), entries.len() + 1);
        assert_eq!(tuple.get_basic::<u8>(1)?, u8::MAX);
        assert_eq!(tuple.get_type(1)?, CHAR_OID);
        assert_eq!(tuple.get_basic::<u16>(2)?, u16::MAX);
        assert_eq!(tuple.get_type(2)?, INT2_OID);
        assert_eq!(tuple.get_basic::<u32>(3)?, u32::MAX);
        assert_eq!(tuple.get_type(3)?, INT4_OID);
        assert_eq!(tuple.get_basic::<u64>(4)?, u64::MAX);
        assert_eq!(tuple.get_type(4)?, INT8_OID);
        assert_eq!(tuple.get_slice(5)?, v5);
        assert_eq!(tuple.get_type(5)?, TEXT_OID);
        assert_eq!(tuple.get_slice(6)?, v6);

        let one = Tuple::construct(0, &entries[..1])?;
        assert_eq!(one.columns(), 2);
        Ok(())
    }

    #[test]
    fn test_construct_null_columns() -> Result<(), MiniError> {
        let v1 = u8::MAX;
        let v4 = b"i am v4";
        let entries = [
            TupleMeta::new(CHAR_OID, std::slice::from_ref(&v1)),
            TupleMeta::new(TEXT_OID, &[]),
            TupleMeta::new(TEXT_OID, &[]),
            TupleMeta::new(TEXT_OID, v4),
            TupleMeta::new(TEXT_OID, &[]),
        ];
        let tuple = Tuple::construct(0, &entries)?;

        assert_eq!(tuple.get_basic::<u8>(1)?, u8::MAX);
        assert!(tuple.get_slice(2)?.is_empty());
        assert!(tuple.get_slice(3)?.is_empty());
        assert_eq!(tuple.get_slice(4)?, v4);
        assert!(tuple.get_slice(5)?.is_empty());
        assert!(matches!(tuple.get_slice(6), Err(MiniError::Corrupt(_))));
        Ok(())
    }

    #[test]
    fn test_basic_type_size_mismatch() -> Result<(), MiniError> {
        let v = 7i64.to_le_bytes();
        let tuple = Tuple::construct(0, &[TupleMeta::new(INT8_OID, &v)])?;
        assert!(matches!(
            tuple.get_basic::<u32>(1),
            Err(MiniError::Corrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn test_rowid_column() -> Result<(), MiniError> {
        let v = 5i16.to_le_bytes();
        let mut tuple = Tuple::construct(42, &[TupleMeta::new(INT2_OID, &v)])?;
        assert!(tuple.has_rowid());
        assert_eq!(tuple.get_basic::<i64>(0)?, 42);
        assert_eq!(tuple.get_type(0)?, INT8_OID);

        tuple.set_rowid(0);
        assert!(!tuple.has_rowid());
        Ok(())
    }

    #[test]
    fn test_round_trip_through_bytes() -> Result<(), MiniError> {
        let v1 = 123i32.to_le_bytes();
        let v2 = b"payload";
        let tuple = Tuple::construct(9, &[
            TupleMeta::new(INT4_OID, &v1),
            TupleMeta::new(TEXT_OID, v2),
        ])?;

        let mut back = Tuple::parse_owned(tuple.bytes().to_vec())?;
        back.set_rowid(9);
        assert_eq!(back.columns(), 3);
        assert_eq!(back.rowid(), 9);
        assert_eq!(back.get_basic::<i32>(1)?, 123);
        assert_eq!(back.get_slice(2)?, v2);

        let copy = back.copy();
        assert_eq!(copy.rowid(), 9);
        assert_eq!(copy.bytes(), back.bytes());
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Tuple::parse(&[1, 2, 3]).is_err());
        // headerSize pointing past the end of the buffer
        let mut bad = vec![0u8; 20];
        bad[..4].copy_from_slice(&100u32.to_le_bytes());
        assert!(Tuple::parse(&bad).is_err());
        // headerSize not aligned to a whole number of meta slots
        let mut bad = vec![0u8; 20];
        bad[..4].copy_from_slice(&18u32.to_le_bytes());
        assert!(Tuple::parse(&bad).is_err());
    }
}
