//! Stored-key encoding.
//!
//! The backing store orders keys by raw bytes and cannot be taught a custom
//! comparator, so every logical key is rewritten into a form whose byte order
//! equals the comparator order the relation wants:
//!
//! * rowid keys (8 bytes little-endian) become big-endian, so byte order is
//!   unsigned numeric order;
//! * index-key tuples become a concatenation of `[type tag | big-endian,
//!   sign-flipped column bytes]`, so byte order is the composite tuple-prefix
//!   order, and a probe tuple with fewer columns is a byte prefix of every
//!   entry it matches.
//!
//! The rest of the system only ever sees logical keys; translation happens at
//! the sub-store boundary.

use crate::error::MiniError;
use crate::tuple::{Tuple, TupleMeta};
use crate::types::{type_width, BOOL_OID, CHAR_OID, INT2_OID, INT4_OID, INT8_OID, NAME_OID};

pub fn rowid_to_stored(key: &[u8]) -> Result<Vec<u8>, MiniError> {
    if key.len() != 8 {
        return Err(MiniError::Corrupt(format!(
            "rowid key has {} bytes, expected 8",
            key.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(key);
    Ok(u64::from_le_bytes(buf).to_be_bytes().to_vec())
}

pub fn rowid_from_stored(stored: &[u8]) -> Result<Vec<u8>, MiniError> {
    if stored.len() != 8 {
        return Err(MiniError::Corrupt(format!(
            "stored rowid key has {} bytes, expected 8",
            stored.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(stored);
    Ok(u64::from_be_bytes(buf).to_le_bytes().to_vec())
}

/// Encodes a logical index-key tuple (tuple codec form) into stored bytes.
pub fn tuple_key_to_stored(key: &[u8]) -> Result<Vec<u8>, MiniError> {
    let tuple = Tuple::parse(key)?;
    let mut out = Vec::with_capacity(key.len());
    for attno in 1..tuple.columns() {
        let meta = tuple.get_meta(attno)?;
        encode_column(meta.type_oid, meta.data, &mut out)?;
    }
    Ok(out)
}

/// Rebuilds the logical tuple from stored bytes. The inverse of
/// `tuple_key_to_stored`; the input must span exactly the encoded columns.
pub fn tuple_key_from_stored(stored: &[u8]) -> Result<Vec<u8>, MiniError> {
    let mut columns: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut pos = 0;
    while pos < stored.len() {
        let type_oid = stored[pos] as u32;
        let width = indexable_width(type_oid).ok_or_else(|| {
            MiniError::Corrupt(format!("bad type tag {type_oid} in stored index key"))
        })?;
        pos += 1;
        if pos + width > stored.len() {
            return Err(MiniError::Corrupt("truncated stored index key".into()));
        }
        columns.push((type_oid, decode_column(&stored[pos..pos + width])));
        pos += width;
    }

    let metas: Vec<TupleMeta<'_>> = columns
        .iter()
        .map(|(oid, data)| TupleMeta::new(*oid, data))
        .collect();
    Ok(Tuple::construct(0, &metas)?.bytes().to_vec())
}

/// Width of a type inside a stored index key, for the types that may appear
/// in one (the orderable fixed-width types).
pub fn indexable_width(type_oid: u32) -> Option<usize> {
    match type_oid {
        BOOL_OID | CHAR_OID | INT2_OID | INT4_OID | INT8_OID | NAME_OID => type_width(type_oid),
        _ => None,
    }
}

fn encode_column(type_oid: u32, data: &[u8], out: &mut Vec<u8>) -> Result<(), MiniError> {
    let width = indexable_width(type_oid)
        .ok_or_else(|| MiniError::Invalid(format!("type {type_oid} is not indexable")))?;
    if data.len() != width {
        return Err(MiniError::Corrupt(format!(
            "index key column of type {type_oid} has {} bytes, expected {width}",
            data.len()
        )));
    }
    out.push(type_oid as u8);
    match width {
        1 => out.push(data[0] ^ 0x80),
        2 => {
            let mut buf = [0u8; 2];
            buf.copy_from_slice(data);
            out.extend_from_slice(&(u16::from_le_bytes(buf) ^ 0x8000).to_be_bytes());
        }
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(data);
            out.extend_from_slice(&(u32::from_le_bytes(buf) ^ 0x8000_0000).to_be_bytes());
        }
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(data);
            out.extend_from_slice(&(u64::from_le_bytes(buf) ^ 0x8000_0000_0000_0000).to_be_bytes());
        }
        _ => out.extend_from_slice(data), // NAME: already byte-ordered
    }
    Ok(())
}

fn decode_column(stored: &[u8]) -> Vec<u8> {
    match stored.len() {
        1 => vec![stored[0] ^ 0x80],
        2 => {
            let mut buf = [0u8; 2];
            buf.copy_from_slice(stored);
            (u16::from_be_bytes(buf) ^ 0x8000).to_le_bytes().to_vec()
        }
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(stored);
            (u32::from_be_bytes(buf) ^ 0x8000_0000).to_le_bytes().to_vec()
        }
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(stored);
            (u64::from_be_bytes(buf) ^ 0x8000_0000_0000_0000)
                .to_le_bytes()
                .to_vec()
        }
        _ => stored.to_vec(),
    }
}
