use std::fmt;

/// Column type ids. The numbering mirrors the PostgreSQL OIDs for the same
/// types so catalog dumps read familiarly.
pub const BOOL_OID: u32 = 16;
pub const CHAR_OID: u32 = 18;
pub const NAME_OID: u32 = 19;
pub const INT8_OID: u32 = 20;
pub const INT2_OID: u32 = 21;
pub const INT2_VECTOR_OID: u32 = 22;
pub const INT4_OID: u32 = 23;
pub const TEXT_OID: u32 = 25;

/// Fixed width of identifier names, including the trailing NUL padding.
pub const NAMEDATALEN: usize = 64;

/// Maximum number of key columns in an index.
pub const INDEX_MAX_KEYS: usize = 32;

/// Storage width of a type, for the types that have a fixed one.
/// Variable-length types (TEXT) return None.
pub fn type_width(type_oid: u32) -> Option<usize> {
    match type_oid {
        BOOL_OID | CHAR_OID => Some(1),
        INT2_OID => Some(2),
        INT4_OID => Some(4),
        INT8_OID => Some(8),
        NAME_OID => Some(NAMEDATALEN),
        INT2_VECTOR_OID => Some(2 * INDEX_MAX_KEYS),
        _ => None,
    }
}

/// B-tree operator strategy numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Strategy {
    Less = 1,
    LessEqual = 2,
    Equal = 3,
    GreaterEqual = 4,
    Greater = 5,
}

/// What a relation is: an ordinary table or a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Relation,
    Index,
}

impl RelKind {
    pub fn as_u8(self) -> u8 {
        match self {
            RelKind::Relation => b'r',
            RelKind::Index => b'i',
        }
    }

    pub fn from_u8(b: u8) -> Option<RelKind> {
        match b {
            b'r' => Some(RelKind::Relation),
            b'i' => Some(RelKind::Index),
            _ => None,
        }
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8() as char)
    }
}

/// A fixed-width, NUL-padded identifier name. Compared byte-wise over the
/// whole buffer, so equal strings always pad to equal bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NameData(pub [u8; NAMEDATALEN]);

impl NameData {
    pub fn empty() -> NameData {
        NameData([0u8; NAMEDATALEN])
    }

    /// Truncates to NAMEDATALEN - 1 bytes so the buffer stays NUL-terminated.
    pub fn from_str(s: &str) -> NameData {
        let mut buf = [0u8; NAMEDATALEN];
        let n = s.len().min(NAMEDATALEN - 1);
        buf[..n].copy_from_slice(&s.as_bytes()[..n]);
        NameData(buf)
    }

    pub fn from_slice(b: &[u8]) -> Option<NameData> {
        if b.len() != NAMEDATALEN {
            return None;
        }
        let mut buf = [0u8; NAMEDATALEN];
        buf.copy_from_slice(b);
        Some(NameData(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(NAMEDATALEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Debug for NameData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameData({:?})", self.as_str())
    }
}

impl fmt::Display for NameData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
