//! Per-type total orders, plus the composite order index keys sort by.
//!
//! Every integer comparator insists its arguments are exactly the type's
//! natural width; handing it anything else is a programmer error. Callers
//! that deal with untrusted data (scan keys) validate widths first.

use crate::tuple::Tuple;
use crate::types::{
    BOOL_OID, CHAR_OID, INT2_OID, INT4_OID, INT8_OID, NAMEDATALEN, NAME_OID,
};
use std::cmp::Ordering;

pub type CmpFn = fn(&[u8], &[u8]) -> Ordering;

/// Comparator for a column type, or None for types with no ordering
/// (TEXT, INT2_VECTOR).
pub fn cmp_fn(type_oid: u32) -> Option<CmpFn> {
    match type_oid {
        CHAR_OID | BOOL_OID => Some(i8_cmp),
        INT2_OID => Some(i16_cmp),
        INT4_OID => Some(i32_cmp),
        INT8_OID => Some(i64_cmp),
        NAME_OID => Some(name_cmp),
        _ => None,
    }
}

macro_rules! int_cmp {
    ($name:ident, $t:ty) => {
        pub fn $name(a: &[u8], b: &[u8]) -> Ordering {
            const W: usize = std::mem::size_of::<$t>();
            assert!(a.len() == W && b.len() == W, "argument width mismatch");
            let mut buf = [0u8; W];
            buf.copy_from_slice(a);
            let va = <$t>::from_le_bytes(buf);
            buf.copy_from_slice(b);
            let vb = <$t>::from_le_bytes(buf);
            va.cmp(&vb)
        }
    };
}

int_cmp!(i8_cmp, i8);
int_cmp!(i16_cmp, i16);
int_cmp!(i32_cmp, i32);
int_cmp!(i64_cmp, i64);
int_cmp!(u64_cmp, u64);

/// Byte-wise order over the full fixed-width name buffer.
pub fn name_cmp(a: &[u8], b: &[u8]) -> Ordering {
    assert!(
        a.len() == NAMEDATALEN && b.len() == NAMEDATALEN,
        "argument width mismatch"
    );
    a.cmp(b)
}

/// Composite order over encoded index tuples: walk the columns of both sides
/// in step, deferring to the per-type comparator; on an all-equal prefix the
/// tuple with fewer columns sorts first. Column types must match pairwise.
pub fn tuple_key_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let ta = Tuple::parse(a).expect("well-formed index tuple");
    let tb = Tuple::parse(b).expect("well-formed index tuple");
    let cols_a = ta.columns();
    let cols_b = tb.columns();

    for i in 0..cols_a.min(cols_b) {
        let ma = ta.get_meta(i).expect("column in range");
        let mb = tb.get_meta(i).expect("column in range");
        assert_eq!(ma.type_oid, mb.type_oid, "index key type mismatch");
        let cmp = cmp_fn(ma.type_oid).expect("orderable index key type");
        let ord = cmp(ma.data, mb.data);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    cols_a.cmp(&cols_b)
}
