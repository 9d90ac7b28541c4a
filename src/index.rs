//! The index access method: building, inserting, and scanning.
//!
//! An index entry maps a tuple built from the indexed row's key columns (in
//! `indkey` order) to the row's rowid. Scans support an equality prefix over
//! the leading scan keys; entries sharing the prefix come back in the index's
//! duplicate order.

use crate::error::MiniError;
use crate::kv::{Cursor, PutFlags};
use crate::relation::{rowid_from_key, Relation, TableScan};
use crate::scan_key::ScanKey;
use crate::tuple::{Tuple, TupleMeta};
use crate::types::{RelKind, Strategy, INDEX_MAX_KEYS};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::debug;

/// Everything the access method needs to know about one index.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    /// Source-table attribute numbers of the key columns, in index order.
    pub key_attrs: Vec<i16>,
    pub unique: bool,
}

impl IndexInfo {
    pub fn new(key_attrs: Vec<i16>, unique: bool) -> IndexInfo {
        assert!(
            !key_attrs.is_empty() && key_attrs.len() <= INDEX_MAX_KEYS,
            "index must have between 1 and {INDEX_MAX_KEYS} key columns"
        );
        IndexInfo { key_attrs, unique }
    }
}

/// Builds the index from scratch by scanning the whole base relation.
pub fn index_build(
    table: &Rc<Relation>,
    index: &Rc<Relation>,
    info: &IndexInfo,
) -> Result<(), MiniError> {
    debug!(table = table.relid, index = index.relid, "building index");
    let mut scan = TableScan::begin(table, &[])?;
    while let Some(tuple) = scan.next_tuple()? {
        index_insert(index, &tuple, info)?;
    }
    scan.end();
    Ok(())
}

/// Inserts one base-table row into the index. Fails with a constraint
/// violation when a unique index already holds a byte-equal key.
pub fn index_insert(index: &Rc<Relation>, tuple: &Tuple, info: &IndexInfo) -> Result<(), MiniError> {
    if !tuple.has_rowid() {
        return Err(MiniError::Invalid("cannot index a tuple without a rowid".into()));
    }
    debug_assert_eq!(index.relkind(), RelKind::Index);
    let rowid = tuple.rowid();

    let mut columns = Vec::with_capacity(info.key_attrs.len());
    for &attno in &info.key_attrs {
        let meta = tuple.get_meta(attno as usize)?;
        columns.push(TupleMeta::new(meta.type_oid, meta.data));
    }
    let index_tuple = Tuple::construct(rowid, &columns)?;

    if info.unique && index.kvstore.get(index_tuple.bytes())?.is_some() {
        return Err(MiniError::Constraint(format!(
            "duplicate key value in unique index {}",
            index.relid
        )));
    }
    index
        .kvstore
        .put(index_tuple.bytes(), &rowid.to_le_bytes(), PutFlags::empty())?;
    Ok(())
}

/// An in-flight index scan returning base-table tuples.
pub struct IndexScan {
    table: Rc<Relation>,
    keys: Vec<ScanKey>,
    cursor: Cursor,
    /// Length of the leading run of scan keys sharing one strategy.
    common_keys: usize,
    /// The entry SET_RANGE landed on, not yet consumed.
    pending: Option<(Tuple<'static>, i64)>,
    finished: bool,
}

impl IndexScan {
    pub fn begin(
        table: &Rc<Relation>,
        index: &Rc<Relation>,
        keys: &[ScanKey],
    ) -> Result<IndexScan, MiniError> {
        debug_assert_eq!(index.relkind(), RelKind::Index);
        if keys.is_empty() {
            return Err(MiniError::Invalid("index scan requires at least one key".into()));
        }

        let common_strategy = keys[0].strategy;
        let mut common_keys = 1;
        while common_keys < keys.len() && keys[common_keys].strategy == common_strategy {
            common_keys += 1;
        }
        if common_strategy != Strategy::Equal {
            return Err(MiniError::NotSupported(format!(
                "index scan strategy {common_strategy:?}"
            )));
        }

        // Probe with the common-prefix arguments and position at the first
        // entry at or after them.
        let probe_columns: Vec<TupleMeta<'_>> = keys[..common_keys]
            .iter()
            .map(|key| TupleMeta::new(key.type_oid, &key.argument))
            .collect();
        let probe = Tuple::construct(0, &probe_columns)?;

        let mut cursor = index.kvstore.cursor();
        let mut pending = None;
        let mut finished = false;
        match cursor.seek(probe.bytes())? {
            Some((key_bytes, value)) => {
                let entry = Tuple::parse_owned(key_bytes)?;
                pending = Some((entry, rowid_from_key(&value)?));
            }
            None => finished = true,
        }

        Ok(IndexScan {
            table: table.clone(),
            keys: keys.to_vec(),
            cursor,
            common_keys,
            pending,
            finished,
        })
    }

    pub fn next_tuple(&mut self) -> Result<Option<Tuple<'static>>, MiniError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let entry = match self.pending.take() {
                Some(entry) => Some(entry),
                None => match self.cursor.next()? {
                    Some((key_bytes, value)) => {
                        Some((Tuple::parse_owned(key_bytes)?, rowid_from_key(&value)?))
                    }
                    None => None,
                },
            };
            let (index_tuple, rowid) = match entry {
                Some(entry) => entry,
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            };

            // One mismatch in the equality prefix ends the scan: entries are
            // ordered by these columns, so nothing further can match.
            for i in 0..self.common_keys {
                let meta = index_tuple.get_meta(i + 1)?;
                if meta.type_oid != self.keys[i].type_oid {
                    return Err(MiniError::Corrupt(format!(
                        "scan key type {} does not match index column type {}",
                        self.keys[i].type_oid, meta.type_oid
                    )));
                }
                if self.keys[i].compare(meta.data)? != Ordering::Equal {
                    self.finished = true;
                    return Ok(None);
                }
            }

            // A mismatch beyond the prefix only skips this entry.
            let mut matched = true;
            for key in &self.keys[self.common_keys..] {
                let meta = index_tuple.get_meta(key.attno as usize)?;
                if meta.type_oid != key.type_oid {
                    return Err(MiniError::Corrupt(format!(
                        "scan key type {} does not match index column type {}",
                        key.type_oid, meta.type_oid
                    )));
                }
                if !key.satisfies(meta.data)? {
                    matched = false;
                    break;
                }
            }
            if !matched {
                continue;
            }

            return Ok(Some(self.fetch_base_tuple(rowid)?));
        }
    }

    fn fetch_base_tuple(&self, rowid: i64) -> Result<Tuple<'static>, MiniError> {
        let value = self
            .table
            .kvstore
            .get(&rowid.to_le_bytes())?
            .ok_or_else(|| {
                MiniError::Corrupt(format!(
                    "index entry references missing rowid {rowid} in relation {}",
                    self.table.relid
                ))
            })?;
        let mut tuple = Tuple::parse_owned(value)?;
        tuple.set_rowid(rowid);
        Ok(tuple)
    }

    pub fn end(self) {}
}
