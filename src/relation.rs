//! Relation descriptors and the table / system-table scan drivers.
//!
//! A `Relation` bundles the KV sub-store of a table or index with its catalog
//! metadata. Descriptors are cached per transaction: the first reference to a
//! relid materializes one, reads its `sys_class` row and, when the relation
//! has indexes, its `sys_index` and `sys_attribute` lists. The cache entry is
//! inserted *before* hydration so the catalog lookups running during
//! hydration can re-enter `open_table` without looping.

use crate::catalog::{SysAttribute, SysClass, SysIndex};
use crate::error::MiniError;
use crate::index::IndexScan;
use crate::kv::{Cursor, KeyOrder, OpenFlags, PutFlags, SubStore, Txn};
use crate::scan_key::ScanKey;
use crate::tuple::Tuple;
use crate::types::{RelKind, Strategy, INT8_OID};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

pub struct Relation {
    pub relid: i64,
    pub kvstore: Rc<SubStore>,
    /// The relation's `sys_class` row; zeroed until hydrated.
    pub rd_rel: RefCell<SysClass>,
    /// Indexes declared on this relation.
    pub rd_index: RefCell<Vec<SysIndex>>,
    /// Attributes, in attnum order.
    pub rd_attr: RefCell<Vec<SysAttribute>>,
}

impl Relation {
    fn new(relid: i64, kvstore: Rc<SubStore>, relkind: RelKind) -> Relation {
        let mut rd_rel = SysClass::default();
        rd_rel.relid = relid;
        rd_rel.relkind = relkind;
        Relation {
            relid,
            kvstore,
            rd_rel: RefCell::new(rd_rel),
            rd_index: RefCell::new(Vec::new()),
            rd_attr: RefCell::new(Vec::new()),
        }
    }

    pub fn relkind(&self) -> RelKind {
        self.rd_rel.borrow().relkind
    }

    /// Opens or creates the table sub-store for `relid` and returns a fresh,
    /// un-hydrated descriptor. Catalog accessors use this path so a catalog
    /// lookup never recurses into catalog hydration.
    pub fn create(txn: &Txn, relid: i64) -> Result<Rc<Relation>, MiniError> {
        let store = txn.open(&relid.to_string(), OpenFlags::CREATE)?;
        store.set_key_order(KeyOrder::Rowid);
        Ok(Rc::new(Relation::new(relid, store, RelKind::Relation)))
    }

    /// Opens a table through the transaction's descriptor cache, hydrating
    /// catalog metadata on a miss. A relation without a `sys_class` row is
    /// returned un-hydrated (the bootstrap path).
    pub fn open_table(txn: &Txn, relid: i64) -> Result<Rc<Relation>, MiniError> {
        if let Some(rel) = txn.get_open_relation(relid) {
            return Ok(rel);
        }

        let store = txn.open(&relid.to_string(), OpenFlags::empty())?;
        store.set_key_order(KeyOrder::Rowid);
        let rel = Rc::new(Relation::new(relid, store, RelKind::Relation));
        txn.insert_open_relation(relid, rel.clone());

        let class_row = match SysClass::get_by_relid(txn, relid)? {
            Some(row) => row,
            None => return Ok(rel),
        };
        debug_assert_eq!(class_row.relid, relid);
        *rel.rd_rel.borrow_mut() = class_row;

        if rel.rd_rel.borrow().relhasindex {
            *rel.rd_index.borrow_mut() = SysIndex::get_index_list(txn, relid)?;
        }
        let relnatts = rel.rd_rel.borrow().relnatts;
        *rel.rd_attr.borrow_mut() = SysAttribute::get_attribute_list(txn, relid, relnatts)?;
        Ok(rel)
    }

    /// Opens (or creates) an index sub-store, with the composite key order.
    pub fn open_index(txn: &Txn, relid: i64) -> Result<Rc<Relation>, MiniError> {
        if let Some(rel) = txn.get_open_relation(relid) {
            return Ok(rel);
        }

        let store = txn.open(&relid.to_string(), OpenFlags::CREATE | OpenFlags::DUP_SORT)?;
        store.set_key_order(KeyOrder::TupleKey);
        let rel = Rc::new(Relation::new(relid, store, RelKind::Index));
        txn.insert_open_relation(relid, rel.clone());
        Ok(rel)
    }

    /// Writes a tuple under a caller-supplied rowid.
    pub fn table_insert(&self, id: i64, tuple: &Tuple) -> Result<(), MiniError> {
        debug_assert_eq!(self.relkind(), RelKind::Relation);
        if id <= 0 {
            return Err(MiniError::Invalid(format!("rowid must be positive, got {id}")));
        }
        self.kvstore
            .put(&id.to_le_bytes(), tuple.bytes(), PutFlags::empty())?;
        Ok(())
    }

    /// Appends a tuple under the next free rowid and returns it.
    pub fn table_append(&self, tuple: &Tuple) -> Result<i64, MiniError> {
        debug_assert_eq!(self.relkind(), RelKind::Relation);
        let id = self.table_next_id()?;
        self.kvstore
            .put(&id.to_le_bytes(), tuple.bytes(), PutFlags::APPEND)?;
        Ok(id)
    }

    /// The rowid `table_append` would assign: 1 + the largest stored rowid,
    /// or 1 for an empty table.
    pub fn table_next_id(&self) -> Result<i64, MiniError> {
        debug_assert_eq!(self.relkind(), RelKind::Relation);
        let mut cursor = self.kvstore.cursor();
        match cursor.last()? {
            Some((key, _)) => Ok(rowid_from_key(&key)? + 1),
            None => Ok(1),
        }
    }
}

pub(crate) fn rowid_from_key(key: &[u8]) -> Result<i64, MiniError> {
    if key.len() != 8 {
        return Err(MiniError::Corrupt(format!(
            "rowid key has {} bytes, expected 8",
            key.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(key);
    Ok(i64::from_le_bytes(buf))
}

/// A table scan. Three modes, picked at begin time: rowid-direct lookup,
/// rowid range walk, or sequential walk with per-row predicate filtering.
pub struct TableScan {
    rel: Rc<Relation>,
    cursor: Option<Cursor>,
    keys: Vec<ScanKey>,
    rowid_scan: bool,
    finished: bool,
    pending: Option<Tuple<'static>>,
}

impl TableScan {
    pub fn begin(rel: &Rc<Relation>, keys: &[ScanKey]) -> Result<TableScan, MiniError> {
        debug_assert_eq!(rel.relkind(), RelKind::Relation);
        let mut scan = TableScan {
            rel: rel.clone(),
            cursor: None,
            keys: keys.to_vec(),
            rowid_scan: false,
            finished: false,
            pending: None,
        };

        if keys.len() == 1 && keys[0].attno == 0 {
            scan.begin_rowid_scan()?;
        } else {
            scan.cursor = Some(rel.kvstore.cursor());
        }
        Ok(scan)
    }

    fn begin_rowid_scan(&mut self) -> Result<(), MiniError> {
        let key = &self.keys[0];
        if key.type_oid != INT8_OID {
            return Err(MiniError::Invalid(format!(
                "invalid rowid key type {}",
                key.type_oid
            )));
        }
        self.rowid_scan = true;
        let rowid = rowid_from_key(&key.argument)?;

        match key.strategy {
            Strategy::Equal => {
                self.finished = true;
                if let Some(value) = self.rel.kvstore.get(&key.argument)? {
                    let mut tuple = Tuple::parse_owned(value)?;
                    tuple.set_rowid(rowid);
                    self.pending = Some(tuple);
                }
            }
            Strategy::GreaterEqual | Strategy::Greater => {
                let mut cursor = self.rel.kvstore.cursor();
                match cursor.seek(&key.argument)? {
                    Some((found, value)) => {
                        // SET_RANGE lands on the first rowid >= the argument;
                        // for a strict > that entry may still be excluded.
                        if key.satisfies(&found)? {
                            let mut tuple = Tuple::parse_owned(value)?;
                            tuple.set_rowid(rowid_from_key(&found)?);
                            self.pending = Some(tuple);
                        }
                    }
                    None => self.finished = true,
                }
                self.cursor = Some(cursor);
            }
            Strategy::Less | Strategy::LessEqual => {
                return Err(MiniError::NotSupported(format!(
                    "rowid scan strategy {:?}",
                    key.strategy
                )));
            }
        }
        Ok(())
    }

    pub fn next_tuple(&mut self) -> Result<Option<Tuple<'static>>, MiniError> {
        if let Some(tuple) = self.pending.take() {
            return Ok(Some(tuple));
        }
        if self.finished {
            return Ok(None);
        }
        if self.rowid_scan {
            return self.next_rowid_tuple();
        }
        self.next_seq_tuple()
    }

    fn next_rowid_tuple(&mut self) -> Result<Option<Tuple<'static>>, MiniError> {
        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => return Ok(None),
        };
        match cursor.next()? {
            Some((key, value)) => {
                let mut tuple = Tuple::parse_owned(value)?;
                tuple.set_rowid(rowid_from_key(&key)?);
                Ok(Some(tuple))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn next_seq_tuple(&mut self) -> Result<Option<Tuple<'static>>, MiniError> {
        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => return Ok(None),
        };
        'fetch: while let Some((key, value)) = cursor.next()? {
            let rowid = rowid_from_key(&key)?;
            let mut tuple = Tuple::parse_owned(value)?;
            tuple.set_rowid(rowid);

            for scan_key in &self.keys {
                let satisfied = if scan_key.attno == 0 {
                    if scan_key.type_oid != INT8_OID {
                        return Err(MiniError::Invalid(format!(
                            "invalid rowid key type {}",
                            scan_key.type_oid
                        )));
                    }
                    scan_key.satisfies(&key)?
                } else {
                    let meta = tuple.get_meta(scan_key.attno as usize)?;
                    if meta.type_oid != scan_key.type_oid {
                        return Err(MiniError::Corrupt(format!(
                            "scan key type {} does not match column type {}",
                            scan_key.type_oid, meta.type_oid
                        )));
                    }
                    scan_key.satisfies(meta.data)?
                };
                if !satisfied {
                    continue 'fetch;
                }
            }
            return Ok(Some(tuple));
        }
        self.finished = true;
        Ok(None)
    }

    pub fn end(self) {}
}

/// Scan over a system table. Delegates to a plain table scan when no usable
/// index is involved, otherwise re-targets the scan keys at the index columns
/// and drives an index scan.
pub enum SysScan {
    Table(TableScan),
    Index(IndexScan),
}

impl SysScan {
    pub fn begin(
        txn: &Txn,
        table_rel: &Rc<Relation>,
        index_id: i64,
        keys: &[ScanKey],
    ) -> Result<SysScan, MiniError> {
        if keys.is_empty() || (keys.len() == 1 && keys[0].attno == 0) {
            return Ok(SysScan::Table(TableScan::begin(table_rel, keys)?));
        }

        if index_id == 0 {
            return Err(MiniError::Invalid(
                "keyed system-table scan requires an index".into(),
            ));
        }
        if !table_rel.rd_rel.borrow().relhasindex {
            return Err(MiniError::Invalid(format!(
                "relation {} has no index",
                table_rel.relid
            )));
        }

        let index_row = {
            let cached = table_rel
                .rd_index
                .borrow()
                .iter()
                .find(|index| index.indexrelid == index_id)
                .copied();
            match cached {
                Some(row) => row,
                None => SysIndex::get_by_indexrelid(txn, index_id)?
                    .ok_or_else(|| MiniError::NotFound(format!("no such index: {index_id}")))?,
            }
        };
        debug_assert_eq!(index_row.indrelid, table_rel.relid);

        // Change attribute numbers to be index column numbers.
        let mut index_keys = Vec::with_capacity(keys.len());
        for key in keys {
            let position = (0..index_row.indnatts as usize)
                .find(|&j| index_row.indkey[j] == key.attno)
                .ok_or_else(|| {
                    MiniError::Invalid(format!(
                        "column {} is not covered by index {}",
                        key.attno, index_id
                    ))
                })?;
            index_keys.push(ScanKey::new(
                (position + 1) as i16,
                key.strategy,
                key.type_oid,
                key.argument.clone(),
            ));
        }

        let index_rel = Relation::open_index(txn, index_id)?;
        debug!(table = table_rel.relid, index = index_id, nkeys = index_keys.len(),
               "system-table index scan");
        Ok(SysScan::Index(IndexScan::begin(
            table_rel,
            &index_rel,
            &index_keys,
        )?))
    }

    pub fn next_tuple(&mut self) -> Result<Option<Tuple<'static>>, MiniError> {
        match self {
            SysScan::Table(scan) => scan.next_tuple(),
            SysScan::Index(scan) => scan.next_tuple(),
        }
    }

    pub fn end(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{Env, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES};
    use crate::tuple::TupleMeta;
    use crate::types::CHAR_OID;
    use tempfile::tempdir;

    fn one_char_tuple() -> Tuple<'static> {
        Tuple::construct(0, &[TupleMeta::new(CHAR_OID, &[0xFF])]).expect("construct")
    }

    #[test]
    fn test_insert_walks_in_rowid_order() -> Result<(), MiniError> {
        let dir = tempdir()?;
        let env = Env::open(dir.path(), DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
        let txn = env.begin();
        let rel = Relation::create(&txn, 100)?;
        let tuple = one_char_tuple();
        rel.table_insert(99, &tuple)?;
        rel.table_insert(101, &tuple)?;
        rel.table_insert(100, &tuple)?;

        let mut cursor = rel.kvstore.cursor();
        let mut seen = Vec::new();
        while let Some((key, _)) = cursor.next()? {
            seen.push(rowid_from_key(&key)?);
        }
        assert_eq!(seen, vec![99, 100, 101]);
        Ok(())
    }

    #[test]
    fn test_insert_rejects_non_positive_rowid() -> Result<(), MiniError> {
        let dir = tempdir()?;
        let env = Env::open(dir.path(), DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
        let txn = env.begin();
        let rel = Relation::create(&txn, 100)?;
        assert!(matches!(
            rel.table_insert(0, &one_char_tuple()),
            Err(MiniError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn test_next_id_continues_after_reopen() -> Result<(), MiniError> {
        let dir = tempdir()?;
        {
            let env = Env::open(dir.path(), DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
            let txn = env.begin();
            let rel = Relation::create(&txn, 42)?;
            let tuple = one_char_tuple();
            assert_eq!(rel.table_append(&tuple)?, 1);
            assert_eq!(rel.table_append(&tuple)?, 2);
            assert_eq!(rel.table_next_id()?, 3);
            txn.commit()?;
        }
        let env = Env::open(dir.path(), DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
        let txn = env.begin();
        let rel = Relation::create(&txn, 42)?;
        assert_eq!(rel.table_next_id()?, 3);
        assert_eq!(rel.table_append(&one_char_tuple())?, 3);
        Ok(())
    }

    #[test]
    fn test_descriptor_cache_returns_same_relation() -> Result<(), MiniError> {
        let dir = tempdir()?;
        let env = Env::open(dir.path(), DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
        let txn = env.begin();
        Relation::create(&txn, 7)?;
        let a = Relation::open_table(&txn, 7)?;
        let b = Relation::open_table(&txn, 7)?;
        assert!(Rc::ptr_eq(&a, &b));
        Ok(())
    }

    #[test]
    fn test_rowid_scan_less_not_supported() -> Result<(), MiniError> {
        let dir = tempdir()?;
        let env = Env::open(dir.path(), DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
        let txn = env.begin();
        let rel = Relation::create(&txn, 5)?;
        rel.table_append(&one_char_tuple())?;

        let key = ScanKey::new(0, Strategy::Less, INT8_OID, 10i64.to_le_bytes().to_vec());
        assert!(matches!(
            TableScan::begin(&rel, &[key]),
            Err(MiniError::NotSupported(_))
        ));
        Ok(())
    }
}
