//! The system catalog: typed views onto `sys_class`, `sys_attribute` and
//! `sys_index` tuples, plus their well-known relation ids.
//!
//! Catalog rows store their id as the tuple's rowid rather than as a payload
//! column: `to_tuple` omits the id, `from_tuple` reads it back through the
//! synthetic column 0. The lookup helpers open their relation through
//! `Relation::create`, which skips hydration, so a catalog lookup never
//! recurses into another catalog lookup.

use crate::error::MiniError;
use crate::kv::Txn;
use crate::relation::{Relation, SysScan, TableScan};
use crate::scan_key::ScanKey;
use crate::tuple::{Tuple, TupleMeta};
use crate::types::{
    NameData, RelKind, Strategy, BOOL_OID, CHAR_OID, INDEX_MAX_KEYS, INT2_OID, INT2_VECTOR_OID,
    INT4_OID, INT8_OID, NAMEDATALEN, NAME_OID,
};

pub const SYS_CLASS_RELATION_NAME: &str = "sys_class";
pub const SYS_CLASS_RELATION_ID: i64 = 1259;

pub const ANUM_SYS_CLASS_RELID: i16 = 0;
pub const ANUM_SYS_CLASS_RELNAME: i16 = 1;
pub const ANUM_SYS_CLASS_RELHASINDEX: i16 = 2;
pub const ANUM_SYS_CLASS_RELKIND: i16 = 3;
pub const ANUM_SYS_CLASS_RELNATTS: i16 = 4;
pub const NATTS_SYS_CLASS: i16 = 5;

pub const SYS_CLASS_RELID_INDEX_ID: i64 = 2662;
pub const SYS_CLASS_RELNAME_INDEX_ID: i64 = 2663;

pub const SYS_ATTRIBUTE_RELATION_NAME: &str = "sys_attribute";
pub const SYS_ATTRIBUTE_RELATION_ID: i64 = 1249;

pub const ANUM_SYS_ATTRIBUTE_ATTID: i16 = 0;
pub const ANUM_SYS_ATTRIBUTE_ATTRELID: i16 = 1;
pub const ANUM_SYS_ATTRIBUTE_ATTTYPID: i16 = 2;
pub const ANUM_SYS_ATTRIBUTE_ATTNAME: i16 = 3;
pub const ANUM_SYS_ATTRIBUTE_ATTNUM: i16 = 4;
pub const NATTS_SYS_ATTRIBUTE: i16 = 5;

pub const SYS_ATTRIBUTE_ATTID_INDEX_ID: i64 = 2657;
pub const SYS_ATTRIBUTE_ATTRELID_ATTNAME_INDEX_ID: i64 = 2658;
pub const SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID: i64 = 2659;

pub const SYS_INDEX_RELATION_NAME: &str = "sys_index";
pub const SYS_INDEX_RELATION_ID: i64 = 2610;

pub const ANUM_SYS_INDEX_INDEXRELID: i16 = 0;
pub const ANUM_SYS_INDEX_INDRELID: i16 = 1;
pub const ANUM_SYS_INDEX_INDNATTS: i16 = 2;
pub const ANUM_SYS_INDEX_INDISUNIQUE: i16 = 3;
pub const ANUM_SYS_INDEX_INDISPRIMARY: i16 = 4;
pub const ANUM_SYS_INDEX_INDKEY: i16 = 5;
pub const NATTS_SYS_INDEX: i16 = 6;

pub const SYS_INDEX_INDEXRELID_INDEX_ID: i64 = 2678;
pub const SYS_INDEX_INDRELID_INDEX_ID: i64 = 2679;

/// One `sys_class` row: a table or index known to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysClass {
    pub relid: i64,
    pub relname: NameData,
    pub relhasindex: bool,
    pub relkind: RelKind,
    pub relnatts: i16,
}

impl Default for SysClass {
    fn default() -> SysClass {
        SysClass {
            relid: 0,
            relname: NameData::empty(),
            relhasindex: false,
            relkind: RelKind::Relation,
            relnatts: 0,
        }
    }
}

impl SysClass {
    pub fn from_tuple(tuple: &Tuple) -> Result<SysClass, MiniError> {
        expect_columns(tuple, NATTS_SYS_CLASS, SYS_CLASS_RELATION_NAME)?;
        expect_type(tuple, ANUM_SYS_CLASS_RELNAME, NAME_OID)?;
        expect_type(tuple, ANUM_SYS_CLASS_RELHASINDEX, BOOL_OID)?;
        expect_type(tuple, ANUM_SYS_CLASS_RELKIND, CHAR_OID)?;
        expect_type(tuple, ANUM_SYS_CLASS_RELNATTS, INT2_OID)?;

        let relkind_raw = tuple.get_basic::<u8>(ANUM_SYS_CLASS_RELKIND as usize)?;
        Ok(SysClass {
            relid: tuple.get_basic::<i64>(ANUM_SYS_CLASS_RELID as usize)?,
            relname: name_column(tuple, ANUM_SYS_CLASS_RELNAME)?,
            relhasindex: tuple.get_basic::<u8>(ANUM_SYS_CLASS_RELHASINDEX as usize)? != 0,
            relkind: RelKind::from_u8(relkind_raw).ok_or_else(|| {
                MiniError::Corrupt(format!("bad relkind byte {relkind_raw:#x}"))
            })?,
            relnatts: tuple.get_basic::<i16>(ANUM_SYS_CLASS_RELNATTS as usize)?,
        })
    }

    pub fn to_tuple(&self) -> Result<Tuple<'static>, MiniError> {
        let relhasindex = [self.relhasindex as u8];
        let relkind = [self.relkind.as_u8()];
        let relnatts = self.relnatts.to_le_bytes();
        Tuple::construct(self.relid, &[
            TupleMeta::new(NAME_OID, self.relname.as_bytes()),
            TupleMeta::new(BOOL_OID, &relhasindex),
            TupleMeta::new(CHAR_OID, &relkind),
            TupleMeta::new(INT2_OID, &relnatts),
        ])
    }

    /// Inserts a new `sys_class` row. A zero `relid` asks for the next free
    /// one; the chosen relid is returned.
    pub fn create_entry(
        txn: &Txn,
        relid: i64,
        relname: &str,
        relhasindex: bool,
        relkind: RelKind,
        relnatts: i16,
    ) -> Result<i64, MiniError> {
        let rel = Relation::create(txn, SYS_CLASS_RELATION_ID)?;
        let relid = if relid > 0 { relid } else { rel.table_next_id()? };
        let row = SysClass {
            relid,
            relname: NameData::from_str(relname),
            relhasindex,
            relkind,
            relnatts,
        };
        rel.table_insert(relid, &row.to_tuple()?)?;
        Ok(relid)
    }

    /// Direct lookup by relation id on the table sub-store.
    pub fn get_by_relid(txn: &Txn, relid: i64) -> Result<Option<SysClass>, MiniError> {
        let rel = Relation::create(txn, SYS_CLASS_RELATION_ID)?;
        let value = match rel.kvstore.get(&relid.to_le_bytes())? {
            Some(value) => value,
            None => return Ok(None),
        };
        let mut tuple = Tuple::parse_owned(value)?;
        tuple.set_rowid(relid);
        Ok(Some(SysClass::from_tuple(&tuple)?))
    }

    /// Equality scan on the relname index.
    pub fn get_by_relname(txn: &Txn, relname: &str) -> Result<Option<SysClass>, MiniError> {
        let rel = Relation::open_table(txn, SYS_CLASS_RELATION_ID)?;
        let name = NameData::from_str(relname);
        let key = ScanKey::new(
            ANUM_SYS_CLASS_RELNAME,
            Strategy::Equal,
            NAME_OID,
            name.as_bytes().to_vec(),
        );
        let mut scan = SysScan::begin(txn, &rel, SYS_CLASS_RELNAME_INDEX_ID, &[key])?;
        let row = match scan.next_tuple()? {
            Some(tuple) => Some(SysClass::from_tuple(&tuple)?),
            None => None,
        };
        scan.end();
        Ok(row)
    }
}

/// One `sys_attribute` row: a single column of some relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysAttribute {
    pub attid: i64,
    pub attrelid: i64,
    pub atttypid: i32,
    pub attname: NameData,
    pub attnum: i16,
}

impl SysAttribute {
    pub fn from_tuple(tuple: &Tuple) -> Result<SysAttribute, MiniError> {
        expect_columns(tuple, NATTS_SYS_ATTRIBUTE, SYS_ATTRIBUTE_RELATION_NAME)?;
        expect_type(tuple, ANUM_SYS_ATTRIBUTE_ATTRELID, INT8_OID)?;
        expect_type(tuple, ANUM_SYS_ATTRIBUTE_ATTTYPID, INT4_OID)?;
        expect_type(tuple, ANUM_SYS_ATTRIBUTE_ATTNAME, NAME_OID)?;
        expect_type(tuple, ANUM_SYS_ATTRIBUTE_ATTNUM, INT2_OID)?;

        Ok(SysAttribute {
            attid: tuple.get_basic::<i64>(ANUM_SYS_ATTRIBUTE_ATTID as usize)?,
            attrelid: tuple.get_basic::<i64>(ANUM_SYS_ATTRIBUTE_ATTRELID as usize)?,
            atttypid: tuple.get_basic::<i32>(ANUM_SYS_ATTRIBUTE_ATTTYPID as usize)?,
            attname: name_column(tuple, ANUM_SYS_ATTRIBUTE_ATTNAME)?,
            attnum: tuple.get_basic::<i16>(ANUM_SYS_ATTRIBUTE_ATTNUM as usize)?,
        })
    }

    pub fn to_tuple(&self) -> Result<Tuple<'static>, MiniError> {
        let attrelid = self.attrelid.to_le_bytes();
        let atttypid = self.atttypid.to_le_bytes();
        let attnum = self.attnum.to_le_bytes();
        Tuple::construct(self.attid, &[
            TupleMeta::new(INT8_OID, &attrelid),
            TupleMeta::new(INT4_OID, &atttypid),
            TupleMeta::new(NAME_OID, self.attname.as_bytes()),
            TupleMeta::new(INT2_OID, &attnum),
        ])
    }

    /// Appends an attribute row; the assigned attid is the returned rowid.
    pub fn create_entry(
        txn: &Txn,
        attrelid: i64,
        atttypid: i32,
        attname: &str,
        attnum: i16,
    ) -> Result<i64, MiniError> {
        let row = SysAttribute {
            attid: 0,
            attrelid,
            atttypid,
            attname: NameData::from_str(attname),
            attnum,
        };
        let rel = Relation::create(txn, SYS_ATTRIBUTE_RELATION_ID)?;
        rel.table_append(&row.to_tuple()?)
    }

    /// All attributes of a relation, in attnum order, via the
    /// `(attrelid, attnum)` index: `attrelid = ? AND attnum < relnatts + 1`.
    pub fn get_attribute_list(
        txn: &Txn,
        attrelid: i64,
        relnatts: i16,
    ) -> Result<Vec<SysAttribute>, MiniError> {
        let rel = Relation::open_table(txn, SYS_ATTRIBUTE_RELATION_ID)?;
        let limit = relnatts + 1;
        let keys = [
            ScanKey::new(
                ANUM_SYS_ATTRIBUTE_ATTRELID,
                Strategy::Equal,
                INT8_OID,
                attrelid.to_le_bytes().to_vec(),
            ),
            ScanKey::new(
                ANUM_SYS_ATTRIBUTE_ATTNUM,
                Strategy::Less,
                INT2_OID,
                limit.to_le_bytes().to_vec(),
            ),
        ];

        let mut scan = SysScan::begin(txn, &rel, SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID, &keys)?;
        let mut attrs = Vec::new();
        while let Some(tuple) = scan.next_tuple()? {
            attrs.push(SysAttribute::from_tuple(&tuple)?);
        }
        scan.end();
        Ok(attrs)
    }
}

/// One `sys_index` row: an index and the table columns it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysIndex {
    pub indexrelid: i64,
    pub indrelid: i64,
    pub indnatts: i16,
    pub indisunique: bool,
    pub indisprimary: bool,
    /// Source-table attnos of the key columns; slots past indnatts are 0.
    pub indkey: [i16; INDEX_MAX_KEYS],
}

impl SysIndex {
    pub fn from_tuple(tuple: &Tuple) -> Result<SysIndex, MiniError> {
        expect_columns(tuple, NATTS_SYS_INDEX, SYS_INDEX_RELATION_NAME)?;
        expect_type(tuple, ANUM_SYS_INDEX_INDRELID, INT8_OID)?;
        expect_type(tuple, ANUM_SYS_INDEX_INDNATTS, INT2_OID)?;
        expect_type(tuple, ANUM_SYS_INDEX_INDISUNIQUE, BOOL_OID)?;
        expect_type(tuple, ANUM_SYS_INDEX_INDISPRIMARY, BOOL_OID)?;
        expect_type(tuple, ANUM_SYS_INDEX_INDKEY, INT2_VECTOR_OID)?;

        let raw = tuple.get_slice(ANUM_SYS_INDEX_INDKEY as usize)?;
        if raw.len() != 2 * INDEX_MAX_KEYS {
            return Err(MiniError::Corrupt(format!(
                "indkey column has {} bytes, expected {}",
                raw.len(),
                2 * INDEX_MAX_KEYS
            )));
        }
        let mut indkey = [0i16; INDEX_MAX_KEYS];
        for (i, chunk) in raw.chunks_exact(2).enumerate() {
            indkey[i] = i16::from_le_bytes([chunk[0], chunk[1]]);
        }

        Ok(SysIndex {
            indexrelid: tuple.get_basic::<i64>(ANUM_SYS_INDEX_INDEXRELID as usize)?,
            indrelid: tuple.get_basic::<i64>(ANUM_SYS_INDEX_INDRELID as usize)?,
            indnatts: tuple.get_basic::<i16>(ANUM_SYS_INDEX_INDNATTS as usize)?,
            indisunique: tuple.get_basic::<u8>(ANUM_SYS_INDEX_INDISUNIQUE as usize)? != 0,
            indisprimary: tuple.get_basic::<u8>(ANUM_SYS_INDEX_INDISPRIMARY as usize)? != 0,
            indkey,
        })
    }

    pub fn to_tuple(&self) -> Result<Tuple<'static>, MiniError> {
        let indrelid = self.indrelid.to_le_bytes();
        let indnatts = self.indnatts.to_le_bytes();
        let indisunique = [self.indisunique as u8];
        let indisprimary = [self.indisprimary as u8];
        let mut indkey = [0u8; 2 * INDEX_MAX_KEYS];
        for (i, attno) in self.indkey.iter().enumerate() {
            indkey[2 * i..2 * i + 2].copy_from_slice(&attno.to_le_bytes());
        }
        Tuple::construct(self.indexrelid, &[
            TupleMeta::new(INT8_OID, &indrelid),
            TupleMeta::new(INT2_OID, &indnatts),
            TupleMeta::new(BOOL_OID, &indisunique),
            TupleMeta::new(BOOL_OID, &indisprimary),
            TupleMeta::new(INT2_VECTOR_OID, &indkey),
        ])
    }

    pub fn create_entry(txn: &Txn, row: &SysIndex) -> Result<(), MiniError> {
        let rel = Relation::create(txn, SYS_INDEX_RELATION_ID)?;
        rel.table_insert(row.indexrelid, &row.to_tuple()?)
    }

    /// Every index declared on `indrelid`, by sequential scan.
    pub fn get_index_list(txn: &Txn, indrelid: i64) -> Result<Vec<SysIndex>, MiniError> {
        let rel = Relation::create(txn, SYS_INDEX_RELATION_ID)?;
        let key = ScanKey::new(
            ANUM_SYS_INDEX_INDRELID,
            Strategy::Equal,
            INT8_OID,
            indrelid.to_le_bytes().to_vec(),
        );
        let mut scan = TableScan::begin(&rel, &[key])?;
        let mut indexes = Vec::new();
        while let Some(tuple) = scan.next_tuple()? {
            indexes.push(SysIndex::from_tuple(&tuple)?);
        }
        scan.end();
        Ok(indexes)
    }

    /// Direct lookup by index relation id.
    pub fn get_by_indexrelid(txn: &Txn, indexrelid: i64) -> Result<Option<SysIndex>, MiniError> {
        let rel = Relation::create(txn, SYS_INDEX_RELATION_ID)?;
        let value = match rel.kvstore.get(&indexrelid.to_le_bytes())? {
            Some(value) => value,
            None => return Ok(None),
        };
        let mut tuple = Tuple::parse_owned(value)?;
        tuple.set_rowid(indexrelid);
        Ok(Some(SysIndex::from_tuple(&tuple)?))
    }
}

fn expect_columns(tuple: &Tuple, natts: i16, relname: &str) -> Result<(), MiniError> {
    if tuple.columns() != natts as usize {
        return Err(MiniError::Corrupt(format!(
            "{relname} tuple has {} columns, expected {natts}",
            tuple.columns()
        )));
    }
    Ok(())
}

fn expect_type(tuple: &Tuple, attno: i16, type_oid: u32) -> Result<(), MiniError> {
    let actual = tuple.get_type(attno as usize)?;
    if actual != type_oid {
        return Err(MiniError::Corrupt(format!(
            "column {attno} has type {actual}, expected {type_oid}"
        )));
    }
    Ok(())
}

fn name_column(tuple: &Tuple, attno: i16) -> Result<NameData, MiniError> {
    let raw = tuple.get_slice(attno as usize)?;
    NameData::from_slice(raw).ok_or_else(|| {
        MiniError::Corrupt(format!(
            "name column {attno} has {} bytes, expected {NAMEDATALEN}",
            raw.len()
        ))
    })
}
