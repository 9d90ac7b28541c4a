mod common;

use rusty_mini_pg::catalog::*;
use rusty_mini_pg::error::MiniError;
use rusty_mini_pg::index::{index_build, index_insert, IndexInfo, IndexScan};
use rusty_mini_pg::relation::Relation;
use rusty_mini_pg::scan_key::ScanKey;
use rusty_mini_pg::tuple::Tuple;
use rusty_mini_pg::types::{NameData, Strategy, NAME_OID};

#[test]
fn verify_index_scan_on_relname() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;

    // build a scratch index over sys_class.relname in one transaction
    {
        let txn = env.begin();
        let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
        let index = Relation::open_index(&txn, 1227)?;
        let info = IndexInfo::new(vec![ANUM_SYS_CLASS_RELNAME], true);
        index_build(&rel, &index, &info)?;
        txn.commit()?;
    }

    // scan it in a fresh transaction
    let txn = env.begin();
    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    let index = Relation::open_index(&txn, 1227)?;
    let name = NameData::from_str(SYS_CLASS_RELATION_NAME);
    let key = ScanKey::new(
        ANUM_SYS_CLASS_RELNAME,
        Strategy::Equal,
        NAME_OID,
        name.as_bytes().to_vec(),
    );

    let mut scan = IndexScan::begin(&rel, &index, &[key])?;
    let mut matched = 0;
    while let Some(tuple) = scan.next_tuple()? {
        let row = SysClass::from_tuple(&tuple)?;
        assert_eq!(row.relid, SYS_CLASS_RELATION_ID);
        assert_eq!(row.relname.as_str(), SYS_CLASS_RELATION_NAME);
        matched += 1;
    }
    scan.end();
    assert_eq!(matched, 1);
    Ok(())
}

#[test]
fn verify_index_and_table_agree() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    // the (attrelid, attnum) index must hold exactly one entry per
    // sys_attribute row, keyed by that row's own columns
    let table = Relation::open_table(&txn, SYS_ATTRIBUTE_RELATION_ID)?;
    let index = Relation::open_index(&txn, SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID)?;

    let mut entries = 0;
    let mut cursor = index.kvstore.cursor();
    while let Some((key_bytes, value)) = cursor.next()? {
        let mut rowid_buf = [0u8; 8];
        rowid_buf.copy_from_slice(&value);
        let rowid = i64::from_le_bytes(rowid_buf);

        let base = table
            .kvstore
            .get(&rowid.to_le_bytes())?
            .expect("index entry points at a live row");
        let mut base_tuple = Tuple::parse_owned(base)?;
        base_tuple.set_rowid(rowid);
        let row = SysAttribute::from_tuple(&base_tuple)?;

        let key_tuple = Tuple::parse(&key_bytes)?;
        assert_eq!(key_tuple.columns(), 3);
        assert_eq!(key_tuple.get_basic::<i64>(1)?, row.attrelid);
        assert_eq!(key_tuple.get_basic::<i16>(2)?, row.attnum);
        entries += 1;
    }

    let expected = (NATTS_SYS_CLASS + NATTS_SYS_ATTRIBUTE + NATTS_SYS_INDEX) as usize;
    assert_eq!(entries, expected);
    Ok(())
}

#[test]
fn verify_unique_violation_on_incremental_insert() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let index = Relation::open_index(&txn, SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID)?;
    let info = IndexInfo::new(
        vec![ANUM_SYS_ATTRIBUTE_ATTRELID, ANUM_SYS_ATTRIBUTE_ATTNUM],
        true,
    );

    // a second attribute row with the same (attrelid, attnum) as an existing
    // one violates the unique index
    let duplicate = SysAttribute {
        attid: 999,
        attrelid: SYS_CLASS_RELATION_ID,
        atttypid: NAME_OID as i32,
        attname: NameData::from_str("duplicate"),
        attnum: ANUM_SYS_CLASS_RELID,
    };
    let mut tuple = duplicate.to_tuple()?;
    tuple.set_rowid(999);
    assert!(matches!(
        index_insert(&index, &tuple, &info),
        Err(MiniError::Constraint(_))
    ));

    // a fresh (attrelid, attnum) pair goes in fine
    let fresh = SysAttribute {
        attnum: 77,
        ..duplicate
    };
    let mut tuple = fresh.to_tuple()?;
    tuple.set_rowid(999);
    index_insert(&index, &tuple, &info)?;
    Ok(())
}

#[test]
fn verify_duplicate_entries_share_prefix_key() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    // the non-unique indrelid index holds one entry per sys_index row;
    // sys_class and sys_attribute contribute two and three entries under
    // their respective indrelid keys
    let table = Relation::open_table(&txn, SYS_INDEX_RELATION_ID)?;
    let index = Relation::open_index(&txn, SYS_INDEX_INDRELID_INDEX_ID)?;

    let key = ScanKey::new(
        ANUM_SYS_INDEX_INDRELID,
        Strategy::Equal,
        rusty_mini_pg::types::INT8_OID,
        SYS_ATTRIBUTE_RELATION_ID.to_le_bytes().to_vec(),
    );
    let mut scan = IndexScan::begin(&table, &index, std::slice::from_ref(&key))?;
    let mut index_ids = Vec::new();
    while let Some(tuple) = scan.next_tuple()? {
        index_ids.push(SysIndex::from_tuple(&tuple)?.indexrelid);
    }
    scan.end();

    index_ids.sort();
    assert_eq!(
        index_ids,
        vec![
            SYS_ATTRIBUTE_ATTID_INDEX_ID,
            SYS_ATTRIBUTE_ATTRELID_ATTNAME_INDEX_ID,
            SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID
        ]
    );
    Ok(())
}
