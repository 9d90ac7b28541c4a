mod common;

use rusty_mini_pg::catalog::*;
use rusty_mini_pg::error::MiniError;
use rusty_mini_pg::relation::{Relation, SysScan};
use rusty_mini_pg::scan_key::ScanKey;
use rusty_mini_pg::types::{NameData, RelKind, Strategy, INT8_OID, NAME_OID};

#[test]
fn verify_bootstrap_classes() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    let mut scan = SysScan::begin(&txn, &rel, 0, &[])?;
    let mut rows = Vec::new();
    while let Some(tuple) = scan.next_tuple()? {
        rows.push(SysClass::from_tuple(&tuple)?);
    }
    scan.end();

    assert_eq!(rows.len(), 3);
    let mut relids: Vec<i64> = rows.iter().map(|r| r.relid).collect();
    relids.sort();
    assert_eq!(
        relids,
        vec![
            SYS_ATTRIBUTE_RELATION_ID,
            SYS_CLASS_RELATION_ID,
            SYS_INDEX_RELATION_ID
        ]
    );
    for row in &rows {
        assert!(row.relhasindex);
        assert_eq!(row.relkind, RelKind::Relation);
        let expected_natts = match row.relid {
            SYS_CLASS_RELATION_ID => NATTS_SYS_CLASS,
            SYS_ATTRIBUTE_RELATION_ID => NATTS_SYS_ATTRIBUTE,
            SYS_INDEX_RELATION_ID => NATTS_SYS_INDEX,
            other => panic!("unexpected relid {other}"),
        };
        assert_eq!(row.relnatts, expected_natts);
    }
    Ok(())
}

#[test]
fn verify_bootstrap_attribute_count() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let rel = Relation::open_table(&txn, SYS_ATTRIBUTE_RELATION_ID)?;
    let mut scan = SysScan::begin(&txn, &rel, 0, &[])?;
    let mut count = 0;
    while let Some(tuple) = scan.next_tuple()? {
        SysAttribute::from_tuple(&tuple)?;
        count += 1;
    }
    scan.end();

    assert_eq!(
        count,
        (NATTS_SYS_CLASS + NATTS_SYS_ATTRIBUTE + NATTS_SYS_INDEX) as usize
    );
    Ok(())
}

#[test]
fn verify_bootstrap_index_rows() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let rel = Relation::open_table(&txn, SYS_INDEX_RELATION_ID)?;
    let mut scan = SysScan::begin(&txn, &rel, 0, &[])?;
    let mut rows = Vec::new();
    while let Some(tuple) = scan.next_tuple()? {
        rows.push(SysIndex::from_tuple(&tuple)?);
    }
    scan.end();

    assert_eq!(rows.len(), 7);
    let by_id = |id: i64| {
        rows.iter()
            .find(|r| r.indexrelid == id)
            .unwrap_or_else(|| panic!("index {id} missing"))
    };

    let relid_index = by_id(SYS_CLASS_RELID_INDEX_ID);
    assert_eq!(relid_index.indrelid, SYS_CLASS_RELATION_ID);
    assert!(relid_index.indisunique && relid_index.indisprimary);
    assert_eq!(relid_index.indnatts, 1);
    assert_eq!(relid_index.indkey[0], ANUM_SYS_CLASS_RELID);

    let attnum_index = by_id(SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID);
    assert_eq!(attnum_index.indrelid, SYS_ATTRIBUTE_RELATION_ID);
    assert_eq!(attnum_index.indnatts, 2);
    assert_eq!(
        &attnum_index.indkey[..2],
        &[ANUM_SYS_ATTRIBUTE_ATTRELID, ANUM_SYS_ATTRIBUTE_ATTNUM]
    );

    let indrelid_index = by_id(SYS_INDEX_INDRELID_INDEX_ID);
    assert!(!indrelid_index.indisunique && !indrelid_index.indisprimary);
    Ok(())
}

#[test]
fn verify_relname_index_scan() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    // through the typed helper
    let row = SysClass::get_by_relname(&txn, SYS_CLASS_RELATION_NAME)?.expect("sys_class row");
    assert_eq!(row.relid, SYS_CLASS_RELATION_ID);
    assert_eq!(row.relname.as_str(), SYS_CLASS_RELATION_NAME);

    // and through a raw keyed scan: exactly one match
    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    let name = NameData::from_str(SYS_CLASS_RELATION_NAME);
    let key = ScanKey::new(
        ANUM_SYS_CLASS_RELNAME,
        Strategy::Equal,
        NAME_OID,
        name.as_bytes().to_vec(),
    );
    let mut scan = SysScan::begin(&txn, &rel, SYS_CLASS_RELNAME_INDEX_ID, &[key])?;
    let mut matched = 0;
    while let Some(tuple) = scan.next_tuple()? {
        assert_eq!(SysClass::from_tuple(&tuple)?.relid, SYS_CLASS_RELATION_ID);
        matched += 1;
    }
    scan.end();
    assert_eq!(matched, 1);

    assert!(SysClass::get_by_relname(&txn, "no_such_table")?.is_none());
    Ok(())
}

#[test]
fn verify_attribute_list_order() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    // user-space scan keys on (attrelid, attnum) come back in attnum order
    // and only for the requested attrelid
    let attrs = SysAttribute::get_attribute_list(&txn, SYS_CLASS_RELATION_ID, NATTS_SYS_CLASS)?;
    assert_eq!(attrs.len(), NATTS_SYS_CLASS as usize);
    for (i, attr) in attrs.iter().enumerate() {
        assert_eq!(attr.attrelid, SYS_CLASS_RELATION_ID);
        assert_eq!(attr.attnum, i as i16);
    }
    let names: Vec<&str> = attrs.iter().map(|a| a.attname.as_str()).collect();
    assert_eq!(
        names,
        vec!["relid", "relname", "relhasindex", "relkind", "relnatts"]
    );

    let attrs =
        SysAttribute::get_attribute_list(&txn, SYS_ATTRIBUTE_RELATION_ID, NATTS_SYS_ATTRIBUTE)?;
    assert_eq!(attrs.len(), NATTS_SYS_ATTRIBUTE as usize);
    let attrs = SysAttribute::get_attribute_list(&txn, SYS_INDEX_RELATION_ID, NATTS_SYS_INDEX)?;
    assert_eq!(attrs.len(), NATTS_SYS_INDEX as usize);
    Ok(())
}

#[test]
fn verify_sys_scan_with_rowid_key() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    let key = ScanKey::new(
        0,
        Strategy::Equal,
        INT8_OID,
        SYS_CLASS_RELATION_ID.to_le_bytes().to_vec(),
    );
    let mut scan = SysScan::begin(&txn, &rel, 0, &[key])?;
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
fn verify_open_table_hydrates_descriptor() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    {
        let class_row = rel.rd_rel.borrow();
        assert_eq!(class_row.relname.as_str(), SYS_CLASS_RELATION_NAME);
        assert!(class_row.relhasindex);
        assert_eq!(class_row.relnatts, NATTS_SYS_CLASS);
    }
    assert_eq!(rel.rd_index.borrow().len(), 2); // relid + relname indexes
    assert_eq!(rel.rd_attr.borrow().len(), NATTS_SYS_CLASS as usize);
    Ok(())
}

#[test]
fn verify_get_by_relid() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let row = SysClass::get_by_relid(&txn, SYS_INDEX_RELATION_ID)?.expect("sys_index row");
    assert_eq!(row.relname.as_str(), SYS_INDEX_RELATION_NAME);
    assert!(SysClass::get_by_relid(&txn, 999_999)?.is_none());
    Ok(())
}

#[test]
fn verify_keyed_scan_requires_index() -> Result<(), MiniError> {
    let catalog = common::init_catalog()?;
    let env = common::open_env(&catalog.catalog_path)?;
    let txn = env.begin();

    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    let key = ScanKey::new(
        ANUM_SYS_CLASS_RELNAME,
        Strategy::Equal,
        NAME_OID,
        NameData::from_str("sys_class").as_bytes().to_vec(),
    );

    // no index supplied
    assert!(matches!(
        SysScan::begin(&txn, &rel, 0, std::slice::from_ref(&key)),
        Err(MiniError::Invalid(_))
    ));

    // an index that does not cover the scanned column
    assert!(matches!(
        SysScan::begin(&txn, &rel, SYS_CLASS_RELID_INDEX_ID, &[ScanKey::new(
            ANUM_SYS_CLASS_RELNATTS,
            Strategy::Equal,
            rusty_mini_pg::types::INT2_OID,
            5i16.to_le_bytes().to_vec(),
        )]),
        Err(MiniError::Invalid(_))
    ));

    // an index id that does not exist
    assert!(matches!(
        SysScan::begin(&txn, &rel, 4242, std::slice::from_ref(&key)),
        Err(MiniError::NotFound(_))
    ));
    Ok(())
}
