//! Database initialization: on-disk layout plus the catalog bootstrap that
//! makes the system self-describing.

use crate::catalog::*;
use crate::error::MiniError;
use crate::index::IndexInfo;
use crate::indexcmd::IndexRegistry;
use crate::kv::{Env, Txn, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES};
use crate::relation::Relation;
use crate::types::{RelKind, BOOL_OID, CHAR_OID, INT2_OID, INT2_VECTOR_OID, INT4_OID, INT8_OID, NAME_OID};
use std::fs;
use std::path::Path;
use tracing::info;

/// Name of the directory holding the shared catalog environment.
pub const CATALOG_DATABASE: &str = "catalog";

/// Creates a fresh workspace: the root directory, the catalog environment
/// (bootstrapped), and one environment for the named user database.
pub fn init_workspace(workspace: &Path, database: &str) -> Result<(), MiniError> {
    info!(workspace = %workspace.display(), database, "creating database workspace");
    fs::create_dir(workspace)?;

    init_catalog(&workspace.join(CATALOG_DATABASE))?;

    let user_dir = workspace.join(database);
    fs::create_dir(&user_dir)?;
    // opening once creates the store files
    Env::open(&user_dir, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
    Ok(())
}

/// Bootstraps a fresh catalog directory: the three system relations, their
/// own catalog rows, and the seven catalog indexes.
pub fn init_catalog(catalog_dir: &Path) -> Result<(), MiniError> {
    fs::create_dir(catalog_dir)?;
    let env = Env::open(catalog_dir, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)?;
    let txn = env.begin();

    Relation::create(&txn, SYS_CLASS_RELATION_ID)?;
    Relation::create(&txn, SYS_ATTRIBUTE_RELATION_ID)?;
    Relation::create(&txn, SYS_INDEX_RELATION_ID)?;

    init_sys_class(&txn)?;
    init_sys_attribute(&txn)?;
    init_sys_index(&txn)?;

    info!("building catalog indexes");
    build_catalog_indexes(&txn)?;

    txn.commit()?;
    info!(path = %catalog_dir.display(), "catalog initialized");
    Ok(())
}

fn init_sys_class(txn: &Txn) -> Result<(), MiniError> {
    SysClass::create_entry(
        txn,
        SYS_CLASS_RELATION_ID,
        SYS_CLASS_RELATION_NAME,
        true,
        RelKind::Relation,
        NATTS_SYS_CLASS,
    )?;

    let relid = SYS_CLASS_RELATION_ID;
    SysAttribute::create_entry(txn, relid, INT8_OID as i32, "relid", ANUM_SYS_CLASS_RELID)?;
    SysAttribute::create_entry(txn, relid, NAME_OID as i32, "relname", ANUM_SYS_CLASS_RELNAME)?;
    SysAttribute::create_entry(txn, relid, BOOL_OID as i32, "relhasindex", ANUM_SYS_CLASS_RELHASINDEX)?;
    SysAttribute::create_entry(txn, relid, CHAR_OID as i32, "relkind", ANUM_SYS_CLASS_RELKIND)?;
    SysAttribute::create_entry(txn, relid, INT2_OID as i32, "relnatts", ANUM_SYS_CLASS_RELNATTS)?;
    Ok(())
}

fn init_sys_attribute(txn: &Txn) -> Result<(), MiniError> {
    SysClass::create_entry(
        txn,
        SYS_ATTRIBUTE_RELATION_ID,
        SYS_ATTRIBUTE_RELATION_NAME,
        true,
        RelKind::Relation,
        NATTS_SYS_ATTRIBUTE,
    )?;

    let relid = SYS_ATTRIBUTE_RELATION_ID;
    SysAttribute::create_entry(txn, relid, INT8_OID as i32, "attid", ANUM_SYS_ATTRIBUTE_ATTID)?;
    SysAttribute::create_entry(txn, relid, INT8_OID as i32, "attrelid", ANUM_SYS_ATTRIBUTE_ATTRELID)?;
    SysAttribute::create_entry(txn, relid, INT4_OID as i32, "atttypid", ANUM_SYS_ATTRIBUTE_ATTTYPID)?;
    SysAttribute::create_entry(txn, relid, NAME_OID as i32, "attname", ANUM_SYS_ATTRIBUTE_ATTNAME)?;
    SysAttribute::create_entry(txn, relid, INT2_OID as i32, "attnum", ANUM_SYS_ATTRIBUTE_ATTNUM)?;
    Ok(())
}

fn init_sys_index(txn: &Txn) -> Result<(), MiniError> {
    SysClass::create_entry(
        txn,
        SYS_INDEX_RELATION_ID,
        SYS_INDEX_RELATION_NAME,
        true,
        RelKind::Relation,
        NATTS_SYS_INDEX,
    )?;

    let relid = SYS_INDEX_RELATION_ID;
    SysAttribute::create_entry(txn, relid, INT8_OID as i32, "indexrelid", ANUM_SYS_INDEX_INDEXRELID)?;
    SysAttribute::create_entry(txn, relid, INT8_OID as i32, "indrelid", ANUM_SYS_INDEX_INDRELID)?;
    SysAttribute::create_entry(txn, relid, INT2_OID as i32, "indnatts", ANUM_SYS_INDEX_INDNATTS)?;
    SysAttribute::create_entry(txn, relid, BOOL_OID as i32, "indisunique", ANUM_SYS_INDEX_INDISUNIQUE)?;
    SysAttribute::create_entry(txn, relid, BOOL_OID as i32, "indisprimary", ANUM_SYS_INDEX_INDISPRIMARY)?;
    SysAttribute::create_entry(txn, relid, INT2_VECTOR_OID as i32, "indkey", ANUM_SYS_INDEX_INDKEY)?;
    Ok(())
}

fn build_catalog_indexes(txn: &Txn) -> Result<(), MiniError> {
    let mut registry = IndexRegistry::new();

    registry.register(
        SYS_CLASS_RELATION_ID,
        SYS_CLASS_RELID_INDEX_ID,
        true,
        IndexInfo::new(vec![ANUM_SYS_CLASS_RELID], true),
    );
    registry.register(
        SYS_CLASS_RELATION_ID,
        SYS_CLASS_RELNAME_INDEX_ID,
        false,
        IndexInfo::new(vec![ANUM_SYS_CLASS_RELNAME], true),
    );

    registry.register(
        SYS_ATTRIBUTE_RELATION_ID,
        SYS_ATTRIBUTE_ATTID_INDEX_ID,
        true,
        IndexInfo::new(vec![ANUM_SYS_ATTRIBUTE_ATTID], true),
    );
    registry.register(
        SYS_ATTRIBUTE_RELATION_ID,
        SYS_ATTRIBUTE_ATTRELID_ATTNAME_INDEX_ID,
        false,
        IndexInfo::new(
            vec![ANUM_SYS_ATTRIBUTE_ATTRELID, ANUM_SYS_ATTRIBUTE_ATTNAME],
            true,
        ),
    );
    registry.register(
        SYS_ATTRIBUTE_RELATION_ID,
        SYS_ATTRIBUTE_ATTRELID_ATTNUM_INDEX_ID,
        false,
        IndexInfo::new(
            vec![ANUM_SYS_ATTRIBUTE_ATTRELID, ANUM_SYS_ATTRIBUTE_ATTNUM],
            true,
        ),
    );

    registry.register(
        SYS_INDEX_RELATION_ID,
        SYS_INDEX_INDEXRELID_INDEX_ID,
        true,
        IndexInfo::new(vec![ANUM_SYS_INDEX_INDEXRELID], true),
    );
    registry.register(
        SYS_INDEX_RELATION_ID,
        SYS_INDEX_INDRELID_INDEX_ID,
        false,
        IndexInfo::new(vec![ANUM_SYS_INDEX_INDRELID], false),
    );

    registry.build_all(txn)
}
