//! Index registration: collect the indexes a relation should carry, then
//! create their catalog rows and build them in one pass.

use crate::catalog::SysIndex;
use crate::error::MiniError;
use crate::index::{index_build, IndexInfo};
use crate::kv::Txn;
use crate::relation::Relation;
use crate::types::INDEX_MAX_KEYS;
use tracing::info;

pub struct IndexRegistration {
    pub table: i64,
    pub index: i64,
    pub primary: bool,
    pub info: IndexInfo,
}

/// Pending index registrations, built in registration order.
#[derive(Default)]
pub struct IndexRegistry {
    list: Vec<IndexRegistration>,
}

impl IndexRegistry {
    pub fn new() -> IndexRegistry {
        IndexRegistry::default()
    }

    pub fn register(&mut self, table: i64, index: i64, primary: bool, info: IndexInfo) {
        if primary {
            assert!(info.unique, "a primary-key index must be unique");
        }
        self.list.push(IndexRegistration {
            table,
            index,
            primary,
            info,
        });
    }

    /// Writes the `sys_index` row for each registration and builds the index
    /// from its base relation. The registry is drained.
    pub fn build_all(&mut self, txn: &Txn) -> Result<(), MiniError> {
        for reg in self.list.drain(..) {
            let table = Relation::create(txn, reg.table)?;
            let index = Relation::open_index(txn, reg.index)?;

            let mut row = SysIndex {
                indexrelid: reg.index,
                indrelid: reg.table,
                indnatts: reg.info.key_attrs.len() as i16,
                indisunique: reg.info.unique,
                indisprimary: reg.primary,
                indkey: [0i16; INDEX_MAX_KEYS],
            };
            for (i, &attno) in reg.info.key_attrs.iter().enumerate() {
                row.indkey[i] = attno;
            }

            SysIndex::create_entry(txn, &row)?;
            index_build(&table, &index, &reg.info)?;
            info!(table = reg.table, index = reg.index, "index built");
        }
        Ok(())
    }
}
