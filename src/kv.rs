//! The KV façade: environment, transaction, named sub-store, cursor.
//!
//! Each relation lives in its own named sub-store (a `sled::Tree` whose name
//! is the decimal relation id). A transaction buffers every write in a
//! per-sub-store overlay ordered by stored key; reads and cursors merge the
//! overlay with the tree so a transaction always observes its own writes.
//! Commit turns each overlay into one batch per tree and flushes; abort just
//! drops the overlays. Only one write transaction runs at a time: `begin`
//! holds the environment's writer lock until the transaction ends.
//!
//! Keys are translated by the installed `KeyOrder` (see `keycode`) so that
//! the store's byte order equals the relation's comparator order. `DUP_SORT`
//! sub-stores append the 8-byte value to the stored key, which gives LMDB's
//! duplicate-sort behavior over a plain ordered map.

use crate::error::MiniError;
use crate::keycode;
use crate::relation::Relation;
use parking_lot::{Mutex, MutexGuard};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// Default memory-map size for one environment: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Default cap on the number of named sub-stores per environment.
pub const DEFAULT_MAX_SUB_STORES: usize = 128;

const SLED_DEFAULT_TREE: &[u8] = b"__sled__default";

/// Length of the value appended to stored keys in DUP_SORT sub-stores.
const DUP_VALUE_LEN: usize = 8;

bitflags::bitflags! {
    /// Sub-store open flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const CREATE = 1;
        const DUP_SORT = 2;
    }
}

bitflags::bitflags! {
    /// Put flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PutFlags: u32 {
        /// Key must sort strictly after every existing key.
        const APPEND = 1;
        /// On a duplicate key, leave the old value and report `false`.
        const NO_OVERWRITE = 2;
    }
}

/// Which comparator order a sub-store's keys follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// 8-byte unsigned rowids.
    Rowid,
    /// Composite index-key tuples.
    TupleKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

pub struct Env {
    db: sled::Db,
    path: PathBuf,
    write_lock: Mutex<()>,
    max_sub_stores: usize,
}

impl Env {
    /// Opens or creates the on-disk store rooted at an existing directory.
    pub fn open(path: &Path, map_size: usize, max_sub_stores: usize) -> Result<Env, MiniError> {
        if !path.is_dir() {
            return Err(MiniError::CantOpen(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(map_size as u64)
            .open()
            .map_err(|e| MiniError::CantOpen(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "opened environment");
        Ok(Env {
            db,
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
            max_sub_stores,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a transaction. Blocks while another write transaction is live.
    pub fn begin(&self) -> Txn<'_> {
        let guard = self.write_lock.lock();
        Txn {
            env: self,
            _write_guard: guard,
            state: Rc::new(Cell::new(TxnState::Active)),
            stores: RefCell::new(HashMap::new()),
            open_rels: RefCell::new(HashMap::new()),
        }
    }

    fn sub_store_count(&self) -> usize {
        self.db
            .tree_names()
            .iter()
            .filter(|name| name.as_ref() != SLED_DEFAULT_TREE)
            .count()
    }

    fn has_sub_store(&self, name: &str) -> bool {
        self.db
            .tree_names()
            .iter()
            .any(|n| n.as_ref() == name.as_bytes())
    }
}

pub struct Txn<'env> {
    env: &'env Env,
    _write_guard: MutexGuard<'env, ()>,
    state: Rc<Cell<TxnState>>,
    stores: RefCell<HashMap<String, Rc<SubStore>>>,
    open_rels: RefCell<HashMap<i64, Rc<Relation>>>,
}

impl<'env> Txn<'env> {
    /// Opens a named sub-store, creating it when `CREATE` is given. Opening
    /// the same name twice in one transaction returns the cached handle.
    pub fn open(&self, name: &str, flags: OpenFlags) -> Result<Rc<SubStore>, MiniError> {
        self.check_active()?;
        if let Some(store) = self.stores.borrow().get(name) {
            return Ok(store.clone());
        }

        if !self.env.has_sub_store(name) {
            if !flags.contains(OpenFlags::CREATE) {
                return Err(MiniError::NotFound(format!("no such sub-store: {name}")));
            }
            if self.env.sub_store_count() >= self.env.max_sub_stores {
                return Err(MiniError::Invalid(format!(
                    "sub-store limit ({}) reached",
                    self.env.max_sub_stores
                )));
            }
        }

        let tree = self.env.db.open_tree(name)?;
        debug!(name, ?flags, "opened sub-store");
        let store = Rc::new(SubStore {
            name: name.to_string(),
            tree,
            flags,
            txn_state: self.state.clone(),
            order: Cell::new(None),
            touched: Cell::new(false),
            overlay: RefCell::new(BTreeMap::new()),
        });
        self.stores
            .borrow_mut()
            .insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Makes every buffered write durable. The transaction is unusable
    /// afterwards, whether commit succeeded or not.
    pub fn commit(self) -> Result<(), MiniError> {
        self.check_active()?;
        for store in self.stores.borrow().values() {
            let mut overlay = store.overlay.borrow_mut();
            if overlay.is_empty() {
                continue;
            }
            let mut batch = sled::Batch::default();
            for (key, value) in overlay.iter() {
                match value {
                    Some(v) => batch.insert(key.as_slice(), v.as_slice()),
                    None => batch.remove(key.as_slice()),
                }
            }
            if let Err(e) = store.tree.apply_batch(batch) {
                self.state.set(TxnState::Aborted);
                return Err(e.into());
            }
            overlay.clear();
        }
        if let Err(e) = self.env.db.flush() {
            self.state.set(TxnState::Aborted);
            return Err(e.into());
        }
        debug!("transaction committed");
        self.state.set(TxnState::Committed);
        Ok(())
    }

    /// Abandons every buffered write.
    pub fn abort(self) {
        for store in self.stores.borrow().values() {
            store.overlay.borrow_mut().clear();
        }
        self.state.set(TxnState::Aborted);
    }

    pub fn state(&self) -> TxnState {
        self.state.get()
    }

    fn check_active(&self) -> Result<(), MiniError> {
        if self.state.get() != TxnState::Active {
            return Err(MiniError::Invalid("transaction is closed".into()));
        }
        Ok(())
    }

    /// The per-transaction relation descriptor cache.
    pub(crate) fn get_open_relation(&self, relid: i64) -> Option<Rc<Relation>> {
        self.open_rels.borrow().get(&relid).cloned()
    }

    pub(crate) fn insert_open_relation(&self, relid: i64, rel: Rc<Relation>) {
        self.open_rels.borrow_mut().insert(relid, rel);
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if self.state.get() == TxnState::Active {
            self.state.set(TxnState::Aborted);
        }
    }
}

pub struct SubStore {
    name: String,
    tree: sled::Tree,
    flags: OpenFlags,
    txn_state: Rc<Cell<TxnState>>,
    order: Cell<Option<KeyOrder>>,
    touched: Cell<bool>,
    /// Uncommitted writes, keyed by stored bytes. None is a tombstone.
    overlay: RefCell<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl SubStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dup_sort(&self) -> bool {
        self.flags.contains(OpenFlags::DUP_SORT)
    }

    /// Installs the key order for this sub-store. Must happen before any I/O
    /// on the handle; calls after the first are no-ops.
    pub fn set_key_order(&self, order: KeyOrder) {
        if self.order.get().is_some() {
            return;
        }
        debug_assert!(
            !self.touched.get(),
            "key order must be installed before any I/O on sub-store {}",
            self.name
        );
        self.order.set(Some(order));
    }

    pub fn key_order(&self) -> Option<KeyOrder> {
        self.order.get()
    }

    pub fn put(&self, key: &[u8], value: &[u8], flags: PutFlags) -> Result<bool, MiniError> {
        self.begin_io()?;
        let mut stored = self.to_stored(key)?;
        if self.is_dup_sort() {
            if value.len() != DUP_VALUE_LEN {
                return Err(MiniError::Invalid(format!(
                    "dup-sort sub-store {} requires {DUP_VALUE_LEN}-byte values",
                    self.name
                )));
            }
            stored.extend_from_slice(value);
        }

        if flags.contains(PutFlags::APPEND) {
            if let Some((last, _)) = self.stored_seek_last()? {
                if stored <= last {
                    return Err(MiniError::Invalid(format!(
                        "append key out of order in sub-store {}",
                        self.name
                    )));
                }
            }
        }

        if (flags.contains(PutFlags::NO_OVERWRITE) || self.is_dup_sort())
            && self.stored_get(&stored)?.is_some()
        {
            return Ok(false);
        }

        self.overlay
            .borrow_mut()
            .insert(stored, Some(value.to_vec()));
        Ok(true)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, MiniError> {
        self.begin_io()?;
        let stored = self.to_stored(key)?;
        if self.is_dup_sort() {
            // First duplicate for the key, if any.
            match self.stored_seek_ge(&stored)? {
                Some((found, value)) if found.starts_with(&stored) => Ok(Some(value)),
                _ => Ok(None),
            }
        } else {
            self.stored_get(&stored)
        }
    }

    /// Deletes a key; on a DUP_SORT sub-store this removes every duplicate.
    pub fn del(&self, key: &[u8]) -> Result<bool, MiniError> {
        self.begin_io()?;
        let stored = self.to_stored(key)?;
        if self.is_dup_sort() {
            let mut doomed = Vec::new();
            let mut from = stored.clone();
            while let Some((found, _)) = self.stored_seek_ge(&from)? {
                if !found.starts_with(&stored) {
                    break;
                }
                from = stored_successor(&found);
                doomed.push(found);
            }
            let deleted = !doomed.is_empty();
            let mut overlay = self.overlay.borrow_mut();
            for key in doomed {
                overlay.insert(key, None);
            }
            Ok(deleted)
        } else {
            let existed = self.stored_get(&stored)?.is_some();
            if existed {
                self.overlay.borrow_mut().insert(stored, None);
            }
            Ok(existed)
        }
    }

    /// Opens a cursor over this sub-store.
    pub fn cursor(self: &Rc<Self>) -> Cursor {
        Cursor {
            store: self.clone(),
            pos: None,
        }
    }

    fn begin_io(&self) -> Result<(), MiniError> {
        if self.txn_state.get() != TxnState::Active {
            return Err(MiniError::Invalid(format!(
                "sub-store {} used outside its transaction",
                self.name
            )));
        }
        self.touched.set(true);
        Ok(())
    }

    fn to_stored(&self, key: &[u8]) -> Result<Vec<u8>, MiniError> {
        match self.order.get() {
            None => Ok(key.to_vec()),
            Some(KeyOrder::Rowid) => keycode::rowid_to_stored(key),
            Some(KeyOrder::TupleKey) => keycode::tuple_key_to_stored(key),
        }
    }

    fn from_stored(&self, stored: &[u8]) -> Result<Vec<u8>, MiniError> {
        let key_part = if self.is_dup_sort() {
            if stored.len() < DUP_VALUE_LEN {
                return Err(MiniError::Corrupt(format!(
                    "stored dup-sort key too short in sub-store {}",
                    self.name
                )));
            }
            &stored[..stored.len() - DUP_VALUE_LEN]
        } else {
            stored
        };
        match self.order.get() {
            None => Ok(key_part.to_vec()),
            Some(KeyOrder::Rowid) => keycode::rowid_from_stored(key_part),
            Some(KeyOrder::TupleKey) => keycode::tuple_key_from_stored(key_part),
        }
    }

    fn stored_get(&self, stored: &[u8]) -> Result<Option<Vec<u8>>, MiniError> {
        if let Some(entry) = self.overlay.borrow().get(stored) {
            return Ok(entry.clone());
        }
        Ok(self.tree.get(stored)?.map(|v| v.to_vec()))
    }

    /// Smallest live entry with stored key >= `from`, merging overlay + tree.
    fn stored_seek_ge(&self, from: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, MiniError> {
        let mut cur = from.to_vec();
        loop {
            let ov_next = self
                .overlay
                .borrow()
                .range(cur.clone()..)
                .next()
                .map(|(k, v)| (k.clone(), v.clone()));
            let tree_next = match self.tree.range(cur.as_slice()..).next() {
                Some(item) => {
                    let (k, v) = item?;
                    Some((k.to_vec(), v.to_vec()))
                }
                None => None,
            };

            match (ov_next, tree_next) {
                (None, None) => return Ok(None),
                (None, Some(entry)) => return Ok(Some(entry)),
                (Some((ok, ov)), None) => match ov {
                    Some(v) => return Ok(Some((ok, v))),
                    None => cur = stored_successor(&ok),
                },
                (Some((ok, ov)), Some((tk, tv))) => {
                    if ok <= tk {
                        match ov {
                            Some(v) => return Ok(Some((ok, v))),
                            // Tombstone hides any tree entry at the same key.
                            None => cur = stored_successor(&ok),
                        }
                    } else {
                        return Ok(Some((tk, tv)));
                    }
                }
            }
        }
    }

    /// Largest live entry, merging overlay + tree.
    fn stored_seek_last(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, MiniError> {
        let mut bound: Option<Vec<u8>> = None; // exclusive upper bound
        loop {
            let ov_prev = {
                let overlay = self.overlay.borrow();
                match &bound {
                    None => overlay.iter().next_back(),
                    Some(b) => overlay.range(..b.clone()).next_back(),
                }
                .map(|(k, v)| (k.clone(), v.clone()))
            };
            let tree_prev = {
                let item = match &bound {
                    None => self.tree.iter().next_back(),
                    Some(b) => self.tree.range(..b.as_slice()).next_back(),
                };
                match item {
                    Some(entry) => {
                        let (k, v) = entry?;
                        Some((k.to_vec(), v.to_vec()))
                    }
                    None => None,
                }
            };

            match (ov_prev, tree_prev) {
                (None, None) => return Ok(None),
                (None, Some(entry)) => return Ok(Some(entry)),
                (Some((ok, ov)), None) => match ov {
                    Some(v) => return Ok(Some((ok, v))),
                    None => bound = Some(ok),
                },
                (Some((ok, ov)), Some((tk, tv))) => {
                    if ok >= tk {
                        match ov {
                            Some(v) => return Ok(Some((ok, v))),
                            None => bound = Some(ok),
                        }
                    } else {
                        return Ok(Some((tk, tv)));
                    }
                }
            }
        }
    }
}

/// Smallest stored key strictly greater than `key` in byte order.
fn stored_successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}

/// A forward cursor. Positions are sticky: `next` continues from the last
/// returned entry, `seek` repositions at the smallest key >= the probe.
pub struct Cursor {
    store: Rc<SubStore>,
    pos: Option<Vec<u8>>,
}

impl Cursor {
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, MiniError> {
        self.store.begin_io()?;
        let from = match &self.pos {
            None => Vec::new(),
            Some(pos) => stored_successor(pos),
        };
        match self.store.stored_seek_ge(&from)? {
            Some((stored, value)) => self.emit(stored, value),
            None => Ok(None),
        }
    }

    pub fn last(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, MiniError> {
        self.store.begin_io()?;
        match self.store.stored_seek_last()? {
            Some((stored, value)) => self.emit(stored, value),
            None => Ok(None),
        }
    }

    /// SET_RANGE: position at the smallest entry whose key is >= `key` in the
    /// installed order. On a DUP_SORT sub-store the probe may be a key-column
    /// prefix.
    pub fn seek(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, MiniError> {
        self.store.begin_io()?;
        let stored = self.store.to_stored(key)?;
        match self.store.stored_seek_ge(&stored)? {
            Some((found, value)) => self.emit(found, value),
            None => Ok(None),
        }
    }

    fn emit(
        &mut self,
        stored: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, MiniError> {
        let logical = self.store.from_stored(&stored)?;
        self.pos = Some(stored);
        Ok(Some((logical, value)))
    }
}
