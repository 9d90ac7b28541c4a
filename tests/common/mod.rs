#![allow(dead_code)]

use rusty_mini_pg::bootstrap::{self, CATALOG_DATABASE};
use rusty_mini_pg::error::MiniError;
use rusty_mini_pg::kv::{Env, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch workspace with a bootstrapped catalog. Dropping it removes the
/// files.
pub struct CatalogGuard {
    _dir: TempDir,
    pub catalog_path: PathBuf,
}

/// Runs initdb against a fresh temporary directory.
pub fn init_catalog() -> Result<CatalogGuard, MiniError> {
    let dir = TempDir::new()?;
    let catalog_path = dir.path().join(CATALOG_DATABASE);
    bootstrap::init_catalog(&catalog_path)?;
    Ok(CatalogGuard {
        _dir: dir,
        catalog_path,
    })
}

pub fn open_env(path: &Path) -> Result<Env, MiniError> {
    Env::open(path, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES)
}

/// A bare environment with no catalog, for raw relation tests.
pub fn scratch_env() -> Result<(TempDir, Env), MiniError> {
    let dir = TempDir::new()?;
    let env = open_env(dir.path())?;
    Ok((dir, env))
}
