//! Storage and catalog core of a minimal single-node SQL database: tables
//! and indexes over an embedded ordered key-value store, a self-describing
//! system catalog, and the scan drivers an executor plugs into.

pub mod bitmapset;
pub mod bootstrap;
pub mod catalog;
pub mod compare;
pub mod error;
pub mod index;
pub mod indexcmd;
mod keycode;
pub mod kv;
pub mod relation;
pub mod scan_key;
pub mod tuple;
pub mod types;
