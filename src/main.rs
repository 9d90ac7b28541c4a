use clap::{Parser, Subcommand};
use rusty_mini_pg::bootstrap::{self, CATALOG_DATABASE};
use rusty_mini_pg::catalog::{
    SysAttribute, SysClass, SysIndex, SYS_ATTRIBUTE_RELATION_ID, SYS_CLASS_RELATION_ID,
    SYS_INDEX_RELATION_ID,
};
use rusty_mini_pg::kv::{Env, DEFAULT_MAP_SIZE, DEFAULT_MAX_SUB_STORES};
use rusty_mini_pg::relation::{Relation, SysScan};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rusty-mini-pg")]
#[command(about = "Storage and catalog core of a minimal SQL database (MVP)")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a database workspace: catalog plus one user database
    Init {
        /// Workspace directory to create
        #[arg(long, default_value = "./data")]
        data: PathBuf,

        /// Name of the user database to create alongside the catalog
        #[arg(long, default_value = "demo")]
        database: String,
    },
    /// Dump the system catalog of an existing workspace
    Catalog {
        /// Workspace directory created by `init`
        #[arg(long, default_value = "./data")]
        data: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    match args.command {
        Command::Init { data, database } => {
            bootstrap::init_workspace(&data, &database)?;
            eprintln!(
                "initialized workspace {} with database {}",
                data.display(),
                database
            );
        }
        Command::Catalog { data } => dump_catalog(&data)?,
    }
    Ok(())
}

fn dump_catalog(data: &PathBuf) -> anyhow::Result<()> {
    let env = Env::open(
        &data.join(CATALOG_DATABASE),
        DEFAULT_MAP_SIZE,
        DEFAULT_MAX_SUB_STORES,
    )?;
    let txn = env.begin();

    println!("sys_class:");
    let rel = Relation::open_table(&txn, SYS_CLASS_RELATION_ID)?;
    let mut scan = SysScan::begin(&txn, &rel, 0, &[])?;
    while let Some(tuple) = scan.next_tuple()? {
        let row = SysClass::from_tuple(&tuple)?;
        println!(
            "  (relid={}, relname={}, relhasindex={}, relkind={}, relnatts={})",
            row.relid, row.relname, row.relhasindex, row.relkind, row.relnatts
        );
    }
    scan.end();

    println!("sys_attribute:");
    let rel = Relation::open_table(&txn, SYS_ATTRIBUTE_RELATION_ID)?;
    let mut scan = SysScan::begin(&txn, &rel, 0, &[])?;
    while let Some(tuple) = scan.next_tuple()? {
        let row = SysAttribute::from_tuple(&tuple)?;
        println!(
            "  (attid={}, attrelid={}, atttypid={}, attname={}, attnum={})",
            row.attid, row.attrelid, row.atttypid, row.attname, row.attnum
        );
    }
    scan.end();

    println!("sys_index:");
    let rel = Relation::open_table(&txn, SYS_INDEX_RELATION_ID)?;
    let mut scan = SysScan::begin(&txn, &rel, 0, &[])?;
    while let Some(tuple) = scan.next_tuple()? {
        let row = SysIndex::from_tuple(&tuple)?;
        let keys: Vec<String> = row.indkey[..row.indnatts as usize]
            .iter()
            .map(|attno| attno.to_string())
            .collect();
        println!(
            "  (indexrelid={}, indrelid={}, indnatts={}, indisunique={}, indisprimary={}, indkey=[{}])",
            row.indexrelid,
            row.indrelid,
            row.indnatts,
            row.indisunique,
            row.indisprimary,
            keys.join(", ")
        );
    }
    scan.end();
    Ok(())
}
