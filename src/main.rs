//! tidedb - inspect and exercise a tidedb database file

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tidedb::access::{Column, Field, Row, Schema, TypeId};
use tidedb::catalog::CatalogError;
use tidedb::database::{Database, DatabaseConfig};

const DEMO_TABLE: &str = "kv";
const DEMO_INDEX: &str = "kv_key";

/// tidedb - a page-based storage engine with B+tree indexes
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Buffer pool size in frames
    #[arg(short, long, global = true, default_value = "64")]
    pool_size: usize,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show disk allocation, tables and index shapes
    Stat { file: PathBuf },

    /// Insert shuffled keys 0..count into the key/value table
    Load {
        file: PathBuf,

        /// Number of keys
        #[arg(short, long)]
        count: u32,

        /// Shuffle seed; random when omitted
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Print key/value rows in key order
    Scan {
        file: PathBuf,

        /// First key to print
        #[arg(short, long)]
        from: Option<i32>,

        /// Maximum number of rows
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = DatabaseConfig::default().with_buffer_pool_size(args.pool_size);
    match args.command {
        Command::Stat { file } => stat(&file, config),
        Command::Load { file, count, seed } => load(&file, config, count, seed),
        Command::Scan { file, from, limit } => scan(&file, config, from, limit),
    }
}

fn kv_schema() -> Schema {
    Schema::new(vec![
        Column::new("key", TypeId::Int, 0, false, true),
        Column::new_char("value", 32, 1, true, false),
    ])
}

fn stat(file: &Path, config: DatabaseConfig) -> Result<()> {
    let db = Database::open(file, config).context("Failed to open database")?;

    let meta = db.disk_meta();
    println!("allocated pages: {}", meta.num_allocated_pages);
    println!("extents:         {}", meta.num_extents);
    for (extent, used) in meta.extent_used_pages.iter().enumerate() {
        println!("  extent {:>4}: {} pages used", extent, used);
    }

    let catalog = db.catalog();
    for table in catalog.tables() {
        let rows = table.heap().iter().filter(|row| row.is_ok()).count();
        println!(
            "table {} (id {}): {} rows, heap from page {}",
            table.name(),
            table.table_id(),
            rows,
            table.heap().first_page_id()
        );
        for index in catalog.table_indexes(table.name())? {
            let stats = index.tree().statistics()?;
            println!(
                "  index {} (id {}, {}-byte keys): height {}, {} internal / {} leaf pages, {} entries",
                index.name(),
                index.index_id(),
                index.tree().key_capacity(),
                stats.height,
                stats.internal_pages,
                stats.leaf_pages,
                stats.entries
            );
        }
    }
    Ok(())
}

fn load(file: &Path, config: DatabaseConfig, count: u32, seed: Option<u64>) -> Result<()> {
    let mut db = Database::open_or_create(file, config).context("Failed to open database")?;
    if db.catalog().get_table(DEMO_TABLE).is_err() {
        db.create_table(DEMO_TABLE, kv_schema())?;
        db.create_index(DEMO_TABLE, DEMO_INDEX, &["key"])?;
    }

    let mut keys: Vec<i32> = (0..count as i32).collect();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    keys.shuffle(&mut rng);

    let mut inserted = 0;
    let mut skipped = 0;
    for key in keys {
        let mut row = Row::new(vec![Field::Int(key), Field::Char(format!("value-{}", key))]);
        match db.insert(DEMO_TABLE, &mut row) {
            Ok(_) => inserted += 1,
            Err(e) if matches!(e.downcast_ref::<CatalogError>(), Some(CatalogError::DuplicateKey(_))) => {
                skipped += 1
            }
            Err(e) => return Err(e),
        }
    }

    let index = db.catalog().get_index(DEMO_TABLE, DEMO_INDEX)?;
    index.tree().check().context("index check failed after load")?;
    let stats = index.tree().statistics()?;
    println!(
        "inserted {} keys ({} already present); tree height {}, {} entries",
        inserted, skipped, stats.height, stats.entries
    );
    db.flush()
}

fn scan(file: &Path, config: DatabaseConfig, from: Option<i32>, limit: usize) -> Result<()> {
    let db = Database::open(file, config).context("Failed to open database")?;
    let catalog = db.catalog();
    let index = catalog.get_index(DEMO_TABLE, DEMO_INDEX)?;
    let heap = catalog.get_table(DEMO_TABLE)?.heap();

    let from = from.map(|key| vec![Field::Int(key)]);
    for rid in index.scan_from(from.as_deref(), limit)? {
        let row = heap.get_tuple(rid)?;
        let fields: Vec<String> = row.fields.iter().map(|f| f.to_string()).collect();
        println!("{} {}", rid, fields.join(" "));
    }
    Ok(())
}
