//! Driftsync CLI
//!
//! Command-line tools for driftsync.
//!
//! # Commands
//!
//! - `demo` - Sync two seeded in-memory databases over an in-process pipe

use clap::{Parser, Subcommand};
use driftsync_adapter::MemoryDatabase;
use driftsync_codec::PackedValue;
use driftsync_engine::pipe::pipe;
use driftsync_engine::{sync_from, sync_to, DestOptions};
use driftsync_schema::{Column, ColumnType, Table};
use tracing_subscriber::EnvFilter;

/// Driftsync command-line database synchronization tools.
#[derive(Parser)]
#[command(name = "driftsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both roles over an in-process pipe against seeded in-memory
    /// databases, showing what a session exchanges
    Demo {
        /// Roll back instead of committing at session end
        #[arg(short, long)]
        rollback_after: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo { rollback_after } => demo(rollback_after)?,
        Commands::Version => {
            println!("driftsync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn demo_table() -> Table {
    Table {
        name: "accounts".into(),
        columns: vec![
            Column::new("id", ColumnType::SignedInt, false).with_size(8),
            Column::new("name", ColumnType::Varchar, false).with_size(80),
            Column::new("balance", ColumnType::Decimal, true)
                .with_size(10)
                .with_scale(2),
        ],
        primary_key_columns: vec![0],
        keys: vec![],
        where_conditions: None,
    }
}

fn account(id: i64, name: &str, balance: &str) -> Vec<PackedValue> {
    vec![
        PackedValue::Int(id),
        PackedValue::from(name),
        PackedValue::from(balance),
    ]
}

fn demo(rollback_after: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = MemoryDatabase::new();
    source.create_table(demo_table());
    source.insert("accounts", account(1, "alice", "120.00"));
    source.insert("accounts", account(2, "bob", "35.50"));
    source.insert("accounts", account(3, "carol", "0.00"));

    let dest = MemoryDatabase::new();
    dest.create_table(demo_table());
    dest.insert("accounts", account(1, "alice", "120.00"));
    dest.insert("accounts", account(2, "bob", "8.00")); // drifted
    dest.insert("accounts", account(9, "mallory", "999.99")); // gone upstream

    let (commands_w, commands_r) = pipe();
    let (responses_w, responses_r) = pipe();

    let source_adapter = source.connect();
    let source_thread =
        std::thread::spawn(move || sync_from(source_adapter, commands_r, responses_w));

    let mut options = DestOptions::new();
    if rollback_after {
        options = options.with_rollback_after();
    }
    let report = sync_to(dest.connect(), options, responses_r, commands_w)?;
    source_thread.join().expect("source worker panicked")?;

    for table in &report.tables {
        println!(
            "{}: {} hash commands, {} rows commands, {} rows changed",
            table.table, table.hash_commands, table.rows_commands, table.rows_changed
        );
    }
    for row in dest.rows("accounts") {
        println!(
            "  {} {} {}",
            row[0].as_int().unwrap_or_default(),
            row[1].as_text().unwrap_or_default(),
            row[2].as_text().unwrap_or_default(),
        );
    }

    Ok(())
}
