#[macro_use]
mod errors;
mod repl;
mod session;
mod sql;
mod storage;

use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "litedb",
    version = VERSION,
    about = "Single-file B+ tree table with a line-oriented REPL."
)]
struct Cli {
    /// Path to the database file. Created on first open.
    #[arg(env = "LITEDB_FILE")]
    filename: Option<PathBuf>,
}

fn main() {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open("litedb.log")
        .expect("Failed to open log file");

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let filename = match cli.filename {
        Some(filename) => filename,
        None => {
            println!("Must supply a database filename.");
            process::exit(1);
        }
    };

    if let Err(e) = repl::start(&filename) {
        tracing::error!("Session aborted: {}", e);
        eprintln!("{}", e);
        process::exit(1);
    }
}
