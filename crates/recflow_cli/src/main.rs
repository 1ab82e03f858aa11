//! recflow CLI
//!
//! Command-line tools for exercising recflow streams against the in-memory
//! remote database.
//!
//! # Commands
//!
//! - `query` - Run a paginated query and print its emission trace
//! - `explore` - Enumerate every injected failure path of a batch save

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// recflow stream tools.
#[derive(Parser)]
#[command(name = "recflow")]
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
    /// Run a paginated query against a seeded mock
    Query {
        /// Number of records to seed
        #[arg(short, long, default_value = "10")]
        items: usize,

        /// Largest page a single operation may request
        #[arg(short, long, default_value = "3")]
        page_size: usize,

        /// Demand to signal (unbounded if omitted)
        #[arg(short, long)]
        demand: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Enumerate every failure path of a batch save
    Explore {
        /// Number of records to save
        #[arg(short, long, default_value = "2")]
        records: usize,

        /// Save atomically
        #[arg(short, long)]
        atomic: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Query {
            items,
            page_size,
            demand,
            format,
        } => {
            commands::query::run(items, page_size, demand, &format)?;
        }
        Commands::Explore { records, atomic } => {
            commands::explore::run(records, atomic)?;
        }
        Commands::Version => {
            println!("recflow CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
