//! # InformedChoice CLI (`ic`)
//!
//! ## Usage
//!
//! ```bash
//! ic --config ./config/ic.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ic init` | Create the SQLite database and run schema migrations |
//! | `ic import <file>` | Load raw product rows from a JSON Lines file |
//! | `ic lookup --id N` | Resolve a product by identifier, `--barcode`, or `--query` |
//! | `ic suggest "<q>"` | Print autocomplete suggestions |
//! | `ic serve` | Start the HTTP server |
//!
//! Logs go to stderr; set `RUST_LOG` to adjust verbosity (default `info`).

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use informed_choice::resolve::ProductRequest;
use informed_choice::{config, import, migrate, resolve, server, suggest};

/// InformedChoice: ingredient, processing, and nutrition assessments for
/// food products.
#[derive(Parser)]
#[command(name = "ic", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ic.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the products table, and its
    /// full-text index. Running it again is safe.
    Init,

    /// Import raw products from a JSON Lines file.
    ///
    /// Existing products keep their stored assessments; only the raw
    /// columns are refreshed.
    Import {
        /// Path to the `.jsonl` file.
        path: PathBuf,
    },

    /// Resolve one product and print it with its assessments.
    ///
    /// Missing assessments are computed by the configured oracle and stored.
    #[command(group(ArgGroup::new("by").required(true).args(["id", "barcode", "query"])))]
    Lookup {
        /// Product identifier.
        #[arg(long)]
        id: Option<i64>,

        /// Product barcode (GTIN/UPC).
        #[arg(long)]
        barcode: Option<String>,

        /// Free-text search query; the best match is used.
        #[arg(long)]
        query: Option<String>,
    },

    /// Print autocomplete suggestions for a partial query.
    Suggest {
        query: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { path } => {
            import::run_import(&cfg, &path).await?;
        }
        Commands::Lookup { id, barcode, query } => {
            let request = ProductRequest {
                identifier: id,
                barcode,
                query,
            };
            resolve::run_lookup(&cfg, request).await?;
        }
        Commands::Suggest { query } => {
            suggest::run_suggest(&cfg, &query).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
