//! PeopleCount CLI
//!
//! Command-line tools for PeopleCount database management.
//!
//! # Commands
//!
//! - `inspect` - Display document counts and journal size
//! - `verify` - Check relationship symmetry and dangling references
//! - `exec` - Run one operation with a JSON payload
//! - `compact` - Rewrite the journal as one record per document

mod commands;

use clap::{Parser, Subcommand};
use commands::OpenArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PeopleCount command-line database tools.
#[derive(Parser)]
#[command(name = "peoplecount")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Encoded super password hash (enables resetPassword)
    #[arg(global = true, long)]
    super_password_hash: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display document counts and journal size
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify relationship integrity
    Verify,

    /// Run one operation, e.g. `exec createStore --json '{"name":"main"}'`
    Exec {
        /// Operation name (case-insensitive)
        operation: String,

        /// JSON payload; read from stdin when omitted
        #[arg(short, long)]
        json: Option<String>,

        /// Run as this user instead of as an admin
        #[arg(long)]
        as_user: Option<String>,
    },

    /// Rewrite the journal to reclaim space
    Compact {
        /// Dry run - show the current size only
        #[arg(short, long)]
        dry_run: bool,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut open = OpenArgs {
        create: false,
        super_password_hash: cli.super_password_hash,
    };

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &open, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path, &open)?;
        }
        Commands::Exec {
            operation,
            json,
            as_user,
        } => {
            let path = cli.path.ok_or("Database path required for exec")?;
            open.create = true;
            let payload = match json {
                Some(text) => text,
                None => commands::exec::read_stdin()?,
            };
            commands::exec::run(&path, &open, &operation, &payload, as_user)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Database path required for compact")?;
            commands::compact::run(&path, &open, dry_run)?;
        }
        Commands::Version => {
            println!("PeopleCount CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
