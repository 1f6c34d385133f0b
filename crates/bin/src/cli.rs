//! CLI argument definitions for the positioning binary.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database file
    Sqlite,
    /// PostgreSQL database
    Postgres,
}

/// Inspect and repair positioned columns in an application database
#[derive(Parser, Debug)]
#[command(name = "positioning")]
#[command(about = "Dense, gapless row positions: check, heal and move")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendConfig,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the application's tables live
#[derive(clap::Args, Debug, Clone)]
pub struct BackendConfig {
    /// Storage backend to use
    #[arg(short, long, default_value = "sqlite", env = "POSITIONING_BACKEND", global = true)]
    pub backend: Backend,

    /// SQLite database file (required when backend=sqlite)
    #[arg(short = 'd', long, env = "POSITIONING_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// PostgreSQL connection URL (required when backend=postgres)
    #[arg(long, env = "POSITIONING_POSTGRES_URL", global = true)]
    pub postgres_url: Option<String>,
}

/// The positioned column a command works on
#[derive(clap::Args, Debug, Clone)]
pub struct ColumnArgs {
    /// Table holding the positioned rows
    #[arg(short, long)]
    pub table: String,

    /// Primary key column of the table
    #[arg(long, default_value = "id")]
    pub primary_key: String,

    /// Position column
    #[arg(short, long, default_value = "position")]
    pub column: String,

    /// Scope column; repeat for a multi-column scope, omit for a global scope
    #[arg(short, long = "scope")]
    pub scope: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report gaps, duplicates and unpositioned rows per scope
    Check(ColumnArgs),
    /// Renumber every scope densely, keeping the current order
    Heal(ColumnArgs),
    /// Reposition one row, renumbering its siblings
    Move(MoveArgs),
    /// List the rows of the scope containing a row, in order
    List(ListArgs),
}

/// Arguments for the move command
#[derive(clap::Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["to", "first", "last", "before", "after"])
))]
pub struct MoveArgs {
    #[command(flatten)]
    pub column: ColumnArgs,

    /// Primary key of the row to move
    #[arg(long)]
    pub id: i64,

    /// Explicit position (clamped into the scope)
    #[arg(long, allow_negative_numbers = true)]
    pub to: Option<i64>,

    /// Move to the head of the scope
    #[arg(long)]
    pub first: bool,

    /// Move to the tail of the scope
    #[arg(long)]
    pub last: bool,

    /// Move right before the row with this primary key
    #[arg(long)]
    pub before: Option<i64>,

    /// Move right after the row with this primary key
    #[arg(long)]
    pub after: Option<i64>,
}

/// Arguments for the list command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub column: ColumnArgs,

    /// Primary key of a row in the scope to list
    #[arg(long)]
    pub id: i64,
}
