//! Tidemark command-line interface
//!
//! The shipped `tidemark` binary runs with empty registries, which is enough
//! for `init`, `create`, `status` and breakpoint management. Applications that
//! compile their migration units in embed the CLI through [`run_with`]:
//!
//! ```rust,no_run
//! use tidemark::migration::{MigrationRegistry, SeedRegistry};
//! use tidemark_cli::{run_with, Registries};
//!
//! fn main() {
//!     let registries = Registries {
//!         migrations: MigrationRegistry::new(),
//!         seeds: SeedRegistry::new(),
//!     };
//!     std::process::exit(run_with(registries));
//! }
//! ```

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;
use tidemark::migration::{MigrationRegistry, SeedRegistry};
use tidemark::DEFAULT_CONFIG_FILE;

/// Process exit codes
pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_MISSING: i32 = 2;
pub const EXIT_PENDING: i32 = 3;

/// Errors raised by the CLI itself (everything else comes from `tidemark`)
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("The migration name \"{0}\" is not valid (use letters, digits and underscores, starting with a letter)")]
    InvalidName(String),

    #[error("A migration named \"{name}\" already exists in \"{path}\"")]
    MigrationExists { name: String, path: PathBuf },

    #[error("Config file \"{0}\" already exists")]
    ConfigExists(PathBuf),
}

/// Migration and seed units available to the CLI
#[derive(Debug, Default, Clone)]
pub struct Registries {
    pub migrations: MigrationRegistry,
    pub seeds: SeedRegistry,
}

#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(about = "Versioned schema migrations and seeds")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Target environment (default: `environments.default_environment`)
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// Database URL overriding the environment's configured one
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter configuration file
    Init,

    /// Show migration status (up, down and missing)
    Status {
        #[arg(short, long, value_enum, default_value_t = StatusFormat::Text)]
        format: StatusFormat,
    },

    /// Apply pending migrations
    Migrate {
        /// Version or name to migrate to (`0` reverts everything)
        #[arg(short, long, conflicts_with = "date")]
        target: Option<String>,

        /// Migrate up to this date (YYYYMMDD, YYYYMMDDHHMMSS or RFC 3339)
        #[arg(short, long)]
        date: Option<String>,

        /// Record versions without running them
        #[arg(long)]
        fake: bool,

        /// Show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert applied migrations (default: the most recent one)
    Rollback {
        /// Version or name to roll back to (`0` or `all` reverts everything)
        #[arg(short, long, conflicts_with_all = ["date", "steps"])]
        target: Option<String>,

        /// Revert every migration applied at or after this date
        #[arg(short, long, conflicts_with = "steps")]
        date: Option<String>,

        /// Number of migrations to revert
        #[arg(long)]
        steps: Option<usize>,

        /// Ignore breakpoints
        #[arg(short, long)]
        force: bool,

        /// Remove log entries without running them
        #[arg(long)]
        fake: bool,

        /// Show what would be reverted without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Run seeds (all of them unless named)
    Seed {
        #[arg(short, long = "seed")]
        seeds: Vec<String>,
    },

    /// Toggle, set or clear a breakpoint (default: most recent migration)
    Breakpoint {
        #[arg(short, long)]
        target: Option<i64>,

        #[arg(long, conflicts_with_all = ["unset", "remove_all"])]
        set: bool,

        #[arg(long, conflicts_with = "remove_all")]
        unset: bool,

        /// Clear every breakpoint
        #[arg(short, long)]
        remove_all: bool,
    },

    /// Generate a new migration file
    Create {
        /// Migration name (e.g. `CreateUsersTable` or `create_users_table`)
        name: String,

        /// Directory to write into (default: first configured migration path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).try_init();
}

/// Parse the process arguments and run one command
///
/// Returns the process exit code.
pub fn run_with(registries: Registries) -> i32 {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);

    let started = Instant::now();
    match commands::execute(&cli, &registries) {
        Ok(code) => {
            if !cli.quiet && code == EXIT_OK {
                println!(
                    "{}",
                    format!("All Done. Took {:.4}s", started.elapsed().as_secs_f64()).green()
                );
            }
            code
        }
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            EXIT_ERROR
        }
    }
}
