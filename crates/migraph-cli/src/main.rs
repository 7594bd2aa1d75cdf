//! Migraph Command-Line Client
//!
//! Validates plan files, shows migration paths, and upgrades SQLite
//! databases while recording the reached state in a sled directory.

mod commands;
mod error;
mod output;
mod plan_file;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::UpgradeOptions;
use output::OutputFormat;

/// Migraph Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "migraph")]
#[command(version, about = "Run schema-migration plans")]
pub struct Args {
    /// Output format
    #[arg(long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that a plan has a single final state and no loops
    Validate {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,
    },

    /// Print the states walked between two states
    Path {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// State to start from (empty for the origin)
        #[arg(long, default_value = "")]
        from: String,

        /// State to stop at (defaults to the final state)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show the recorded state of a plan
    Status {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Directory of the state store
        #[arg(long, default_value = "migraph-state")]
        state_path: PathBuf,
    },

    /// Upgrade a SQLite database to the plan's final state
    Upgrade {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// SQLite database file
        #[arg(long)]
        database: PathBuf,

        /// Directory of the state store
        #[arg(long, default_value = "migraph-state")]
        state_path: PathBuf,

        /// Start from this state instead of the recorded one
        #[arg(long)]
        from: Option<String>,

        /// Do not run post-migrations
        #[arg(long)]
        skip_post_migrations: bool,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("migraph=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
    let output = match &args.command {
        Command::Validate { plan } => commands::validate(plan, args.format)?,
        Command::Path { plan, from, to } => {
            commands::path(plan, from, to.as_deref(), args.format)?
        }
        Command::Status { plan, state_path } => commands::status(plan, state_path, args.format)?,
        Command::Upgrade {
            plan,
            database,
            state_path,
            from,
            skip_post_migrations,
        } => commands::upgrade(
            &UpgradeOptions {
                plan,
                database,
                state_path,
                from: from.as_deref(),
                skip_post_migrations: *skip_post_migrations,
            },
            args.format,
        )?,
    };
    Ok(output)
}
