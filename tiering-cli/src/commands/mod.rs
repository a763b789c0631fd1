//! CLI Commands Module
//!
//! Command definitions for the tiering CLI.

use clap::{Parser, Subcommand};

/// Storage tiering CLI
#[derive(Parser, Debug)]
#[command(name = "tiering")]
#[command(author = "Rainbow City Foundation")]
#[command(version)]
#[command(about = "Storage tiering policy engine command line")]
#[command(long_about = "Run tier group sweeps, restages and access-time updates against a \
    catalog fixture.\n\n\
    The catalog is read from a JSON fixture; migration jobs are collected by an \
    in-memory queue and printed instead of being executed.")]
pub struct Cli {
    /// Catalog fixture (JSON) (env: TIERING_CATALOG)
    #[arg(short, long, env = "TIERING_CATALOG")]
    pub catalog: String,

    /// Write catalog changes back to the fixture
    #[arg(long)]
    pub save: bool,

    /// Output format (json, table, plain)
    #[arg(short, long, default_value = "json")]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    #[default]
    Json,
    /// Table format (human-readable)
    Table,
    /// Plain text
    Plain,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sweep one or more tier groups
    Run {
        /// Tier group name (repeatable)
        #[arg(short, long = "group", required = true)]
        groups: Vec<String>,
        /// Evaluate as of this time (epoch seconds) instead of now
        #[arg(long)]
        at: Option<i64>,
    },

    /// Move an object back to its group's restage tier
    Restage {
        /// Logical object path
        #[arg(short, long)]
        object: String,
        /// Leaf resource the object is read from
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Record an access to an object
    Touch {
        /// Logical object path
        #[arg(short, long)]
        object: String,
        /// Access time (epoch seconds) instead of now
        #[arg(long)]
        at: Option<i64>,
    },

    /// Show the resolved tiers of a group
    Topology {
        /// Tier group name
        #[arg(short, long)]
        group: String,
    },

    /// List policy violations on a resource
    Violations {
        /// Resource name (leaf or coordinating)
        #[arg(short, long)]
        resource: String,
        /// Evaluate as of this time (epoch seconds) instead of now
        #[arg(long)]
        at: Option<i64>,
    },

    /// Validate a schedule rule and show the registrations it produces
    Schedule {
        /// Rule spec JSON
        #[arg(short, long)]
        rule: String,
        /// Parameters JSON
        #[arg(short, long, default_value = "")]
        params: String,
    },
}
