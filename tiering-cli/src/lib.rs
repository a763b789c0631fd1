//! Tiering CLI - Command Line Interface
//!
//! Operator tool for the storage tiering policy engine. Every command loads
//! a catalog fixture, runs one engine entry point against it and prints the
//! result.
//!
//! # Usage
//!
//! ```text
//! tiering [OPTIONS] --catalog <CATALOG> <COMMAND>
//!
//! Commands:
//!   run         Sweep one or more tier groups
//!   restage     Move an object back to its group's restage tier
//!   touch       Record an access to an object
//!   topology    Show the resolved tiers of a group
//!   violations  List policy violations on a resource
//!   schedule    Validate a schedule rule and show the registrations it produces
//!
//! Options:
//!   -c, --catalog <CATALOG>  Catalog fixture (JSON) [env: TIERING_CATALOG]
//!       --save               Write catalog changes back to the fixture
//!   -f, --format <FORMAT>    Output format (json, table, plain) [default: json]
//!   -v, --verbose            Enable verbose output
//! ```
//!
//! # Examples
//!
//! ## Sweep a group
//! ```text
//! tiering --catalog catalog.json run --group tiers
//! ```
//!
//! ## Record an access and persist it
//! ```text
//! tiering --catalog catalog.json --save touch --object /zone/home/alice/data.bin
//! ```

pub mod commands;
pub mod error;
pub mod handler;
pub mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};
pub use handler::{execute, CommandOutput, GroupRun};

/// Tiering CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
