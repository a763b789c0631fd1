//! Command Handlers
//!
//! Builds an engine over the catalog fixture named on the command line and
//! runs one command against it. Jobs land in an in-memory queue and schedule
//! registrations in a recording registrar; both are reported, not executed.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tiering_core::{
    CatalogFixture, HostContext, InMemoryCatalog, InMemoryJobQueue, RecordingScheduleRegistrar,
    RestageOutcome, RestageRequest, ScheduleRequest, StorageTiering, SweepReport, TierGroup,
    TieringConfig, Violation,
};
use tracing::{debug, info};

use crate::commands::{Cli, Commands};
use crate::error::{CliError, CliResult};
use crate::output;

type Engine = StorageTiering<InMemoryCatalog, InMemoryJobQueue>;

/// Result of one group in a `run` command
#[derive(Debug, Serialize)]
pub struct GroupRun {
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SweepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a command produced
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Sweeps(Vec<GroupRun>),
    Restage(RestageOutcome),
    AccessTime {
        object_path: String,
        access_time: i64,
    },
    Topology(TierGroup),
    Violations {
        resource: String,
        violations: Vec<Violation>,
    },
    Schedule(Vec<ScheduleRequest>),
}

impl CommandOutput {
    /// Groups whose sweep returned an error
    pub fn failed_groups(&self) -> Vec<String> {
        match self {
            CommandOutput::Sweeps(runs) => runs
                .iter()
                .filter(|r| r.error.is_some())
                .map(|r| r.group.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> CliResult<()> {
    let result = execute(&cli).await?;
    output::print_output(&result, cli.format)?;

    let failed = result.failed_groups();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::SweepFailed { groups: failed })
    }
}

/// Execute a command and return its output without printing it
pub async fn execute(cli: &Cli) -> CliResult<CommandOutput> {
    let config = TieringConfig::from_env();
    let fixture = load_fixture(&cli.catalog).await?;

    let catalog = Arc::new(
        InMemoryCatalog::from_fixture(fixture)
            .with_access_time_attribute(&config.attributes.access_time),
    );
    let queue = Arc::new(InMemoryJobQueue::new());
    let registrar = Arc::new(RecordingScheduleRegistrar::new());
    let context = HostContext::new(catalog.clone(), queue).with_registrar(registrar.clone());
    let engine = StorageTiering::new(context, config)?;

    let result = match &cli.command {
        Commands::Run { groups, at } => handle_run(&engine, groups, *at).await,
        Commands::Restage { object, source } => {
            let request = match source {
                Some(source) => RestageRequest::from_resource(object, source),
                None => RestageRequest::new(object),
            };
            Ok(CommandOutput::Restage(engine.restage(request).await?))
        }
        Commands::Touch { object, at } => {
            let access_time = match at {
                Some(at) => engine.update_access_time_at(object, *at).await?,
                None => engine.update_access_time(object).await?,
            };
            Ok(CommandOutput::AccessTime {
                object_path: object.clone(),
                access_time,
            })
        }
        Commands::Topology { group } => {
            Ok(CommandOutput::Topology(engine.resolve_topology(group).await?))
        }
        Commands::Violations { resource, at } => {
            let violations = match at {
                Some(at) => engine.find_violations_at(resource, *at).await?,
                None => engine.find_violations(resource).await?,
            };
            Ok(CommandOutput::Violations {
                resource: resource.clone(),
                violations,
            })
        }
        Commands::Schedule { rule, params } => {
            engine.schedule(rule, params).await?;
            Ok(CommandOutput::Schedule(registrar.requests().await))
        }
    }?;

    if cli.save {
        save_fixture(&cli.catalog, &catalog.snapshot().await).await?;
        info!(path = %cli.catalog, "Catalog fixture saved");
    }

    Ok(result)
}

async fn handle_run(engine: &Engine, groups: &[String], at: Option<i64>) -> CliResult<CommandOutput> {
    let results = match at {
        Some(now) => {
            let mut results = Vec::with_capacity(groups.len());
            for group in groups {
                results.push((group.clone(), engine.run_policy_for_group_at(group, now).await));
            }
            results
        }
        None => {
            let names: Vec<&str> = groups.iter().map(String::as_str).collect();
            engine.run_policy_for_groups(&names).await
        }
    };

    let runs = results
        .into_iter()
        .map(|(group, result)| match result {
            Ok(report) => GroupRun {
                group,
                report: Some(report),
                error: None,
            },
            Err(e) => GroupRun {
                group,
                report: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(CommandOutput::Sweeps(runs))
}

async fn load_fixture(path: &str) -> CliResult<CatalogFixture> {
    if !Path::new(path).exists() {
        return Err(CliError::config(format!("catalog fixture '{}' not found", path)));
    }
    let json = tokio::fs::read_to_string(path).await?;
    debug!(path, bytes = json.len(), "Loaded catalog fixture");
    Ok(CatalogFixture::from_json(&json)?)
}

async fn save_fixture(path: &str, fixture: &CatalogFixture) -> CliResult<()> {
    tokio::fs::write(path, fixture.to_json()?).await?;
    Ok(())
}
