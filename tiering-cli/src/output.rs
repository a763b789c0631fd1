//! Output Formatting
//!
//! Prints command results as JSON, a human-readable table, or plain lines.

use serde::Serialize;
use tiering_core::{RestageOutcome, SweepReport};

use crate::commands::OutputFormat;
use crate::error::CliResult;
use crate::handler::{CommandOutput, GroupRun};

/// Format and print a command result
pub fn print_output(output: &CommandOutput, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(output)?,
        OutputFormat::Table => print_table(output),
        OutputFormat::Plain => {
            for line in plain_lines(output) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Print as pretty JSON
fn print_json<T: Serialize>(data: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

fn print_table(output: &CommandOutput) {
    match output {
        CommandOutput::Sweeps(runs) => {
            for run in runs {
                print_sweep(run);
                println!();
            }
        }
        CommandOutput::Restage(outcome) => {
            println!("Restage Result");
            println!("==============");
            match outcome {
                RestageOutcome::AlreadyResident { resource } => {
                    print_row("Outcome:", "already resident");
                    print_row("Resource:", resource);
                }
                RestageOutcome::Dispatched(dispatched) => {
                    print_row("Outcome:", "dispatched");
                    print_row("Object:", &dispatched.job.object_path);
                    print_row("Source:", &dispatched.job.source_resource);
                    print_row("Destination:", &dispatched.job.destination_resource);
                    print_row("Job ID:", &dispatched.handle.job_id.to_string());
                }
            }
        }
        CommandOutput::AccessTime {
            object_path,
            access_time,
        } => {
            print_row("Object:", object_path);
            print_row("Access Time:", &access_time.to_string());
        }
        CommandOutput::Topology(group) => {
            println!("Tier Group: {}", group.name);
            print_separator();
            for level in group.levels.values() {
                for (member, leaves) in &level.members {
                    let leaves: Vec<&str> = leaves.iter().map(String::as_str).collect();
                    println!("{:<6} {:<20} {}", level.index, member, leaves.join(", "));
                }
            }
        }
        CommandOutput::Violations {
            resource,
            violations,
        } => {
            println!("Violations on {} ({})", resource, violations.len());
            print_separator();
            for v in violations {
                let at = v
                    .access_time
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<12} {:<16} {}", at, v.resource, v.object_path);
            }
        }
        CommandOutput::Schedule(requests) => {
            println!("Schedule Registrations");
            print_separator();
            for request in requests {
                print_row(&request.group, &request.schedule);
            }
        }
    }
}

fn print_sweep(run: &GroupRun) {
    println!("Tier Group Sweep: {}", run.group);
    println!("==================");
    match (&run.report, &run.error) {
        (Some(report), _) => {
            print_row("Run ID:", &report.run_id);
            print_row("State:", &sweep_state(report));
            print_row("Tiers:", &report.tiers.to_string());
            print_row("Resources:", &report.resources_evaluated.to_string());
            print_row("Violations:", &report.violations_found.to_string());
            print_row("Jobs:", &report.jobs.len().to_string());
            for issue in report.policy_errors.iter().chain(&report.dispatch_errors) {
                print_row("Skipped:", &format!("{} ({})", issue.resource, issue.error));
            }
            if !report.jobs.is_empty() {
                print_separator();
                for dispatched in &report.jobs {
                    let job = &dispatched.job;
                    println!(
                        "{} -> {}  {}",
                        job.source_resource, job.destination_resource, job.object_path
                    );
                }
            }
        }
        (None, Some(error)) => print_row("Error:", error),
        (None, None) => {}
    }
}

fn sweep_state(report: &SweepReport) -> String {
    serde_json::to_value(&report.state)
        .ok()
        .and_then(|v| v.get("state").and_then(|s| s.as_str()).map(String::from))
        .unwrap_or_else(|| format!("{:?}", report.state))
}

/// One summary line per result
fn plain_lines(output: &CommandOutput) -> Vec<String> {
    match output {
        CommandOutput::Sweeps(runs) => runs
            .iter()
            .map(|run| match (&run.report, &run.error) {
                (Some(report), _) => format!(
                    "{}: {} jobs, {} violations, {} skipped",
                    run.group,
                    report.jobs.len(),
                    report.violations_found,
                    report.policy_errors.len() + report.dispatch_errors.len()
                ),
                (None, error) => format!(
                    "{}: failed: {}",
                    run.group,
                    error.as_deref().unwrap_or("unknown error")
                ),
            })
            .collect(),
        CommandOutput::Restage(RestageOutcome::AlreadyResident { resource }) => {
            vec![format!("already resident on {}", resource)]
        }
        CommandOutput::Restage(RestageOutcome::Dispatched(d)) => vec![format!(
            "{} -> {}  {}",
            d.job.source_resource, d.job.destination_resource, d.job.object_path
        )],
        CommandOutput::AccessTime {
            object_path,
            access_time,
        } => vec![format!("{} {}", object_path, access_time)],
        CommandOutput::Topology(group) => group
            .levels
            .values()
            .map(|level| {
                let leaves: Vec<String> = level.leaves().into_iter().collect();
                format!("{} {}", level.index, leaves.join(","))
            })
            .collect(),
        CommandOutput::Violations { violations, .. } => {
            violations.iter().map(|v| v.object_path.clone()).collect()
        }
        CommandOutput::Schedule(requests) => requests
            .iter()
            .map(|r| format!("{} {}", r.group, r.schedule))
            .collect(),
    }
}

/// Print a table row
pub fn print_row(key: &str, value: &str) {
    println!("{:<20} {}", key, value);
}

/// Print a separator line
pub fn print_separator() {
    println!("{}", "-".repeat(40));
}
