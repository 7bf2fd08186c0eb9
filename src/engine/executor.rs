//! Command handlers: plan, apply, facts.

use anyhow::{Context as AnyhowContext, Result, bail};
use clap::ValueEnum;
use colored::Colorize;
use converge::{
    AutoConfirm, ConfirmCallback, ExecuteOptions, ExecuteSummary, Executor, FactQuery, Fetcher,
    HttpFetcher, OsFamily, RunResult,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::differ::{display_run, print_summary};
use crate::Context;
use crate::cli::{ApplyArgs, DeployName, FactName, FactsArgs, RunArgs};
use crate::config::Inventory;
use crate::deploys::{self, Deploy, RepoOptions};
use crate::progress::FleetProgress;
use crate::ui;

/// Confirm on the terminal
struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(io::Error::other)
    }
}

/// Show what a deploy would change
pub fn plan(ctx: &Context, args: RunArgs) -> Result<()> {
    let runs = run_deploy(ctx, &args, true)?;
    let summary = report(ctx, &args, &runs, true)?;
    if !summary.is_success() {
        bail!("Plan failed on {} host(s)", summary.hosts_failed);
    }
    Ok(())
}

/// Plan, confirm, then converge
pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    if args.dry_run {
        return plan(ctx, args.run);
    }

    let planned = run_deploy(ctx, &args.run, true)?;
    let summary = ExecuteSummary::from_runs(&planned);
    if !args.run.json {
        for run in &planned {
            display_run(run, ctx.verbose > 0);
        }
    }

    if !summary.is_success() {
        print_summary(&summary, true);
        bail!(
            "Plan failed on {} host(s); nothing applied",
            summary.hosts_failed
        );
    }
    if summary.would_change == 0 {
        println!();
        println!("  {} No changes needed", "✓".green());
        return Ok(());
    }

    let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(PromptConfirm)
    };
    let prompt = format!(
        "Apply {} changes to {} host(s)?",
        summary.would_change, summary.hosts_succeeded
    );
    if !confirm.confirm(&prompt)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let runs = run_deploy(ctx, &args.run, false)?;
    let summary = report(ctx, &args.run, &runs, false)?;
    if !summary.is_success() {
        bail!("Deploy failed on {} host(s)", summary.hosts_failed);
    }
    Ok(())
}

/// Resolve hosts, declare the deploy for each and run the fleet.
fn run_deploy(ctx: &Context, args: &RunArgs, dry_run: bool) -> Result<Vec<RunResult>> {
    let inventory = Inventory::resolve(&args.targets)?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new());
    let deploy = Deploy::new(
        args.deploy,
        RepoOptions {
            edge: args.edge,
            testing: args.testing,
            no_community: args.no_community,
            backup: args.backup,
        },
        Arc::clone(&fetcher),
    );
    let timeout = args.targets.timeout.map(Duration::from_secs);
    let hosts = inventory.hosts(deploy.default_os(), timeout);

    log::info!(
        "{} {:?} on {} host(s)",
        if dry_run { "Planning" } else { "Applying" },
        args.deploy,
        hosts.len()
    );

    let executor = Executor::new(fetcher).with_options(ExecuteOptions {
        dry_run,
        jobs: usize::from(args.jobs),
    });
    let progress = FleetProgress::new(ctx.quiet || args.json);

    executor
        .run_fleet(
            hosts,
            |host| deploy.operations(host),
            |host| progress.host(host.name()),
        )
        .context("Failed to start deploy")
}

/// Display runs (or print them as JSON) and the summary.
fn report(
    ctx: &Context,
    args: &RunArgs,
    runs: &[RunResult],
    dry_run: bool,
) -> Result<ExecuteSummary> {
    let summary = ExecuteSummary::from_runs(runs);
    if args.json {
        let doc = serde_json::json!({ "runs": runs, "summary": &summary });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(summary);
    }

    for run in runs {
        display_run(run, ctx.verbose > 0);
    }
    print_summary(&summary, dry_run);
    Ok(summary)
}

/// Build the fact query named on the command line.
pub fn fact_query(fact: FactName, arg: Option<&str>) -> Result<FactQuery> {
    let required = || -> Result<String> {
        match arg {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            _ => bail!("fact '{}' needs an argument", fact_name(fact)),
        }
    };
    Ok(match fact {
        FactName::Path => FactQuery::Path(required()?),
        FactName::Link => FactQuery::Link(required()?),
        FactName::Lines => FactQuery::FileLines(required()?),
        FactName::Command => FactQuery::Command(required()?),
        FactName::Service => FactQuery::Service(required()?),
        FactName::Groups => FactQuery::Groups,
        FactName::Users => FactQuery::Users,
        FactName::Packages => FactQuery::InstalledPackages,
        FactName::Ipv4 => FactQuery::Ipv4Addrs,
    })
}

fn fact_name(fact: FactName) -> String {
    fact.to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default()
}

/// Query one fact on every selected host
pub fn facts(_ctx: &Context, args: FactsArgs) -> Result<()> {
    let os: OsFamily = args.os.parse()?;
    let query = fact_query(args.fact, args.arg.as_deref())?;
    let inventory = Inventory::resolve(&args.targets)?;
    let timeout = args.targets.timeout.map(Duration::from_secs);

    let mut failed = 0;
    for mut host in inventory.hosts(os, timeout) {
        ui::section(host.name());
        match host.fact(&query) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(e) => {
                ui::error(&format!("{query}: {e}"));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("Fact query failed on {failed} host(s)");
    }
    Ok(())
}

/// List the deploys labhost ships
pub fn list_deploys() {
    ui::header("Deploys");
    for name in DeployName::value_variants() {
        let Some(value) = name.to_possible_value() else {
            continue;
        };
        println!(
            "  {:<12} {} {}",
            value.get_name().bold(),
            deploys::describe(*name),
            format!("[{}]", deploys::default_os(*name)).dimmed()
        );
    }
}
