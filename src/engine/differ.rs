//! Run report display

use colored::{ColoredString, Colorize};
use converge::{ExecuteSummary, Outcome, RunResult};

/// Symbol shown next to an operation
pub fn outcome_symbol(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::NoChange => "○".dimmed(),
        Outcome::Changed => "✓".green(),
        Outcome::WouldChange => "~".yellow(),
        Outcome::Skipped { .. } => "⊘".dimmed(),
        Outcome::Failed { .. } => "✗".red(),
    }
}

/// Short description of an outcome
pub fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::NoChange => "(no change)".to_string(),
        Outcome::Changed => "(changed)".to_string(),
        Outcome::WouldChange => "(would change)".to_string(),
        Outcome::Skipped { reason } => format!("(skipped: {reason})"),
        Outcome::Failed { error, category } => format!("(failed, {category}: {error})"),
    }
}

/// Display one host's run in a box.
///
/// Unchanged operations are listed only when `verbose` is set.
pub fn display_run(run: &RunResult, verbose: bool) {
    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        run.host.bold()
    );
    println!("│");

    let mut shown = 0;
    for report in &run.reports {
        if matches!(report.outcome, Outcome::NoChange) && !verbose {
            continue;
        }
        shown += 1;
        println!(
            "│   {} {:<40} {}",
            outcome_symbol(&report.outcome),
            report.name,
            outcome_label(&report.outcome).dimmed()
        );
        for action in &report.actions {
            println!("│       {}", action.dimmed());
        }
    }

    if let Some(error) = &run.error
        && run.reports.is_empty()
    {
        println!("│   {} {}", "✗".red(), error);
        shown += 1;
    }

    for name in &run.not_run {
        println!("│   {} {:<40} {}", "·".dimmed(), name, "(not run)".dimmed());
        shown += 1;
    }

    if shown == 0 {
        println!("│   {} No changes needed", "✓".green());
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ {} operations, {} changes",
        run.reports.len().to_string().bold(),
        run.changed_count().to_string().green()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print the final summary across hosts
pub fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if !summary.is_success() {
        println!(
            "  {} {} of {} hosts failed",
            "⚠".yellow().bold(),
            summary.hosts_failed,
            summary.hosts_failed + summary.hosts_succeeded
        );
    } else if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else {
        println!("  {} Hosts converged successfully!", "✓".green().bold());
    }

    if summary.would_change > 0 {
        println!("    • {} operations would change", summary.would_change);
    }
    if summary.changed > 0 {
        println!("    • {} operations changed", summary.changed);
    }
    if summary.no_change > 0 {
        println!("    • {} operations already converged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} operations skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "operations".red());
    }
    if summary.not_run > 0 {
        println!("    • {} operations not run", summary.not_run);
    }
}
