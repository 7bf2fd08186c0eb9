use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "labhost")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge lab hosts to their declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what a deploy would change, without changing anything
    Plan(RunArgs),

    /// Converge hosts to the state a deploy declares
    Apply(ApplyArgs),

    /// Query facts from a host
    Facts(FactsArgs),

    /// List available deploys
    Deploys,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Deploys shipped with labhost
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeployName {
    /// Alpine base, PostgreSQL and Concourse CI (web + worker)
    Concourse,
    /// Debian KIND node: containerd/runc from sid, kind, nerdctl
    Kind,
    /// Alpine KIND node from distribution packages
    KindAlpine,
    /// Alpine base system only
    Alpine,
    /// Debian base system only
    Debian,
}

/// Host selection shared by every command that talks to hosts
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Single target host, reached as `ssh root@<target>`
    #[arg(short, long, env = "LAB_TARGET")]
    pub target: Option<String>,

    /// Inventory file (default: <config dir>/inventory.toml)
    #[arg(short, long)]
    pub inventory: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Deploy to run
    #[arg(value_enum)]
    pub deploy: DeployName,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Number of hosts converged in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Also enable the Alpine @edge repositories
    #[arg(long)]
    pub edge: bool,

    /// Also enable the Alpine @testing repository
    #[arg(long)]
    pub testing: bool,

    /// Comment out the Alpine community repositories instead of enabling them
    #[arg(long)]
    pub no_community: bool,

    /// Copy /etc/apk/repositories to repositories.bak before editing it
    #[arg(long)]
    pub backup: bool,

    /// Print run reports as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Only show what would change (same as `plan`)
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FactsArgs {
    /// Fact to query
    #[arg(value_enum)]
    pub fact: FactName,

    /// Path, command or service name, depending on the fact
    pub arg: Option<String>,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Operating system family of the host
    #[arg(long, default_value = "alpine")]
    pub os: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FactName {
    Path,
    Link,
    Lines,
    Command,
    Groups,
    Users,
    Packages,
    Service,
    Ipv4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "labhost", "-vv", "apply", "concourse", "--target", "10.0.0.5", "--yes", "-j", "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.run.deploy, DeployName::Concourse);
        assert_eq!(args.run.targets.target.as_deref(), Some("10.0.0.5"));
        assert_eq!(args.run.jobs, 2);
        assert!(args.yes);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_parse_kind_alpine() {
        let cli = Cli::try_parse_from(["labhost", "plan", "kind-alpine", "--edge"]).unwrap();
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.deploy, DeployName::KindAlpine);
        assert!(args.edge);
        assert!(!args.backup);
        assert!(!args.no_community);
    }

    #[test]
    fn test_parse_facts() {
        let cli =
            Cli::try_parse_from(["labhost", "facts", "service", "postgresql", "-t", "lab"]).unwrap();
        let Command::Facts(args) = cli.command else {
            panic!("expected facts");
        };
        assert_eq!(args.fact, FactName::Service);
        assert_eq!(args.arg.as_deref(), Some("postgresql"));
    }
}
