//! Alpine base system: timezone, APK repositories, tooling.

use super::{RepoOptions, TIMEZONE, timezone};
use converge::operation::{Line, Packages, Shell};
use converge::{Condition, Operation};

pub const MIRROR: &str = "http://mirror.csclub.uwaterloo.ca";
pub const VERSION: &str = "3.21";

const REPOSITORIES: &str = "/etc/apk/repositories";
const COMMENTED_COMMUNITY: &str = "^#.*community$";
const ACTIVE_COMMUNITY: &str = "^[hf].*community$";

/// Timezone, repositories and tooling, in that order.
pub fn base(repos: RepoOptions) -> Vec<Operation> {
    let mut ops = vec![timezone(TIMEZONE)];
    ops.extend(set_repository(MIRROR, VERSION, repos.backup));
    ops.push(if repos.no_community {
        disable_community()
    } else {
        enable_community()
    });
    if repos.edge {
        ops.extend(enable_edge(MIRROR, repos.backup));
    }
    if repos.testing {
        ops.extend(enable_testing(MIRROR, repos.backup));
    }
    ops.push(update_index(&ops));
    ops.push(tooling());
    ops
}

fn pattern_missing(pattern: impl Into<String>) -> Condition {
    Condition::PatternMissing {
        path: REPOSITORIES.to_string(),
        pattern: pattern.into(),
    }
}

/// `cp -a` of the repositories file, run only when one of `edits` is about
/// to change it.
fn backup(label: &str, edits: Vec<Condition>) -> Operation {
    Operation::new(
        format!("Back up repositories ({label})"),
        Shell::new([format!(
            "[ ! -e {REPOSITORIES} ] || cp -a {REPOSITORIES} {REPOSITORIES}.bak"
        )]),
    )
    .when(Condition::Any(edits))
}

/// Point the main and community repositories at `mirror` for `version`.
///
/// A repository already listed for the version is left alone, whatever
/// mirror it uses. Blank lines are dropped once anything was added.
pub fn set_repository(mirror: &str, version: &str, keep_backup: bool) -> Vec<Operation> {
    let repos = ["main", "community"];
    let mut ops = Vec::new();
    if keep_backup {
        ops.push(backup(
            &format!("v{version}"),
            repos
                .iter()
                .map(|repo| pattern_missing(format!("v{version}/{repo}")))
                .collect(),
        ));
    }

    ops.extend(repos.iter().map(|repo| {
        Operation::new(
            repository_op(version, repo),
            Line::new(REPOSITORIES, format!("{mirror}/alpine/v{version}/{repo}")),
        )
        .when(pattern_missing(format!("v{version}/{repo}")))
    }));

    ops.push(
        Operation::new(
            "Delete empty repository lines",
            Shell::new([format!("sed -i '/^[[:space:]]*$/d' {REPOSITORIES}")]),
        )
        .when(Condition::Any(
            repos
                .iter()
                .map(|repo| Condition::changed(repository_op(version, repo)))
                .collect(),
        )),
    );
    ops
}

fn repository_op(version: &str, repo: &str) -> String {
    format!("Repository v{version}/{repo}")
}

/// Uncomment community repository lines.
pub fn enable_community() -> Operation {
    Operation::new(
        "Enable community repository",
        Shell::new([format!("sed -i '/{COMMENTED_COMMUNITY}/s/^#//' {REPOSITORIES}")])
            .only_if(Condition::pattern_found(REPOSITORIES, COMMENTED_COMMUNITY)),
    )
}

/// Comment out active community repository lines.
pub fn disable_community() -> Operation {
    Operation::new(
        "Disable community repository",
        Shell::new([format!("sed -i '/{ACTIVE_COMMUNITY}/s/^/#/' {REPOSITORIES}")])
            .only_if(Condition::pattern_found(REPOSITORIES, ACTIVE_COMMUNITY)),
    )
}

fn whole_line(line: &str) -> String {
    format!("^{line}$")
}

pub fn enable_edge(mirror: &str, keep_backup: bool) -> Vec<Operation> {
    let lines: Vec<(String, String)> = ["main", "community"]
        .into_iter()
        .map(|repo| {
            (
                format!("Repository @edge/{repo}"),
                format!("@edge {mirror}/alpine/edge/{repo}"),
            )
        })
        .collect();

    let mut ops = Vec::new();
    if keep_backup {
        ops.push(backup(
            "@edge",
            lines.iter().map(|(_, line)| pattern_missing(whole_line(line))).collect(),
        ));
    }
    ops.extend(
        lines
            .into_iter()
            .map(|(name, line)| Operation::new(name, Line::new(REPOSITORIES, line))),
    );
    ops
}

pub fn enable_testing(mirror: &str, keep_backup: bool) -> Vec<Operation> {
    let line = format!("@testing {mirror}/alpine/edge/testing");
    let mut ops = Vec::new();
    if keep_backup {
        ops.push(backup("@testing", vec![pattern_missing(whole_line(&line))]));
    }
    ops.push(Operation::new(
        "Repository @testing",
        Line::new(REPOSITORIES, line),
    ));
    ops
}

/// Refresh the package index if any earlier repository operation changed.
fn update_index(repository_ops: &[Operation]) -> Operation {
    let changed = repository_ops
        .iter()
        .filter(|op| {
            ["Repository", "Enable", "Disable"]
                .iter()
                .any(|prefix| op.name.starts_with(prefix))
        })
        .map(|op| Condition::changed(&op.name))
        .collect();
    Operation::new("Update package index", Shell::new(["apk update"]))
        .when(Condition::Any(changed))
}

pub fn tooling() -> Operation {
    Operation::new("Install tools", Packages::new(["neovim", "curl", "jq"]))
}
