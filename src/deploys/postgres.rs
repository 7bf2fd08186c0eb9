//! PostgreSQL 16 server with the role and database Concourse uses.

use converge::operation::{Packages, Service, Shell};
use converge::transport::quote;
use converge::{Condition, Operation};

pub const ROLE: &str = "atc";
pub const DATABASE: &str = "atc";

const DATA_MARKER: &str = "/var/lib/postgresql/16/data/PG_VERSION";

/// `psql` as the postgres superuser
fn psql(args: &str, sql: &str) -> String {
    let inner = format!("psql {args} {}", quote(sql));
    format!("su postgres -s /bin/sh -c {}", quote(&inner))
}

/// Prints "1" when `sql` finds a row; prints nothing when it doesn't or the
/// server is not reachable yet.
fn exists(sql: &str) -> Condition {
    Condition::CommandOutputIs {
        command: format!("{} 2>/dev/null || true", psql("-tAc", sql)),
        expected: "1".to_string(),
    }
}

pub fn server() -> Vec<Operation> {
    vec![
        Operation::new(
            "Install Postgres 16",
            Packages::new(["postgresql16", "postgresql16-contrib", "postgresql16-openrc"]),
        ),
        Operation::new(
            "Initialise Postgres cluster",
            Shell::new(["/etc/init.d/postgresql setup"])
                .only_if(Condition::missing(DATA_MARKER)),
        ),
        Operation::new(
            "Activate Postgres",
            Service::running("postgresql").enabled(true),
        ),
        role(ROLE),
        database(DATABASE, ROLE),
    ]
}

pub fn role(name: &str) -> Operation {
    Operation::new(
        format!("Create {} role", name.to_uppercase()),
        Shell::new([psql("-c", &format!("CREATE ROLE \"{name}\" LOGIN"))]).only_if(!exists(
            &format!("SELECT 1 FROM pg_roles WHERE rolname = '{name}'"),
        )),
    )
}

pub fn database(name: &str, owner: &str) -> Operation {
    Operation::new(
        format!("Create {} database", name.to_uppercase()),
        Shell::new([psql(
            "-c",
            &format!("CREATE DATABASE \"{name}\" OWNER \"{owner}\""),
        )])
        .only_if(!exists(&format!(
            "SELECT 1 FROM pg_database WHERE datname = '{name}'"
        ))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Executor, Host, MockFetcher, MockTransport, Outcome, OsFamily};
    use std::sync::Arc;

    #[test]
    fn test_psql_quoting() {
        let command = psql("-c", "CREATE ROLE \"atc\" LOGIN");
        assert!(command.starts_with("su postgres -s /bin/sh -c 'psql -c "));
        assert!(command.contains(r#"CREATE ROLE "atc" LOGIN"#));
        assert!(command.ends_with('\''));
    }

    #[test]
    fn test_existing_role_and_database_left_alone() {
        let mock = MockTransport::new("ci");
        mock.on_ok("su postgres -s /bin/sh -c 'psql -tAc", "1\n");
        let mut host = Host::new("ci", OsFamily::Alpine, mock.clone());

        let result = Executor::new(Arc::new(MockFetcher::new()))
            .run_simple(&mut host, &[role(ROLE), database(DATABASE, ROLE)]);
        assert!(result.is_success());
        assert_eq!(result.changed_count(), 0);
        assert!(!mock.ran("su postgres -s /bin/sh -c 'psql -c"));
    }

    #[test]
    fn test_missing_role_is_created() {
        let mock = MockTransport::new("ci");
        let mut host = Host::new("ci", OsFamily::Alpine, mock.clone());

        let result = Executor::new(Arc::new(MockFetcher::new()))
            .run_simple(&mut host, &[role(ROLE)]);
        assert_eq!(
            result.report("Create ATC role").map(|r| &r.outcome),
            Some(&Outcome::Changed)
        );
        assert!(mock.ran("su postgres -s /bin/sh -c 'psql -c"));
    }
}
