//! Concourse CI: release install, OpenRC services, first boot and keys.

use converge::operation::{Directory, Download, File, Line, Packages, Service, Shell};
use converge::{Condition, Error, Fetcher, Operation, Result};
use fetchkit::{Algorithm, checksum};

pub const VERSION: &str = "7.13.1";
pub const USER: &str = "atc";
pub const GROUP: &str = "atc";
pub const ETC_DIR: &str = "/etc/concourse";

const INSTALL_DIR: &str = "/usr/local/concourse";
const BINARY: &str = "/usr/local/concourse/bin/concourse";
const WEB_CONF: &str = "/etc/conf.d/concourse-web";
const TEST_USER_ON: &str = r#"test_local_user="YES""#;
const TEST_USER_OFF: &str = r#"#test_local_user="NO""#;
const KEYS: [&str; 3] = ["session_signing_key", "tsa_host_key", "authorized_worker_keys"];

const WEB_INITD: &str = include_str!("../assets/concourse-web.initd");
const WEB_CONFD: &str = include_str!("../assets/concourse-web.confd");
const WORKER_INITD: &str = include_str!("../assets/concourse-worker.initd");

pub fn release_url(version: &str) -> String {
    format!(
        "https://github.com/concourse/concourse/releases/download/v{version}/concourse-{version}-linux-amd64.tgz"
    )
}

/// Everything after the Alpine base and PostgreSQL.
pub fn operations(fetcher: &dyn Fetcher) -> Result<Vec<Operation>> {
    let mut ops = install(fetcher, VERSION)?;
    ops.extend(services(USER, GROUP));
    ops.extend(first_run(USER, GROUP));
    ops.push(Operation::new(
        "Starting Web",
        Service::running("concourse-web").enabled(true),
    ));
    ops.push(Operation::new(
        "Starting worker",
        Service::running("concourse-worker").enabled(true),
    ));
    Ok(ops)
}

/// Install `version` unless the installed binary already reports it.
///
/// The SHA-1 published next to the release is resolved now, so a missing
/// checksum file fails the deploy before anything is changed.
pub fn install(fetcher: &dyn Fetcher, version: &str) -> Result<Vec<Operation>> {
    let url = release_url(version);
    let checksum = checksum::resolve(fetcher, &url, Algorithm::Sha1).map_err(|source| {
        Error::ChecksumFetch {
            url: url.clone(),
            source,
        }
    })?;
    if checksum.is_none() {
        log::warn!("no SHA-1 published for {url}; download will not be verified");
    }

    let target = format!("/tmp/concourse-{version}.tgz");
    let outdated = !Condition::CommandOutputIs {
        command: format!("[ -x {BINARY} ] && {BINARY} --version || true"),
        expected: version.to_string(),
    };

    Ok(vec![
        Operation::new("Add iptables", Packages::new(["iptables"])),
        Operation::new(
            "Enable cgroups v2",
            Service::running("cgroups").enabled(true),
        ),
        Operation::new(
            format!("Downloading v{version}"),
            Download::new(url, &target).checksum(checksum),
        )
        .when(outdated.clone()),
        Operation::new(
            "Delete previous version",
            Directory::new(INSTALL_DIR).absent(),
        )
        .when(outdated.clone()),
        Operation::new(
            "Extract",
            Shell::new([format!("tar -zxf {target} -C /usr/local")]),
        )
        .when(outdated),
        Operation::new("Deleted tgz file", File::new(&target).absent())
            .when(Condition::changed("Extract")),
    ])
}

/// Init scripts, service account and config directory.
pub fn services(user: &str, group: &str) -> Vec<Operation> {
    vec![
        Operation::new(
            "web Init",
            File::new("/etc/init.d/concourse-web")
                .content(WEB_INITD)
                .mode(0o755),
        ),
        Operation::new("web Conf", File::new(WEB_CONF).content(WEB_CONFD).mode(0o644)),
        Operation::new(
            "Worker Init",
            File::new("/etc/init.d/concourse-worker")
                .content(WORKER_INITD)
                .mode(0o755),
        ),
        Operation::new(
            format!("{group} group"),
            Shell::new([format!("grep -q ^{group}: /etc/group || addgroup -S {group}")])
                .only_if(Condition::GroupMissing(group.to_string())),
        ),
        Operation::new(
            format!("{user} user"),
            Shell::new([format!(
                "grep -q ^{user}: /etc/passwd || adduser -S -D -H -g '' -G {group} -h / -s /sbin/nologin {user}"
            )])
            .only_if(Condition::UserMissing(user.to_string())),
        ),
        Operation::new(
            "Config directory",
            Directory::new(ETC_DIR).owner(user, group),
        ),
    ]
}

/// Generate missing keys, then boot the web node once with a local test
/// user so the database is initialised.
///
/// The boot only happens on the run that created the session signing key.
pub fn first_run(user: &str, group: &str) -> Vec<Operation> {
    let mut ops = Vec::new();
    for key in KEYS {
        let key_file = format!("{ETC_DIR}/{key}");
        let kind = if key == "session_signing_key" { "rsa" } else { "ssh" };

        ops.push(Operation::new(
            format!("Gen: {key}"),
            Shell::new([format!("{BINARY} generate-key -t {kind} -f {key_file}")])
                .only_if(Condition::missing(&key_file)),
        ));
        ops.push(
            Operation::new(format!("Mod: {key}"), File::new(&key_file).owner(user, group))
                .when(Condition::exists(&key_file)),
        );
        if kind == "ssh" {
            let public = format!("{key_file}.pub");
            ops.push(
                Operation::new(format!("Mod: {key}.pub"), File::new(&public).owner(user, group))
                    .when(Condition::exists(&public)),
            );
        }
    }

    let first_boot = Condition::changed("Gen: session_signing_key");
    ops.extend([
        Operation::new(
            "First boot with testing user",
            Line::new(WEB_CONF, TEST_USER_ON).replacing(TEST_USER_OFF),
        )
        .when(first_boot.clone()),
        Operation::new(
            "Starting Web for first boot",
            Service::running("concourse-web"),
        )
        .when(first_boot.clone()),
        Operation::new("Wait for first launch", Shell::new([wait_for_port(8080, 60)]))
            .when(first_boot.clone()),
        Operation::new("Stopping Web", Service::stopped("concourse-web")).when(first_boot),
        Operation::new(
            "Revert first boot changes",
            Line::new(WEB_CONF, TEST_USER_OFF).replacing(TEST_USER_ON),
        )
        .when(Condition::changed("First boot with testing user")),
    ]);
    ops
}

/// Poll until something listens on `port`, failing after `attempts` seconds.
fn wait_for_port(port: u16, attempts: u32) -> String {
    format!(
        "i=0; until netstat -tln | grep -q ':{port} '; do \
         i=$((i+1)); [ $i -ge {attempts} ] && exit 1; sleep 1; done"
    )
}
