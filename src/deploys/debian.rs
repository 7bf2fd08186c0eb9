//! Debian base system: timezone, sid repository, tooling.

use super::{TIMEZONE, timezone};
use converge::operation::{File, Packages, Shell};
use converge::{Condition, Operation};

const SID_SOURCE: &str = "deb http://ftp.ca.debian.org/debian sid main contrib";
const SID_LIST: &str = "/etc/apt/sources.list.d/sid.list";
const SID_PIN: &str = "/etc/apt/preferences.d/99-debian-sid";

pub fn base() -> Vec<Operation> {
    let mut ops = vec![timezone(TIMEZONE)];
    ops.extend(enable_sid());
    ops.push(tooling());
    ops
}

/// Add the sid repository, pinned low so it is only used on request
/// (`apt-get install -t sid`).
pub fn enable_sid() -> Vec<Operation> {
    vec![
        Operation::new(
            "Sid repository",
            File::new(SID_LIST).content(format!("{SID_SOURCE}\n")).mode(0o644),
        ),
        Operation::new(
            "Pin sid",
            File::new(SID_PIN)
                .content("Package: *\nPin: release a=unstable\nPin-Priority: 10\n")
                .mode(0o644),
        ),
        Operation::new("Update apt index", Shell::new(["apt-get update"])).when(Condition::Any(
            vec![Condition::changed("Sid repository"), Condition::changed("Pin sid")],
        )),
    ]
}

pub fn tooling() -> Operation {
    Operation::new("Install tools", Packages::new(["neovim", "curl", "jq"]))
}
