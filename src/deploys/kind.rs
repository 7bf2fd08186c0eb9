//! KIND (Kubernetes in Docker) nodes backed by containerd.

use super::debian;
use converge::operation::{Download, File, Packages, Service, Shell};
use converge::{Condition, Error, Host, Operation, Result};

pub const KIND_RELEASE: &str = "https://kind.sigs.k8s.io/dl/v0.28.0/kind-linux-amd64";
pub const NERD_RELEASE: &str = "https://github.com/containerd/nerdctl/releases/download/v2.1.1/nerdctl-2.1.1-linux-amd64.tar.gz";

/// Interface whose first address the API server binds to
pub const INTERFACE: &str = "enp1s0";

const NERDCTL: &str = "/usr/local/bin/nerdctl";
const NERD_ARCHIVE: &str = "/tmp/nerdctl.tar.gz";
const KIND_CONFIG: &str = "/root/kind-cfg.yaml";

/// Debian node: containerd and runc from sid, upstream kind and nerdctl.
///
/// Reads the host's IPv4 addresses to build the cluster config.
pub fn debian_node(host: &mut Host) -> Result<Vec<Operation>> {
    let address = api_address(host)?;

    let mut ops = debian::base();
    ops.extend([
        Operation::new(
            "Install packages",
            Packages::new(["containernetworking-plugins", "kubernetes-client", "iptables"]),
        ),
        Operation::new(
            "Install containerd and runc from sid",
            Packages::new(["containerd", "runc", "kubernetes-client"]).extra_args(["-t", "sid"]),
        ),
        Operation::new(
            "Enable containerd",
            Service::running("containerd").enabled(true),
        ),
        Operation::new(
            "Download KIND",
            Download::new(KIND_RELEASE, "/usr/local/bin/kind").mode(0o755),
        ),
        Operation::new("Download NerdCTL", Download::new(NERD_RELEASE, NERD_ARCHIVE))
            .when(Condition::missing(NERDCTL)),
        Operation::new(
            "Extract NerdCTL",
            Shell::new([
                format!("tar -xf {NERD_ARCHIVE} -C /usr/local/bin"),
                format!("chmod +x {NERDCTL}"),
            ]),
        )
        .when(Condition::missing(NERDCTL)),
        Operation::new(
            "Put KIND config",
            File::new(KIND_CONFIG).content(cluster_config(&address)),
        ),
    ]);
    Ok(ops)
}

/// Alpine node using the distribution's kind and nerdctl packages.
pub fn alpine_node() -> Vec<Operation> {
    vec![
        Operation::new(
            "Install packages",
            Packages::new(["containerd", "kind", "nerdctl", "kubectl", "iptables"]),
        ),
        Operation::new(
            "Enable cgroups v2",
            Service::running("cgroups").enabled(true),
        ),
        Operation::new(
            "Enable containerd",
            Service::running("containerd").enabled(true),
        ),
    ]
}

fn api_address(host: &mut Host) -> Result<String> {
    host.ipv4_addrs()?
        .remove(INTERFACE)
        .and_then(|addrs| addrs.into_iter().next())
        .ok_or_else(|| {
            Error::Config(format!(
                "{}: interface {INTERFACE} has no IPv4 address",
                host.name()
            ))
        })
}

/// Two-node cluster with the API server on `address` and HTTP(S) exposed
/// on the control plane (443/80) and the worker (8443/8080).
pub fn cluster_config(address: &str) -> String {
    format!(
        r#"kind: Cluster
apiVersion: kind.x-k8s.io/v1alpha4
networking:
  apiServerAddress: "{address}"
  apiServerPort: 6443
nodes:
- role: control-plane
  extraPortMappings:
  - containerPort: 443
    hostPort: 443
    protocol: TCP
  - containerPort: 80
    hostPort: 80
    protocol: TCP
- role: worker
  extraPortMappings:
  - containerPort: 443
    hostPort: 8443
    protocol: TCP
  - containerPort: 80
    hostPort: 8080
    protocol: TCP
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploys::assert_unique_names;
    use converge::operation::OperationKind;
    use converge::{MockTransport, OsFamily};

    const IP_OUTPUT: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: enp1s0    inet 192.168.122.10/24 brd 192.168.122.255 scope global enp1s0\\       valid_lft forever
2: enp1s0    inet 192.168.122.11/24 scope global secondary enp1s0\\       valid_lft forever
";

    fn node() -> (Host, MockTransport) {
        let mock = MockTransport::new("kind-1");
        mock.on_ok("ip -o -4 addr show", IP_OUTPUT);
        (Host::new("kind-1", OsFamily::Debian, mock.clone()), mock)
    }

    #[test]
    fn test_config_uses_first_address() {
        let (mut host, _) = node();
        let ops = debian_node(&mut host).unwrap();
        assert_unique_names(&ops);

        let config = ops
            .iter()
            .find_map(|op| match &op.kind {
                OperationKind::FilePresent(file) if file.path == KIND_CONFIG => {
                    file.content.clone()
                }
                _ => None,
            })
            .unwrap();
        let config = String::from_utf8(config).unwrap();
        assert!(config.contains("apiServerAddress: \"192.168.122.10\""));
        assert!(config.contains("hostPort: 8443"));
    }

    #[test]
    fn test_missing_interface_is_config_error() {
        let mock = MockTransport::new("kind-1");
        mock.on_ok("ip -o -4 addr show", "1: lo    inet 127.0.0.1/8 scope host lo\n");
        let mut host = Host::new("kind-1", OsFamily::Debian, mock);

        let err = debian_node(&mut host).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(INTERFACE));
    }

    #[test]
    fn test_sid_packages_use_target_release() {
        let (mut host, _) = node();
        let ops = debian_node(&mut host).unwrap();
        let sid = ops
            .iter()
            .find(|op| op.name == "Install containerd and runc from sid")
            .unwrap();
        let OperationKind::PackageInstalled(packages) = &sid.kind else {
            panic!("expected a package operation");
        };
        assert_eq!(packages.extra_args, vec!["-t", "sid"]);
    }

    #[test]
    fn test_nerdctl_guarded_on_binary() {
        let (mut host, _) = node();
        let ops = debian_node(&mut host).unwrap();
        for name in ["Download NerdCTL", "Extract NerdCTL"] {
            let op = ops.iter().find(|op| op.name == name).unwrap();
            assert_eq!(op.when, Some(Condition::missing(NERDCTL)));
        }
    }

    #[test]
    fn test_alpine_node_services() {
        let ops = alpine_node();
        assert_unique_names(&ops);
        assert_eq!(ops.len(), 3);
    }
}
