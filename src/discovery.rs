//! The pod-discovery / rendezvous protocol (spec §4.4, §4.7): bootstrap a
//! benchmark's host roster and gate worker startup until peers are
//! reachable.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, ConfigMapVolumeSource, Container, EnvVar, SecurityContext,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

use crate::settings::Settings;

/// One participating pod slot: `<bench>-<task>-<ordinal>` (spec §4.3, §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSlot {
    pub task: String,
    pub ordinal: u32,
}

impl PeerSlot {
    /// Predicted stable DNS name under the benchmark's headless service.
    pub fn dns_name(&self, bench_name: &str) -> String {
        format!("{}-{}-{}.{}", bench_name, self.task, self.ordinal, bench_name)
    }
}

/// Build the full expected peer roster for a set of `{task: replica_count}`
/// pairs, in task-declaration order (mirrors a gang job's `tasks[]` list).
pub fn expected_peers(tasks: &[(String, u32)]) -> Vec<PeerSlot> {
    let mut peers = Vec::new();
    for (task, replicas) in tasks {
        for ordinal in 0..*replicas {
            peers.push(PeerSlot {
                task: task.clone(),
                ordinal,
            });
        }
    }
    peers
}

/// Render the discovery config map (spec §4.4 step 1): predicted DNS names
/// plus a per-task `<task>-hosts` key for targeted waits, and an initially
/// empty `hosts` key.
pub fn render_configmap(
    bench_name: &str,
    namespace: &str,
    tasks: &[(String, u32)],
    owner_labels: &BTreeMap<String, String>,
) -> ConfigMap {
    let peers = expected_peers(tasks);
    let mut data = BTreeMap::new();

    data.insert("hosts".to_string(), String::new());

    let task_names: std::collections::BTreeSet<&String> =
        tasks.iter().map(|(t, _)| t).collect();
    for task in task_names {
        let names: Vec<String> = peers
            .iter()
            .filter(|p| &p.task == task)
            .map(|p| p.dns_name(bench_name))
            .collect();
        data.insert(format!("{task}-hosts"), names.join("\n"));
    }

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(format!("{bench_name}-hosts")),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels.clone()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Apply (idempotent, server-side) the discovery config map, creating it if
/// absent and leaving a populated `hosts` key untouched.
pub async fn ensure_configmap(
    client: Client,
    namespace: &str,
    configmap: &ConfigMap,
) -> Result<(), kube::Error> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let name = configmap.metadata.name.as_deref().unwrap_or_default();

    if api.get_opt(name).await?.is_some() {
        return Ok(());
    }

    api.patch(
        name,
        &PatchParams::apply("kube-perftest-operator").force(),
        &Patch::Apply(configmap),
    )
    .await?;
    Ok(())
}

/// Pure mirror of the in-pod "wait-for-peers" decision (spec §4.4 step 4,
/// testable property 8): given the current `hosts` file content and the
/// expected peer DNS names, is the roster fully populated?
///
/// Each non-empty line of `hosts_content` is `IP\tDNS`; a peer is satisfied
/// once some line's DNS field matches it exactly.
pub fn peers_satisfied(hosts_content: &str, expected: &[String]) -> bool {
    let known: std::collections::HashSet<&str> = hosts_content
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(str::trim)
        .collect();

    expected.iter().all(|dns| known.contains(dns.as_str()))
}

/// Recompute the `hosts` key content from the currently known pod IPs
/// (spec §4.7): one `IP\tDNS` line per pod that already has both.
pub fn render_hosts_table(known_ips: &[(String, String)]) -> String {
    known_ips
        .iter()
        .map(|(ip, dns)| format!("{ip}\t{dns}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Patch the discovery config map's `hosts` key (spec §4.7): last-write-wins,
/// eventual consistency is sufficient since consumers re-probe.
pub async fn update_hosts_configmap(
    client: Client,
    namespace: &str,
    bench_name: &str,
    known_ips: &[(String, String)],
) -> Result<(), kube::Error> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let name = format!("{bench_name}-hosts");
    let hosts = render_hosts_table(known_ips);

    let patch = serde_json::json!({ "data": { "hosts": hosts } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/* ============================= INIT CONTAINERS ============================= */

/// Shared mount points for the discovery config map (spec §4.4 step 2): the
/// `hosts` key at `/etc/hosts`, the whole map at a config directory.
pub const DISCOVERY_CONFIG_DIR: &str = "/etc/kube-perftest/discovery";
pub const HOSTS_FILE_PATH: &str = "/etc/hosts";

pub fn discovery_volume(bench_name: &str) -> Volume {
    Volume {
        name: "discovery".to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: format!("{bench_name}-hosts"),
            optional: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn discovery_volume_mounts() -> Vec<VolumeMount> {
    vec![
        VolumeMount {
            name: "discovery".to_string(),
            mount_path: HOSTS_FILE_PATH.to_string(),
            sub_path: Some("hosts".to_string()),
            ..Default::default()
        },
        VolumeMount {
            name: "discovery".to_string(),
            mount_path: DISCOVERY_CONFIG_DIR.to_string(),
            ..Default::default()
        },
    ]
}

/// Build the `wait-for-peers` init container (spec §4.4 step 4): the
/// two-phase dance between an unpopulated `/etc/hosts` (force a restart so
/// it remounts) and a populated-but-incomplete one (transient failure,
/// re-tried by the kubelet).
pub fn render_wait_for_peers(
    image: &str,
    task: &str,
    expected_peer_count: usize,
) -> Container {
    let script = format!(
        r#"set -e
expected={expected_peer_count}
if [ ! -s "{hosts}" ]; then
  while [ "$(grep -c . "{dir}/hosts" 2>/dev/null || echo 0)" -lt "$expected" ]; do sleep 2; done
  exit 1
fi
lines=$(grep -c . "{hosts}" 2>/dev/null || echo 0)
if [ "$lines" -lt "$expected" ]; then
  exit 1
fi
exit 0
"#,
        dir = DISCOVERY_CONFIG_DIR,
        hosts = HOSTS_FILE_PATH,
    );

    Container {
        name: "wait-for-peers".to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script]),
        volume_mounts: Some(discovery_volume_mounts()),
        env: Some(vec![EnvVar {
            name: "BENCH_TASK".to_string(),
            value: Some(task.to_string()),
            value_from: None,
        }]),
        ..Default::default()
    }
}

/// Build the `wait-for-port` init container (spec §4.4 step 5): TCP-probe
/// each expected peer's advertised port before the main container starts.
///
/// `peers` may include the pod's own identity (same-task siblings aren't
/// filtered out upstream); the generated script skips whichever entry
/// matches its own hostname rather than probing itself, since that would
/// deadlock against its own not-yet-started main container.
pub fn render_wait_for_port(image: &str, peers: &[PeerSlot], bench_name: &str, port: u16) -> Container {
    let targets = peers
        .iter()
        .map(|p| p.dns_name(bench_name))
        .collect::<Vec<_>>()
        .join(" ");

    let script = format!(
        r#"set -e
self=$(hostname -f)
for host in {targets}; do
  if [ "$host" = "$self" ]; then
    continue
  fi
  until nc -z "$host" {port}; do sleep 2; done
done
"#
    );

    Container {
        name: "wait-for-port".to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script]),
        ..Default::default()
    }
}

/// The MTU-configuration init container (spec §4.3): requires
/// `NET_ADMIN`/`NET_RAW` to set MTU on the pod's network interface.
pub fn render_mtu_init_container(image: &str, mtu: u32, interface: &str) -> Container {
    Container {
        name: "configure-mtu".to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            format!("ip link set dev {interface} mtu {mtu}"),
        ]),
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                add: Some(vec!["NET_ADMIN".to_string(), "NET_RAW".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn discovery_container_image(settings: &Settings) -> &str {
    &settings.discovery_container_image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_peers_orders_by_task_then_ordinal() {
        let tasks = vec![("server".to_string(), 1), ("client".to_string(), 2)];
        let peers = expected_peers(&tasks);
        assert_eq!(
            peers,
            vec![
                PeerSlot { task: "server".to_string(), ordinal: 0 },
                PeerSlot { task: "client".to_string(), ordinal: 0 },
                PeerSlot { task: "client".to_string(), ordinal: 1 },
            ]
        );
    }

    #[test]
    fn test_dns_name_format() {
        let slot = PeerSlot { task: "client".to_string(), ordinal: 1 };
        assert_eq!(slot.dns_name("my-bench"), "my-bench-client-1.my-bench");
    }

    #[test]
    fn test_render_configmap_has_empty_hosts_key_initially() {
        let tasks = vec![("server".to_string(), 1), ("client".to_string(), 1)];
        let cm = render_configmap("bench1", "default", &tasks, &BTreeMap::new());
        let data = cm.data.unwrap();
        assert_eq!(data.get("hosts").unwrap(), "");
        assert!(data.contains_key("server-hosts"));
        assert!(data.contains_key("client-hosts"));
    }

    // ── Discovery liveness (testable property 8) ──

    #[test]
    fn test_peers_satisfied_true_when_all_present() {
        let hosts = "10.0.0.1\tbench-client-0.bench\n10.0.0.2\tbench-client-1.bench\n";
        let expected = vec![
            "bench-client-0.bench".to_string(),
            "bench-client-1.bench".to_string(),
        ];
        assert!(peers_satisfied(hosts, &expected));
    }

    #[test]
    fn test_peers_satisfied_false_when_partial() {
        let hosts = "10.0.0.1\tbench-client-0.bench\n";
        let expected = vec![
            "bench-client-0.bench".to_string(),
            "bench-client-1.bench".to_string(),
        ];
        assert!(!peers_satisfied(hosts, &expected));
    }

    #[test]
    fn test_peers_satisfied_true_on_empty_expectation() {
        assert!(peers_satisfied("", &[]));
    }

    #[test]
    fn test_peers_satisfied_false_on_empty_hosts_nonempty_expectation() {
        assert!(!peers_satisfied("", &["bench-client-0.bench".to_string()]));
    }

    #[test]
    fn test_render_hosts_table_format() {
        let known = vec![
            ("10.0.0.1".to_string(), "bench-client-0.bench".to_string()),
            ("10.0.0.2".to_string(), "bench-client-1.bench".to_string()),
        ];
        let table = render_hosts_table(&known);
        assert_eq!(
            table,
            "10.0.0.1\tbench-client-0.bench\n10.0.0.2\tbench-client-1.bench"
        );
    }

    #[test]
    fn test_wait_for_peers_mounts_discovery_volume() {
        let container = render_wait_for_peers("busybox", "client", 2);
        let mounts = container.volume_mounts.unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mount_path, HOSTS_FILE_PATH);
    }

    #[test]
    fn test_wait_for_peers_gates_on_expected_count() {
        // Both busy-wait branches must threshold on the actual expected
        // peer count, not the task's own predicted roster size.
        let container = render_wait_for_peers("busybox", "client", 3);
        let script = container.command.unwrap()[2].clone();
        assert!(script.contains("expected=3"));
        assert!(script.contains(r#"-lt "$expected""#));
        assert!(!script.contains("known"));
    }

    #[test]
    fn test_wait_for_port_skips_own_hostname() {
        let peers = vec![
            PeerSlot { task: "master".to_string(), ordinal: 0 },
            PeerSlot { task: "master".to_string(), ordinal: 1 },
        ];
        let container = render_wait_for_port("busybox", &peers, "bench", 22);
        let script = container.command.unwrap()[2].clone();
        assert!(script.contains("self=$(hostname -f)"));
        assert!(script.contains("bench-master-0.bench"));
        assert!(script.contains("bench-master-1.bench"));
        assert!(script.contains(r#"if [ "$host" = "$self" ]"#));
    }

    #[test]
    fn test_mtu_init_container_requests_net_admin() {
        let container = render_mtu_init_container("busybox", 9000, "eth0");
        let caps = container
            .security_context
            .unwrap()
            .capabilities
            .unwrap()
            .add
            .unwrap();
        assert!(caps.contains(&"NET_ADMIN".to_string()));
        assert!(caps.contains(&"NET_RAW".to_string()));
    }
}
