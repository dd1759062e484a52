//! The template renderer (spec §4.3): a pure function
//! `(spec, settings) -> child API objects`, built directly as typed
//! `k8s-openapi` structs rather than string templates (spec §9 redesign
//! flag).

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodAffinityTerm,
    PodAntiAffinity, PodSecurityContext, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec, TopologySpreadConstraint,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};

use crate::crd::{CommonBenchmarkSpec, ImagePullPolicy};
use crate::crd::fio::VolumeClaimTemplate;
use crate::discovery;
use crate::settings::Settings;
use crate::volcano::{standard_plugins, restart_on_eviction_policy, VolcanoJobSpec, VolcanoTask};

/// Configuration-class rendering failures (spec §7): contradictory or
/// incomplete spec fields caught while building child objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    InvalidSpec(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::InvalidSpec(reason) => write!(f, "invalid spec: {reason}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// One gang-job task before rendering into a `VolcanoTask` (spec §4.1,
/// §4.3): "the task whose successful termination means benchmark done
/// carries a complete-job-on-task-completion policy".
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub replicas: i32,
    pub command: Vec<String>,
    pub completes_job: bool,
    /// Port the wait-for-port init container should probe on peer tasks
    /// before this task's main container starts (spec §4.4 step 5).
    pub probe_port: Option<u16>,
}

pub struct RenderedChildren {
    pub job_spec: VolcanoJobSpec,
    pub service: Service,
    pub discovery_configmap: k8s_openapi::api::core::v1::ConfigMap,
    pub pvcs: Vec<PersistentVolumeClaim>,
}

/// Identity labels every child pod carries (spec §3): the *only* channel
/// used to locate and filter pods.
pub fn identity_labels(
    settings: &Settings,
    kind: &str,
    namespace: &str,
    name: &str,
    component: &str,
) -> BTreeMap<String, String> {
    let labels = &settings.labels;
    let mut map = BTreeMap::new();
    map.insert(labels.kind_label.clone(), kind.to_string());
    map.insert(labels.namespace_label.clone(), namespace.to_string());
    map.insert(labels.name_label.clone(), name.to_string());
    map.insert(labels.component_label.clone(), component.to_string());
    map
}

fn bench_labels(settings: &Settings, kind: &str, namespace: &str, name: &str) -> BTreeMap<String, String> {
    let labels = &settings.labels;
    let mut map = BTreeMap::new();
    map.insert(labels.kind_label.clone(), kind.to_string());
    map.insert(labels.namespace_label.clone(), namespace.to_string());
    map.insert(labels.name_label.clone(), name.to_string());
    map
}

/// Render every child object for a benchmark (spec §4.3). `exclusive`
/// selects the spread-vs-exclusive affinity rule (spec §4.3 last bullet):
/// pure-network benchmarks (iperf, RDMA*, MPI PingPong) pass `true`.
pub fn render_children(
    kind: &str,
    name: &str,
    namespace: &str,
    common: &CommonBenchmarkSpec,
    tasks: &[TaskSpec],
    priority_class_name: &str,
    settings: &Settings,
    exclusive: bool,
) -> Result<RenderedChildren, TemplateError> {
    common
        .validate()
        .map_err(TemplateError::InvalidSpec)?;

    let owner_labels = bench_labels(settings, kind, namespace, name);
    let task_counts: Vec<(String, u32)> = tasks
        .iter()
        .map(|t| (t.name.clone(), t.replicas.max(0) as u32))
        .collect();
    let peers = discovery::expected_peers(&task_counts);

    let discovery_configmap = discovery::render_configmap(name, namespace, &task_counts, &owner_labels);

    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(owner_labels.clone()),
            ports: Some(vec![ServicePort {
                name: Some("default".to_string()),
                port: 0,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut volcano_tasks = Vec::with_capacity(tasks.len());
    for task in tasks {
        let component_labels = identity_labels(settings, kind, namespace, name, &task.name);
        let pod_template = render_pod_template(
            name,
            common,
            task,
            &peers,
            &component_labels,
            priority_class_name,
            settings,
            exclusive,
        )?;

        let mut volcano_task = if task.completes_job {
            VolcanoTask::completes_job_on_success(&task.name, task.replicas)
        } else {
            VolcanoTask {
                name: task.name.clone(),
                replicas: task.replicas,
                policies: Vec::new(),
                template: None,
            }
        };
        volcano_task.template = Some(pod_template);
        volcano_tasks.push(volcano_task);
    }

    let job_spec = VolcanoJobSpec {
        min_available: Some(tasks.iter().map(|t| t.replicas).sum()),
        max_retry: Some(3),
        scheduler_name: Some(settings.scheduler_name.clone()),
        queue: Some(settings.queue_name.clone()),
        priority_class_name: Some(priority_class_name.to_string()),
        plugins: standard_plugins(),
        policies: vec![restart_on_eviction_policy()],
        tasks: volcano_tasks,
    };

    Ok(RenderedChildren {
        job_spec,
        service,
        discovery_configmap,
        pvcs: Vec::new(),
    })
}

#[allow(clippy::too_many_arguments)]
fn render_pod_template(
    bench_name: &str,
    common: &CommonBenchmarkSpec,
    task: &TaskSpec,
    peers: &[discovery::PeerSlot],
    labels: &BTreeMap<String, String>,
    priority_class_name: &str,
    settings: &Settings,
    exclusive: bool,
) -> Result<PodTemplateSpec, TemplateError> {
    let mut init_containers = Vec::new();

    if let Some(mtu) = common.mtu {
        let interface = if common.host_network { "eth0" } else { "net1" };
        init_containers.push(discovery::render_mtu_init_container(
            &settings.discovery_container_image,
            mtu,
            interface,
        ));
    }

    // Every peer is a rendezvous target except the pod's own identity; a
    // shared per-task template can't know its own ordinal, so "self" is
    // excluded by count here (one fewer than the full roster) and, for the
    // live TCP probe below, by hostname match at container runtime.
    let expected_peer_count = peers.len().saturating_sub(1);

    if expected_peer_count > 0 {
        init_containers.push(discovery::render_wait_for_peers(
            &settings.discovery_container_image,
            &task.name,
            expected_peer_count,
        ));

        if let Some(port) = task.probe_port {
            init_containers.push(discovery::render_wait_for_port(
                &settings.discovery_container_image,
                peers,
                bench_name,
                port,
            ));
        }
    }

    let volume_mounts = discovery::discovery_volume_mounts();
    let volumes = vec![discovery::discovery_volume(bench_name)];

    let main_container = Container {
        name: task.name.clone(),
        image: Some(common.image.clone()),
        image_pull_policy: Some(image_pull_policy_str(common.image_pull_policy).to_string()),
        command: Some(task.command.clone()),
        volume_mounts: Some(volume_mounts),
        resources: common.resources.clone(),
        ports: task.probe_port.map(|p| {
            vec![ContainerPort {
                container_port: p as i32,
                ..Default::default()
            }]
        }),
        ..Default::default()
    };

    let (dns_policy, network_annotation) = if common.host_network {
        (Some("ClusterFirstWithHostNet".to_string()), None)
    } else {
        (None, common.network_name.clone())
    };

    let mut annotations = BTreeMap::new();
    if let Some(network_name) = network_annotation {
        annotations.insert("k8s.v1.cni.cncf.io/networks".to_string(), network_name);
    }

    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(annotations)
            },
            ..Default::default()
        }),
        spec: Some(PodSpec {
            host_network: Some(common.host_network),
            dns_policy,
            priority_class_name: Some(priority_class_name.to_string()),
            init_containers: if init_containers.is_empty() {
                None
            } else {
                Some(init_containers)
            },
            containers: vec![main_container],
            volumes: Some(volumes),
            affinity: Some(render_affinity(labels, exclusive)),
            topology_spread_constraints: if exclusive {
                None
            } else {
                Some(render_topology_spread_constraints(labels))
            },
            security_context: Some(PodSecurityContext::default()),
            ..Default::default()
        }),
    })
}

fn image_pull_policy_str(policy: Option<ImagePullPolicy>) -> &'static str {
    match policy.unwrap_or_default() {
        ImagePullPolicy::Always => "Always",
        ImagePullPolicy::IfNotPresent => "IfNotPresent",
        ImagePullPolicy::Never => "Never",
    }
}

/// Scheduling affinities (spec §4.3 last bullet): spread (anti-affinity
/// against other benchmarks, topology-spread skew=1 per component) for most
/// kinds; exclusive (no other benchmark component on the same node at all)
/// for pure-network kinds.
fn render_affinity(labels: &BTreeMap<String, String>, exclusive: bool) -> Affinity {
    let match_expressions = if exclusive {
        // Any pod carrying the kind-label, regardless of which benchmark —
        // the broadest possible "no other benchmark component" exclusion.
        labels
            .iter()
            .filter(|(k, _)| k.ends_with("kind"))
            .map(|(k, v)| LabelSelectorRequirement {
                key: k.clone(),
                operator: "In".to_string(),
                values: Some(vec![v.clone()]),
            })
            .collect()
    } else {
        labels
            .iter()
            .map(|(k, v)| LabelSelectorRequirement {
                key: k.clone(),
                operator: "In".to_string(),
                values: Some(vec![v.clone()]),
            })
            .collect()
    };

    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_expressions: Some(match_expressions),
                    ..Default::default()
                }),
                topology_key: "kubernetes.io/hostname".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        // Control-plane exclusion is part of the *spread* rule (spec §4.3);
        // exclusive-rule kinds (pure-network benchmarks) get only the
        // broader anti-affinity above.
        node_affinity: if exclusive {
            None
        } else {
            Some(exclude_control_plane_node_affinity())
        },
        ..Default::default()
    }
}

/// Exclude control-plane nodes (spec §4.3): benchmark pods never land on
/// either the current or legacy control-plane node-role label.
fn exclude_control_plane_node_affinity() -> NodeAffinity {
    NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![
                    NodeSelectorRequirement {
                        key: "node-role.kubernetes.io/control-plane".to_string(),
                        operator: "DoesNotExist".to_string(),
                        values: None,
                    },
                    NodeSelectorRequirement {
                        key: "node-role.kubernetes.io/master".to_string(),
                        operator: "DoesNotExist".to_string(),
                        values: None,
                    },
                ]),
                ..Default::default()
            }],
        }),
        ..Default::default()
    }
}

/// Topology-spread skew=1 per component (spec §4.3): pods sharing this
/// task's identity labels spread evenly across nodes rather than piling up.
fn render_topology_spread_constraints(
    labels: &BTreeMap<String, String>,
) -> Vec<TopologySpreadConstraint> {
    vec![TopologySpreadConstraint {
        max_skew: 1,
        topology_key: "kubernetes.io/hostname".to_string(),
        when_unsatisfiable: "ScheduleAnyway".to_string(),
        label_selector: Some(LabelSelector {
            match_labels: Some(labels.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }]
}

/* ============================= PERSISTENT VOLUMES ============================= */

/// Spec §8 "Fio RWM": `ReadWriteMany`/`ReadOnlyMany` means all workers share
/// one PVC; otherwise each worker gets its own.
pub fn render_fio_pvcs(
    bench_name: &str,
    namespace: &str,
    num_workers: u32,
    template: &VolumeClaimTemplate,
    owner_labels: &BTreeMap<String, String>,
) -> Vec<PersistentVolumeClaim> {
    let mut requests = BTreeMap::new();
    requests.insert(
        "storage".to_string(),
        k8s_openapi::apimachinery::pkg::api::resource::Quantity(template.storage.clone()),
    );

    let spec = PersistentVolumeClaimSpec {
        access_modes: Some(template.access_modes.clone()),
        storage_class_name: template.storage_class_name.clone(),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            ..Default::default()
        }),
        ..Default::default()
    };

    let names: Vec<String> = if template.is_shared() {
        vec![format!("{bench_name}-data")]
    } else {
        (0..num_workers)
            .map(|i| format!("{bench_name}-data-{i}"))
            .collect()
    };

    names
        .into_iter()
        .map(|name| PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(namespace.to_string()),
                labels: Some(owner_labels.clone()),
                ..Default::default()
            },
            spec: Some(spec.clone()),
            ..Default::default()
        })
        .collect()
}
