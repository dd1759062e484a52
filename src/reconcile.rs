//! The generic benchmark lifecycle reconciler (spec §4.1): one state
//! machine, instantiated once per CRD kind via the [`BenchmarkResource`]
//! trait.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::crd::fio::{Fio, FioSpec};
use crate::crd::iperf::{IPerf, IPerfSpec};
use crate::crd::mpi_pingpong::{MPIPingPong, MPIPingPongSpec};
use crate::crd::openfoam::{OpenFOAM, OpenFOAMSpec};
use crate::crd::pytorch::{PyTorch, PyTorchSpec};
use crate::crd::rdma::{RDMABandwidth, RDMABandwidthSpec, RDMALatency, RDMALatencySpec};
use crate::crd::{BenchmarkPhase, BenchmarkResult, BenchmarkStatus, CommonBenchmarkSpec};
use crate::parsers::ParseError;
use crate::priority::{self, PriorityCounter};
use crate::settings::Settings;
use crate::template::{self, RenderedChildren, TaskSpec, TemplateError};
use crate::volcano;

pub const FINALIZER: &str = "perftest.stackhpc.com/cleanup";

fn reconcile_timeout_error() -> kube::Error {
    kube::Error::Service(Box::new(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "reconcile_timeout_secs exceeded",
    )))
}

pub struct ReconcileContext {
    pub client: Client,
    pub settings: Settings,
    pub priority_counter: PriorityCounter,
}

/* ============================= PURE DECISION LOGIC ============================= */

/// What was observed about the child gang job's pods this reconcile
/// (spec §4.1 "Running" row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobObservation {
    StillRunning,
    ResultComponentSucceeded,
    Failed(String),
}

/// Pure phase-transition function (spec §4.1): given the current phase and
/// what was observed this reconcile, decide the next phase. Kept separate
/// from all I/O so it is directly unit-testable (spec §8 testable
/// properties 4 and 6), mirroring the teacher's pure-logic-sibling pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Stay in the same phase; re-queue after the given delay.
    Requeue(BenchmarkPhase, Duration),
    /// Move to a new, non-terminal phase.
    Advance(BenchmarkPhase),
    /// Move to a terminal phase; stop reconciling.
    Terminal(BenchmarkPhase, Option<String>),
}

pub fn next_phase(
    current: BenchmarkPhase,
    priority_class_assigned: bool,
    children_applied: bool,
    job_observation: Option<&JobObservation>,
    parse_result: Option<&Result<BenchmarkResult, ParseError>>,
    requeue_interval: Duration,
) -> ReconcileOutcome {
    // Spec §3, §8 testable property 6: terminal states never change.
    if current.is_terminal() {
        return ReconcileOutcome::Terminal(current, None);
    }

    match current {
        BenchmarkPhase::Pending => {
            if priority_class_assigned {
                ReconcileOutcome::Advance(BenchmarkPhase::Preparing)
            } else {
                ReconcileOutcome::Requeue(BenchmarkPhase::Pending, requeue_interval)
            }
        }
        BenchmarkPhase::Preparing => {
            if children_applied {
                ReconcileOutcome::Advance(BenchmarkPhase::Running)
            } else {
                ReconcileOutcome::Requeue(BenchmarkPhase::Preparing, requeue_interval)
            }
        }
        BenchmarkPhase::Running => match job_observation {
            Some(JobObservation::ResultComponentSucceeded) => {
                ReconcileOutcome::Advance(BenchmarkPhase::Summarising)
            }
            Some(JobObservation::Failed(reason)) => {
                ReconcileOutcome::Terminal(BenchmarkPhase::Failed, Some(reason.clone()))
            }
            Some(JobObservation::StillRunning) | None => {
                ReconcileOutcome::Requeue(BenchmarkPhase::Running, requeue_interval)
            }
        },
        BenchmarkPhase::Summarising => match parse_result {
            Some(Ok(_)) => ReconcileOutcome::Terminal(BenchmarkPhase::Succeeded, None),
            Some(Err(err)) => {
                ReconcileOutcome::Terminal(BenchmarkPhase::Failed, Some(err.failure_reason()))
            }
            None => ReconcileOutcome::Requeue(BenchmarkPhase::Summarising, requeue_interval),
        },
        BenchmarkPhase::Succeeded | BenchmarkPhase::Failed | BenchmarkPhase::Terminating => {
            ReconcileOutcome::Terminal(current, None)
        }
    }
}

/// Classify a Volcano `Job`'s status (spec §4.1): success is defined by the
/// result-component task completing, matching the `TaskCompleted ->
/// CompleteJob` policy rendered onto it.
pub fn classify_job_status(status: &serde_json::Value) -> JobObservation {
    let phase = status
        .get("state")
        .and_then(|s| s.get("phase"))
        .and_then(|p| p.as_str())
        .unwrap_or("");

    match phase {
        "Completed" | "Completing" => JobObservation::ResultComponentSucceeded,
        "Failed" | "Aborted" | "Terminated" => {
            let reason = status
                .get("state")
                .and_then(|s| s.get("reason"))
                .and_then(|r| r.as_str())
                .unwrap_or("child job reported failure")
                .to_string();
            JobObservation::Failed(reason)
        }
        _ => JobObservation::StillRunning,
    }
}

/* ============================= RESOURCE TRAIT ============================= */

/// One benchmark kind's kind-specific behavior (spec §4.1, §9 "registry of
/// typed handlers"). Realized as Rust trait dispatch: one `impl` per CRD
/// struct, instantiated into its own `Controller` rather than a runtime
/// string-keyed table.
pub trait BenchmarkResource:
    Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    fn common(&self) -> &CommonBenchmarkSpec;
    fn status(&self) -> Option<&BenchmarkStatus>;
    fn kind_str(&self) -> &'static str;
    fn result_component(&self) -> &'static str;
    fn exclusive_affinity(&self) -> bool;
    fn tasks(&self, name: &str) -> Vec<TaskSpec>;
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError>;

    fn render(
        &self,
        name: &str,
        namespace: &str,
        priority_class_name: &str,
        settings: &Settings,
    ) -> Result<RenderedChildren, TemplateError> {
        template::render_children(
            self.kind_str(),
            name,
            namespace,
            self.common(),
            &self.tasks(name),
            priority_class_name,
            settings,
            self.exclusive_affinity(),
        )
    }
}

/* ============================= GENERIC RECONCILER ============================= */

pub async fn reconcile<K>(
    object: Arc<K>,
    ctx: Arc<ReconcileContext>,
) -> Result<Action, kube::Error>
where
    K: BenchmarkResource,
{
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();
    let kind = object.kind_str();
    let requeue_interval = Duration::from_secs(ctx.settings.requeue_interval_secs);

    if object.meta().deletion_timestamp.is_some() {
        return handle_deletion(&object, &ctx).await;
    }

    ensure_finalizer(&object, &ctx.client).await?;

    let current_status = object.status().cloned().unwrap_or_default();
    let current_phase = current_status.phase();

    if current_phase.is_terminal() {
        return Ok(Action::await_change());
    }

    info!(kind, bench = %name, namespace = %namespace, phase = ?current_phase, "reconcile_start");

    let reconcile_timeout = Duration::from_secs(ctx.settings.reconcile_timeout_secs);

    let (new_status, outcome) = tokio::time::timeout(reconcile_timeout, async {
        match current_phase {
            BenchmarkPhase::Pending => {
                reconcile_pending(&object, &ctx, &name, &namespace, current_status, requeue_interval).await
            }
            BenchmarkPhase::Preparing => {
                reconcile_preparing(&object, &ctx, &name, &namespace, current_status, requeue_interval).await
            }
            BenchmarkPhase::Running => {
                reconcile_running(&object, &ctx, &name, &namespace, current_status, requeue_interval).await
            }
            BenchmarkPhase::Summarising => {
                reconcile_summarising(&object, &ctx, &name, &namespace, current_status, requeue_interval).await
            }
            BenchmarkPhase::Succeeded | BenchmarkPhase::Failed | BenchmarkPhase::Terminating => {
                Ok((current_status.clone(), ReconcileOutcome::Terminal(current_phase, None)))
            }
        }
    })
    .await
    .map_err(|_| reconcile_timeout_error())??;

    tokio::time::timeout(
        reconcile_timeout,
        patch_status::<K>(&ctx.client, &namespace, &name, &new_status),
    )
    .await
    .map_err(|_| reconcile_timeout_error())??;

    info!(kind, bench = %name, namespace = %namespace, phase = ?new_status.phase(), "reconcile_done");

    match outcome {
        ReconcileOutcome::Requeue(_, delay) => Ok(Action::requeue(delay)),
        ReconcileOutcome::Advance(_) => Ok(Action::requeue(Duration::from_secs(1))),
        ReconcileOutcome::Terminal(phase, _) if phase.is_terminal() => Ok(Action::await_change()),
        ReconcileOutcome::Terminal(_, _) => Ok(Action::requeue(requeue_interval)),
    }
}

async fn reconcile_pending<K: BenchmarkResource>(
    object: &K,
    ctx: &ReconcileContext,
    name: &str,
    _namespace: &str,
    mut status: BenchmarkStatus,
    requeue_interval: Duration,
) -> Result<(BenchmarkStatus, ReconcileOutcome), kube::Error> {
    // Drawing from the shared monotonic counter must happen at most once per
    // benchmark: a redraw on a retried Pending observation (e.g. a prior
    // `patch_status` conflict) would scramble the ascending-creation-order
    // guarantee relative to other benchmarks created in between.
    if status.priority_class_name.is_none() {
        let priority_class_name = format!("{name}-priority");
        let priority_value = ctx.priority_counter.next_priority();

        priority::ensure_priority_class(ctx.client.clone(), &priority_class_name, priority_value).await?;

        status.priority_class_name = Some(priority_class_name);
    }
    status.started_at = Some(status.started_at.clone().unwrap_or_else(|| chrono::Utc::now().to_rfc3339()));
    status.observed_generation = object.meta().generation;

    let outcome = next_phase(
        BenchmarkPhase::Pending,
        true,
        false,
        None,
        None,
        requeue_interval,
    );
    apply_outcome_to_status(&mut status, &outcome);
    Ok((status, outcome))
}

async fn reconcile_preparing<K: BenchmarkResource>(
    object: &K,
    ctx: &ReconcileContext,
    name: &str,
    namespace: &str,
    mut status: BenchmarkStatus,
    requeue_interval: Duration,
) -> Result<(BenchmarkStatus, ReconcileOutcome), kube::Error> {
    let priority_class_name = status
        .priority_class_name
        .clone()
        .unwrap_or_else(|| format!("{name}-priority"));

    let rendered = match object.render(name, namespace, &priority_class_name, &ctx.settings) {
        Ok(rendered) => rendered,
        Err(err) => {
            let outcome = ReconcileOutcome::Terminal(
                BenchmarkPhase::Failed,
                Some(format!("configuration error: {err}")),
            );
            apply_outcome_to_status(&mut status, &outcome);
            return Ok((status, outcome));
        }
    };

    apply_children(ctx, namespace, object, &rendered).await?;

    let outcome = next_phase(
        BenchmarkPhase::Preparing,
        true,
        true,
        None,
        None,
        requeue_interval,
    );
    apply_outcome_to_status(&mut status, &outcome);
    Ok((status, outcome))
}

async fn apply_children<K: BenchmarkResource>(
    ctx: &ReconcileContext,
    namespace: &str,
    object: &K,
    rendered: &RenderedChildren,
) -> Result<(), kube::Error> {
    let name = object.name_any();
    let apply_params = PatchParams::apply("kube-perftest-operator").force();

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    services
        .patch(&name, &apply_params, &Patch::Apply(&rendered.service))
        .await?;

    let configmaps: Api<k8s_openapi::api::core::v1::ConfigMap> =
        Api::namespaced(ctx.client.clone(), namespace);
    configmaps
        .patch(
            &format!("{name}-hosts"),
            &apply_params,
            &Patch::Apply(&rendered.discovery_configmap),
        )
        .await?;

    let volcano_ar = volcano::api_resource();
    let jobs: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, &volcano_ar);

    let mut job_object = DynamicObject::new(&name, &volcano_ar);
    job_object.metadata.namespace = Some(namespace.to_string());
    job_object.metadata.owner_references = object.controller_owner_ref(&()).map(|r| vec![r]);
    job_object.data = serde_json::json!({ "spec": rendered.job_spec });

    jobs.patch(&name, &apply_params, &Patch::Apply(&job_object)).await?;

    for pvc in &rendered.pvcs {
        let pvcs: Api<k8s_openapi::api::core::v1::PersistentVolumeClaim> =
            Api::namespaced(ctx.client.clone(), namespace);
        let pvc_name = pvc.metadata.name.clone().unwrap_or_default();
        if pvcs.get_opt(&pvc_name).await?.is_none() {
            match pvcs.create(&Default::default(), pvc).await {
                Ok(_) => {}
                Err(kube::Error::Api(err)) if err.code == 409 => {}
                Err(err) => return Err(err),
            }
        }
    }

    Ok(())
}

async fn reconcile_running<K: BenchmarkResource>(
    object: &K,
    ctx: &ReconcileContext,
    name: &str,
    namespace: &str,
    mut status: BenchmarkStatus,
    requeue_interval: Duration,
) -> Result<(BenchmarkStatus, ReconcileOutcome), kube::Error> {
    let volcano_ar = volcano::api_resource();
    let jobs: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, &volcano_ar);

    let observation = match jobs.get_opt(name).await? {
        Some(job) => job
            .data
            .get("status")
            .map(classify_job_status)
            .unwrap_or(JobObservation::StillRunning),
        None => JobObservation::StillRunning,
    };

    update_discovery_hosts(ctx, object, name, namespace).await?;

    let outcome = next_phase(
        BenchmarkPhase::Running,
        true,
        true,
        Some(&observation),
        None,
        requeue_interval,
    );
    apply_outcome_to_status(&mut status, &outcome);
    Ok((status, outcome))
}

async fn update_discovery_hosts<K: BenchmarkResource>(
    ctx: &ReconcileContext,
    object: &K,
    name: &str,
    namespace: &str,
) -> Result<(), kube::Error> {
    let labels = &ctx.settings.labels;
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let selector = format!(
        "{}={},{}={}",
        labels.kind_label,
        object.kind_str(),
        labels.name_label,
        name
    );
    let list = pods
        .list(&kube::api::ListParams::default().labels(&selector))
        .await?;

    let known_ips: Vec<(String, String)> = list
        .items
        .iter()
        .filter_map(|pod| {
            let ip = pod.status.as_ref()?.pod_ip.clone()?;
            pod.metadata.labels.as_ref()?.get(&labels.component_label)?;
            let pod_name = pod.metadata.name.clone()?;
            Some((ip, format!("{pod_name}.{name}")))
        })
        .collect();

    if !known_ips.is_empty() {
        crate::discovery::update_hosts_configmap(ctx.client.clone(), namespace, name, &known_ips).await?;
    }

    Ok(())
}

async fn reconcile_summarising<K: BenchmarkResource>(
    object: &K,
    ctx: &ReconcileContext,
    name: &str,
    namespace: &str,
    mut status: BenchmarkStatus,
    requeue_interval: Duration,
) -> Result<(BenchmarkStatus, ReconcileOutcome), kube::Error> {
    let logs = crate::scraper::fetch_component_logs(
        ctx.client.clone(),
        namespace,
        &ctx.settings,
        object.kind_str(),
        name,
        object.result_component(),
        Duration::from_secs(ctx.settings.scrape_timeout_secs),
    )
    .await?;

    let parsed = match logs {
        Some(logs) => Some(object.parse_result(&logs)),
        None => None,
    };

    if let Some(Ok(ref result)) = parsed {
        status.result = Some(result.clone());
    }

    let outcome = next_phase(
        BenchmarkPhase::Summarising,
        true,
        true,
        None,
        parsed.as_ref(),
        requeue_interval,
    );
    apply_outcome_to_status(&mut status, &outcome);
    Ok((status, outcome))
}

fn apply_outcome_to_status(status: &mut BenchmarkStatus, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Requeue(phase, _) => status.phase = Some(*phase),
        ReconcileOutcome::Advance(phase) => status.phase = Some(*phase),
        ReconcileOutcome::Terminal(phase, reason) => {
            status.phase = Some(*phase);
            if phase.is_terminal() {
                status.finished_at = Some(status.finished_at.clone().unwrap_or_else(|| chrono::Utc::now().to_rfc3339()));
            }
            if reason.is_some() {
                status.failure_reason = reason.clone();
            }
        }
    }
}

async fn patch_status<K: BenchmarkResource>(
    client: &Client,
    namespace: &str,
    name: &str,
    status: &BenchmarkStatus,
) -> Result<(), kube::Error> {
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply("kube-perftest-operator"), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

pub fn error_policy<K: BenchmarkResource>(
    _object: Arc<K>,
    error: &kube::Error,
    _ctx: Arc<ReconcileContext>,
) -> Action {
    warn!(error = %error, "reconcile_error");
    Action::requeue(Duration::from_secs(60))
}

/* ============================= FINALIZER ============================= */

fn has_finalizer<K: Resource>(object: &K) -> bool {
    object
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == FINALIZER))
}

async fn ensure_finalizer<K: BenchmarkResource>(object: &K, client: &Client) -> Result<(), kube::Error> {
    if has_finalizer(object) {
        return Ok(());
    }
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": [FINALIZER] } });
    api.patch(&name, &PatchParams::apply("kube-perftest-operator"), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn remove_finalizer<K: BenchmarkResource>(object: &K, client: &Client) -> Result<(), kube::Error> {
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": [] } });
    api.patch(&name, &PatchParams::apply("kube-perftest-operator"), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn handle_deletion<K: BenchmarkResource>(
    object: &K,
    ctx: &ReconcileContext,
) -> Result<Action, kube::Error> {
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();

    info!(bench = %name, namespace = %namespace, "handling_deletion");

    if let Some(priority_class_name) = object.status().and_then(|s| s.priority_class_name.clone()) {
        priority::delete_priority_class(ctx.client.clone(), &priority_class_name).await?;
    }

    if has_finalizer(object) {
        remove_finalizer(object, &ctx.client).await?;
    }

    Ok(Action::await_change())
}

/* ============================= PER-KIND IMPLS ============================= */

impl BenchmarkResource for IPerf {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "IPerf"
    }
    fn result_component(&self) -> &'static str {
        "client"
    }
    fn exclusive_affinity(&self) -> bool {
        true
    }
    fn tasks(&self, name: &str) -> Vec<TaskSpec> {
        iperf_tasks(name, &self.spec)
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::iperf::parse(logs)
    }
}

fn iperf_tasks(name: &str, spec: &IPerfSpec) -> Vec<TaskSpec> {
    let server_dns = format!("{name}-server-0.{name}");
    let mut client_args = vec![
        "iperf3".to_string(),
        "-c".to_string(),
        server_dns,
        "-P".to_string(),
        spec.streams.to_string(),
        "-t".to_string(),
        spec.duration.to_string(),
    ];
    if let Some(bandwidth) = &spec.bandwidth {
        client_args.push("-b".to_string());
        client_args.push(bandwidth.clone());
    }

    vec![
        TaskSpec {
            name: "server".to_string(),
            replicas: 1,
            command: vec!["iperf3".to_string(), "-s".to_string()],
            completes_job: false,
            probe_port: Some(5201),
        },
        TaskSpec {
            name: "client".to_string(),
            replicas: 1,
            command: client_args,
            completes_job: true,
            probe_port: None,
        },
    ]
}

impl BenchmarkResource for MPIPingPong {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "MPIPingPong"
    }
    fn result_component(&self) -> &'static str {
        "master"
    }
    fn exclusive_affinity(&self) -> bool {
        true
    }
    fn tasks(&self, _name: &str) -> Vec<TaskSpec> {
        mpi_pingpong_tasks(&self.spec)
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::mpi_pingpong::parse(logs)
    }
}

fn mpi_pingpong_tasks(spec: &MPIPingPongSpec) -> Vec<TaskSpec> {
    let mut command = vec![
        "mpirun".to_string(),
        "-np".to_string(),
        spec.num_procs.to_string(),
        "mpitests-IMB-MPI1".to_string(),
        "PingPong".to_string(),
    ];
    if let (Some(min), Some(max)) = (spec.min_msg_bytes, spec.max_msg_bytes) {
        command.push("-msglog".to_string());
        command.push(format!("{min}:{max}"));
    }

    vec![TaskSpec {
        name: "master".to_string(),
        replicas: spec.num_procs.max(1) as i32,
        command,
        completes_job: true,
        probe_port: Some(22),
    }]
}

impl BenchmarkResource for OpenFOAM {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "OpenFOAM"
    }
    fn result_component(&self) -> &'static str {
        "master"
    }
    fn exclusive_affinity(&self) -> bool {
        false
    }
    fn tasks(&self, _name: &str) -> Vec<TaskSpec> {
        vec![TaskSpec {
            name: "master".to_string(),
            replicas: 1,
            command: vec![
                "run-openfoam-case".to_string(),
                self.spec.case.clone(),
                self.spec.num_workers.to_string(),
            ],
            completes_job: true,
            probe_port: None,
        }]
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::openfoam::parse(logs)
    }
}

impl BenchmarkResource for RDMABandwidth {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "RDMABandwidth"
    }
    fn result_component(&self) -> &'static str {
        "client"
    }
    fn exclusive_affinity(&self) -> bool {
        true
    }
    fn tasks(&self, name: &str) -> Vec<TaskSpec> {
        rdma_tasks(name, &self.spec.ib_device, self.spec.duration, "ib_write_bw")
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::rdma::parse_bandwidth(logs)
    }
}

impl BenchmarkResource for RDMALatency {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "RDMALatency"
    }
    fn result_component(&self) -> &'static str {
        "client"
    }
    fn exclusive_affinity(&self) -> bool {
        true
    }
    fn tasks(&self, name: &str) -> Vec<TaskSpec> {
        rdma_tasks(name, &self.spec.ib_device, self.spec.duration, "ib_write_lat")
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::rdma::parse_latency(logs)
    }
}

fn rdma_tasks(name: &str, ib_device: &Option<String>, duration: u32, tool: &str) -> Vec<TaskSpec> {
    let server_dns = format!("{name}-server-0.{name}");
    let mut client_command = vec![tool.to_string(), "-D".to_string(), duration.to_string()];
    if let Some(device) = ib_device {
        client_command.push("-d".to_string());
        client_command.push(device.clone());
    }
    client_command.push(server_dns);

    let mut server_command = vec![tool.to_string(), "-D".to_string(), duration.to_string()];
    if let Some(device) = ib_device {
        server_command.push("-d".to_string());
        server_command.push(device.clone());
    }

    vec![
        TaskSpec {
            name: "server".to_string(),
            replicas: 1,
            command: server_command,
            completes_job: false,
            probe_port: Some(18515),
        },
        TaskSpec {
            name: "client".to_string(),
            replicas: 1,
            command: client_command,
            completes_job: true,
            probe_port: None,
        },
    ]
}

impl BenchmarkResource for Fio {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "Fio"
    }
    fn result_component(&self) -> &'static str {
        "master"
    }
    fn exclusive_affinity(&self) -> bool {
        false
    }
    fn tasks(&self, _name: &str) -> Vec<TaskSpec> {
        fio_tasks(&self.spec)
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::fio::parse(logs)
    }

    fn render(
        &self,
        name: &str,
        namespace: &str,
        priority_class_name: &str,
        settings: &Settings,
    ) -> Result<RenderedChildren, TemplateError> {
        let mut rendered = template::render_children(
            self.kind_str(),
            name,
            namespace,
            self.common(),
            &self.tasks(name),
            priority_class_name,
            settings,
            self.exclusive_affinity(),
        )?;

        let labels = template::identity_labels(settings, self.kind_str(), namespace, name, "master");
        rendered.pvcs = template::render_fio_pvcs(
            name,
            namespace,
            self.spec.num_workers,
            &self.spec.volume_claim_template,
            &labels,
        );
        Ok(rendered)
    }
}

fn fio_tasks(spec: &FioSpec) -> Vec<TaskSpec> {
    let job_file = spec.job_file.clone().unwrap_or_else(|| "default.fio".to_string());
    vec![TaskSpec {
        name: "master".to_string(),
        replicas: spec.num_workers.max(1) as i32,
        command: vec![
            "fio".to_string(),
            format!("--name={job_file}"),
            format!("--rw={}", spec.rw),
            "--output-format=json+".to_string(),
        ],
        completes_job: true,
        probe_port: None,
    }]
}

impl BenchmarkResource for PyTorch {
    fn common(&self) -> &CommonBenchmarkSpec {
        &self.spec.common
    }
    fn status(&self) -> Option<&BenchmarkStatus> {
        self.status.as_ref()
    }
    fn kind_str(&self) -> &'static str {
        "PyTorch"
    }
    fn result_component(&self) -> &'static str {
        "client"
    }
    fn exclusive_affinity(&self) -> bool {
        false
    }
    fn tasks(&self, _name: &str) -> Vec<TaskSpec> {
        vec![TaskSpec {
            name: "client".to_string(),
            replicas: self.spec.num_workers.max(1) as i32,
            command: vec!["python".to_string(), self.spec.script.clone()],
            completes_job: true,
            probe_port: None,
        }]
    }
    fn parse_result(&self, logs: &str) -> Result<BenchmarkResult, ParseError> {
        crate::parsers::pytorch::parse(logs)
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    // ── Phase transitions (spec §8 testable properties 4, 6) ──

    #[test]
    fn test_pending_advances_once_priority_assigned() {
        let outcome = next_phase(
            BenchmarkPhase::Pending,
            true,
            false,
            None,
            None,
            Duration::from_secs(30),
        );
        assert_eq!(outcome, ReconcileOutcome::Advance(BenchmarkPhase::Preparing));
    }

    #[test]
    fn test_pending_requeues_without_priority() {
        let outcome = next_phase(
            BenchmarkPhase::Pending,
            false,
            false,
            None,
            None,
            Duration::from_secs(30),
        );
        assert_eq!(
            outcome,
            ReconcileOutcome::Requeue(BenchmarkPhase::Pending, Duration::from_secs(30))
        );
    }

    #[test]
    fn test_preparing_advances_once_children_applied() {
        let outcome = next_phase(
            BenchmarkPhase::Preparing,
            true,
            true,
            None,
            None,
            Duration::from_secs(30),
        );
        assert_eq!(outcome, ReconcileOutcome::Advance(BenchmarkPhase::Running));
    }

    #[test]
    fn test_running_advances_to_summarising_on_success() {
        let outcome = next_phase(
            BenchmarkPhase::Running,
            true,
            true,
            Some(&JobObservation::ResultComponentSucceeded),
            None,
            Duration::from_secs(30),
        );
        assert_eq!(outcome, ReconcileOutcome::Advance(BenchmarkPhase::Summarising));
    }

    #[test]
    fn test_running_fails_terminally_on_job_failure() {
        let outcome = next_phase(
            BenchmarkPhase::Running,
            true,
            true,
            Some(&JobObservation::Failed("OOMKilled".to_string())),
            None,
            Duration::from_secs(30),
        );
        assert_eq!(
            outcome,
            ReconcileOutcome::Terminal(BenchmarkPhase::Failed, Some("OOMKilled".to_string()))
        );
    }

    #[test]
    fn test_summarising_succeeds_on_parse_ok() {
        let result = Ok(BenchmarkResult::IPerf {
            bandwidth_gbps: "0.98".to_string(),
        });
        let outcome = next_phase(
            BenchmarkPhase::Summarising,
            true,
            true,
            None,
            Some(&result),
            Duration::from_secs(30),
        );
        assert_eq!(outcome, ReconcileOutcome::Terminal(BenchmarkPhase::Succeeded, None));
    }

    #[test]
    fn test_summarising_fails_on_parse_error() {
        // spec §8 "Parse failure" scenario.
        let result = Err(ParseError::MissingMarker("summary line".to_string()));
        let outcome = next_phase(
            BenchmarkPhase::Summarising,
            true,
            true,
            None,
            Some(&result),
            Duration::from_secs(30),
        );
        match outcome {
            ReconcileOutcome::Terminal(BenchmarkPhase::Failed, Some(reason)) => {
                assert!(reason.starts_with("parse-error:"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_phases_never_advance() {
        for phase in [BenchmarkPhase::Succeeded, BenchmarkPhase::Failed] {
            let outcome = next_phase(phase, true, true, None, None, Duration::from_secs(30));
            assert_eq!(outcome, ReconcileOutcome::Terminal(phase, None));
        }
    }

    // ── Job status classification ──

    #[test]
    fn test_classify_completed_job_as_success() {
        let status = serde_json::json!({ "state": { "phase": "Completed" } });
        assert_eq!(classify_job_status(&status), JobObservation::ResultComponentSucceeded);
    }

    #[test]
    fn test_classify_failed_job_carries_reason() {
        let status = serde_json::json!({ "state": { "phase": "Failed", "reason": "exceeded maxRetry" } });
        assert_eq!(
            classify_job_status(&status),
            JobObservation::Failed("exceeded maxRetry".to_string())
        );
    }

    #[test]
    fn test_classify_running_job_as_still_running() {
        let status = serde_json::json!({ "state": { "phase": "Running" } });
        assert_eq!(classify_job_status(&status), JobObservation::StillRunning);
    }

    // ── Status mutation from outcomes ──

    #[test]
    fn test_terminal_outcome_sets_finished_at_once() {
        let mut status = BenchmarkStatus::default();
        let outcome = ReconcileOutcome::Terminal(BenchmarkPhase::Succeeded, None);
        apply_outcome_to_status(&mut status, &outcome);
        assert!(status.finished_at.is_some());
        assert_eq!(status.phase(), BenchmarkPhase::Succeeded);
    }

    #[test]
    fn test_finished_at_is_stable_across_repeated_application() {
        let mut status = BenchmarkStatus::default();
        let outcome = ReconcileOutcome::Terminal(BenchmarkPhase::Succeeded, None);
        apply_outcome_to_status(&mut status, &outcome);
        let first = status.finished_at.clone();
        apply_outcome_to_status(&mut status, &outcome);
        assert_eq!(status.finished_at, first);
    }

    #[test]
    fn test_iperf_tasks_client_depends_on_server_dns() {
        let spec = IPerfSpec {
            common: CommonBenchmarkSpec {
                image: "iperf:latest".to_string(),
                ..Default::default()
            },
            streams: 4,
            duration: 5,
            bandwidth: None,
        };
        let tasks = iperf_tasks("bench1", &spec);
        let client = tasks.iter().find(|t| t.name == "client").unwrap();
        assert!(client.command.iter().any(|arg| arg.contains("bench1-server-0.bench1")));
    }
}
