use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource};
use prometheus::{Encoder, Histogram, HistogramVec, IntCounterVec, Registry, TextEncoder};
use tokio::signal;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use kube_perftest::crd::{
    BenchmarkSet, Fio, IPerf, MPIPingPong, OpenFOAM, PyTorch, RDMABandwidth, RDMALatency,
};
use kube_perftest::priority::PriorityCounter;
use kube_perftest::reconcile::{self as engine, BenchmarkResource, ReconcileContext};
use kube_perftest::settings::Settings;
use kube_perftest::{benchmarkset, registry};

/* ============================= PROMETHEUS ============================= */

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILE_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new(
            "kubeperftest_reconcile_total",
            "Total reconcile cycles, by benchmark kind",
        ),
        &["kind"],
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric not yet registered");
    c
});

static RECONCILE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new(
            "kubeperftest_reconcile_errors_total",
            "Total reconcile errors, by benchmark kind",
        ),
        &["kind"],
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric not yet registered");
    c
});

static RECONCILE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let h = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "kubeperftest_reconcile_duration_seconds",
            "Duration of each reconcile cycle in seconds, by benchmark kind",
        ),
        &["kind"],
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(h.clone()))
        .expect("metric not yet registered");
    h
});

/* ============================= STATE ============================= */

pub(crate) struct ReconcileState {
    pub(crate) ready: bool,
}

/* ============================= ENTRY ============================= */

/// Startup-phase failures (bad kubeconfig, unreachable cluster) exit the
/// process directly with code 1 (spec.md §6); settings are loaded by the
/// caller, before the log subscriber is initialized, so its `logFormat`
/// choice is live for every line this function logs. Only a post-startup
/// controller-stream error is returned as `Err` so `main` can distinguish
/// it and exit with code 2.
pub async fn run(settings: Settings) -> Result<()> {
    println!("Starting kube-perftest operator...\n");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[FATAL] Failed to load kubeconfig: {e}");
            std::process::exit(1);
        }
    };

    print!("  Cluster connection .......... ");
    match client.apiserver_version().await {
        Ok(v) => println!("OK (v{}.{})", v.major, v.minor),
        Err(e) => {
            println!("FAIL");
            eprintln!("[FATAL] Cannot reach cluster: {e}. Is the cluster running?");
            std::process::exit(1);
        }
    }

    LazyLock::force(&RECONCILE_TOTAL);
    LazyLock::force(&RECONCILE_ERRORS);
    LazyLock::force(&RECONCILE_DURATION);

    let priority_counter = PriorityCounter::new(&settings.priority_window);
    let ctx = Arc::new(ReconcileContext {
        client: client.clone(),
        settings,
        priority_counter,
    });
    let set_ctx = Arc::new(benchmarkset::SetReconcileContext {
        client: client.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], 9090));

    println!("  CRD watch .................... {} kinds under perftest.stackhpc.com/v1alpha1", registry::KIND_TABLE.len() + 1);
    println!("  Metrics server ............... http://{addr}");
    println!();
    println!("  Available endpoints:");
    println!("    GET /healthz .............. Liveness probe (always 200 OK)");
    println!("    GET /readyz ............... Readiness probe (503 until first reconcile, then 200)");
    println!("    GET /metrics .............. Prometheus metrics scrape endpoint");
    println!();
    println!("Operator running. Press Ctrl+C to stop.\n");
    println!("{}", "=".repeat(70));

    info!("operator_controller_started");

    let reconcile_state = Arc::new(Mutex::new(ReconcileState { ready: false }));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_state = reconcile_state.clone();
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle =
        tokio::spawn(async move { start_metrics_server(http_state, http_shutdown, addr).await });

    let all_controllers = run_all_controllers(client.clone(), ctx, set_ctx, reconcile_state.clone());

    tokio::select! {
        _ = all_controllers => {
            info!("operator_controller_stream_ended");
            println!("\nController streams ended unexpectedly.");
        }
        _ = signal::ctrl_c() => {
            info!("shutdown_signal_received");
            println!("\n{}", "=".repeat(70));
            println!("Shutdown signal received. Stopping operator...");
            println!("{}", "=".repeat(70));
        }
    }

    let _ = shutdown_tx.send(());
    let _ = http_handle.await?;

    info!("operator_stopped");
    println!("Operator stopped.");

    Ok(())
}

/// Drive all 7 typed benchmark controllers plus the `BenchmarkSet`
/// controller concurrently (spec.md §4.1/§4.2: one watch per kind, no
/// cross-kind coupling other than the shared priority counter).
async fn run_all_controllers(
    client: Client,
    ctx: Arc<ReconcileContext>,
    set_ctx: Arc<benchmarkset::SetReconcileContext>,
    state: Arc<Mutex<ReconcileState>>,
) {
    let kind_controllers: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>> = vec![
        Box::pin(run_kind_controller::<IPerf>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_kind_controller::<MPIPingPong>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_kind_controller::<OpenFOAM>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_kind_controller::<RDMABandwidth>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_kind_controller::<RDMALatency>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_kind_controller::<Fio>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_kind_controller::<PyTorch>(client.clone(), ctx.clone(), state.clone())),
        Box::pin(run_set_controller(client, set_ctx, state)),
    ];

    futures::future::join_all(kind_controllers).await;
}

async fn run_kind_controller<K>(
    client: Client,
    ctx: Arc<ReconcileContext>,
    state: Arc<Mutex<ReconcileState>>,
) where
    K: BenchmarkResource,
{
    let api: Api<K> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client);

    // Pods are owned by the Volcano `Job`, not directly by the benchmark
    // object, so a plain `.owns()` (which matches via `ownerReferences`)
    // never fires — correlate by the identity labels this operator itself
    // stamps on every pod instead (spec §4.7: pod IP/phase transitions
    // re-wake the reconciler rather than waiting out the poll interval).
    let kind_label = ctx.settings.labels.kind_label.clone();
    let name_label = ctx.settings.labels.name_label.clone();
    let kind = K::kind(&());

    Controller::new(api, Default::default())
        .watches(pods, Default::default(), move |pod: Pod| {
            let labels = pod.metadata.labels.as_ref()?;
            if labels.get(&kind_label).map(String::as_str) != Some(kind.as_ref()) {
                return None;
            }
            let name = labels.get(&name_label)?;
            let namespace = pod.metadata.namespace.as_deref()?;
            Some(ObjectRef::<K>::new(name).within(namespace))
        })
        .run(reconcile_instrumented, error_policy_instrumented, ctx)
        .for_each(move |result| {
            let state = state.clone();
            async move {
                mark_ready(&state).await;
                if let Err(e) = result {
                    warn!(error = %e, "reconcile_dispatch_error");
                }
            }
        })
        .await;
}

async fn run_set_controller(
    client: Client,
    ctx: Arc<benchmarkset::SetReconcileContext>,
    state: Arc<Mutex<ReconcileState>>,
) {
    let api: Api<BenchmarkSet> = Api::all(client);
    Controller::new(api, Default::default())
        .run(benchmarkset::reconcile, benchmarkset::error_policy, ctx)
        .for_each(move |result| {
            let state = state.clone();
            async move {
                mark_ready(&state).await;
                if let Err(e) = result {
                    warn!(error = %e, "benchmarkset_dispatch_error");
                }
            }
        })
        .await;
}

async fn mark_ready(state: &Arc<Mutex<ReconcileState>>) {
    let mut s = state.lock().await;
    if !s.ready {
        s.ready = true;
    }
}

async fn reconcile_instrumented<K>(
    object: Arc<K>,
    ctx: Arc<ReconcileContext>,
) -> std::result::Result<Action, kube::Error>
where
    K: BenchmarkResource,
{
    let kind = object.kind_str();
    RECONCILE_TOTAL.with_label_values(&[kind]).inc();
    let _timer = RECONCILE_DURATION.with_label_values(&[kind]).start_timer();

    let result = engine::reconcile(object, ctx).await;
    if result.is_err() {
        RECONCILE_ERRORS.with_label_values(&[kind]).inc();
    }
    result
}

fn error_policy_instrumented<K>(
    object: Arc<K>,
    error: &kube::Error,
    ctx: Arc<ReconcileContext>,
) -> Action
where
    K: BenchmarkResource,
{
    engine::error_policy(object, error, ctx)
}

/* ============================= HTTP ============================= */

pub(crate) fn build_reconcile_router(state: Arc<Mutex<ReconcileState>>) -> Router {
    Router::new()
        .route("/metrics", get(reconcile_metrics_handler))
        .route("/healthz", get(|| async { (StatusCode::OK, "OK") }))
        .route(
            "/readyz",
            get({
                let state = state.clone();
                move || reconcile_ready_handler(state.clone())
            }),
        )
}

async fn start_metrics_server(
    state: Arc<Mutex<ReconcileState>>,
    mut shutdown: broadcast::Receiver<()>,
    addr: SocketAddr,
) -> Result<()> {
    let app = build_reconcile_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind metrics server on :9090")?;

    info!(addr = %addr, "reconcile_metrics_server_started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

async fn reconcile_ready_handler(state: Arc<Mutex<ReconcileState>>) -> impl IntoResponse {
    let state = state.lock().await;
    if state.ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn reconcile_metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics encoding error".to_string(),
            ),
        },
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics encoding error".to_string(),
        ),
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz_always_ok() {
        let state = Arc::new(Mutex::new(ReconcileState { ready: false }));
        let app = build_reconcile_router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_unavailable_until_ready() {
        let state = Arc::new(Mutex::new(ReconcileState { ready: false }));
        let app = build_reconcile_router(state);

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_ok_once_marked_ready() {
        let state = Arc::new(Mutex::new(ReconcileState { ready: true }));
        let app = build_reconcile_router(state);

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        LazyLock::force(&RECONCILE_TOTAL);
        let state = Arc::new(Mutex::new(ReconcileState { ready: false }));
        let app = build_reconcile_router(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("kubeperftest_reconcile_total"));
    }
}
