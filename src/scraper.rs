//! Log collection for the result component (spec §4.5): once a benchmark's
//! gang job reports success, the controller reads back the result
//! component's pod logs and hands them to the matching parser.

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::Client;

use crate::settings::Settings;

/// Fetch and concatenate logs from every pod of `component` belonging to
/// `bench_name` (spec §4.5: "the result component's pods, concatenated in
/// list order"). Returns `None` if no matching pod exists yet rather than
/// erroring, since summarising can be retried.
pub async fn fetch_component_logs(
    client: Client,
    namespace: &str,
    settings: &Settings,
    kind: &str,
    bench_name: &str,
    component: &str,
    timeout: Duration,
) -> Result<Option<String>, kube::Error> {
    let labels = &settings.labels;
    let selector = format!(
        "{}={},{}={},{}={}",
        labels.kind_label, kind, labels.name_label, bench_name, labels.component_label, component
    );

    let pods: Api<Pod> = Api::namespaced(client, namespace);
    let list = pods.list(&ListParams::default().labels(&selector)).await?;

    if list.items.is_empty() {
        return Ok(None);
    }

    let log_params = LogParams {
        timestamps: false,
        ..Default::default()
    };

    let mut combined = String::new();
    for pod in &list.items {
        let Some(pod_name) = pod.metadata.name.as_deref() else {
            continue;
        };
        let fetch = pods.logs(pod_name, &log_params);
        match tokio::time::timeout(timeout, fetch).await {
            Ok(result) => combined.push_str(&result?),
            Err(_) => tracing::warn!(pod = pod_name, "log_fetch_timed_out"),
        }
        combined.push('\n');
    }

    if combined.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(combined))
}
