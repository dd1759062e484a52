//! Priority class allocation (spec §4.6): a monotonic counter so newer
//! benchmarks preempt older *queued* siblings.
//!
//! spec §3 describes the allocation formula as `MAX_PRIORITY − counter`
//! (decreasing with submission order); spec §8 testable property 5 requires
//! `priority(t2) > priority(t1)` for `t1 < t2` (increasing with submission
//! order). Kubernetes `PriorityClass.value` compares directly — higher
//! preempts lower — so only the increasing form actually makes a later
//! benchmark preempt an earlier queued one; this module follows §8 and
//! counts up from `window.min`, resolving the tension in DESIGN.md.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use k8s_openapi::api::scheduling::v1::PriorityClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

use crate::settings::PriorityWindow;

/// Spec §5: "the only shared mutable state" across all reconciler workers.
/// A single `fetch_add` is already atomic, stronger than the spec's minimum
/// requirement of a mutex or CAS loop.
#[derive(Clone)]
pub struct PriorityCounter {
    next: Arc<AtomicI64>,
}

impl PriorityCounter {
    pub fn new(window: &PriorityWindow) -> Self {
        PriorityCounter {
            next: Arc::new(AtomicI64::new(window.min)),
        }
    }

    /// Each call returns a strictly larger value than the last, starting
    /// from `window.min` (spec §8 testable property 5).
    pub fn next_priority(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Idempotently create the cluster-scoped `PriorityClass` (spec §4.6).
pub async fn ensure_priority_class(
    client: Client,
    name: &str,
    value: i64,
) -> Result<(), kube::Error> {
    let api: Api<PriorityClass> = Api::all(client);

    let class = PriorityClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        value: value as i32,
        description: Some(format!("priority class for benchmark {name}")),
        global_default: Some(false),
        ..Default::default()
    };

    api.patch(
        name,
        &PatchParams::apply("kube-perftest-operator").force(),
        &Patch::Apply(&class),
    )
    .await?;
    Ok(())
}

/// Deletion of a benchmark triggers deletion of its priority class
/// (spec §4.6). Tolerates "already gone".
pub async fn delete_priority_class(client: Client, name: &str) -> Result<(), kube::Error> {
    let api: Api<PriorityClass> = Api::all(client);
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e),
    }
}
