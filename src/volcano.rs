//! Typed view of the external gang scheduler's `batch.volcano.sh/v1alpha1`
//! `Job` CRD (spec §6), submitted via [`kube::api::DynamicObject`] since this
//! operator does not own that CRD's schema.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::core::{ApiResource, GroupVersionKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VOLCANO_GROUP: &str = "batch.volcano.sh";
pub const VOLCANO_VERSION: &str = "v1alpha1";
pub const VOLCANO_KIND: &str = "Job";

/// The `ApiResource` for Volcano `Job`, known statically since the group and
/// kind are fixed and a discovery round-trip buys nothing here (spec §9,
/// "typed representation ... submitted through `DynamicObject` against a
/// statically-known `ApiResource`").
pub fn api_resource() -> ApiResource {
    let gvk = GroupVersionKind {
        group: VOLCANO_GROUP.to_string(),
        version: VOLCANO_VERSION.to_string(),
        kind: VOLCANO_KIND.to_string(),
    };
    ApiResource::from_gvk(&gvk)
}

/// `spec` of a Volcano `Job`, serialized into a [`kube::api::DynamicObject`]'s
/// `data["spec"]` by the template renderer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolcanoJobSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    #[serde(default)]
    pub plugins: std::collections::BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub policies: Vec<VolcanoLifecyclePolicy>,

    pub tasks: Vec<VolcanoTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolcanoLifecyclePolicy {
    pub event: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolcanoTask {
    pub name: String,
    pub replicas: i32,

    /// Spec §4.1 "complete-job-on-task-completion": the result-component task
    /// carries this policy so the gang job ends once it exits successfully.
    #[serde(default)]
    pub policies: Vec<VolcanoLifecyclePolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
}

impl VolcanoTask {
    /// spec §4.1: "the task whose successful termination means 'benchmark
    /// done' carries a complete-job-on-task-completion policy".
    pub fn completes_job_on_success(name: impl Into<String>, replicas: i32) -> Self {
        VolcanoTask {
            name: name.into(),
            replicas,
            policies: vec![VolcanoLifecyclePolicy {
                event: "TaskCompleted".to_string(),
                action: "CompleteJob".to_string(),
            }],
            template: None,
        }
    }
}

/// Standard plugins every benchmark job requests (spec §6): `env` (inject
/// `VC_*` peer env vars), `ssh` (generate and mount SSH keys), `svc` (mount
/// the headless service's DNS suffix).
pub fn standard_plugins() -> std::collections::BTreeMap<String, Vec<String>> {
    let mut plugins = std::collections::BTreeMap::new();
    plugins.insert("env".to_string(), vec![]);
    plugins.insert("ssh".to_string(), vec![]);
    plugins.insert("svc".to_string(), vec![]);
    plugins
}

/// `PodEvicted -> RestartJob` (spec §6): preemption of a running task
/// restarts the whole gang rather than failing it outright.
pub fn restart_on_eviction_policy() -> VolcanoLifecyclePolicy {
    VolcanoLifecyclePolicy {
        event: "PodEvicted".to_string(),
        action: "RestartJob".to_string(),
    }
}

/// Wraps a rendered [`VolcanoJobSpec`] as the JSON body of a `DynamicObject`.
pub fn to_dynamic_spec(spec: &VolcanoJobSpec) -> Value {
    serde_json::to_value(spec).expect("VolcanoJobSpec always serializes")
}
