//! Permutation expansion and aggregation for [`crate::crd::BenchmarkSet`]
//! (spec §4.2).

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::crd::{BenchmarkSet, BenchmarkSetSpec, BenchmarkSetStatus, Permutations};

/* ============================= EXPANSION ============================= */

/// Expand a set's permutations into one concrete child spec per child (spec
/// §4.2, §8 testable properties 1-3).
///
/// Deterministic: repeated calls with the same input produce byte-identical
/// output in the same order.
pub fn expand(spec: &BenchmarkSetSpec) -> Vec<Value> {
    let points = permutation_points(&spec.permutations);
    let mut out = Vec::with_capacity(points.len() * spec.repetitions.max(1) as usize);

    for _ in 0..spec.repetitions.max(1) {
        for point in &points {
            out.push(deep_merge_into(spec.template.spec.clone(), point));
        }
    }

    out
}

/// The product × explicit permutation list, before repetition (spec §4.2
/// steps 1-2). An empty product contributes a single empty permutation.
fn permutation_points(perms: &Permutations) -> Vec<Map<String, Value>> {
    let mut points = cartesian_product(&perms.product);
    points.extend(perms.explicit.iter().cloned());
    points
}

fn cartesian_product(product: &[crate::crd::benchmarkset::ProductAxis]) -> Vec<Map<String, Value>> {
    let mut points: Vec<Map<String, Value>> = vec![Map::new()];

    for axis in product {
        let mut next = Vec::with_capacity(points.len() * axis.values.len().max(1));
        for existing in &points {
            for value in &axis.values {
                let mut point = existing.clone();
                point.insert(axis.name.clone(), value.clone());
                next.push(point);
            }
        }
        points = next;
    }

    points
}

/// Deep-merge rule (spec §4.2 step 4, §9): scalars and sequences in the
/// permutation replace the template value; nested maps merge recursively;
/// keys absent from the permutation leave the template value untouched.
pub fn deep_merge_into(template: Value, permutation: &Map<String, Value>) -> Value {
    let mut base = match template {
        Value::Object(map) => map,
        other => {
            // A non-object template has nothing sensible to merge into;
            // treat the permutation as the whole spec.
            if permutation.is_empty() {
                return other;
            }
            Map::new()
        }
    };

    for (key, value) in permutation {
        match (base.get(key).cloned(), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let merged = deep_merge_into(Value::Object(existing), incoming);
                base.insert(key.clone(), merged);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(base)
}

/// Count formula for spec §4.2 step 5 / §8 testable property 2.
pub fn expected_count(spec: &BenchmarkSetSpec) -> usize {
    let product_size: usize = spec
        .permutations
        .product
        .iter()
        .map(|axis| axis.values.len().max(1))
        .product::<usize>()
        .max(if spec.permutations.product.is_empty() { 1 } else { 0 });
    let product_size = if spec.permutations.product.is_empty() {
        1
    } else {
        product_size
    };
    let explicit_size = spec.permutations.explicit.len();
    (spec.repetitions.max(1) as usize) * (product_size + explicit_size)
}

/// Child name = `<set-name>-<zero-padded-index>` (spec §4.2 step 5, §8
/// testable property 3).
pub fn child_name(set_name: &str, index: usize, count: usize) -> String {
    let width = index_width(count);
    format!("{set_name}-{index:0width$}", width = width)
}

fn index_width(count: usize) -> usize {
    if count <= 1 {
        1
    } else {
        ((count - 1) as f64).log10().floor() as usize + 1
    }
}

/* ============================= RECONCILE ============================= */

pub struct SetReconcileContext {
    pub client: Client,
}

/// Reconcile a `BenchmarkSet`: expand once, create missing children
/// idempotently by name, recompute aggregate status (spec §4.2).
pub async fn reconcile(
    set: Arc<BenchmarkSet>,
    ctx: Arc<SetReconcileContext>,
) -> Result<Action, kube::Error> {
    let name = set.name_any();
    let namespace = set.namespace().unwrap_or_default();

    if set.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let count = set
        .status
        .as_ref()
        .and_then(|s| s.count)
        .unwrap_or_else(|| expected_count(&set.spec) as u32);

    let children_specs = expand(&set.spec);
    debug_assert_eq!(children_specs.len(), count as usize);

    let (group, version) = ("perftest.stackhpc.com", "v1alpha1");
    let gvk = GroupVersionKind::gvk(group, version, &set.spec.template.kind);
    let ar = ApiResource::from_gvk(&gvk);
    let plural = ar.plural.clone();
    let children_api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), &namespace, &ar);

    // ── Ensure every child exists (idempotent create-if-absent) ──
    for (index, child_spec) in children_specs.iter().enumerate() {
        let name = child_name(&name_of(&set), index, count as usize);

        if children_api.get_opt(&name).await?.is_some() {
            continue;
        }

        let mut object = DynamicObject::new(&name, &ar);
        object.metadata = ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            owner_references: Some(vec![set.controller_owner_ref(&()).ok_or_else(|| {
                kube::Error::Discovery(kube::core::discovery::Error::MissingResource(
                    "owner reference".to_string(),
                ))
            })?]),
            ..Default::default()
        };
        object.data = serde_json::json!({ "spec": child_spec });

        match children_api.create(&Default::default(), &object).await {
            Ok(_) => {
                info!(set = %name_of(&set), child = %name, "benchmarkset_child_created");
            }
            Err(kube::Error::Api(err)) if err.code == 409 => {
                // Already exists (race with a previous partial reconcile).
            }
            Err(e) => return Err(e),
        }
    }

    // ── Recompute aggregate status from current children ──
    let existing = children_api.list(&Default::default()).await?;
    let prefix = format!("{}-", name_of(&set));

    let mut succeeded = 0u32;
    let mut failed = 0u32;

    for child in &existing.items {
        let is_ours = child
            .metadata
            .name
            .as_deref()
            .is_some_and(|n| n.starts_with(&prefix));
        if !is_ours {
            continue;
        }
        let phase = child
            .data
            .get("status")
            .and_then(|s| s.get("phase"))
            .and_then(|p| p.as_str());
        match phase {
            Some("Succeeded") => succeeded += 1,
            Some("Failed") => failed += 1,
            _ => {}
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let created_at = set
        .status
        .as_ref()
        .and_then(|s| s.created_at.clone())
        .unwrap_or_else(|| now.clone());

    let terminal = succeeded + failed >= count;
    let finished_at = if terminal {
        set.status
            .as_ref()
            .and_then(|s| s.finished_at.clone())
            .or_else(|| Some(now.clone()))
    } else {
        None
    };

    let status = BenchmarkSetStatus {
        count: Some(count),
        succeeded,
        failed,
        created_at: Some(created_at),
        finished_at,
    };

    let sets_api: Api<BenchmarkSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let status_patch = serde_json::json!({ "status": status });
    sets_api
        .patch_status(
            &name_of(&set),
            &PatchParams::apply("kube-perftest-operator"),
            &Patch::Merge(&status_patch),
        )
        .await?;

    info!(
        set = %name_of(&set),
        plural = %plural,
        count,
        succeeded,
        failed,
        "benchmarkset_reconciled"
    );

    if terminal {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(Duration::from_secs(15)))
    }
}

pub fn error_policy(
    _set: Arc<BenchmarkSet>,
    error: &kube::Error,
    _ctx: Arc<SetReconcileContext>,
) -> Action {
    warn!(error = %error, "benchmarkset_reconcile_error");
    Action::requeue(Duration::from_secs(60))
}

fn name_of(set: &BenchmarkSet) -> String {
    set.name_any()
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::benchmarkset::{BenchmarkTemplate, ProductAxis};
    use serde_json::json;

    fn axis(name: &str, values: &[Value]) -> ProductAxis {
        ProductAxis {
            name: name.to_string(),
            values: values.to_vec(),
        }
    }

    fn base_spec(template_spec: Value) -> BenchmarkSetSpec {
        BenchmarkSetSpec {
            template: BenchmarkTemplate {
                kind: "IPerf".to_string(),
                spec: template_spec,
            },
            repetitions: 1,
            permutations: Permutations::default(),
        }
    }

    // ── Determinism (testable property 1) ──

    #[test]
    fn test_expand_is_deterministic() {
        let mut spec = base_spec(json!({"image": "x", "duration": 30}));
        spec.permutations.product = vec![axis("streams", &[json!(1), json!(2)])];
        spec.repetitions = 2;

        let a = expand(&spec);
        let b = expand(&spec);
        assert_eq!(a, b);
    }

    // ── Count correctness (testable property 2) ──

    #[test]
    fn test_count_empty_permutations_yields_repetitions() {
        let mut spec = base_spec(json!({"image": "x"}));
        spec.repetitions = 3;
        assert_eq!(expand(&spec).len(), 3);
        assert_eq!(expected_count(&spec), 3);
    }

    #[test]
    fn test_count_product_times_repetitions() {
        let mut spec = base_spec(json!({"image": "x"}));
        spec.permutations.product = vec![axis("streams", &[json!(1), json!(2)])];
        spec.repetitions = 2;
        // product_size=2, explicit=0, repetitions=2 -> 4
        assert_eq!(expand(&spec).len(), 4);
        assert_eq!(expected_count(&spec), 4);
    }

    #[test]
    fn test_count_product_and_explicit_combined() {
        let mut spec = base_spec(json!({"image": "x"}));
        spec.permutations.product = vec![axis("streams", &[json!(1), json!(2)])];
        spec.permutations.explicit = vec![{
            let mut m = serde_json::Map::new();
            m.insert("streams".to_string(), json!(8));
            m
        }];
        spec.repetitions = 1;
        // product_size=2 + explicit=1 = 3
        assert_eq!(expand(&spec).len(), 3);
        assert_eq!(expected_count(&spec), 3);
    }

    #[test]
    fn test_benchmarkset_product_scenario_from_spec() {
        // spec §8 "BenchmarkSet product" scenario.
        let mut spec = base_spec(json!({"duration": 30}));
        spec.permutations.product = vec![axis("streams", &[json!(1), json!(2)])];
        spec.repetitions = 2;

        let children = expand(&spec);
        assert_eq!(children.len(), 4);

        let streams: Vec<i64> = children
            .iter()
            .map(|c| c["streams"].as_i64().unwrap())
            .collect();
        // repetitions outermost: [1,2,1,2]
        assert_eq!(streams, vec![1, 2, 1, 2]);
    }

    // ── Name stability (testable property 3) ──

    #[test]
    fn test_child_name_zero_padded() {
        assert_eq!(child_name("sweep", 0, 12), "sweep-00");
        assert_eq!(child_name("sweep", 11, 12), "sweep-11");
        assert_eq!(child_name("sweep", 3, 4), "sweep-3");
        assert_eq!(child_name("sweep", 0, 1), "sweep-0");
        assert_eq!(child_name("sweep", 99, 100), "sweep-99");
        assert_eq!(child_name("sweep", 0, 100), "sweep-00");
    }

    // ── Deep-merge semantics (spec §9) ──

    #[test]
    fn test_deep_merge_scalar_replaces() {
        let template = json!({"image": "a", "duration": 10});
        let mut perm = Map::new();
        perm.insert("duration".to_string(), json!(99));
        let merged = deep_merge_into(template, &perm);
        assert_eq!(merged["duration"], 99);
        assert_eq!(merged["image"], "a");
    }

    #[test]
    fn test_deep_merge_sequence_replaces_not_concatenates() {
        let template = json!({"tags": ["a", "b"]});
        let mut perm = Map::new();
        perm.insert("tags".to_string(), json!(["c"]));
        let merged = deep_merge_into(template, &perm);
        assert_eq!(merged["tags"], json!(["c"]));
    }

    #[test]
    fn test_deep_merge_nested_maps_merge_recursively() {
        let template = json!({"resources": {"requests": {"cpu": "1"}, "limits": {"cpu": "2"}}});
        let mut perm = Map::new();
        let mut requests = Map::new();
        requests.insert("memory".to_string(), json!("1Gi"));
        let mut resources = Map::new();
        resources.insert("requests".to_string(), Value::Object(requests));
        perm.insert("resources".to_string(), Value::Object(resources));

        let merged = deep_merge_into(template, &perm);
        assert_eq!(merged["resources"]["requests"]["cpu"], "1");
        assert_eq!(merged["resources"]["requests"]["memory"], "1Gi");
        assert_eq!(merged["resources"]["limits"]["cpu"], "2");
    }

    #[test]
    fn test_deep_merge_absent_keys_untouched() {
        let template = json!({"image": "a", "streams": 4});
        let merged = deep_merge_into(template.clone(), &Map::new());
        assert_eq!(merged, template);
    }
}
