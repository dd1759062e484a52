use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A parameter sweep over a benchmark template (spec §3, §4.2).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "BenchmarkSet",
    plural = "benchmarksets",
    status = "BenchmarkSetStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSetSpec {
    pub template: BenchmarkTemplate,

    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    #[serde(default)]
    pub permutations: Permutations,
}

fn default_repetitions() -> u32 {
    1
}

/// The child benchmark manifest a set expands into many of.
///
/// `kind` names one of the benchmark CRD kinds (e.g. `"IPerf"`); `spec` is
/// the template's base spec, which each permutation is deep-merged into
/// (spec §4.2 step 4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkTemplate {
    pub kind: String,
    pub spec: serde_json::Value,
}

/// The product/explicit sweep space (spec §4.2 steps 1-2).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Permutations {
    /// Cartesian product of named value lists, in declaration order (spec
    /// §4.2 step 1: "the order keys appear"). A `Vec` rather than a map
    /// preserves that order regardless of JSON/YAML decoder map ordering.
    #[serde(default)]
    pub product: Vec<ProductAxis>,

    /// Explicit permutations appended verbatim after the product.
    #[serde(default)]
    pub explicit: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// One named axis of the Cartesian product: a field name and its candidate
/// values.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductAxis {
    pub name: String,
    pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    #[serde(default)]
    pub succeeded: u32,

    #[serde(default)]
    pub failed: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl BenchmarkSetStatus {
    /// A set is terminal when every child has reported (spec §3 invariant).
    pub fn is_terminal(&self) -> bool {
        match self.count {
            Some(count) => self.succeeded + self.failed == count,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_shape() {
        let crd = BenchmarkSet::crd();
        assert_eq!(crd.spec.names.kind, "BenchmarkSet");
        assert_eq!(crd.spec.names.plural, "benchmarksets");
    }

    #[test]
    fn test_default_repetitions_is_one() {
        let json = r#"{"template":{"kind":"IPerf","spec":{"image":"x"}}}"#;
        let spec: BenchmarkSetSpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.repetitions, 1);
        assert!(spec.permutations.product.is_empty());
        assert!(spec.permutations.explicit.is_empty());
    }

    #[test]
    fn test_status_not_terminal_without_count() {
        let status = BenchmarkSetStatus::default();
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_status_terminal_when_all_children_report() {
        let status = BenchmarkSetStatus {
            count: Some(4),
            succeeded: 3,
            failed: 1,
            ..Default::default()
        };
        assert!(status.is_terminal());
    }

    #[test]
    fn test_status_not_terminal_when_partial() {
        let status = BenchmarkSetStatus {
            count: Some(4),
            succeeded: 2,
            failed: 1,
            ..Default::default()
        };
        assert!(!status.is_terminal());
    }
}
