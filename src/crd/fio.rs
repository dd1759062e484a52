use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BenchmarkStatus, CommonBenchmarkSpec};

/// A storage I/O benchmark driven by `fio` (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "Fio",
    plural = "fios",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FioSpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    /// Number of parallel worker pods sharing `volumeClaimTemplate`.
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,

    /// Name of a bundled fio job file; a simple default is used if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_file: Option<String>,

    /// `fio --rw` value, e.g. `"read"`, `"randwrite"`.
    #[serde(default = "default_rw")]
    pub rw: String,

    pub volume_claim_template: VolumeClaimTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimTemplate {
    pub access_modes: Vec<String>,
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

impl VolumeClaimTemplate {
    /// Spec §8 scenario "Fio RWM": `ReadWriteMany` means all workers share
    /// one PVC instead of one-per-worker.
    pub fn is_shared(&self) -> bool {
        self.access_modes
            .iter()
            .any(|m| m == "ReadWriteMany" || m == "ReadOnlyMany")
    }
}

fn default_num_workers() -> u32 {
    1
}

fn default_rw() -> String {
    "read".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_shape() {
        let crd = Fio::crd();
        assert_eq!(crd.spec.names.kind, "Fio");
        assert_eq!(crd.spec.names.plural, "fios");
    }

    #[test]
    fn test_defaults() {
        let json = r#"{"image":"fio:latest","volumeClaimTemplate":{"accessModes":["ReadWriteOnce"],"storage":"10Gi"}}"#;
        let spec: FioSpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.num_workers, 1);
        assert_eq!(spec.rw, "read");
        assert!(!spec.volume_claim_template.is_shared());
    }

    #[test]
    fn test_rwm_is_shared() {
        let vct = VolumeClaimTemplate {
            access_modes: vec!["ReadWriteMany".to_string()],
            storage: "10Gi".to_string(),
            storage_class_name: None,
        };
        assert!(vct.is_shared());
    }

    #[test]
    fn test_rwo_is_not_shared() {
        let vct = VolumeClaimTemplate {
            access_modes: vec!["ReadWriteOnce".to_string()],
            storage: "10Gi".to_string(),
            storage_class_name: None,
        };
        assert!(!vct.is_shared());
    }
}
