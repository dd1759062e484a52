use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BenchmarkStatus, CommonBenchmarkSpec};

/// A point-to-point MPI latency/bandwidth benchmark using IMB's PingPong
/// benchmark (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "MPIPingPong",
    plural = "mpipingpongs",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MPIPingPongSpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    /// Total MPI ranks across both endpoints; must be even (one pair per node).
    #[serde(default = "default_num_procs")]
    pub num_procs: u32,

    /// Minimum message size in bytes passed to `IMB-MPI1 PingPong -msglog`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_msg_bytes: Option<u32>,

    /// Maximum message size in bytes passed to `IMB-MPI1 PingPong -msglog`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_msg_bytes: Option<u32>,
}

fn default_num_procs() -> u32 {
    2
}

impl MPIPingPongSpec {
    pub fn validate(&self) -> Result<(), String> {
        self.common.validate()?;
        if self.num_procs < 2 || self.num_procs % 2 != 0 {
            return Err("numProcs must be even and at least 2".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_shape() {
        let crd = MPIPingPong::crd();
        assert_eq!(crd.spec.names.kind, "MPIPingPong");
        assert_eq!(crd.spec.names.plural, "mpipingpongs");
    }

    #[test]
    fn test_default_num_procs_is_two() {
        let json = r#"{"image":"mpioperator/intel:latest"}"#;
        let spec: MPIPingPongSpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.num_procs, 2);
    }

    #[test]
    fn test_validate_rejects_odd_num_procs() {
        let spec = MPIPingPongSpec {
            common: CommonBenchmarkSpec {
                image: "x".to_string(),
                ..Default::default()
            },
            num_procs: 3,
            min_msg_bytes: None,
            max_msg_bytes: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_even_num_procs() {
        let spec = MPIPingPongSpec {
            common: CommonBenchmarkSpec {
                image: "x".to_string(),
                ..Default::default()
            },
            num_procs: 4,
            min_msg_bytes: None,
            max_msg_bytes: None,
        };
        assert!(spec.validate().is_ok());
    }
}
