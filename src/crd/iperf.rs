use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BenchmarkStatus, CommonBenchmarkSpec};

/// A network-throughput benchmark driven by `iperf3` (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "IPerf",
    plural = "iperfs",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IPerfSpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    /// Number of parallel client streams (`iperf3 -P`).
    #[serde(default = "default_streams")]
    pub streams: u32,

    /// Test duration in seconds (`iperf3 -t`).
    #[serde(default = "default_duration")]
    pub duration: u32,

    /// Target bandwidth (`iperf3 -b`), e.g. `"1G"`. Unlimited if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<String>,
}

fn default_streams() -> u32 {
    1
}

fn default_duration() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_shape() {
        let crd = IPerf::crd();
        assert_eq!(crd.spec.group, "perftest.stackhpc.com");
        assert_eq!(crd.spec.names.kind, "IPerf");
        assert_eq!(crd.spec.names.plural, "iperfs");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn test_defaults_applied_on_empty_json() {
        let json = r#"{"image":"networkstatic/iperf3:latest"}"#;
        let spec: IPerfSpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.streams, 1);
        assert_eq!(spec.duration, 10);
        assert_eq!(spec.bandwidth, None);
        assert_eq!(spec.common.image, "networkstatic/iperf3:latest");
    }

    #[test]
    fn test_common_fields_flatten_into_spec_json() {
        let spec = IPerfSpec {
            common: CommonBenchmarkSpec {
                image: "networkstatic/iperf3:latest".to_string(),
                host_network: true,
                ..Default::default()
            },
            streams: 4,
            duration: 30,
            bandwidth: None,
        };
        let json = serde_json::to_value(&spec).expect("should serialize");
        assert_eq!(json["image"], "networkstatic/iperf3:latest");
        assert_eq!(json["hostNetwork"], true);
        assert_eq!(json["streams"], 4);
    }
}
