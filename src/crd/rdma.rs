use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BenchmarkStatus, CommonBenchmarkSpec};

/// An RDMA bandwidth benchmark driven by perftest's `ib_write_bw`/`ib_read_bw`
/// (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "RDMABandwidth",
    plural = "rdmabandwidths",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RDMABandwidthSpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ib_device: Option<String>,

    #[serde(default = "default_duration")]
    pub duration: u32,
}

/// An RDMA latency benchmark driven by perftest's `ib_write_lat`/`ib_read_lat`
/// (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "RDMALatency",
    plural = "rdmalatencies",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RDMALatencySpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ib_device: Option<String>,

    #[serde(default = "default_duration")]
    pub duration: u32,
}

fn default_duration() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_bandwidth_crd_shape() {
        let crd = RDMABandwidth::crd();
        assert_eq!(crd.spec.names.kind, "RDMABandwidth");
        assert_eq!(crd.spec.names.plural, "rdmabandwidths");
    }

    #[test]
    fn test_latency_crd_shape() {
        let crd = RDMALatency::crd();
        assert_eq!(crd.spec.names.kind, "RDMALatency");
        assert_eq!(crd.spec.names.plural, "rdmalatencies");
    }

    #[test]
    fn test_bandwidth_default_duration() {
        let json = r#"{"image":"perftest:latest"}"#;
        let spec: RDMABandwidthSpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.duration, 10);
        assert_eq!(spec.ib_device, None);
    }

    #[test]
    fn test_latency_ib_device_override() {
        let json = r#"{"image":"perftest:latest","ibDevice":"mlx5_0","duration":20}"#;
        let spec: RDMALatencySpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.ib_device.as_deref(), Some("mlx5_0"));
        assert_eq!(spec.duration, 20);
    }
}
