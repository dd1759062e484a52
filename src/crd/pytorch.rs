use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BenchmarkStatus, CommonBenchmarkSpec};

/// A PyTorch timing benchmark running a bundled training/inference script
/// (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "PyTorch",
    plural = "pytorches",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PyTorchSpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    /// Name of the bundled script to run inside the image.
    pub script: String,

    /// Number of worker pods; single-pod scripts use 1.
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,

    /// Whether the script expects a GPU device.
    #[serde(default)]
    pub gpu: bool,
}

fn default_num_workers() -> u32 {
    1
}
