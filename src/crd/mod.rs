//! Custom resource types for the `perftest.stackhpc.com/v1alpha1` API group.
//!
//! One `#[derive(CustomResource)]` struct per benchmark kind (spec §3, §6),
//! all sharing [`CommonBenchmarkSpec`] and [`BenchmarkStatus`], plus the
//! [`BenchmarkSet`] sweep resource.

use k8s_openapi::api::core::v1::ResourceRequirements;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod benchmarkset;
pub mod fio;
pub mod iperf;
pub mod mpi_pingpong;
pub mod openfoam;
pub mod pytorch;
pub mod rdma;

pub use benchmarkset::{BenchmarkSet, BenchmarkSetSpec, BenchmarkSetStatus, Permutations};
pub use fio::{Fio, FioSpec};
pub use iperf::{IPerf, IPerfSpec};
pub use mpi_pingpong::{MPIPingPong, MPIPingPongSpec};
pub use openfoam::{OpenFOAM, OpenFOAMSpec};
pub use pytorch::{PyTorch, PyTorchSpec};
pub use rdma::{RDMABandwidth, RDMABandwidthSpec, RDMALatency, RDMALatencySpec};

pub const API_GROUP: &str = "perftest.stackhpc.com";
pub const API_VERSION: &str = "v1alpha1";

/* ============================= COMMON SPEC ============================= */

/// Fields shared by every benchmark kind (spec §3 "attributes").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommonBenchmarkSpec {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<ImagePullPolicy>,

    #[serde(default)]
    pub host_network: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "schema_resource_requirements")]
    pub resources: Option<ResourceRequirements>,
}

fn schema_resource_requirements(
    gen: &mut schemars::gen::SchemaGenerator,
) -> schemars::schema::Schema {
    // k8s-openapi types don't derive JsonSchema; CRD validation for this
    // field is left permissive (an open object), matching how the upstream
    // ResourceRequirements field is exposed on most community CRDs.
    let _ = gen;
    schemars::schema::Schema::Bool(true)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ImagePullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl CommonBenchmarkSpec {
    /// Configuration-class validation (spec §7): contradictory fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.host_network && self.network_name.is_some() {
            return Err("hostNetwork and networkName are mutually exclusive".to_string());
        }
        if self.image.trim().is_empty() {
            return Err("image must not be empty".to_string());
        }
        Ok(())
    }
}

/* ============================= STATUS ============================= */

/// Lifecycle phase of a benchmark (spec §3 invariants).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BenchmarkPhase {
    #[default]
    Pending,
    Preparing,
    Running,
    Summarising,
    Succeeded,
    Failed,
    Terminating,
}

impl BenchmarkPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BenchmarkPhase::Succeeded | BenchmarkPhase::Failed)
    }
}

/// The fixed result schema populated by each kind's parser (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "PascalCase")]
pub enum BenchmarkResult {
    IPerf {
        bandwidth_gbps: String,
    },
    MPIPingPong {
        records: Vec<PingPongRecord>,
        smallest_bytes: u64,
        largest_bytes: u64,
    },
    RDMABandwidth {
        points: Vec<RdmaPoint>,
    },
    RDMALatency {
        points: Vec<RdmaPoint>,
    },
    OpenFOAM {
        wall_time_seconds: f64,
    },
    Fio {
        bw_bytes: u64,
        iops: f64,
        clat_mean_ms: f64,
    },
    PyTorch {
        cpu_peak_memory_mb: f64,
        gpu_peak_memory_mb: Option<f64>,
        cpu_wall_time_s: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingPongRecord {
    pub bytes: u64,
    pub repetitions: u64,
    pub t_avg_usec: f64,
    pub mbytes_per_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RdmaPoint {
    pub bytes: u64,
    pub value: f64,
}

/// Status sub-resource shared by every benchmark kind.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BenchmarkPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BenchmarkResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl BenchmarkStatus {
    pub fn phase(&self) -> BenchmarkPhase {
        self.phase.unwrap_or_default()
    }

    /// Terminal immutability (spec §3, §8 testable property 6).
    pub fn is_immutable(&self) -> bool {
        self.phase().is_terminal()
    }
}

/* ============================= TESTS ============================= */
