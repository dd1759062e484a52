use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BenchmarkStatus, CommonBenchmarkSpec};

/// A CFD solver benchmark wrapping an OpenFOAM case (spec §6).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "OpenFOAM",
    plural = "openfoams",
    status = "BenchmarkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OpenFOAMSpec {
    #[serde(flatten)]
    pub common: CommonBenchmarkSpec,

    /// Name of the bundled OpenFOAM tutorial/case to run.
    pub case: String,

    /// Number of parallel decomposed-domain workers.
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,
}

fn default_num_workers() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_shape() {
        let crd = OpenFOAM::crd();
        assert_eq!(crd.spec.names.kind, "OpenFOAM");
        assert_eq!(crd.spec.names.plural, "openfoams");
    }

    #[test]
    fn test_case_is_required() {
        let json = r#"{"image":"openfoam/openfoam10-paraview510"}"#;
        let result: Result<OpenFOAMSpec, _> = serde_json::from_str(json);
        assert!(result.is_err(), "case field should be required");
    }

    #[test]
    fn test_default_num_workers() {
        let json = r#"{"image":"openfoam/openfoam10-paraview510","case":"motorBike"}"#;
        let spec: OpenFOAMSpec = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(spec.num_workers, 2);
        assert_eq!(spec.case, "motorBike");
    }
}
