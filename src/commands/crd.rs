use anyhow::Result;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

use kube_perftest::crd::{
    BenchmarkSet, Fio, IPerf, MPIPingPong, OpenFOAM, PyTorch, RDMABandwidth, RDMALatency,
};

fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        IPerf::crd(),
        MPIPingPong::crd(),
        OpenFOAM::crd(),
        RDMABandwidth::crd(),
        RDMALatency::crd(),
        Fio::crd(),
        PyTorch::crd(),
        BenchmarkSet::crd(),
    ]
}

/// Print every benchmark CRD's YAML to stdout for `kubectl apply -f`.
pub fn generate() -> Result<()> {
    for crd in all_crds() {
        let yaml = serde_yaml::to_string(&crd)?;
        println!("---");
        println!("{yaml}");
    }
    Ok(())
}

/// Apply every benchmark CRD directly to the connected cluster.
pub async fn install() -> Result<()> {
    use kube::{Api, Client};

    let client = Client::try_default().await?;
    let crds: Api<CustomResourceDefinition> = Api::all(client);

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        match crds.create(&Default::default(), &crd).await {
            Ok(_) => println!("CRD '{name}' installed successfully"),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                println!("CRD '{name}' already exists, skipping")
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
