use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kube-perftest")]
#[command(about = "Gang-scheduled benchmark operator for Kubernetes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display application version
    Version,

    /// Check cluster connectivity and permissions
    Check,

    /// List Kubernetes resources (e.g. pods)
    List {
        /// Resource type to list (pods)
        resource: String,
    },

    /// Manage the benchmark CRDs
    Crd {
        #[command(subcommand)]
        action: CrdAction,
    },

    /// Inspect the registered benchmark kinds
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Start the benchmark operator reconcile loop
    Reconcile {
        /// Optional path to a config.yaml overriding built-in defaults
        #[arg(long)]
        config: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CrdAction {
    /// Print every benchmark CRD's YAML to stdout
    Generate,

    /// Install every benchmark CRD into the connected cluster
    Install,
}

#[derive(Subcommand)]
pub enum RegistryAction {
    /// List every registered benchmark kind
    List,
}
