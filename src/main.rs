mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, CrdAction, RegistryAction};
use kube_perftest::settings::{LogFormat, Settings};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The long-running controller process loads settings up front so its
    // `logFormat` choice (spec.md §6) can pick the subscriber before any
    // log line is emitted; one-shot CLI commands never load settings and
    // always get plain human-readable output.
    if let Commands::Reconcile { config } = &cli.command {
        let settings = match Settings::load(config.as_deref()) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[FATAL] Failed to load settings: {e}");
                std::process::exit(1);
            }
        };
        init_tracing(matches!(settings.log_format, LogFormat::Json));
        if let Err(e) = commands::reconcile::run(settings).await {
            eprintln!("[FATAL] {e}");
            std::process::exit(2);
        }
        return Ok(());
    }

    init_tracing(false);

    match cli.command {
        Commands::Version => commands::version::run()?,
        Commands::Check => commands::check::run().await?,
        Commands::List { resource } => {
            commands::list::run(resource).await?;
        }
        Commands::Crd { action } => match action {
            CrdAction::Generate => commands::crd::generate()?,
            CrdAction::Install => commands::crd::install().await?,
        },
        Commands::Registry { action } => match action {
            RegistryAction::List => commands::registry::list(),
        },
        Commands::Reconcile { .. } => unreachable!("handled above"),
    }

    Ok(())
}
