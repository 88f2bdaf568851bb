mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "chartup",
    about = "Build a Helm chart's images and redeploy the release on source changes"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and push every image listed in a chart's images.yaml
    Build {
        /// Chart directory containing Chart.yaml and images.yaml
        chart: PathBuf,
    },
    /// Build, install, then rebuild and redeploy on every source change
    Up {
        /// Pass --dry-run to every helm install and uninstall
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { chart } => commands::build(&chart).await?,
        Commands::Up { dry_run } => commands::up(dry_run).await?,
    }

    Ok(())
}
