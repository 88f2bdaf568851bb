use chartup_build::ImageBuilder;
use chartup_core::ChartupConfig;
use chartup_release::{HelmClient, RealHelm};
use chartup_watch::{DevLoop, LoopOptions};
use tokio_util::sync::CancellationToken;

/// Build, install, and keep the release in sync until Ctrl-C.
pub async fn up(dry_run: bool) -> anyhow::Result<()> {
    let project_dir = super::project_dir()?;
    let config = ChartupConfig::load(&project_dir)?;
    let options = LoopOptions::from_config(&config, &project_dir)?;

    let helm = RealHelm::new(config.release.helm_bin.clone(), config.release.timeout());
    let releases = HelmClient::with_executor(helm).dry_run(config.release.dry_run || dry_run);
    let builder = ImageBuilder::new(&config.build);

    println!(
        "Starting dev loop for release {} ({})",
        options.release_name,
        options.chart_dir.display()
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, stopping");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!("cannot listen for Ctrl-C: {e}"),
        }
    });

    DevLoop::new(builder, releases, options).run(cancel).await?;
    Ok(())
}
