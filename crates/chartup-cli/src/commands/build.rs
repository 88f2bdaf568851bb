use chartup_build::ImageBuilder;
use chartup_core::{CHART_DESCRIPTOR, ChartupConfig};
use std::path::Path;

/// One-shot build and publish of every image in `chart`'s manifest.
pub async fn build(chart: &Path) -> anyhow::Result<()> {
    let project_dir = super::project_dir()?;
    let config = ChartupConfig::load(&project_dir)?;

    if !chart.join(CHART_DESCRIPTOR).exists() {
        anyhow::bail!(
            "no chart found for building (missing {CHART_DESCRIPTOR} in {})",
            chart.display()
        );
    }

    let manifest_path = chart.join(&config.manifest.file);
    if !manifest_path.exists() {
        anyhow::bail!(
            "no images defined for chart (missing {} in {})",
            config.manifest.file,
            chart.display()
        );
    }

    let builder = ImageBuilder::new(&config.build);
    let report = builder
        .build_manifest(&manifest_path, &project_dir, config.manifest.on_invalid_entry)
        .await?;

    let built: Vec<String> = report.succeeded().map(str::to_owned).collect();
    report.into_result()?;

    println!("Built {} image(s): {}", built.len(), built.join(", "));
    Ok(())
}
