use crate::executor::{HelmExecutor, RealHelm};
use crate::helm::HelmError;
use std::path::{Path, PathBuf};

/// Installs and removes a named release of a chart.
///
/// Installing over an existing release of the same name is left to the
/// implementation. Uninstalling a release that does not exist is an
/// [`UninstallError`], never a panic.
#[allow(async_fn_in_trait)]
pub trait ReleaseController: Send + Sync {
    async fn install(
        &self,
        values: &[u8],
        chart_path: &Path,
        release_name: &str,
    ) -> Result<(), InstallError>;

    async fn uninstall(&self, release_name: &str) -> Result<(), UninstallError>;
}

/// helm CLI client, parameterized over the executor for testability.
pub struct HelmClient<E: HelmExecutor = RealHelm> {
    executor: E,
    dry_run: bool,
}

impl HelmClient<RealHelm> {
    pub fn new() -> Self {
        Self {
            executor: RealHelm::default(),
            dry_run: false,
        }
    }
}

impl Default for HelmClient<RealHelm> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: HelmExecutor> HelmClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            dry_run: false,
        }
    }

    /// Append `--dry-run` to every command.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn finish_args(&self, mut cmd: Vec<String>) -> Vec<String> {
        if self.dry_run {
            cmd.push("--dry-run".to_owned());
        }
        cmd
    }
}

impl<E: HelmExecutor> ReleaseController for HelmClient<E> {
    async fn install(
        &self,
        values: &[u8],
        chart_path: &Path,
        release_name: &str,
    ) -> Result<(), InstallError> {
        let chart = chart_path
            .to_str()
            .ok_or_else(|| InstallError::InvalidChartPath(chart_path.to_path_buf()))?;

        let cmd = self.finish_args(args(["install", release_name, chart, "--values", "-"]));

        let output = self
            .executor
            .exec_with_stdin(&cmd, values)
            .await
            .map_err(|e| InstallError::Helm {
                release: release_name.to_owned(),
                source: e,
            })?;

        tracing::debug!("helm install output:\n{}", output.trim_end());
        Ok(())
    }

    async fn uninstall(&self, release_name: &str) -> Result<(), UninstallError> {
        let cmd = self.finish_args(args(["uninstall", release_name]));

        let output = self
            .executor
            .exec(&cmd)
            .await
            .map_err(|e| UninstallError {
                release: release_name.to_owned(),
                source: e,
            })?;

        tracing::debug!("helm uninstall output:\n{}", output.trim_end());
        Ok(())
    }
}

// ── Helper ──

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("chart path is not valid UTF-8: {0}")]
    InvalidChartPath(PathBuf),

    #[error("failed to install release '{release}'")]
    Helm { release: String, source: HelmError },
}

#[derive(Debug, thiserror::Error)]
#[error("failed to uninstall release '{release}'")]
pub struct UninstallError {
    pub release: String,
    pub source: HelmError,
}
