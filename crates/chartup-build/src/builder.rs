use std::fmt;
use std::path::Path;

use chartup_core::{BuildConfig, BuildTarget, InvalidEntryPolicy, ManifestError};

use crate::executor::{Invocation, RealExecutor, ToolError, ToolExecutor};

/// Builds and publishes images, parameterized over the executor for testability.
pub struct ImageBuilder<E: ToolExecutor = RealExecutor> {
    executor: E,
    tool: String,
}

impl ImageBuilder<RealExecutor> {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            executor: RealExecutor::with_timeout(config.timeout()),
            tool: config.tool.clone(),
        }
    }
}

impl<E: ToolExecutor> ImageBuilder<E> {
    pub fn with_executor(executor: E, tool: impl Into<String>) -> Self {
        Self {
            executor,
            tool: tool.into(),
        }
    }

    /// `<tool> build -t <reference> <context>`, run inside the build context.
    pub fn build_invocation(&self, target: &BuildTarget) -> Invocation {
        let context = target.absolute_source_path.display().to_string();
        Invocation {
            program: self.tool.clone(),
            args: vec![
                "build".to_owned(),
                "-t".to_owned(),
                target.reference.clone(),
                context,
            ],
            current_dir: target.absolute_source_path.clone(),
            prefix: target.name.clone(),
        }
    }

    /// `<tool> push <reference>`, run inside the build context.
    pub fn publish_invocation(&self, target: &BuildTarget) -> Invocation {
        Invocation {
            program: self.tool.clone(),
            args: vec!["push".to_owned(), target.reference.clone()],
            current_dir: target.absolute_source_path.clone(),
            prefix: target.name.clone(),
        }
    }

    /// Build then publish a single target. Publish is skipped when the
    /// build fails.
    pub async fn build_target(&self, target: &BuildTarget) -> Result<(), BuildError> {
        tracing::info!("{}: building {}", target.name, target.reference);
        self.executor
            .run(&self.build_invocation(target))
            .await
            .map_err(|e| BuildError::Build {
                target: target.name.clone(),
                source: e,
            })?;

        tracing::info!("{}: publishing {}", target.name, target.reference);
        self.executor
            .run(&self.publish_invocation(target))
            .await
            .map_err(|e| BuildError::Publish {
                target: target.name.clone(),
                source: e,
            })?;

        tracing::info!("{}: published {}", target.name, target.reference);
        Ok(())
    }

    /// Build every target in order. A failing target does not stop the
    /// remaining ones; every outcome is recorded in the report.
    pub async fn build_all(&self, targets: &[BuildTarget]) -> BuildReport {
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let result = self.build_target(target).await;
            if let Err(e) = &result {
                tracing::error!("{}: {e}", target.name);
            }
            outcomes.push(TargetOutcome {
                target: target.name.clone(),
                result,
            });
        }
        BuildReport { outcomes }
    }

    /// Resolve the manifest at `manifest_path` and build all of its targets.
    pub async fn build_manifest(
        &self,
        manifest_path: &Path,
        base_dir: &Path,
        policy: InvalidEntryPolicy,
    ) -> Result<BuildReport, ManifestError> {
        let targets = chartup_core::resolve_with(manifest_path, base_dir, policy)?;
        if targets.is_empty() {
            tracing::warn!("no images defined in {}", manifest_path.display());
        }
        Ok(self.build_all(&targets).await)
    }
}

// ── Report ──

#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<(), BuildError>,
}

/// Outcome of building a set of targets.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.target.as_str())
    }

    /// Aggregate every per-target error into one.
    pub fn into_result(self) -> Result<(), BuildFailures> {
        let total = self.outcomes.len();
        let errors: Vec<BuildError> = self
            .outcomes
            .into_iter()
            .filter_map(|o| o.result.err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BuildFailures { total, errors })
        }
    }
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("image build failed for '{target}'")]
    Build { target: String, source: ToolError },

    #[error("image publish failed for '{target}'")]
    Publish { target: String, source: ToolError },
}

impl BuildError {
    pub fn target(&self) -> &str {
        match self {
            Self::Build { target, .. } | Self::Publish { target, .. } => target,
        }
    }
}

/// Every failure from one multi-target build.
#[derive(Debug)]
pub struct BuildFailures {
    pub total: usize,
    pub errors: Vec<BuildError>,
}

impl fmt::Display for BuildFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} image(s) failed to build or publish",
            self.errors.len(),
            self.total
        )?;
        for e in &self.errors {
            write!(f, "\n  - {e}")?;
            if let Some(source) = std::error::Error::source(e) {
                write!(f, ": {source}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailures {}
