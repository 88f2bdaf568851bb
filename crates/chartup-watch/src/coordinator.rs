//! The build → install → watch → rebuild → redeploy loop.
//!
//! ```text
//! Init ──► InitialDeploying ──► Watching ──► Rebuilding ──► Redeploying
//!   │              │              ▲   │           │              │
//!   └──────────────┴─► Terminated │   └ cancel    └─ failure ─┐  │
//!                                 └──────────────────────────┴──┘
//! ```
//!
//! Events are handled one at a time in arrival order, so a redeploy never
//! overlaps a build of the same release.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chartup_build::{BuildError, BuildFailures, ImageBuilder, ToolExecutor};
use chartup_core::{BuildTarget, CHART_DESCRIPTOR, ChartupConfig, InvalidEntryPolicy, ManifestError};
use chartup_release::{InstallError, ReleaseController, UninstallError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::attribution::owning_targets;
use crate::watcher::{ChangeEvent, ChangeWatcher, WatchError, WatchMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    InitialDeploying,
    Watching,
    Rebuilding,
    Redeploying,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Directory holding `Chart.yaml` and the image manifest.
    pub chart_dir: PathBuf,
    pub manifest_file: String,
    /// Directory that relative `sourcePath`s are resolved against.
    pub base_dir: PathBuf,
    pub release_name: String,
    pub on_invalid_entry: InvalidEntryPolicy,
    /// Quiet period for coalescing bursts; `None` handles every event.
    pub debounce: Option<Duration>,
}

impl LoopOptions {
    /// Options for running in `project_dir`, which must be absolute.
    pub fn from_config(config: &ChartupConfig, project_dir: &Path) -> Result<Self, LoopError> {
        let release_name = match &config.project.release_name {
            Some(name) => name.clone(),
            None => release_name_for(project_dir).ok_or_else(|| LoopError::ReleaseName {
                dir: project_dir.to_path_buf(),
            })?,
        };

        Ok(Self {
            chart_dir: project_dir.join(&config.project.chart_dir),
            manifest_file: config.manifest.file.clone(),
            base_dir: project_dir.to_path_buf(),
            release_name,
            on_invalid_entry: config.manifest.on_invalid_entry,
            debounce: config.watch.debounce(),
        })
    }
}

/// Release name derived from a directory's base name.
pub fn release_name_for(dir: &Path) -> Option<String> {
    dir.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

/// Result of the `Init` state.
#[derive(Debug, Clone)]
pub struct Plan {
    pub chart_path: PathBuf,
    pub manifest_path: PathBuf,
    pub targets: Vec<BuildTarget>,
}

/// The installed release and everything needed to reinstall it.
#[derive(Debug, Clone)]
pub struct ReleaseSession {
    pub release_name: String,
    pub chart_path: PathBuf,
    pub values: Vec<u8>,
    pub targets: Vec<BuildTarget>,
}

/// Both halves of a redeploy. Install is attempted even if uninstall failed.
#[derive(Debug)]
pub struct RedeployOutcome {
    pub uninstall: Result<(), UninstallError>,
    pub install: Result<(), InstallError>,
}

impl RedeployOutcome {
    pub fn is_clean(&self) -> bool {
        self.uninstall.is_ok() && self.install.is_ok()
    }
}

/// What one handled change did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub trigger: PathBuf,
    pub rebuilt: Vec<String>,
    pub failures: Vec<BuildError>,
    /// `None` when a rebuild failed and the current release was kept.
    pub redeploy: Option<RedeployOutcome>,
}

pub struct DevLoop<E: ToolExecutor, R: ReleaseController> {
    builder: ImageBuilder<E>,
    releases: R,
    options: LoopOptions,
}

impl<E: ToolExecutor, R: ReleaseController> DevLoop<E, R> {
    pub fn new(builder: ImageBuilder<E>, releases: R, options: LoopOptions) -> Self {
        Self {
            builder,
            releases,
            options,
        }
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    /// Build, install, then watch until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), LoopError> {
        let result = self.run_until_cancelled(&cancel).await;
        if let Err(e) = &result {
            self.enter(LoopState::Terminated);
            tracing::error!("dev loop terminated: {e}");
        }
        result
    }

    async fn run_until_cancelled(&self, cancel: &CancellationToken) -> Result<(), LoopError> {
        let plan = self.prepare()?;
        let session = self.deploy(plan).await?;

        let mut subscription =
            ChangeWatcher::start(&session.targets).map_err(|e| LoopError::Watch { source: e })?;
        self.watch(&session, subscription.events_mut(), cancel, |_| {})
            .await;
        drop(subscription);

        tracing::info!("stopped watching; release {} left installed", session.release_name);
        Ok(())
    }

    /// `Init`: check for the chart and resolve the image manifest.
    pub fn prepare(&self) -> Result<Plan, LoopError> {
        self.enter(LoopState::Init);

        let chart_dir = &self.options.chart_dir;
        if !chart_dir.join(CHART_DESCRIPTOR).exists() {
            return Err(LoopError::NoChart {
                path: chart_dir.clone(),
            });
        }

        let chart_path = chart_dir
            .canonicalize()
            .map_err(|e| LoopError::ChartPath {
                path: chart_dir.clone(),
                source: e,
            })?;
        let manifest_path = chart_path.join(&self.options.manifest_file);

        let targets = chartup_core::resolve_with(
            &manifest_path,
            &self.options.base_dir,
            self.options.on_invalid_entry,
        )
        .map_err(|e| LoopError::Manifest { source: e })?;

        Ok(Plan {
            chart_path,
            manifest_path,
            targets,
        })
    }

    /// `InitialDeploying`: build every image, then install the release with
    /// the manifest as its values.
    pub async fn deploy(&self, plan: Plan) -> Result<ReleaseSession, LoopError> {
        self.enter(LoopState::InitialDeploying);

        self.builder
            .build_all(&plan.targets)
            .await
            .into_result()
            .map_err(|e| LoopError::Build { source: e })?;

        let values = std::fs::read(&plan.manifest_path).map_err(|e| LoopError::Values {
            path: plan.manifest_path.clone(),
            source: e,
        })?;

        let release_name = self.options.release_name.clone();
        tracing::info!("installing {release_name}");
        self.releases
            .install(&values, &plan.chart_path, &release_name)
            .await
            .map_err(|e| LoopError::Install { source: e })?;
        tracing::info!("{release_name} installed");

        Ok(ReleaseSession {
            release_name,
            chart_path: plan.chart_path,
            values,
            targets: plan.targets,
        })
    }

    /// `Watching`: consume `events` until cancelled or the channel closes.
    /// `on_cycle` sees the outcome of every handled change.
    pub async fn watch<F>(
        &self,
        session: &ReleaseSession,
        events: &mut UnboundedReceiver<WatchMessage>,
        cancel: &CancellationToken,
        mut on_cycle: F,
    ) where
        F: FnMut(&CycleOutcome),
    {
        self.enter(LoopState::Watching);

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("cancellation requested");
                    return;
                }
                message = events.recv() => message,
            };

            let event = match message {
                Some(WatchMessage::Change(event)) => event,
                Some(WatchMessage::Error(e)) => {
                    tracing::warn!("watch error: {e}");
                    continue;
                }
                None => {
                    tracing::warn!("watch channel closed");
                    return;
                }
            };

            if let Some(outcome) = self.handle_change(session, event, events).await {
                on_cycle(&outcome);
            }
        }
    }

    /// Attribute a change to its targets and run a cycle if it qualifies.
    pub async fn handle_change(
        &self,
        session: &ReleaseSession,
        event: ChangeEvent,
        events: &mut UnboundedReceiver<WatchMessage>,
    ) -> Option<CycleOutcome> {
        if !event.is_qualifying() {
            tracing::debug!("ignoring metadata change on {}", event.path.display());
            return None;
        }

        tracing::info!("change detected: {} ({:?})", event.path.display(), event.kind);
        let mut owners = owning_targets(&event.path, &session.targets);

        if let Some(window) = self.options.debounce {
            coalesce(window, events, &session.targets, &mut owners).await;
        }

        if owners.is_empty() {
            tracing::debug!("{} is not inside any image source tree", event.path.display());
            return None;
        }

        Some(self.rebuild_and_redeploy(session, &owners, event.path).await)
    }

    /// `Rebuilding` then, if every build succeeded, `Redeploying`.
    pub async fn rebuild_and_redeploy(
        &self,
        session: &ReleaseSession,
        owners: &[&BuildTarget],
        trigger: PathBuf,
    ) -> CycleOutcome {
        self.enter(LoopState::Rebuilding);

        let mut rebuilt = Vec::new();
        let mut failures = Vec::new();
        for target in owners {
            match self.builder.build_target(target).await {
                Ok(()) => rebuilt.push(target.name.clone()),
                Err(e) => {
                    tracing::error!(
                        "{}: rebuild failed, keeping the current release: {}",
                        target.name,
                        error_chain(&e)
                    );
                    failures.push(e);
                }
            }
        }

        let redeploy = if failures.is_empty() {
            Some(self.redeploy(session).await)
        } else {
            None
        };

        self.enter(LoopState::Watching);
        CycleOutcome {
            trigger,
            rebuilt,
            failures,
            redeploy,
        }
    }

    /// Uninstall then install. Both are attempted; failures are logged and
    /// returned, never fatal.
    pub async fn redeploy(&self, session: &ReleaseSession) -> RedeployOutcome {
        self.enter(LoopState::Redeploying);
        let name = &session.release_name;

        tracing::info!("uninstalling {name}");
        let uninstall = self.releases.uninstall(name).await;
        if let Err(e) = &uninstall {
            tracing::warn!("{}", error_chain(e));
        }

        tracing::info!("installing {name}");
        let install = self
            .releases
            .install(&session.values, &session.chart_path, name)
            .await;
        match &install {
            Ok(()) => tracing::info!("{name} installed"),
            Err(e) => tracing::error!("{}", error_chain(e)),
        }

        RedeployOutcome { uninstall, install }
    }

    fn enter(&self, state: LoopState) {
        tracing::debug!("loop state -> {state:?}");
    }
}

/// Keep receiving until no qualifying event arrives for `window`, adding the
/// owners of each one.
async fn coalesce<'a>(
    window: Duration,
    events: &mut UnboundedReceiver<WatchMessage>,
    targets: &'a [BuildTarget],
    owners: &mut Vec<&'a BuildTarget>,
) {
    let mut merged = 0usize;
    while let Ok(message) = tokio::time::timeout(window, events.recv()).await {
        match message {
            Some(WatchMessage::Change(event)) if event.is_qualifying() => {
                merged += 1;
                for target in owning_targets(&event.path, targets) {
                    if !owners.iter().any(|o| o.name == target.name) {
                        owners.push(target);
                    }
                }
            }
            Some(WatchMessage::Change(_)) => {}
            Some(WatchMessage::Error(e)) => tracing::warn!("watch error: {e}"),
            None => break,
        }
    }
    if merged > 0 {
        tracing::debug!("coalesced {merged} additional change(s)");
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("no chart found (missing Chart.yaml) in {path}")]
    NoChart { path: PathBuf },

    #[error("failed to resolve chart directory {path}")]
    ChartPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot derive a release name from {dir}; set project.release_name in chartup.toml")]
    ReleaseName { dir: PathBuf },

    #[error("failed to resolve image manifest")]
    Manifest { source: ManifestError },

    #[error("initial image build failed")]
    Build { source: BuildFailures },

    #[error("failed to read release values from {path}")]
    Values {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("initial install failed")]
    Install { source: InstallError },

    #[error("failed to start watching image sources")]
    Watch { source: WatchError },
}
