//! Directory-level filesystem subscriptions over build target source trees.

use std::path::{Path, PathBuf};

use chartup_core::BuildTarget;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
    /// Permission or other metadata-only change (chmod, touch of attributes).
    Metadata,
}

impl ChangeKind {
    /// Map a notify event kind. Pure access notifications are not changes.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(Self::Create),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(Self::Metadata),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Rename),
            EventKind::Modify(_) => Some(Self::Write),
            EventKind::Remove(_) => Some(Self::Remove),
            EventKind::Any | EventKind::Other => Some(Self::Write),
        }
    }

    /// Metadata-only changes never trigger a rebuild.
    pub fn is_qualifying(self) -> bool {
        self != Self::Metadata
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn is_qualifying(&self) -> bool {
        self.kind.is_qualifying()
    }
}

/// Item delivered on the watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Change(ChangeEvent),
    /// Transport-level failure reported by the backend.
    Error(String),
}

/// Directories registered when the subscription was created.
///
/// Directories created afterwards are not picked up.
#[derive(Debug, Default)]
pub struct WatchRegistration {
    pub directories: Vec<PathBuf>,
    pub failures: Vec<WatchError>,
}

/// A live subscription. Dropping it releases every OS watch and closes the
/// event channel.
pub struct ChangeSubscription {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<WatchMessage>,
    registration: WatchRegistration,
}

impl ChangeSubscription {
    pub fn registration(&self) -> &WatchRegistration {
        &self.registration
    }

    pub fn events_mut(&mut self) -> &mut mpsc::UnboundedReceiver<WatchMessage> {
        &mut self.events
    }

    pub async fn next(&mut self) -> Option<WatchMessage> {
        self.events.recv().await
    }
}

pub struct ChangeWatcher;

impl ChangeWatcher {
    /// Subscribe to every directory beneath each target's source tree.
    ///
    /// Only creating the backend is fatal. Directories that cannot be walked
    /// or registered are logged and recorded in the registration.
    pub fn start(targets: &[BuildTarget]) -> Result<ChangeSubscription, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| forward(&tx, res),
            Config::default(),
        )
        .map_err(|e| WatchError::Init { source: e })?;

        let mut registration = WatchRegistration::default();
        for target in targets {
            register_tree(&mut watcher, &target.absolute_source_path, &mut registration);
        }

        tracing::info!(
            "watching {} director{} across {} image(s)",
            registration.directories.len(),
            if registration.directories.len() == 1 { "y" } else { "ies" },
            targets.len()
        );

        Ok(ChangeSubscription {
            _watcher: watcher,
            events: rx,
            registration,
        })
    }
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    root: &Path,
    registration: &mut WatchRegistration,
) {
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("cannot walk {}: {e}", root.display());
                registration.failures.push(WatchError::Walk {
                    root: root.to_path_buf(),
                    source: e,
                });
                continue;
            }
        };

        if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
            continue;
        }

        let dir = entry.into_path();
        if registration.directories.contains(&dir) {
            continue;
        }

        match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => registration.directories.push(dir),
            Err(e) => {
                tracing::warn!("cannot watch {}: {e}", dir.display());
                registration
                    .failures
                    .push(WatchError::Subscribe { path: dir, source: e });
            }
        }
    }
}

fn forward(tx: &mpsc::UnboundedSender<WatchMessage>, res: notify::Result<Event>) {
    let messages = match res {
        Ok(event) => match ChangeKind::from_event_kind(&event.kind) {
            Some(kind) => event
                .paths
                .into_iter()
                .map(|path| WatchMessage::Change(ChangeEvent { path, kind }))
                .collect(),
            None => Vec::new(),
        },
        Err(e) => vec![WatchMessage::Error(e.to_string())],
    };

    for message in messages {
        if tx.send(message).is_err() {
            tracing::trace!("watch channel closed; dropping event");
            return;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to create filesystem watcher")]
    Init { source: notify::Error },

    #[error("failed to watch directory {path}")]
    Subscribe {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("failed to walk source tree {root}")]
    Walk { root: PathBuf, source: ignore::Error },
}
