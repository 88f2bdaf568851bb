//! Filesystem watching and the rebuild/redeploy loop for chartup.
//!
//! [`ChangeWatcher`] subscribes to every directory under each image's source
//! tree and forwards notifications onto a channel. [`DevLoop`] consumes that
//! channel: each qualifying change is attributed to the images that contain
//! it, those images are rebuilt and published, and the release is
//! uninstalled and installed again.

pub mod attribution;
pub mod coordinator;
pub mod watcher;

pub use attribution::{normalize_event_path, owning_targets, owns};
pub use coordinator::{
    CycleOutcome, DevLoop, LoopError, LoopOptions, LoopState, Plan, RedeployOutcome,
    ReleaseSession, release_name_for,
};
pub use watcher::{
    ChangeEvent, ChangeKind, ChangeSubscription, ChangeWatcher, WatchError, WatchMessage,
    WatchRegistration,
};
