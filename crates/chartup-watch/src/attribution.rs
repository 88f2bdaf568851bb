use std::path::{Path, PathBuf};

use chartup_core::BuildTarget;

/// Bring an event path into the same form as `absolute_source_path`.
///
/// Removed files cannot be canonicalized, so their parent is resolved and
/// the file name re-attached.
pub fn normalize_event_path(path: &Path) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => return canonical,
        Err(e) => tracing::trace!("cannot canonicalize {}: {e}", path.display()),
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        match parent.canonicalize() {
            Ok(parent) => return parent.join(name),
            Err(e) => tracing::trace!("cannot canonicalize {}: {e}", parent.display()),
        }
    }

    path.to_path_buf()
}

/// Whether `path` lies at or beneath the target's source tree.
///
/// Comparison is per path component, so `/src/api2` is not inside `/src/api`.
pub fn owns(target: &BuildTarget, path: &Path) -> bool {
    path.starts_with(&target.absolute_source_path)
}

/// Targets whose source tree contains `path`, in manifest order.
pub fn owning_targets<'a>(path: &Path, targets: &'a [BuildTarget]) -> Vec<&'a BuildTarget> {
    let normalized = normalize_event_path(path);
    targets
        .iter()
        .filter(|t| owns(t, &normalized) || owns(t, path))
        .collect()
}
