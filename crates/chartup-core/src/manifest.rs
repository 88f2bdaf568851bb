//! Image manifest (`images.yaml`) resolution.
//!
//! The manifest maps a target name to a record describing one image:
//!
//! ```yaml
//! api:
//!   reference: registry.local/team/api:dev
//!   sourcePath: ./images/api
//! ```
//!
//! `Image` and `Path` are accepted as alternative spellings of `reference`
//! and `sourcePath`. Other fields are ignored.

use std::path::{Component, Path, PathBuf};

use serde_yaml_ng::{Mapping, Value};

use crate::config::InvalidEntryPolicy;

const REFERENCE_KEYS: &[&str] = &["reference", "Image"];
const SOURCE_PATH_KEYS: &[&str] = &["sourcePath", "Path"];

/// One image to be built and published.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildTarget {
    pub name: String,
    pub reference: String,
    /// Build context as written in the manifest.
    pub source_path: PathBuf,
    /// `source_path` resolved once at load time; used for containment checks.
    pub absolute_source_path: PathBuf,
}

/// A top-level manifest key that does not describe a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

/// A parsed manifest: one tagged result per mapping-valued key.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub entries: Vec<Result<BuildTarget, FieldError>>,
    pub skipped: Vec<SkippedEntry>,
}

impl Manifest {
    /// Read and parse the manifest at `path`. Relative source paths are
    /// resolved against `base_dir`.
    pub fn load(path: &Path, base_dir: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::NotFound {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(path, &content, base_dir)
    }

    /// Parse manifest text. `path` is only used for diagnostics.
    pub fn parse(path: &Path, content: &str, base_dir: &Path) -> Result<Self, ManifestError> {
        let document: Value =
            serde_yaml_ng::from_str(content).map_err(|e| ManifestError::Malformed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let mapping = match document {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            other => {
                return Err(ManifestError::Malformed {
                    path: path.to_path_buf(),
                    detail: format!("expected a mapping at top level, found {}", kind(&other)),
                });
            }
        };

        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for (key, value) in mapping {
            let Some(name) = key.as_str() else {
                let reason = format!("key of type {} is not a target name", kind(&key));
                tracing::warn!("skipping manifest key {key:?}: {reason}");
                skipped.push(SkippedEntry {
                    key: format!("{key:?}"),
                    reason,
                });
                continue;
            };

            match value {
                Value::Mapping(record) => entries.push(target_from_record(name, &record, base_dir)),
                other => {
                    let reason = format!("unhandled value type {}", kind(&other));
                    tracing::warn!("skipping manifest key {name:?}: {reason}");
                    skipped.push(SkippedEntry {
                        key: name.to_owned(),
                        reason,
                    });
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            skipped,
        })
    }

    /// Collapse per-entry results according to `policy`.
    pub fn into_targets(
        self,
        policy: InvalidEntryPolicy,
    ) -> Result<Vec<BuildTarget>, ManifestError> {
        let mut targets = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            match entry {
                Ok(target) => targets.push(target),
                Err(e) => match policy {
                    InvalidEntryPolicy::Fail => {
                        return Err(ManifestError::InvalidEntry {
                            path: self.path,
                            source: e,
                        });
                    }
                    InvalidEntryPolicy::Skip => {
                        tracing::warn!("skipping invalid manifest entry: {e}");
                    }
                },
            }
        }
        Ok(targets)
    }
}

/// Resolve the manifest at `manifest_path`, relative to the current working
/// directory, failing on the first invalid entry.
pub fn resolve(manifest_path: &Path) -> Result<Vec<BuildTarget>, ManifestError> {
    let cwd = std::env::current_dir().map_err(|e| ManifestError::WorkingDir { source: e })?;
    resolve_with(manifest_path, &cwd, InvalidEntryPolicy::Fail)
}

pub fn resolve_with(
    manifest_path: &Path,
    base_dir: &Path,
    policy: InvalidEntryPolicy,
) -> Result<Vec<BuildTarget>, ManifestError> {
    Manifest::load(manifest_path, base_dir)?.into_targets(policy)
}

fn target_from_record(
    name: &str,
    record: &Mapping,
    base_dir: &Path,
) -> Result<BuildTarget, FieldError> {
    if name.is_empty() {
        return Err(FieldError::EmptyName);
    }

    for key in record.keys() {
        let known = key
            .as_str()
            .is_some_and(|k| REFERENCE_KEYS.contains(&k) || SOURCE_PATH_KEYS.contains(&k));
        if !known {
            tracing::debug!("target {name:?}: ignoring field {key:?}");
        }
    }

    let reference = string_field(name, record, REFERENCE_KEYS)?;
    let source_path = PathBuf::from(string_field(name, record, SOURCE_PATH_KEYS)?);
    let absolute_source_path = absolutize(&source_path, base_dir);

    Ok(BuildTarget {
        name: name.to_owned(),
        reference,
        source_path,
        absolute_source_path,
    })
}

fn string_field(
    target: &str,
    record: &Mapping,
    keys: &'static [&'static str],
) -> Result<String, FieldError> {
    let field = keys[0];
    let value = keys
        .iter()
        .find_map(|k| record.get(*k))
        .ok_or_else(|| FieldError::Missing {
            target: target.to_owned(),
            field,
        })?;

    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_owned()),
        Some(_) => Err(FieldError::Empty {
            target: target.to_owned(),
            field,
        }),
        None => Err(FieldError::NotAString {
            target: target.to_owned(),
            field,
            found: kind(value),
        }),
    }
}

/// Join onto `base_dir` if relative, then canonicalize. Paths that do not
/// exist yet are normalized lexically instead.
fn absolutize(path: &Path, base_dir: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    joined
        .canonicalize()
        // arch-lint: allow(no-error-swallowing) reason="source paths may not exist yet; fall back to lexical normalization"
        .unwrap_or_else(|_| normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Problem with a single manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("target name must not be empty")]
    EmptyName,

    #[error("target '{target}' is missing `{field}`")]
    Missing { target: String, field: &'static str },

    #[error("target '{target}' has `{field}` of type {found}, expected string")]
    NotAString {
        target: String,
        field: &'static str,
        found: &'static str,
    },

    #[error("target '{target}' has an empty `{field}`")]
    Empty { target: String, field: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read image manifest {path}")]
    NotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image manifest {path} is malformed: {detail}")]
    Malformed { path: PathBuf, detail: String },

    #[error("invalid entry in image manifest {path}")]
    InvalidEntry { path: PathBuf, source: FieldError },

    #[error("failed to determine the working directory")]
    WorkingDir { source: std::io::Error },
}
