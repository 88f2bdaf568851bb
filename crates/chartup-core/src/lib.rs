//! Core types and configuration for chartup.
//!
//! This crate defines the `chartup.toml` schema ([`ChartupConfig`]),
//! image manifest resolution ([`Manifest`], [`BuildTarget`]), and shared
//! error types.

pub mod config;
pub mod error;
pub mod manifest;

pub use config::{
    BuildConfig, ChartupConfig, InvalidEntryPolicy, ManifestConfig, ProjectConfig, ReleaseConfig,
    WatchConfig,
};
pub use error::{Error, Result};
pub use manifest::{
    BuildTarget, FieldError, Manifest, ManifestError, SkippedEntry, resolve, resolve_with,
};

/// File whose presence marks a directory as a deployable chart.
pub const CHART_DESCRIPTOR: &str = "Chart.yaml";
