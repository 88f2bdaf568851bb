//! Image build and publish orchestration for chartup.
//!
//! # Build pipeline
//!
//! ```text
//! images.yaml
//!   1. Resolve  ── chartup_core::resolve_with → [BuildTarget]
//!   2. Build    ── <tool> build -t <reference> <context>
//!   3. Publish  ── <tool> push <reference>
//! ```
//!
//! Each step streams its output as `name | line`. Targets are built one after
//! another; a failing target is reported and the remaining ones still run.

pub mod builder;
pub mod executor;

pub use builder::{BuildError, BuildFailures, BuildReport, ImageBuilder, TargetOutcome};
pub use executor::{Invocation, RealExecutor, ToolError, ToolExecutor};
