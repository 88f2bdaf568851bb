//! Release management for chartup.
//!
//! [`ReleaseController`] is the narrow install/uninstall interface the dev
//! loop depends on; [`HelmClient`] implements it on top of the `helm` CLI.

pub mod client;
pub mod executor;
pub mod helm;

pub use client::{HelmClient, InstallError, ReleaseController, UninstallError};
pub use executor::{HelmExecutor, RealHelm};
pub use helm::HelmError;
