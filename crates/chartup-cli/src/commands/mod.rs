mod build;
mod up;

pub use build::build;
pub use up::up;

/// The directory chartup was started in, as an absolute path.
fn project_dir() -> anyhow::Result<std::path::PathBuf> {
    Ok(std::env::current_dir()?)
}
