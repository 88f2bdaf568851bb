use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HelmError {
    #[error("helm CLI not found; install: https://helm.sh/docs/intro/install/")]
    NotFound { source: std::io::Error },

    #[error("helm command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("helm output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },

    #[error("failed waiting for helm")]
    Wait { source: std::io::Error },

    #[error("failed to write to helm stdin")]
    StdinWrite { source: std::io::Error },

    #[error("helm command timed out after {after:?}: {args:?}")]
    TimedOut { args: Vec<String>, after: Duration },
}
