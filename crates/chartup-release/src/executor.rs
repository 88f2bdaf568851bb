use std::process::Stdio;
use std::time::Duration;

use crate::helm::HelmError;

/// Abstraction over helm CLI execution for testability.
///
/// Production code uses [`RealHelm`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait HelmExecutor: Send + Sync {
    /// Execute a helm command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, HelmError>;

    /// Execute a helm command with data piped to stdin.
    async fn exec_with_stdin(&self, args: &[String], stdin_data: &[u8])
    -> Result<String, HelmError>;
}

/// Real helm CLI executor.
#[derive(Debug, Clone)]
pub struct RealHelm {
    bin: String,
    timeout: Option<Duration>,
}

impl Default for RealHelm {
    fn default() -> Self {
        Self::new("helm", None)
    }
}

impl RealHelm {
    pub fn new(bin: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    async fn bounded<F>(&self, args: &[String], fut: F) -> Result<String, HelmError>
    where
        F: std::future::Future<Output = Result<String, HelmError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_elapsed| HelmError::TimedOut {
                    args: args.to_vec(),
                    after: limit,
                })?,
            None => fut.await,
        }
    }
}

impl HelmExecutor for RealHelm {
    async fn exec(&self, args: &[String]) -> Result<String, HelmError> {
        tracing::debug!("running {} {}", self.bin, args.join(" "));

        let run = async {
            let output = tokio::process::Command::new(&self.bin)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| HelmError::NotFound { source: e })?;

            finish(args, output)
        };

        self.bounded(args, run).await
    }

    async fn exec_with_stdin(
        &self,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, HelmError> {
        use tokio::io::AsyncWriteExt;

        tracing::debug!("running {} {} (values on stdin)", self.bin, args.join(" "));

        let run = async {
            let mut child = tokio::process::Command::new(&self.bin)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| HelmError::NotFound { source: e })?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(stdin_data)
                    .await
                    .map_err(|e| HelmError::StdinWrite { source: e })?;
                stdin
                    .shutdown()
                    .await
                    .map_err(|e| HelmError::StdinWrite { source: e })?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| HelmError::Wait { source: e })?;

            finish(args, output)
        };

        self.bounded(args, run).await
    }
}

fn finish(args: &[String], output: std::process::Output) -> Result<String, HelmError> {
    if output.status.success() {
        String::from_utf8(output.stdout).map_err(|e| HelmError::InvalidUtf8 { source: e })
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(HelmError::CommandFailed {
            args: args.to_vec(),
            stderr,
        })
    }
}
