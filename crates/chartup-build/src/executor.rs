use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// How long output readers may keep draining once a timed-out child is killed.
pub const DRAIN_AFTER_KILL: Duration = Duration::from_millis(500);

/// One external tool invocation.
///
/// The working directory is handed to the child process, so the calling
/// process never changes its own directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
    /// Prepended to every output line.
    pub prefix: String,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Abstraction over external tool execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait ToolExecutor: Send + Sync {
    /// Run the invocation to completion, streaming its output line by line.
    async fn run(&self, invocation: &Invocation) -> Result<(), ToolError>;
}

/// Spawns real processes and prints their output as `prefix | line`.
#[derive(Debug, Clone, Default)]
pub struct RealExecutor {
    timeout: Option<Duration>,
}

impl RealExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child and fail with [`ToolError::TimedOut`] after `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ToolExecutor for RealExecutor {
    async fn run(&self, invocation: &Invocation) -> Result<(), ToolError> {
        tracing::debug!(
            "running `{}` in {}",
            invocation.command_line(),
            invocation.current_dir.display()
        );

        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Spawn {
                program: invocation.program.clone(),
                source: e,
            })?;

        let readers: Vec<_> = [
            child.stdout.take().map(|out| {
                tokio::spawn(stream_lines(out, invocation.prefix.clone()))
            }),
            child.stderr.take().map(|err| {
                tokio::spawn(stream_lines(err, invocation.prefix.clone()))
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_elapsed) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("failed to kill `{}`: {e}", invocation.program);
                    }
                    // Grandchildren may still hold the pipes open.
                    drain_after_kill(readers, invocation).await;
                    return Err(ToolError::TimedOut {
                        program: invocation.program.clone(),
                        after: limit,
                    });
                }
            },
            None => child.wait().await,
        };

        // Output is fully drained before the step counts as complete.
        join_readers(readers, invocation).await;

        let status = waited.map_err(|e| ToolError::Wait {
            program: invocation.program.clone(),
            source: e,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                program: invocation.program.clone(),
                args: invocation.args.clone(),
                status: status.to_string(),
            })
        }
    }
}

async fn join_readers(readers: Vec<JoinHandle<io::Result<()>>>, invocation: &Invocation) {
    for reader in readers {
        report_reader(reader.await, invocation);
    }
}

/// Give the readers [`DRAIN_AFTER_KILL`] to hit EOF, then abort the rest.
async fn drain_after_kill(readers: Vec<JoinHandle<io::Result<()>>>, invocation: &Invocation) {
    let deadline = tokio::time::Instant::now() + DRAIN_AFTER_KILL;
    for mut reader in readers {
        match tokio::time::timeout_at(deadline, &mut reader).await {
            Ok(joined) => report_reader(joined, invocation),
            Err(_elapsed) => {
                tracing::debug!(
                    "output of `{}` still open after kill; abandoning reader",
                    invocation.program
                );
                reader.abort();
            }
        }
    }
}

fn report_reader(
    joined: Result<io::Result<()>, tokio::task::JoinError>,
    invocation: &Invocation,
) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("error reading output of `{}`: {e}", invocation.program),
        Err(e) => tracing::warn!("output reader for `{}` failed: {e}", invocation.program),
    }
}

async fn stream_lines<R>(reader: R, prefix: String) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        println!("{}", prefixed(&prefix, &line));
    }
}

/// Format one output line for the log sink.
pub fn prefixed(prefix: &str, line: &str) -> String {
    format!("{prefix} | {}", line.trim_end_matches(['\r', '\n']))
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to start `{program}`; is it installed and on PATH?")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("failed waiting for `{program}`")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[error("`{program} {}` exited with {status}", args.join(" "))]
    Failed {
        program: String,
        args: Vec<String>,
        status: String,
    },

    #[error("`{program}` timed out after {after:?}")]
    TimedOut { program: String, after: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_strips_line_endings() {
        assert_eq!(prefixed("api", "Step 1/4\r\n"), "api | Step 1/4");
        assert_eq!(prefixed("api", "done"), "api | done");
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let inv = Invocation {
            program: "docker".to_owned(),
            args: vec!["push".to_owned(), "x/app:dev".to_owned()],
            current_dir: PathBuf::from("/tmp"),
            prefix: "app".to_owned(),
        };
        assert_eq!(inv.command_line(), "docker push x/app:dev");
    }
}
