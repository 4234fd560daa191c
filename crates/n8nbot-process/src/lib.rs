//! Process runner adapter: runs `CommandSpec`s as child processes with `tokio::process`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use n8nbot_core::{
    errors::Error,
    ports::{CommandSpec, ProcessOutput, ProcessRunner},
    utils::tail_text,
    Result,
};

const DIAG_TAIL_MAX_LINES: usize = 40;
const DIAG_TAIL_MAX_BYTES: usize = 8 * 1024;

/// Runs commands on the host. Stdin is closed, stdout and stderr are captured.
///
/// The child is killed if the timeout elapses (or the future is dropped).
#[derive(Clone, Debug, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let shown = spec.display();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        tracing::debug!(command = %shown, timeout = ?spec.timeout, "spawning");
        let child = cmd.spawn().map_err(|source| Error::Spawn {
            command: shown.clone(),
            source,
        })?;

        let output = match spec.timeout {
            Some(after) => match tokio::time::timeout(after, child.wait_with_output()).await {
                Ok(res) => res?,
                Err(_) => {
                    tracing::warn!(command = %shown, timeout_ms = after.as_millis() as u64, "command timed out; killed");
                    return Err(Error::Timeout {
                        command: shown,
                        after,
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let out = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            // Some tools (n8n among them) print their diagnostic on stdout.
            let diag = if out.stderr.trim().is_empty() {
                &out.stdout
            } else {
                &out.stderr
            };
            let stderr = spec.redact(&tail_text(diag, DIAG_TAIL_MAX_LINES, DIAG_TAIL_MAX_BYTES));
            tracing::debug!(command = %shown, code = ?out.code, "command exited unsuccessfully");
            return Err(Error::CommandFailed {
                command: shown,
                code: out.code,
                stderr,
            });
        }

        Ok(out)
    }
}
