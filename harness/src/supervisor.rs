//! Language server child process, owned for the length of one run.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::ServerConfig;

/// The server's protocol streams, handed to [`crate::Transport::spawn`].
pub struct ServerIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// How the server went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    Killed,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(status) => write!(f, "server exited ({status})"),
            Self::Killed => f.write_str("server killed after grace period"),
        }
    }
}

/// A running language server.
///
/// The child is spawned with `kill_on_drop`, so dropping this handle on any
/// path (abort, panic) terminates the server.
pub struct ServerProcess {
    child: Child,
    name: String,
}

impl ServerProcess {
    /// Spawn the server with piped stdio. Its stderr is relayed to ours.
    pub fn spawn(config: &ServerConfig, cwd: Option<&Path>) -> Result<(Self, ServerIo)> {
        let command = config.expanded_command();
        let resolved_cmd =
            which::which(&command).with_context(|| format!("{command} not found in PATH"))?;

        let mut cmd = Command::new(&resolved_cmd);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {command}"))?;

        let stdout = child.stdout.take().context("no stdout from child")?;
        let stdin = child.stdin.take().context("no stdin from child")?;
        if let Some(mut stderr) = child.stderr.take() {
            // Fire and forget: relay failures never affect the run.
            tokio::spawn(async move {
                let mut out = tokio::io::stderr();
                let _ = tokio::io::copy(&mut stderr, &mut out).await;
            });
        }

        tracing::info!(
            command = %resolved_cmd.display(),
            args = ?config.args,
            pid = ?child.id(),
            "Spawned language server"
        );

        Ok((
            Self {
                child,
                name: command,
            },
            ServerIo { stdin, stdout },
        ))
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait up to `grace` for the server to exit, then kill it.
    pub async fn shutdown(mut self, grace: Duration) -> Termination {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("LSP '{}' exited: {status}", self.name);
                Termination::Exited(status)
            }
            Ok(Err(e)) => {
                tracing::warn!("LSP '{}' wait failed: {e}", self.name);
                let _ = self.child.kill().await;
                Termination::Killed
            }
            Err(_) => {
                tracing::debug!("LSP '{}' didn't exit in time, killing", self.name);
                let _ = self.child.kill().await;
                Termination::Killed
            }
        }
    }
}
