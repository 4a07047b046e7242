//! Launching the wrapped language server.

use super::config::ProxyConfig;
use super::error::ProcessError;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

/// Byte streams to and from a running wrapped server
pub struct Transport {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Kept so the process dies with the transport
    pub child: Option<Child>,
}

/// Starts the wrapped server. Called again for every restart.
pub trait Launcher: Send + Sync {
    fn launch(&self) -> Result<Transport, ProcessError>;
}

/// Spawns a child process speaking LSP on stdio
pub struct ProcessLauncher {
    command: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.server_command.clone(), config.command_args())
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> Result<Transport, ProcessError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ProcessError::MissingPipe {
            command: self.command.clone(),
            stream: "stdin",
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ProcessError::MissingPipe {
            command: self.command.clone(),
            stream: "stdout",
        })?;

        tracing::info!(command = %self.command, args = ?self.args, pid = ?child.id(), "started language server");
        Ok(Transport {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary() {
        let launcher = ProcessLauncher::new("definitely-not-a-language-server", Vec::new());
        assert!(matches!(launcher.launch(), Err(ProcessError::Spawn { .. })));
    }
}
