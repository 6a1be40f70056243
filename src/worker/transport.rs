use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::command::RemoteCommand;
use crate::config::{TransportConfig, TransportKind};

/// What the transport hands back once the remote command has finished.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<i32>,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Carries a command to one node and returns its captured output.
///
/// An `Err` means the call could not even be started; a remote command that
/// ran and failed is an `Ok` with a non-zero exit status. Implementations
/// must stop their work when the returned future is dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(&self, node: &str, command: &RemoteCommand) -> std::io::Result<RemoteOutput>;
}

/// Shells out to `docker exec` or `ssh`.
#[derive(Debug, Clone, Default)]
pub struct ProcessTransport {
    config: TransportConfig,
}

impl ProcessTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Full argv (program first) used to reach `node`.
    ///
    /// `docker exec` passes the tokens straight to the container as argv.
    /// `ssh` hands the remote shell a single string, so the tokens are
    /// shell-quoted into one word to keep their boundaries intact.
    pub fn argv(&self, node: &str, command: &RemoteCommand) -> std::io::Result<Vec<String>> {
        let mut argv = vec![self.config.program().to_string()];
        if self.config.kind == TransportKind::Docker {
            argv.push("exec".to_string());
        }
        argv.extend(self.config.extra_args.iter().cloned());
        argv.push(node.to_string());
        match self.config.kind {
            TransportKind::Docker => argv.extend(command.tokens().iter().cloned()),
            TransportKind::Ssh => {
                let remote = shlex::try_join(command.tokens().iter().map(String::as_str))
                    .map_err(|e| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            format!("cannot quote command for ssh: {}", e),
                        )
                    })?;
                argv.push(remote);
            }
        }
        Ok(argv)
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn run(&self, node: &str, command: &RemoteCommand) -> std::io::Result<RemoteOutput> {
        let argv = self.argv(node, command)?;
        tracing::debug!(node, transport = %self.config.kind, argv = ?argv, "Spawning transport");

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(RemoteOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status: output.status.code(),
        })
    }
}
