use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::command::RemoteCommand;
use crate::config::OutputSink;
use crate::dispatch::{ExecutionResult, FailureKind};
use crate::worker::sink;
use crate::worker::transport::{RemoteOutput, Transport};

/// Runs the command against exactly one node.
///
/// Every call produces one [`ExecutionResult`]; faults on the local side
/// (transport missing, timeout, unwritable sink) are folded into the result
/// instead of being returned as errors.
#[derive(Clone)]
pub struct NodeExecutor {
    transport: Arc<dyn Transport>,
    sink: OutputSink,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for NodeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeExecutor")
            .field("sink", &self.sink)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl NodeExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sink: OutputSink::default(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort the transport call once `token` is cancelled. Persistence of
    /// an already captured result is never interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    /// Execute `command` on `node`, persisting to the sink when configured.
    pub async fn execute(&self, node: &str, command: &RemoteCommand) -> ExecutionResult {
        tracing::info!(node, command = %command, "Executing command");

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(node, "Transport call aborted by cancellation");
                ExecutionResult::local_fault(
                    node.to_string(),
                    FailureKind::Cancelled,
                    "cancelled",
                )
            }
            result = self.call_transport(node, command) => result,
        };

        sink::persist(&self.sink, result).await
    }

    async fn call_transport(&self, node: &str, command: &RemoteCommand) -> ExecutionResult {
        let call = self.transport.run(node, command);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => Self::process_output(node, outcome),
                Err(_) => {
                    tracing::warn!(node, timeout = ?limit, "Command timed out");
                    ExecutionResult::local_fault(
                        node.to_string(),
                        FailureKind::TimedOut,
                        format!("timed out after {:?}", limit),
                    )
                }
            },
            None => Self::process_output(node, call.await),
        }
    }

    fn process_output(node: &str, outcome: std::io::Result<RemoteOutput>) -> ExecutionResult {
        match outcome {
            Ok(output) => {
                let result = ExecutionResult::from_remote(node.to_string(), output);
                tracing::info!(
                    node,
                    exit_status = ?result.exit_status,
                    success = result.is_success(),
                    "Command completed"
                );
                result
            }
            Err(e) => {
                tracing::error!(node, error = %e, "Transport failed to start");
                ExecutionResult::local_fault(
                    node.to_string(),
                    FailureKind::TransportStart,
                    format!("could not start transport: {}", e),
                )
            }
        }
    }
}
