use std::borrow::Cow;

use serde::{Serialize, Serializer};

use crate::resolver::Node;
use crate::worker::transport::RemoteOutput;

/// Why a node's result counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The transport process could not be started at all.
    TransportStart,
    /// The remote command ran and exited non-zero.
    RemoteNonZeroExit,
    /// Captured output could not be written to the output sink.
    Persistence,
    /// The transport call exceeded the per-worker timeout and was killed.
    TimedOut,
    /// The round was cancelled before this worker finished.
    Cancelled,
    /// The worker task panicked before producing a result.
    WorkerPanic,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::TransportStart => write!(f, "transport start failure"),
            FailureKind::RemoteNonZeroExit => write!(f, "remote non-zero exit"),
            FailureKind::Persistence => write!(f, "persistence failure"),
            FailureKind::TimedOut => write!(f, "timed out"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::WorkerPanic => write!(f, "worker panicked"),
        }
    }
}

/// Outcome of running the command on one node.
///
/// Exactly one is produced per launched worker per round. `summary` is only
/// set when the output sink persisted (or failed to persist) a stream.
/// Streams are kept as the raw bytes the transport captured; they are only
/// decoded for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub node: Node,
    #[serde(serialize_with = "lossy_text")]
    pub stdout: Vec<u8>,
    #[serde(serialize_with = "lossy_text")]
    pub stderr: Vec<u8>,
    /// `None` when no remote process produced a status (local faults,
    /// signals).
    pub exit_status: Option<i32>,
    pub summary: Option<String>,
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// Wrap what the transport returned.
    pub fn from_remote(node: Node, output: RemoteOutput) -> Self {
        let failure = if output.success() {
            None
        } else {
            Some(FailureKind::RemoteNonZeroExit)
        };
        Self {
            node,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status: output.exit_status,
            summary: None,
            failure,
        }
    }

    /// A synthesized result for a fault on the local side. The message
    /// takes the place of the error stream.
    pub fn local_fault(node: Node, kind: FailureKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            node,
            stdout: Vec::new(),
            stderr: message.into_bytes(),
            exit_status: None,
            summary: None,
            failure: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

fn lossy_text<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}
