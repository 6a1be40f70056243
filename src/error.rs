use thiserror::Error;

/// Process-level failures. Per-node faults never surface here; they are
/// carried inside [`ExecutionResult`](crate::dispatch::ExecutionResult).
#[derive(Error, Debug)]
pub enum ClshError {
    #[error("No nodes configured: pass --node-list or --node-file, set CLSH_HOSTS or CLSH_HOSTFILE, or create {0}")]
    NoNodesConfigured(String),

    #[error("Could not parse command line: {0}")]
    Tokenize(String),

    #[error("Empty command")]
    EmptyCommand,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClshError>;
