//! Per-node execution.
//!
//! - **Transport**: [`Transport`] carries a command to one node;
//!   [`ProcessTransport`] does it with `docker exec` or `ssh`.
//! - **Executor**: [`NodeExecutor`] invokes the transport, applies the
//!   per-worker timeout and turns the outcome into an
//!   [`ExecutionResult`](crate::dispatch::ExecutionResult).
//! - **Sink**: [`sink::persist`] optionally writes the relevant stream to
//!   `<dir>/<node>.<out|err>`.
//!
//! # Execution Flow
//!
//! 1. The dispatcher calls [`NodeExecutor::execute`] once per node
//! 2. The transport spawns the remote call and captures stdout/stderr/status
//! 3. Local faults become synthesized failing results
//! 4. The sink replaces the payload with a summary when it saved a file

pub mod executor;
pub mod sink;
pub mod transport;

pub use executor::NodeExecutor;
pub use transport::{ProcessTransport, RemoteOutput, Transport};
