//! Fan-out remote command execution.
//!
//! Resolve a node list, run one command on every node concurrently through
//! an external transport (`docker exec`, `ssh`), and render each node's
//! outcome as it arrives or grouped once the round completes.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod printer;
pub mod resolver;
pub mod session;
pub mod shutdown;
pub mod worker;
