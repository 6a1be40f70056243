//! Fan-out of one command to many nodes.
//!
//! [`Dispatcher::dispatch_round`] launches one worker per node, bounded by
//! the configured concurrency ceiling, and funnels every
//! [`ExecutionResult`] into a per-round [`RoundStream`]. Results arrive in
//! completion order.

pub mod result;
pub mod round;

pub use result::{ExecutionResult, FailureKind};
pub use round::{Dispatcher, RoundStream};
