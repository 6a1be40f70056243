use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::command::RemoteCommand;
use crate::config::DispatchConfig;
use crate::dispatch::{ExecutionResult, FailureKind};
use crate::resolver::Node;
use crate::worker::NodeExecutor;

/// Results of one dispatch round, in completion order.
///
/// The stream ends once every launched worker has delivered, so it always
/// yields exactly [`expected`](Self::expected) items unless the consumer stops
/// early.
#[derive(Debug)]
pub struct RoundStream {
    inner: ReceiverStream<ExecutionResult>,
    expected: usize,
}

impl RoundStream {
    /// Number of results this round will deliver.
    pub fn expected(&self) -> usize {
        self.expected
    }
}

impl Stream for RoundStream {
    type Item = ExecutionResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Fans a command out to every node of a round.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    executor: NodeExecutor,
    config: DispatchConfig,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(executor: NodeExecutor, config: DispatchConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            executor: executor.with_cancellation(cancel.clone()),
            config,
            cancel,
        }
    }

    /// Observe `token`: once cancelled, running workers are aborted (killing
    /// their transport process) and unlaunched nodes are reported as
    /// cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Launch one worker per node and return the stream of their results.
    ///
    /// Must be called from within a tokio runtime. An empty node list yields
    /// an empty stream.
    pub fn dispatch_round(&self, nodes: Vec<Node>, command: RemoteCommand) -> RoundStream {
        let expected = nodes.len();
        let limit = self.config.parallelism(expected);
        let (tx, rx) = mpsc::channel(expected.max(1));

        tracing::info!(
            nodes = expected,
            parallelism = limit,
            command = %command,
            "Dispatching round"
        );

        let round = Round {
            executor: self.executor.clone(),
            command: Arc::new(command),
            semaphore: Arc::new(Semaphore::new(limit)),
            cancel: self.cancel.clone(),
            tx,
        };
        tokio::spawn(round.drive(nodes));

        RoundStream {
            inner: ReceiverStream::new(rx),
            expected,
        }
    }
}

/// State owned by the task driving a single round.
struct Round {
    executor: NodeExecutor,
    command: Arc<RemoteCommand>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ExecutionResult>,
}

impl Round {
    async fn drive(self, nodes: Vec<Node>) {
        let mut workers = JoinSet::new();
        let mut launched = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = self.semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                self.deliver(ExecutionResult::local_fault(
                    node,
                    FailureKind::Cancelled,
                    "cancelled before dispatch",
                ))
                .await;
                continue;
            };

            let executor = self.executor.clone();
            let command = self.command.clone();
            let tx = self.tx.clone();
            let task_node = node.clone();

            // The executor observes the same token and aborts only its
            // transport call, so a result being persisted is finished first.
            let handle = workers.spawn(async move {
                let _permit = permit;
                let result = executor.execute(&task_node, &command).await;
                // The collector may have stopped listening; nothing to do then.
                let _ = tx.send(result).await;
            });
            launched.insert(handle.id(), node);
        }

        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    launched.remove(&id);
                }
                Err(e) => {
                    // A worker that died before delivering still owes a result.
                    if let Some(node) = launched.remove(&e.id()) {
                        tracing::error!(node = %node, error = %e, "Worker task failed");
                        self.deliver(ExecutionResult::local_fault(
                            node,
                            FailureKind::WorkerPanic,
                            format!("worker task failed: {}", e),
                        ))
                        .await;
                    }
                }
            }
        }

        tracing::debug!("Round complete");
    }

    async fn deliver(&self, result: ExecutionResult) {
        let _ = self.tx.send(result).await;
    }
}
