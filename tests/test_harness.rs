//! Shared helpers for clsh integration tests.
//!
//! Provides a scriptable in-process transport plus a loopback transport that
//! runs commands on the local machine through `sh`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use clsh::command::RemoteCommand;
use clsh::config::{DispatchConfig, TransportConfig, TransportKind};
use clsh::dispatch::{Dispatcher, ExecutionResult, RoundStream};
use clsh::worker::{NodeExecutor, ProcessTransport, RemoteOutput, Transport};

/// How the fake transport answers for a node.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit 0 and print `<command>\n`.
    Echo,
    Succeed(Vec<u8>),
    Fail { code: i32, stderr: String },
    /// The transport itself cannot be started.
    StartError(String),
    Delay(Duration, Box<Behavior>),
    /// Cancel the token, then answer as the inner behavior does.
    CancelThen(CancellationToken, Box<Behavior>),
    /// Never returns.
    Hang,
    Panic,
}

impl Behavior {
    pub fn succeed(stdout: &str) -> Self {
        Behavior::Succeed(stdout.as_bytes().to_vec())
    }

    pub fn succeed_bytes(stdout: &[u8]) -> Self {
        Behavior::Succeed(stdout.to_vec())
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Behavior::Fail {
            code,
            stderr: stderr.to_string(),
        }
    }

    pub fn delayed(ms: u64, then: Behavior) -> Self {
        Behavior::Delay(Duration::from_millis(ms), Box::new(then))
    }
}

/// In-process transport that records every call and tracks concurrency.
pub struct FakeTransport {
    behaviors: HashMap<String, Behavior>,
    default: Behavior,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_default(Behavior::Echo)
    }

    pub fn with_default(default: Behavior) -> Self {
        Self {
            behaviors: HashMap::new(),
            default,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, node: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(node.to_string(), behavior);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every `(node, tokens)` the transport was asked to run.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

struct InFlight<'a> {
    running: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { running }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn run(&self, node: &str, command: &RemoteCommand) -> std::io::Result<RemoteOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((node.to_string(), command.tokens().to_vec()));
        let _guard = InFlight::enter(&self.running, &self.peak);

        let mut behavior = self
            .behaviors
            .get(node)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        loop {
            match behavior {
                Behavior::Delay(delay, then) => {
                    tokio::time::sleep(delay).await;
                    behavior = *then;
                }
                Behavior::CancelThen(token, then) => {
                    token.cancel();
                    behavior = *then;
                }
                Behavior::Echo => {
                    return Ok(RemoteOutput {
                        stdout: format!("{}\n", command).into_bytes(),
                        stderr: Vec::new(),
                        exit_status: Some(0),
                    })
                }
                Behavior::Succeed(stdout) => {
                    return Ok(RemoteOutput {
                        stdout,
                        stderr: Vec::new(),
                        exit_status: Some(0),
                    })
                }
                Behavior::Fail { code, stderr } => {
                    return Ok(RemoteOutput {
                        stdout: Vec::new(),
                        stderr: stderr.into_bytes(),
                        exit_status: Some(code),
                    })
                }
                Behavior::StartError(message) => {
                    return Err(std::io::Error::new(std::io::ErrorKind::NotFound, message))
                }
                Behavior::Hang => return std::future::pending().await,
                Behavior::Panic => panic!("fake transport panicked on {}", node),
            }
        }
    }
}

/// A real process transport that runs the command locally the way sshd
/// would, by handing the quoted command string to a fresh shell:
/// `sh -c 'shift; exec sh -c "$1"' clsh-loopback <node> <command>`.
pub fn loopback_transport() -> ProcessTransport {
    ProcessTransport::new(
        TransportConfig::new(TransportKind::Ssh)
            .with_program("sh")
            .with_arg("-c")
            .with_arg("shift; exec sh -c \"$1\"")
            .with_arg("clsh-loopback"),
    )
}

pub fn dispatcher(transport: &Arc<FakeTransport>, config: DispatchConfig) -> Dispatcher {
    let executor = NodeExecutor::new(transport.clone()).with_timeout(config.timeout);
    Dispatcher::new(executor, config)
}

pub fn nodes(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub fn cmd(tokens: &[&str]) -> RemoteCommand {
    RemoteCommand::new(tokens.iter().map(|t| t.to_string()).collect()).unwrap()
}

/// Drain a round completely.
pub async fn collect_all(stream: RoundStream) -> Vec<ExecutionResult> {
    stream.collect().await
}

/// Results keyed by node; panics on duplicate nodes.
pub fn by_node(results: Vec<ExecutionResult>) -> HashMap<String, ExecutionResult> {
    let mut map = HashMap::new();
    for result in results {
        let node = result.node.clone();
        assert!(
            map.insert(node.clone(), result).is_none(),
            "duplicate result for {}",
            node
        );
    }
    map
}
