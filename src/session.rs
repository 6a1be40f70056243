//! Interactive mode.
//!
//! Each input line is classified by [`parse_line`] and then either ends the
//! session, runs locally (`!cmd`) or re-resolves the node list and runs a
//! full grouped dispatch round. Rounds are strictly sequential: a session is
//! driven through `&mut self`, so the next line is not read until the
//! previous round has been rendered.

use std::io::Write;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::command::RemoteCommand;
use crate::dispatch::Dispatcher;
use crate::error::{ClshError, Result};
use crate::printer::{Printer, RenderMode, RoundReport};
use crate::resolver::{Node, NodeResolver};

/// Words that end the session, matched case-insensitively.
pub const QUIT_KEYWORDS: [&str; 2] = ["quit", "exit"];
/// Prefix that runs the rest of the line on the local machine.
pub const LOCAL_ESCAPE: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    LocalPassthrough,
    RemoteDispatch,
    Terminating,
}

/// What an input line asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    /// Blank line, or an escape with nothing after it.
    Skip,
    Terminate,
    /// Run this shell command locally.
    Local(String),
    Remote(RemoteCommand),
}

/// Classify one line of operator input.
pub fn parse_line(line: &str) -> Result<LineAction> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(LineAction::Skip);
    }
    if QUIT_KEYWORDS
        .iter()
        .any(|kw| trimmed.eq_ignore_ascii_case(kw))
    {
        return Ok(LineAction::Terminate);
    }
    if let Some(local) = trimmed.strip_prefix(LOCAL_ESCAPE) {
        let local = local.trim();
        if local.is_empty() {
            return Ok(LineAction::Skip);
        }
        return Ok(LineAction::Local(local.to_string()));
    }
    match RemoteCommand::parse(trimmed) {
        Ok(command) => Ok(LineAction::Remote(command)),
        Err(ClshError::EmptyCommand) => Ok(LineAction::Skip),
        Err(e) => Err(e),
    }
}

/// Strip the line terminator and check the line is text.
fn decode_line(raw: &[u8]) -> Result<&str> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    std::str::from_utf8(line)
        .map_err(|e| ClshError::Tokenize(format!("input line is not valid UTF-8: {}", e)))
}

pub struct Session<W: Write> {
    resolver: NodeResolver,
    dispatcher: Dispatcher,
    printer: Printer<W>,
    cancel: CancellationToken,
    nodes: Vec<Node>,
    state: SessionState,
    prompt: Option<String>,
    rounds: usize,
}

impl<W: Write> Session<W> {
    /// Resolve the node list once up front; a session cannot start without
    /// nodes. The dispatcher's cancellation token also stops the session.
    pub async fn start(
        resolver: NodeResolver,
        dispatcher: Dispatcher,
        printer: Printer<W>,
    ) -> Result<Self> {
        let nodes = resolver.resolve().await?;
        tracing::info!(nodes = nodes.len(), "Interactive session started");
        let cancel = dispatcher.cancellation().clone();
        Ok(Self {
            resolver,
            dispatcher,
            printer,
            cancel,
            nodes,
            state: SessionState::AwaitingInput,
            prompt: None,
            rounds: 0,
        })
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Node set used by the most recent round.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of remote rounds run so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn printer(&self) -> &Printer<W> {
        &self.printer
    }

    pub fn into_printer(self) -> Printer<W> {
        self.printer
    }

    /// Read and handle lines until `quit`, end of input or cancellation.
    ///
    /// A line that is not valid UTF-8 is reported and skipped like any other
    /// malformed line.
    pub async fn run<R>(&mut self, mut input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut raw = Vec::new();

        while self.state != SessionState::Terminating {
            if let Some(prompt) = &self.prompt {
                self.printer.prompt(prompt)?;
            }

            raw.clear();
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => 0,
                read = input.read_until(b'\n', &mut raw) => read?,
            };
            if read == 0 {
                self.state = SessionState::Terminating;
                continue;
            }

            match decode_line(&raw) {
                Ok(line) => self.handle_line(line).await?,
                Err(e) => self.printer.error(e)?,
            }
        }

        tracing::info!(rounds = self.rounds, "Interactive session finished");
        Ok(())
    }

    /// Handle a single input line and return to `AwaitingInput` unless the
    /// line (or a cancellation) ends the session.
    pub async fn handle_line(&mut self, line: &str) -> Result<()> {
        let action = match parse_line(line) {
            Ok(action) => action,
            Err(e) => {
                self.printer.error(e)?;
                return Ok(());
            }
        };

        match action {
            LineAction::Skip => {}
            LineAction::Terminate => {
                self.state = SessionState::Terminating;
                return Ok(());
            }
            LineAction::Local(command) => {
                self.state = SessionState::LocalPassthrough;
                self.run_local(&command).await?;
            }
            LineAction::Remote(command) => {
                self.state = SessionState::RemoteDispatch;
                if let Some(report) = self.run_remote(command).await? {
                    if report.cancelled {
                        self.state = SessionState::Terminating;
                        return Ok(());
                    }
                }
            }
        }

        self.state = if self.cancel.is_cancelled() {
            SessionState::Terminating
        } else {
            SessionState::AwaitingInput
        };
        Ok(())
    }

    async fn run_local(&mut self, command: &str) -> Result<()> {
        tracing::debug!(command, "Running local command");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => self.printer.local_output(&output.stdout, &output.stderr)?,
            Err(e) => self
                .printer
                .error(format!("could not run local command: {}", e))?,
        }
        Ok(())
    }

    /// Returns `None` when the node list could not be resolved.
    async fn run_remote(&mut self, command: RemoteCommand) -> Result<Option<RoundReport>> {
        match self.resolver.resolve().await {
            Ok(nodes) => self.nodes = nodes,
            Err(e) => {
                self.printer.error(e)?;
                return Ok(None);
            }
        }

        let stream = self.dispatcher.dispatch_round(self.nodes.clone(), command);
        let report = self
            .printer
            .collect(stream, RenderMode::Grouped, &self.cancel)
            .await?;
        self.rounds += 1;
        tracing::debug!(
            round = self.rounds,
            succeeded = report.succeeded,
            failed = report.failed,
            "Round rendered"
        );
        Ok(Some(report))
    }
}
