//! Result collection and rendering.
//!
//! [`Printer::collect`] drains a round's results and renders each one exactly
//! once, either as it arrives ([`RenderMode::Streaming`]) or all together
//! once the round is over ([`RenderMode::Grouped`]).

use std::io::Write;

use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{ExecutionResult, FailureKind};

const GROUP_RULE: &str = "====================";
const GROUP_FOOTER: &str = "--------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Print every result as soon as it arrives, each line tagged with its
    /// node.
    Streaming,
    /// Buffer the round and print each node's block between separators.
    Grouped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Tally of one collected round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub delivered: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The round was cut short by cancellation.
    pub cancelled: bool,
}

impl RoundReport {
    fn record(&mut self, result: &ExecutionResult) {
        self.delivered += 1;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn all_succeeded(&self) -> bool {
        !self.cancelled && self.failed == 0
    }
}

/// Text shown for a result: the sink summary when there is one, otherwise
/// the trimmed stdout on success or an error line on failure.
pub fn payload(result: &ExecutionResult) -> String {
    if let Some(summary) = &result.summary {
        return summary.clone();
    }
    match result.failure {
        None => result.stdout_text().trim().to_string(),
        Some(kind) => {
            let stderr = result.stderr_text();
            let detail = stderr.trim();
            let detail = if !detail.is_empty() {
                detail.to_string()
            } else if let Some(code) = result.exit_status {
                format!("exit status {}", code)
            } else {
                kind.to_string()
            };
            format!("Error executing command on {}: {}", result.node, detail)
        }
    }
}

pub struct Printer<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Drain `results`, rendering per `mode`.
    ///
    /// The cancellation token is checked before each delivery; once it fires
    /// no further results are taken and whatever was already received is
    /// rendered.
    pub async fn collect<S>(
        &mut self,
        mut results: S,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> std::io::Result<RoundReport>
    where
        S: Stream<Item = ExecutionResult> + Unpin,
    {
        let mut report = RoundReport::default();
        let mut buffered = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(delivered = report.delivered, "Collection cancelled");
                    report.cancelled = true;
                    break;
                }
                next = results.next() => next,
            };
            let Some(result) = next else {
                break;
            };

            report.record(&result);
            match mode {
                RenderMode::Streaming => self.render_streaming(&result)?,
                RenderMode::Grouped => buffered.push(result),
            }
        }

        if mode == RenderMode::Grouped {
            self.render_grouped(&buffered)?;
        }
        self.out.flush()?;
        Ok(report)
    }

    fn render_streaming(&mut self, result: &ExecutionResult) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, result)?;
                writeln!(self.out)?;
            }
            OutputFormat::Text => {
                let text = payload(result);
                if text.is_empty() {
                    writeln!(self.out, "{}: ", result.node)?;
                }
                for line in text.lines() {
                    writeln!(self.out, "{}: {}", result.node, line)?;
                }
            }
        }
        self.out.flush()
    }

    fn render_grouped(&mut self, results: &[ExecutionResult]) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.out, results)?;
                writeln!(self.out)?;
            }
            OutputFormat::Text => {
                for result in results {
                    writeln!(self.out, "{} {} {}", GROUP_RULE, result.node, GROUP_RULE)?;
                    let text = payload(result);
                    if !text.is_empty() {
                        writeln!(self.out, "{}", text)?;
                    }
                    writeln!(self.out, "{}", GROUP_FOOTER)?;
                }
            }
        }
        Ok(())
    }

    /// Render the output of a locally executed command verbatim.
    pub fn local_output(&mut self, stdout: &[u8], stderr: &[u8]) -> std::io::Result<()> {
        self.out.write_all(stdout)?;
        self.out.write_all(stderr)?;
        self.out.flush()
    }

    /// Report a problem with the operator's input or the session itself.
    pub fn error(&mut self, message: impl std::fmt::Display) -> std::io::Result<()> {
        writeln!(self.out, "error: {}", message)?;
        self.out.flush()
    }

    pub fn prompt(&mut self, prompt: &str) -> std::io::Result<()> {
        write!(self.out, "{}", prompt)?;
        self.out.flush()
    }
}
