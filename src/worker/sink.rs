//! Per-node persistence of captured streams.
//!
//! Successful stdout lands in `<out_dir>/<node>.out`, failing stderr in
//! `<err_dir>/<node>.err`. Each worker only ever touches the file named after
//! its own node, so concurrent workers never contend for a path.

use std::path::Path;

use crate::config::OutputSink;
use crate::dispatch::{ExecutionResult, FailureKind};

/// File name used for `node`'s stream. Path separators are replaced so a
/// node name can never escape the sink directory.
pub fn file_name(node: &str, ext: &str) -> String {
    let safe: String = node
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    format!("{}.{}", safe, ext)
}

/// Write the stream matching the result's outcome to the sink, if a
/// directory is configured for it, and replace the payload with a summary.
pub async fn persist(sink: &OutputSink, mut result: ExecutionResult) -> ExecutionResult {
    let (dir, ext, stream) = match result.failure {
        None => (sink.out_dir.as_ref(), "out", "stdout"),
        Some(FailureKind::Cancelled) | Some(FailureKind::Persistence) => return result,
        Some(_) => (sink.err_dir.as_ref(), "err", "stderr"),
    };
    let Some(dir) = dir else {
        return result;
    };

    let path = dir.join(file_name(&result.node, ext));
    let contents = if ext == "out" {
        &result.stdout
    } else {
        &result.stderr
    };

    match write_stream(dir, &path, contents).await {
        Ok(()) => {
            tracing::debug!(node = %result.node, path = %path.display(), "Saved {}", stream);
            result.summary = Some(format!("{} saved to {}", stream, path.display()));
        }
        Err(e) => {
            tracing::warn!(
                node = %result.node,
                path = %path.display(),
                error = %e,
                "Could not save output"
            );
            result.summary = Some(format!(
                "could not save output for {} to {}: {}",
                result.node,
                path.display(),
                e
            ));
            result.failure = Some(FailureKind::Persistence);
        }
    }
    result
}

async fn write_stream(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, contents).await
}
