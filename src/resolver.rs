//! Node list resolution.
//!
//! Sources are consulted in a fixed precedence order and the first one that
//! yields at least one node wins:
//!
//! 1. `--node-list` (comma-separated)
//! 2. `--node-file` (one node per line)
//! 3. `CLSH_HOSTS` (colon-separated)
//! 4. `CLSH_HOSTFILE` (one node per line)
//! 5. `.hostfile` in the working directory
//!
//! Missing, unreadable or empty sources fall through to the next one.
//! Files are re-read on every call so an interactive session sees
//! membership changes between commands.

use std::path::Path;

use crate::config::NodeSources;
use crate::error::{ClshError, Result};

/// Opaque identifier of a target endpoint (container name, host name, ...).
pub type Node = String;

/// Where a resolved node list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSource {
    NodeList,
    NodeFile,
    EnvList,
    EnvFile,
    DefaultFile,
}

impl std::fmt::Display for NodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeSource::NodeList => write!(f, "--node-list"),
            NodeSource::NodeFile => write!(f, "--node-file"),
            NodeSource::EnvList => write!(f, "{}", crate::config::HOSTS_ENV),
            NodeSource::EnvFile => write!(f, "{}", crate::config::HOSTFILE_ENV),
            NodeSource::DefaultFile => write!(f, "default node file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeResolver {
    sources: NodeSources,
}

impl NodeResolver {
    pub fn new(sources: NodeSources) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &NodeSources {
        &self.sources
    }

    /// Resolve the ordered node list.
    pub async fn resolve(&self) -> Result<Vec<Node>> {
        self.resolve_with_source().await.map(|(_, nodes)| nodes)
    }

    /// Resolve the node list and report which source supplied it.
    pub async fn resolve_with_source(&self) -> Result<(NodeSource, Vec<Node>)> {
        let s = &self.sources;

        // The two flag sources were asked for explicitly, so falling past
        // them is worth a warning.
        if let Some(list) = &s.node_list {
            let nodes = split_list(list, ',');
            if !nodes.is_empty() {
                return Ok(found(NodeSource::NodeList, nodes));
            }
            tracing::warn!(list = %list, "--node-list names no nodes, trying other sources");
        }

        if let Some(path) = &s.node_file {
            if let Some(nodes) = read_node_file(path).await {
                return Ok(found(NodeSource::NodeFile, nodes));
            }
            tracing::warn!(
                path = %path.display(),
                "--node-file yielded no nodes, trying other sources"
            );
        }

        if let Some(list) = &s.env_list {
            let nodes = split_list(list, ':');
            if !nodes.is_empty() {
                return Ok(found(NodeSource::EnvList, nodes));
            }
        }

        if let Some(path) = &s.env_file {
            if let Some(nodes) = read_node_file(path).await {
                return Ok(found(NodeSource::EnvFile, nodes));
            }
        }

        if let Some(nodes) = read_node_file(&s.default_file).await {
            return Ok(found(NodeSource::DefaultFile, nodes));
        }

        Err(ClshError::NoNodesConfigured(
            s.default_file.display().to_string(),
        ))
    }
}

fn found(source: NodeSource, nodes: Vec<Node>) -> (NodeSource, Vec<Node>) {
    tracing::debug!(%source, count = nodes.len(), "Resolved nodes");
    (source, nodes)
}

fn split_list(list: &str, sep: char) -> Vec<Node> {
    list.split(sep)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse node file contents: one node per line, blank lines and `#`
/// comments skipped.
pub fn parse_node_lines(contents: &str) -> Vec<Node> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Returns `None` when the file is missing, unreadable or has no nodes.
async fn read_node_file(path: &Path) -> Option<Vec<Node>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let nodes = parse_node_lines(&contents);
            if nodes.is_empty() {
                tracing::debug!(path = %path.display(), "Node file is empty, skipping");
                None
            } else {
                Some(nodes)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Node file not found, skipping");
            None
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not read node file, skipping"
            );
            None
        }
    }
}
