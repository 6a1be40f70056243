use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding a colon-separated node list.
pub const HOSTS_ENV: &str = "CLSH_HOSTS";
/// Environment variable holding the path of a node file.
pub const HOSTFILE_ENV: &str = "CLSH_HOSTFILE";
/// Node file looked up in the working directory when nothing else is set.
pub const DEFAULT_HOSTFILE: &str = ".hostfile";
/// Upper bound on concurrent workers when no explicit ceiling is given.
pub const DEFAULT_MAX_PARALLEL: usize = 64;

/// Remote-execution facility used to reach a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TransportKind {
    /// `docker exec <node> <command...>`
    #[default]
    Docker,
    /// `ssh <node> <command...>`
    Ssh,
}

impl TransportKind {
    pub fn default_program(self) -> &'static str {
        match self {
            TransportKind::Docker => "docker",
            TransportKind::Ssh => "ssh",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Docker => write!(f, "docker"),
            TransportKind::Ssh => write!(f, "ssh"),
        }
    }
}

/// Configuration for the process-backed transport.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Binary to invoke instead of the kind's default (`docker`, `ssh`).
    pub program: Option<String>,
    /// Extra arguments placed before the node, e.g. `-oBatchMode=yes` for ssh.
    pub extra_args: Vec<String>,
}

impl TransportConfig {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        self.program
            .as_deref()
            .unwrap_or_else(|| self.kind.default_program())
    }
}

/// Knobs for one dispatch round.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Maximum number of workers running at once. `None` means
    /// `min(node_count, DEFAULT_MAX_PARALLEL)`.
    pub max_parallel: Option<usize>,
    /// Per-worker deadline for the transport call.
    pub timeout: Option<Duration>,
}

impl DispatchConfig {
    pub fn with_max_parallel(mut self, limit: usize) -> Self {
        self.max_parallel = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective concurrency ceiling for a round over `node_count` nodes.
    /// Always at least 1 so an empty round still builds a valid semaphore.
    pub fn parallelism(&self, node_count: usize) -> usize {
        let ceiling = self.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL);
        ceiling.min(node_count).max(1)
    }
}

/// Optional directories where workers persist captured streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSink {
    /// Successful stdout goes to `<out_dir>/<node>.out`.
    pub out_dir: Option<PathBuf>,
    /// Failing stderr goes to `<err_dir>/<node>.err`.
    pub err_dir: Option<PathBuf>,
}

impl OutputSink {
    pub fn new(out_dir: Option<PathBuf>, err_dir: Option<PathBuf>) -> Self {
        Self { out_dir, err_dir }
    }

    pub fn is_empty(&self) -> bool {
        self.out_dir.is_none() && self.err_dir.is_none()
    }
}

/// Every place a node list may come from, highest precedence first.
#[derive(Debug, Clone)]
pub struct NodeSources {
    /// `--node-list a,b,c`
    pub node_list: Option<String>,
    /// `--node-file path`
    pub node_file: Option<PathBuf>,
    /// `CLSH_HOSTS=a:b:c`
    pub env_list: Option<String>,
    /// `CLSH_HOSTFILE=path`
    pub env_file: Option<PathBuf>,
    /// `.hostfile` in the working directory
    pub default_file: PathBuf,
}

impl Default for NodeSources {
    fn default() -> Self {
        Self {
            node_list: None,
            node_file: None,
            env_list: None,
            env_file: None,
            default_file: PathBuf::from(DEFAULT_HOSTFILE),
        }
    }
}

impl NodeSources {
    /// Fill the environment-backed sources from the process environment.
    /// Unset and empty variables are treated the same.
    pub fn with_env(mut self) -> Self {
        self.env_list = std::env::var(HOSTS_ENV).ok().filter(|v| !v.is_empty());
        self.env_file = std::env::var(HOSTFILE_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        self
    }

    pub fn with_node_list(mut self, list: impl Into<String>) -> Self {
        self.node_list = Some(list.into());
        self
    }

    pub fn with_node_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.node_file = Some(path.into());
        self
    }

    pub fn with_env_list(mut self, list: impl Into<String>) -> Self {
        self.env_list = Some(list.into());
        self
    }

    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn with_default_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_file = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_config_default() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.kind, TransportKind::Docker);
        assert_eq!(cfg.program(), "docker");
        assert!(cfg.extra_args.is_empty());
    }

    #[test]
    fn transport_config_program_override() {
        let cfg = TransportConfig::new(TransportKind::Ssh);
        assert_eq!(cfg.program(), "ssh");

        let cfg = cfg.with_program("/usr/local/bin/ssh").with_arg("-oBatchMode=yes");
        assert_eq!(cfg.program(), "/usr/local/bin/ssh");
        assert_eq!(cfg.extra_args, vec!["-oBatchMode=yes".to_string()]);
    }

    #[test]
    fn dispatch_config_parallelism_defaults_to_node_count() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.parallelism(3), 3);
        assert_eq!(cfg.parallelism(500), DEFAULT_MAX_PARALLEL);
    }

    #[test]
    fn dispatch_config_parallelism_never_zero() {
        assert_eq!(DispatchConfig::default().parallelism(0), 1);
        assert_eq!(DispatchConfig::default().with_max_parallel(0).parallelism(10), 1);
    }

    #[test]
    fn dispatch_config_explicit_ceiling() {
        let cfg = DispatchConfig::default()
            .with_max_parallel(4)
            .with_timeout(Duration::from_secs(2));
        assert_eq!(cfg.parallelism(100), 4);
        assert_eq!(cfg.parallelism(2), 2);
        assert_eq!(cfg.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn output_sink_is_empty() {
        assert!(OutputSink::default().is_empty());
        assert!(!OutputSink::new(Some(PathBuf::from("out")), None).is_empty());
        assert!(!OutputSink::new(None, Some(PathBuf::from("err"))).is_empty());
    }

    #[test]
    fn node_sources_default() {
        let sources = NodeSources::default();
        assert!(sources.node_list.is_none());
        assert!(sources.node_file.is_none());
        assert!(sources.env_list.is_none());
        assert!(sources.env_file.is_none());
        assert_eq!(sources.default_file, PathBuf::from(".hostfile"));
    }

    #[test]
    fn node_sources_builders() {
        let sources = NodeSources::default()
            .with_node_list("a,b")
            .with_node_file("/nodes")
            .with_env_list("c:d")
            .with_env_file("/env-nodes")
            .with_default_file("/default");
        assert_eq!(sources.node_list.as_deref(), Some("a,b"));
        assert_eq!(sources.node_file, Some(PathBuf::from("/nodes")));
        assert_eq!(sources.env_list.as_deref(), Some("c:d"));
        assert_eq!(sources.env_file, Some(PathBuf::from("/env-nodes")));
        assert_eq!(sources.default_file, PathBuf::from("/default"));
    }
}
