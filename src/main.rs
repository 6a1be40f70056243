use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use clsh::command::RemoteCommand;
use clsh::config::{DispatchConfig, NodeSources, OutputSink, TransportConfig, TransportKind};
use clsh::dispatch::Dispatcher;
use clsh::printer::{OutputFormat, Printer, RenderMode};
use clsh::resolver::NodeResolver;
use clsh::session::Session;
use clsh::shutdown::{install_shutdown_handler, INTERRUPTED_EXIT_CODE};
use clsh::worker::{NodeExecutor, ProcessTransport};

/// Exit status for argument, configuration and resolution errors.
const USAGE_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "clsh")]
#[command(version)]
#[command(about = "Run a command on many containers or hosts at once")]
struct Args {
    /// Comma-separated nodes to target (highest precedence)
    #[arg(long, value_name = "NODES")]
    node_list: Option<String>,

    /// File with one node per line
    #[arg(long, visible_alias = "hostfile", value_name = "PATH")]
    node_file: Option<PathBuf>,

    /// Save each successful node's stdout to <DIR>/<node>.out
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Save each failing node's stderr to <DIR>/<node>.err
    #[arg(long, value_name = "DIR")]
    err: Option<PathBuf>,

    /// Read commands line by line and run each one on all nodes
    #[arg(short, long)]
    interactive: bool,

    // === Transport Options ===
    /// How commands reach a node
    #[arg(long, value_enum, default_value_t = TransportKind::Docker)]
    transport: TransportKind,

    /// Binary to invoke instead of `docker` / `ssh`
    #[arg(long, value_name = "PATH")]
    transport_bin: Option<String>,

    /// Extra argument passed to the transport before the node (repeatable)
    #[arg(long = "transport-arg", value_name = "ARG", allow_hyphen_values = true)]
    transport_args: Vec<String>,

    // === Dispatch Options ===
    /// Maximum number of nodes running the command at once (default: min(nodes, 64))
    #[arg(long, value_name = "N")]
    max_parallel: Option<usize>,

    /// Kill a node's command if it runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    // === Output Options ===
    /// Print all results together after every node has finished
    #[arg(long)]
    group: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log debug information to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Command to run on every node
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_dispatcher(args: &Args) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let mut transport = TransportConfig::new(args.transport);
    if let Some(program) = &args.transport_bin {
        transport = transport.with_program(program.clone());
    }
    for arg in &args.transport_args {
        transport = transport.with_arg(arg.clone());
    }

    let mut dispatch = DispatchConfig::default();
    if let Some(limit) = args.max_parallel {
        if limit == 0 {
            return Err("--max-parallel must be at least 1".into());
        }
        dispatch = dispatch.with_max_parallel(limit);
    }
    if let Some(secs) = args.timeout {
        if secs == 0 {
            return Err("--timeout must be at least 1 second".into());
        }
        dispatch = dispatch.with_timeout(Duration::from_secs(secs));
    }

    let sink = OutputSink::new(args.out.clone(), args.err.clone());

    tracing::debug!(
        transport = %args.transport,
        sink = ?sink,
        max_parallel = ?dispatch.max_parallel,
        timeout = ?dispatch.timeout,
        "Configured dispatcher"
    );

    let executor = NodeExecutor::new(Arc::new(ProcessTransport::new(transport)))
        .with_sink(sink)
        .with_timeout(dispatch.timeout);
    Ok(Dispatcher::new(executor, dispatch))
}

fn node_sources(args: &Args) -> NodeSources {
    let mut sources = NodeSources::default().with_env();
    if let Some(list) = &args.node_list {
        sources = sources.with_node_list(list.clone());
    }
    if let Some(path) = &args.node_file {
        sources = sources.with_node_file(path.clone());
    }
    sources
}

// =============================================================================
// Modes
// =============================================================================

async fn run_interactive(
    resolver: NodeResolver,
    dispatcher: Dispatcher,
    format: OutputFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cancel = dispatcher.cancellation().clone();
    let printer = Printer::new(std::io::stdout(), format);
    let mut session = Session::start(resolver, dispatcher, printer).await?;
    if std::io::stdin().is_terminal() {
        session = session.with_prompt("clsh> ");
    }

    session.run(BufReader::new(tokio::io::stdin())).await?;

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE));
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_batch(
    resolver: NodeResolver,
    dispatcher: Dispatcher,
    args: &Args,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let nodes = resolver.resolve().await?;
    let mut command = RemoteCommand::new(args.command.clone())?;
    let mut mode = if args.group {
        RenderMode::Grouped
    } else {
        RenderMode::Streaming
    };

    // Piped input is forwarded xargs-style as one trailing token.
    if !std::io::stdin().is_terminal() {
        let mut raw = Vec::new();
        tokio::io::stdin().read_to_end(&mut raw).await?;
        let input = String::from_utf8_lossy(&raw);
        if !input.trim().is_empty() {
            command = command.with_piped_input(&input);
            mode = RenderMode::Grouped;
        }
    }

    let cancel = dispatcher.cancellation().clone();
    let stream = dispatcher.dispatch_round(nodes, command);
    let mut printer = Printer::new(std::io::stdout(), args.format);
    let report = printer.collect(stream, mode, &cancel).await?;

    tracing::info!(
        delivered = report.delivered,
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        "Round finished"
    );

    if report.cancelled {
        Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
    } else if report.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cancel = install_shutdown_handler()?;
    let resolver = NodeResolver::new(node_sources(&args));
    let dispatcher = build_dispatcher(&args)?.with_cancellation(cancel);

    if args.interactive {
        run_interactive(resolver, dispatcher, args.format).await
    } else {
        run_batch(resolver, dispatcher, &args).await
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: could not start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(USAGE_EXIT_CODE)
        }
    };

    // A stdin read left pending by an interrupted session must not hold up exit.
    runtime.shutdown_timeout(Duration::from_millis(100));
    code
}
