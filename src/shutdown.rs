use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Exit status used when the run is interrupted by a signal.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled on the first signal. The
/// dispatcher aborts in-flight workers and the collector stops taking
/// results once it fires. A second signal exits the process immediately.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, cancelling in-flight commands");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, cancelling in-flight commands");
            }
        }
        token_clone.cancel();

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::warn!("Received second signal, exiting immediately");
        std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
    });

    Ok(token)
}
