//! Shutdown on Ctrl-C or SIGTERM.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => (),
        () = terminate => (),
    }
}

/// Returns a token cancelled when the process is asked to stop.
///
/// The run checks it between messages, so the message in flight completes.
#[must_use]
pub fn shutdown() -> CancellationToken {
    let token = CancellationToken::new();
    let notifier = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested, stopping after the current message");
        notifier.cancel();
    });
    token
}
