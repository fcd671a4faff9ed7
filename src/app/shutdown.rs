use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `token` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_signal() => token.cancel(),
            () = token.cancelled() => {}
        }
    })
}

/// Resolves on the first termination signal.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                None
            }
        };

        tokio::select! {
            () = ctrl_c() => info!("got SIGINT"),
            Some(()) = recv_sigterm(&mut sigterm) => info!("got SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("got SIGINT");
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        error!("Failed to listen for SIGINT: {}", err);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn recv_sigterm(sigterm: &mut Option<signal::unix::Signal>) -> Option<()> {
    match sigterm {
        Some(sigterm) => sigterm.recv().await,
        None => std::future::pending().await,
    }
}
