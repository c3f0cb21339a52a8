use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Returns a token cancelled on SIGINT or SIGTERM
///
/// Commands that run until interrupted watch this token and return
/// normally once it fires.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        token_clone.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, stopping"),
        _ = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, stopping"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
