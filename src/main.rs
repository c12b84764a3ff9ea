use clap::Parser;
use container_enricher::{
    cache_manager, cli::Cli, config::EnricherConfig, error::Result, logging,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = EnricherConfig::try_from(cli)?;
    let handle = cache_manager::initialize(&config).await?;

    for pid in &config.resolve_pids {
        match cache_manager::lookup_pid(*pid) {
            Ok(Some(pod)) => info!(
                pid,
                pod = %pod.name,
                namespace = %pod.namespace,
                "resolved pid"
            ),
            Ok(None) => info!(pid, "pid does not belong to a known container"),
            Err(e) => warn!("failed to resolve pid {}: {}", pid, e),
        }
    }

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        wait_for_signal(&cancel).await;
    });

    handle.join().await?;
    info!("enrichment stopped");
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM
async fn wait_for_signal(token: &CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
        () = wait_sigterm() => info!("received SIGTERM, shutting down"),
        () = token.cancelled() => return,
    }
    token.cancel();
}

#[cfg(unix)]
async fn wait_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        // Without a handler SIGTERM never fires
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_sigterm() {
    std::future::pending::<()>().await;
}
