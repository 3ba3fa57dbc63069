//! tabmux: tmux-backed terminal tabs served over line-delimited JSON-RPC.
//! One process owns one private tmux server; every tab is a window in it.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tabmux_core::TabService;
use tabmux_tmux::{TmuxExecutor, private_socket_path};

mod cli;
mod client;
mod protocol;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Serve(opts) => {
            let filter = std::env::var("TABMUX_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .with_writer(std::io::stderr)
                .init();

            run_serve(opts).await?;
        }
        cli::Command::Call(opts) => {
            client::cmd_call(&opts.listen, &opts.method, &opts.params).await?;
        }
    }

    Ok(())
}

async fn run_serve(opts: cli::ServeOpts) -> anyhow::Result<()> {
    let tmux_socket = opts.tmux_socket.clone().unwrap_or_else(private_socket_path);
    let executor = TmuxExecutor::new(opts.tmux_bin.as_str()).with_socket_path(&tmux_socket);
    let service = Arc::new(TabService::new(executor, opts.core_config()));

    tracing::info!(
        tmux_socket = %tmux_socket.display(),
        session = %service.config().session_name,
        "tabmux starting"
    );

    let served = match opts.listen.as_deref() {
        Some(listen) => {
            tokio::select! {
                r = server::run_uds(listen, Arc::clone(&service)) => r,
                () = shutdown_signal() => Ok(()),
            }
        }
        None => {
            tokio::select! {
                r = server::run_stdio(Arc::clone(&service)) => r,
                () = shutdown_signal() => Ok(()),
            }
        }
    };

    if let Err(e) = service.shutdown().await {
        tracing::warn!("tmux teardown failed: {e}");
    }
    remove_socket(&tmux_socket);
    if let Some(listen) = opts.listen.as_deref() {
        remove_socket(listen);
    }
    tracing::info!("tabmux stopped");

    served
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("cannot remove {}: {e}", path.display()),
    }
}
