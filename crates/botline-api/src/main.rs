//! botline CLI and admin REST API entry point.
//!
//! Binary name: `botline`
//!
//! Parses CLI arguments, initializes tracing and the session gateway, then
//! dispatches to the command handler or runs the server.

mod alerts;
mod cli;
mod http;
mod state;

use std::sync::Arc;

use botline_core::cleanup::CleanupScheduler;
use botline_infra::filesystem::resolve_data_dir;
use botline_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (enable_otel, json_logs) = match &cli.command {
        Commands::Serve {
            otel, json_logs, ..
        } => (*otel, *json_logs),
        _ => (false, false),
    };
    init_tracing(&TracingOptions {
        enable_otel,
        json: json_logs,
        default_filter: cli.log_filter().to_string(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "botline", &mut std::io::stdout());
        }

        Commands::Config => {
            cli::config::show_config(&resolve_data_dir(), cli.json).await?;
        }

        Commands::Serve { port, host, .. } => {
            let state = AppState::init().await?;
            serve(state, &host, port, cli.quiet).await?;
        }
    }

    Ok(())
}

async fn serve(state: AppState, host: &str, port: u16, quiet: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let alerts = alerts::spawn_event_logger(state.manager.events(), cancel.child_token());

    let started = state.manager.boot().await;
    let cleanup = CleanupScheduler::new(Arc::clone(&state.manager)).spawn(cancel.child_token());

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if !quiet {
        println!(
            "  {} botline admin API listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        println!(
            "  {} auto-started {} tenant(s), data in {}",
            console::style("•").dim(),
            started.len(),
            state.data_dir.display()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state.clone());
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("stopping all sessions");
    state.manager.shutdown().await;
    cancel.cancel();
    if let Some(cleanup) = cleanup {
        let _ = cleanup.await;
    }
    let _ = alerts.await;

    if !quiet {
        println!("\n  Server stopped.");
    }
    served.map_err(Into::into)
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
