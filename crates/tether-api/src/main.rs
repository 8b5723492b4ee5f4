//! Tether CLI and REST API entry point.
//!
//! Binary name: `tether`
//!
//! Parses CLI arguments, initializes tracing, the database and the session
//! hub, then dispatches to the appropriate command handler or starts the
//! REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, SessionsCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,tether=debug",
        _ => "trace",
    };
    tether_observe::init_tracing(cli.log_format.into(), filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    tether_observe::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that don't need app state
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "tether", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Config => {
            let data_dir = tether_infra::config::resolve_data_dir();
            let config = tether_infra::config::load_config(&data_dir).await;
            return cli::config::show_config(&config, &data_dir, cli.json);
        }
        _ => {}
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Sessions { action } => match action {
            SessionsCommand::List { ip } => {
                cli::session::list_sessions(&state, &ip, cli.json).await?;
            }
            SessionsCommand::Create { ip, title } => {
                cli::session::create_session(&state, &ip, title.as_deref(), cli.json).await?;
            }
            SessionsCommand::Delete { ip, sid } => {
                cli::session::delete_session(&state, &ip, &sid, cli.json).await?;
            }
            SessionsCommand::Share { ip, sid } => {
                cli::session::share_session(&state, &ip, &sid, cli.json).await?;
            }
        },

        Commands::Send { ip, sid, text } => {
            cli::message::send(&state, &ip, &sid, &text, cli.json).await?;
        }

        Commands::Watch { ip, sid } => {
            cli::message::watch(&state, &ip, &sid, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            serve(state, host, port, cli.quiet).await?;
        }

        Commands::Completions { .. } | Commands::Config => unreachable!("handled above"),
    }

    Ok(())
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>, quiet: bool) -> anyhow::Result<()> {
    let server = &state.config().server;
    let host = host.unwrap_or_else(|| server.host.clone());
    let port = port.unwrap_or(server.port);

    let workers = state.hub.spawn_background(state.shutdown.clone());

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if !quiet {
        println!(
            "  {} Tether API listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        if server.allowed_ips.is_empty() {
            println!(
                "  {}",
                console::style("No allowed_ips configured: every chat server IP is accepted").yellow()
            );
        }
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let shutdown = state.shutdown.clone();
    let hub = state.hub.clone();
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends open SSE streams so graceful shutdown can finish.
            shutdown.cancel();
        })
        .await?;

    hub.shutdown();
    for worker in workers {
        let _ = worker.await;
    }

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
