use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use tokio::io::BufReader;
use tokio::sync::oneshot;

use twgate::config::Configuration;
use twgate::{app, console, initialize_state, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("cannot load .env file: {err}");
        }
    }

    let mut config = Configuration::default();
    if let Ok(path) = std::env::var("APP_CONFIG") {
        config = config.path(PathBuf::from(path));
    }
    let debug = std::env::var("APP_DEBUG").is_ok_and(|debug| debug == "on");

    if let Err(err) = telemetry::setup_logging(debug) {
        eprintln!("cannot install logger: {err}");
    }

    let config = match config.read().from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        },
    };
    telemetry::apply_debug(config.debug);

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "metrics disabled");
            None
        },
    };

    let port = config.port;
    let console_enabled = config.console;
    tracing::info!(version = config.version(), debug = config.debug, "starting");

    let state = match initialize_state(config, metrics).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, kind = err.kind(), "cannot authenticate; refusing to serve");
            return ExitCode::FAILURE;
        },
    };

    let (closed_tx, closed_rx) = oneshot::channel();
    if console_enabled {
        let state = state.clone();
        tokio::spawn(async move {
            console::run(state, BufReader::new(tokio::io::stdin())).await;
            let _ = closed_tx.send(());
        });
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "cannot bind");
            return ExitCode::FAILURE;
        },
    };
    tracing::info!(%addr, "listening");

    if let Err(err) = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(closed_rx))
        .await
    {
        tracing::error!(error = %err, "server failed");
        return ExitCode::FAILURE;
    }

    tracing::info!("server stopped");
    ExitCode::SUCCESS
}

/// Resolves on SIGINT, SIGTERM, or when the console input is closed.
async fn shutdown_signal(console_closed: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    // Err: the console task ended without reporting.
    let console = async {
        if console_closed.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "shutting down"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "shutting down"),
        _ = console => tracing::info!("console closed; shutting down"),
    }
}
