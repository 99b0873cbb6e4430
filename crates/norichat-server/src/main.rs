use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;
use tracing_subscriber::EnvFilter;

use norichat_api::auth::AppStateInner;
use norichat_db::Database;
use norichat_gateway::registry::Registry;
use norichat_server::{app, ServerState};

mod cli;

/// Placeholder values that MUST NOT be used as the JWT secret.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("norichat=debug,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();

    let jwt_secret = args
        .jwt_secret
        .or_else(|| std::env::var("NORICHAT_JWT_SECRET").ok())
        .unwrap_or_default();

    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: no usable JWT secret configured.");
        eprintln!("       Generate a strong random value: openssl rand -base64 48");
        eprintln!("       Pass it via --jwt-secret or the NORICHAT_JWT_SECRET env var.");
        std::process::exit(1);
    }

    // A store that cannot be opened is fatal; everything else keeps serving.
    let db = Arc::new(Database::open(&args.db)?);

    let registry = Registry::new();
    let app_state = Arc::new(AppStateInner { db, jwt_secret });
    let state = ServerState::new(app_state, registry);
    let router = app(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    info!("NoriChat server listening on {}", addr);

    // Create the listener via socket2 so TCP_NODELAY is set on the listening
    // socket; accepted connections inherit it, which matters for small
    // WebSocket frames.
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(socket.into())?;

    // Long-lived WebSocket sessions would hold a graceful drain open
    // forever, so a signal stops the server outright: accepting ends, open
    // connections drop, the store closes on drop, exit 0.
    tokio::select! {
        result = axum::serve(listener, router).into_future() => result?,
        _ = shutdown_signal() => {}
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received Ctrl+C, shutting down");
    }
}
