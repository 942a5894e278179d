//! calshared entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info};

use calshare_core::{TracingConfig, TracingOutputFormat, init_tracing};
use calshare_google::{AclClient, GoogleApiConfig, OAuthClient, OAuthCredentials};
use calshare_server::{
    AclGateway, AuthCoordinator, CallbackServer, Dispatcher, PidFile, ServerConfig, ServerError,
    SignalHandler, SocketServer, default_pid_path, default_socket_path, make_connection_handler,
};
use calshare_store::AuthStore;

/// Calendar sharing daemon: chat commands in, calendar ACL changes out.
#[derive(Debug, Parser)]
#[command(name = "calshared")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the Google OAuth credentials JSON file
    #[arg(long, env = "CALSHARE_CREDENTIALS")]
    credentials_file: PathBuf,

    /// Public redirect URL registered with the authorization server
    #[arg(long, env = "CALSHARE_REDIRECT_URL")]
    redirect_url: String,

    /// Unix socket path for transport adapters
    #[arg(long, env = "CALSHARE_SOCKET")]
    socket: Option<PathBuf>,

    /// Listen address for the OAuth callback endpoint
    #[arg(long, env = "CALSHARE_LISTEN", default_value = "127.0.0.1:8847")]
    listen: SocketAddr,

    /// SQLite database path
    #[arg(long, env = "CALSHARE_DB", default_value = "calshare.db")]
    db: PathBuf,

    /// Lifetime of an issued authorization link, in seconds
    #[arg(long, default_value_t = 600)]
    nonce_ttl_secs: u64,

    /// PID file path
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::daemon();
    if cli.debug {
        tracing_config = tracing_config.with_level(Level::DEBUG);
    }
    if cli.json_logs {
        tracing_config = tracing_config.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: failed to initialize tracing: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let credentials =
        OAuthCredentials::from_file(&cli.credentials_file).map_err(ServerError::config)?;

    let google_config = GoogleApiConfig::new(credentials, &cli.redirect_url);
    google_config.validate().map_err(ServerError::config)?;

    let server_config = ServerConfig::new(cli.socket.unwrap_or_else(default_socket_path))
        .with_callback_addr(cli.listen)
        .with_db_path(&cli.db)
        .with_nonce_ttl(Duration::from_secs(cli.nonce_ttl_secs));

    let _pidfile = PidFile::create(cli.pid_file.unwrap_or_else(default_pid_path))?;

    let store = Arc::new(AuthStore::open(&server_config.db_path)?);
    let coordinator = Arc::new(AuthCoordinator::new(
        store.clone(),
        OAuthClient::new(google_config.clone()),
        &server_config,
    ));
    let gateway = Arc::new(AclGateway::new(
        coordinator.clone(),
        AclClient::new(&google_config),
        server_config.retry.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(store, coordinator.clone(), gateway));

    let signals = SignalHandler::new();
    signals.spawn_listener();

    let callback_server = CallbackServer::bind(server_config.callback_addr, coordinator).await?;
    let socket_server = SocketServer::new(&server_config).await?;

    let mut callback_shutdown = signals.subscribe();
    let callback_task = tokio::spawn(async move {
        callback_server
            .run_until_shutdown(callback_shutdown.wait())
            .await
    });

    let mut socket_shutdown = signals.subscribe();
    socket_server
        .run_until_shutdown(
            make_connection_handler(dispatcher),
            socket_shutdown.wait(),
        )
        .await?;

    match callback_task.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!(error = %e, "callback task aborted"),
    }

    info!("shutdown complete");
    Ok(())
}
