//! Sockslink - SOCKS4/4a/5 client and server
//!
//! This is the main entry point for the Sockslink application.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sockslink::client::{Client, ConnectAttempt};
use sockslink::config::{load_config, ClientConfig, Config};
use sockslink::protocol::Target;
use sockslink::server::Server;
use sockslink::SocksError;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sockslink - SOCKS4/4a/5 client and server
#[derive(Parser, Debug)]
#[command(name = "sockslink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a SOCKS server
    Serve {
        /// Listen address, overrides the configuration
        #[arg(long)]
        listen: Option<String>,
    },
    /// Open a tunnel and pipe it to stdin/stdout
    Connect {
        /// Target as host:port
        target: String,

        /// Proxy address, overrides the configuration
        #[arg(long)]
        proxy: Option<String>,

        /// Run a TLS handshake with the target over the tunnel
        #[arg(long)]
        tls: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };

    info!("Sockslink v{}", sockslink::VERSION);

    match args.command {
        Command::Serve { listen } => run_server(config, listen).await,
        Command::Connect { target, proxy, tls } => run_connect(config, target, proxy, tls).await,
    }
}

async fn run_server(config: Config, listen: Option<String>) -> Result<()> {
    let mut server_config = config.server.unwrap_or_default();
    if let Some(listen) = listen {
        server_config.listen_addr = listen;
    }

    let server = Server::from_config(&server_config)?;
    let listener = TcpListener::bind(&server_config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.listen_addr))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.serve(listener, shutdown).await?;
    Ok(())
}

async fn run_connect(config: Config, target: String, proxy: Option<String>, tls: bool) -> Result<()> {
    let client_config = match (config.client, proxy) {
        (Some(mut client), Some(proxy)) => {
            client.proxy_addr = proxy;
            client
        }
        (Some(client), None) => client,
        (None, Some(proxy)) => ClientConfig::new(proxy),
        (None, None) => anyhow::bail!("No [client] configuration and no --proxy given"),
    };
    let target: Target = target.parse()?;
    let client = Client::from_config(&client_config)?;

    if tls {
        secure_connect(&client, &client_config, &target).await
    } else {
        let tunnel = cancel_on_ctrl_c(client.connect(target.host(), target.port())).await?;
        pipe(tunnel).await
    }
}

#[cfg(feature = "rustls-tls")]
async fn secure_connect(client: &Client, config: &ClientConfig, target: &Target) -> Result<()> {
    let upgrader = sockslink::transport::SecureUpgrader::new(&config.tls)?;
    let stream =
        cancel_on_ctrl_c(client.connect_secure(target.host(), target.port(), &upgrader)).await?;
    pipe(stream).await
}

#[cfg(not(feature = "rustls-tls"))]
async fn secure_connect(_client: &Client, _config: &ClientConfig, _target: &Target) -> Result<()> {
    anyhow::bail!("Built without TLS support")
}

/// Await an attempt, cancelling it on Ctrl+C
async fn cancel_on_ctrl_c<T>(attempt: ConnectAttempt<T>) -> Result<T, SocksError> {
    let handle = attempt.handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling connection attempt");
            handle.cancel();
        }
    });

    let result = attempt.await;
    watcher.abort();
    result
}

/// Copy stdin to the stream and the stream to stdout
async fn pipe<S>(stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stdio = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
    let mut stream = stream;
    tokio::io::copy_bidirectional(&mut stdio, &mut stream).await?;
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }

    shutdown.cancel();
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `connect` can use stdout for tunnel data
    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
