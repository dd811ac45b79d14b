mod command;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use geodash_core::{http, Backend, CoreBroadcast, CoreEvent, HttpBackend, QueryCore, Severity};
use geodash_proto::config::Config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use crate::command::Command;

#[derive(Parser)]
#[command(
    name = "geodash",
    version,
    about = "Satellite layer explorer: query orchestration driver"
)]
struct Cli {
    /// Config file (default: ~/.config/geodash/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the backend base URL
    #[arg(long)]
    backend: Option<String>,
    /// Don't start the HTTP control surface
    #[arg(long)]
    no_http: bool,
    /// Override the HTTP control surface port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = geodash_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("geodash.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; otherwise debug for our crates, quiet HTTP internals.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("geodash log: {}", log_path.display());
    tracing::info!("geodash starting");

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            tracing::warn!("config load failed, using defaults: {}", e);
            Config::default()
        }),
    };
    if let Some(url) = cli.backend {
        config.backend.base_url = url;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if cli.no_http {
        config.http.enabled = false;
    }

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(config.backend.base_url.clone()));
    tracing::info!("backend: {}", config.backend.base_url);

    // ── Channels ─────────────────────────────────────────────────────────────
    let (broadcast_tx, mut broadcast_rx) = broadcast::channel::<CoreBroadcast>(1024);
    let (event_tx, event_rx) = mpsc::channel::<CoreEvent>(1024);

    let core = QueryCore::new(&config, backend, event_tx.clone(), broadcast_tx.clone());
    let view = core.shared_view();

    // ── HTTP control surface ─────────────────────────────────────────────────
    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            Arc::clone(&view),
            event_tx.clone(),
        );
    }

    // ── Core loop ────────────────────────────────────────────────────────────
    let core_handle = tokio::spawn(async move {
        if let Err(e) = core.run(event_rx).await {
            tracing::error!("QueryCore exited with error: {}", e);
        }
    });

    // ── Notices → stdout ─────────────────────────────────────────────────────
    tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(CoreBroadcast::Notice { severity, message }) => {
                    let tag = match severity {
                        Severity::Info => "info",
                        Severity::Warning => "warn",
                        Severity::Error => "error",
                    };
                    println!("[{}] {}", tag, message);
                }
                Ok(CoreBroadcast::StateUpdated(_)) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("notice printer lagged by {}", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── Stdin driver ─────────────────────────────────────────────────────────
    println!("{}", command::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Any exit from this loop still tears the core down below.
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read failed: {}", e);
                eprintln!("stdin read failed: {}", e);
                break;
            }
        };
        match command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(Command::Help)) => println!("{}", command::HELP),
            Ok(Some(Command::State)) => {
                let snapshot = view.read().await.clone();
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("cannot render state: {}", e),
                }
            }
            Ok(Some(Command::Action(action))) => {
                if event_tx.send(CoreEvent::Action(action)).await.is_err() {
                    eprintln!("core loop is gone");
                    break;
                }
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    let _ = event_tx.send(CoreEvent::Shutdown).await;
    let _ = core_handle.await;
    tracing::info!("geodash stopped");
    Ok(())
}
