// SPDX-License-Identifier: MIT

//! Porter daemon (porterd)
//!
//! Long-running service that owns the migration pipeline: it connects to
//! the broker, starts the per-configuration consumers, and serves the
//! operator HTTP API.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use porter_adapters::{AmqpBroker, HttpDhisApi};
use porter_config::FileConfigStore;
use porter_core::{Clock, SystemClock};
use porter_daemon::{api, env};
use porter_engine::{Engine, EngineDefaults, EngineDeps};
use porter_storage::ScratchStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Broker connection attempts before startup fails.
const CONNECT_RETRIES: u32 = 10;
/// Delay between broker connection attempts.
const CONNECT_DELAY: Duration = Duration::from_secs(5);
/// How often expired validation sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("porterd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("porterd {}", env!("CARGO_PKG_VERSION"));
                println!("Porter daemon - migrates aggregate data between DHIS2-compatible instances");
                println!();
                println!("USAGE:");
                println!("    porterd");
                println!();
                println!("Configuration comes from the environment: BROKER_URI,");
                println!("BROKER_PREFETCH_COUNT, DATA_SERVICE_PORT, SOURCE_TIMEOUT_MS,");
                println!("DEST_TIMEOUT_MS, PORTER_CONFIG_DIR, PORTER_OUTPUT_DIR,");
                println!("PORTER_LOG_FILE.");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: porterd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let _log_guard = setup_logging()?;

    let broker_uri = env::broker_uri();
    info!(uri = %broker_uri, "connecting to broker");
    let broker = AmqpBroker::connect(&broker_uri, CONNECT_RETRIES, CONNECT_DELAY).await?;

    let defaults = EngineDefaults {
        prefetch: env::prefetch_count(),
        source_timeout: env::source_timeout(),
        dest_timeout: env::dest_timeout(),
        ..EngineDefaults::default()
    };
    let engine = Arc::new(Engine::new(
        EngineDeps {
            broker: Arc::new(broker),
            dhis: Arc::new(HttpDhisApi::new()?),
            configs: Arc::new(FileConfigStore::new(env::config_dir())),
            scratch: ScratchStore::new(env::output_dir()),
        },
        SystemClock,
        defaults,
    ));

    engine.start_workers().await?;
    info!("workers started");

    spawn_session_sweeper(Arc::clone(&engine));

    let port = env::data_service_port();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "http api listening");

    let router = api::build_router(Arc::clone(&engine));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("daemon stopped");
    Ok(())
}

/// Periodically drop validation sessions whose TTL has elapsed.
fn spawn_session_sweeper(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let expired = engine.sessions().expire(engine.clock().epoch_ms());
            if expired > 0 {
                tracing::debug!(expired, "expired validation sessions");
            }
        }
    });
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
}

fn setup_logging(
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match env::log_file() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file_name = path
                .file_name()
                .ok_or("PORTER_LOG_FILE must name a file")?
                .to_os_string();
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
