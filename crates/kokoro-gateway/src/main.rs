use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kokoro_core::config::KokoroConfig;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod auth;
mod error;
mod http;
mod services;
mod tasks;

use services::Services;

#[derive(Parser)]
#[command(name = "kokoro-gateway", version, about = "Kokoro reminder gateway and worker")]
struct Cli {
    /// Config file. Falls back to $KOKORO_CONFIG, then ~/.kokoro/kokoro.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// HTTP API, dispatcher and reconcile ticker in one process (default).
    Serve,
    /// Dispatcher and reconcile ticker only.
    Worker,
    /// Run one fallback sweep, print the report and exit.
    Reconcile,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kokoro_gateway=info,kokoro_worker=info,kokoro_reminders=info,kokoro_queue=info,tower_http=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = KokoroConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        KokoroConfig::default()
    });
    config.validate()?;

    let services = Services::open(&config)?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Reconcile => {
            let report = services.reconciler.run_once()?;
            println!("{}", serde_json::to_string(&report)?);
        }
        command => run(command, config, &services).await?,
    }
    services.close();
    Ok(())
}

/// Long-running modes. Returns once every task has drained after a signal.
async fn run(command: Command, config: KokoroConfig, services: &Services) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let mut background = JoinSet::new();

    background.spawn(tasks::log_events(services.events.clone(), shutdown.clone()));
    background.spawn(services.dispatcher(&config.worker).run(shutdown.clone()));
    if config.reconcile.interval_secs > 0 {
        background.spawn(tasks::reconcile_loop(
            services.reconciler.clone(),
            Duration::from_secs(config.reconcile.interval_secs),
            shutdown.clone(),
        ));
    }

    if command == Command::Serve {
        let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
        let state = Arc::new(app::AppState::new(config, services, shutdown.clone()));
        let router = app::build_router(state);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Kokoro gateway listening on {}", addr);
        let stop = shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tasks::shutdown_signal().await;
                stop.cancel();
            })
            .await?;
    } else {
        info!("Kokoro worker running");
        tasks::shutdown_signal().await;
    }

    shutdown.cancel();
    while let Some(done) = background.join_next().await {
        if let Err(e) = done {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    info!("shutdown complete");
    Ok(())
}
