use anyhow::Context;
use clap::Parser;
use launchhub::adapters::build_executors;
use launchhub::api::{create_router, AppState};
use launchhub::cli::{self, Cli, Commands};
use launchhub::config::{AppConfig, ExecutorMode, LoggingConfig};
use launchhub::hub::Hub;
use launchhub::pipeline::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;

    match cli.command {
        Commands::Serve { port, dry_run } => {
            init_logging(&config.logging);
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if dry_run {
                config.executors.mode = ExecutorMode::DryRun;
            }
            serve(config).await?;
        }
        Commands::Estimate { launch, json } => {
            init_logging_simple();
            cli::print_estimate(&config, &launch, json)?;
        }
        Commands::Simulate {
            count,
            window,
            delay_ms,
            latency_ms,
            launch,
        } => {
            init_logging(&config.logging);
            let outcomes =
                cli::run_simulation(&config, count, window, delay_ms, latency_ms, &launch).await?;
            let failed = outcomes.iter().filter(|o| !o.success).count();
            info!(total = outcomes.len(), failed, "simulation finished");
        }
        Commands::Watch { url, channel, user } => {
            init_logging_simple();
            cli::watch(&url, &channel, user.as_deref()).await?;
        }
    }

    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {}", e);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    let hub = Arc::new(Hub::new());
    let executors = build_executors(&config.executors)?;
    let orchestrator = Arc::new(Orchestrator::new(
        executors,
        hub.clone(),
        config.cost.clone(),
        config.pipeline.clone(),
    ));
    let state = AppState::new(hub, orchestrator, config.server.outbox_capacity);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Launch hub listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Launch hub stopped");
    Ok(())
}

fn init_logging(settings: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},launchhub=debug", settings.level))
    });

    let log_dir = std::env::var("LAUNCHHUB_LOG_DIR").ok();

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial file, so check writability first.
    let file_layer = log_dir.and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Could not create log directory {} ({}), file logging disabled", log_dir, e);
            return None;
        }
        let test_path = std::path::Path::new(&log_dir).join(".launchhub_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&test_path) {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(&log_dir, "launchhub.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Lives for the whole process
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let console_layer = if settings.json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        info!("File logging enabled");
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
