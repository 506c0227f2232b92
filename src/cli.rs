use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::adapters::SimulatedChain;
use crate::config::AppConfig;
use crate::domain::{CostEstimate, LaunchConfig, LaunchRequest, MomentRef, Rarity, Requester};
use crate::error::{LaunchError, Result};
use crate::hub::{
    ClientMessage, ConnectionId, Envelope, Hub, MINT_CANCELLED, MINT_COMPLETE, MINT_ERROR,
    MINT_PROGRESS,
};
use crate::pipeline::{BatchJob, BatchOutcome, BatchScheduler, Orchestrator};

#[derive(Parser)]
#[command(name = "launchhub")]
#[command(version)]
#[command(about = "Cross-chain launch pipeline with a real-time notification hub", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, $LAUNCHHUB_ENV.toml)
    #[arg(short, long, default_value = "config", env = "LAUNCHHUB_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the notification hub and pipeline
    Serve {
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Force the deterministic dry-run executors
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the cost breakdown for a launch configuration
    Estimate {
        #[command(flatten)]
        launch: LaunchArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run a batch of launches against dry-run executors
    Simulate {
        /// Number of launches in the batch
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
        /// Launches per window (defaults to batch.window_size)
        #[arg(short, long)]
        window: Option<usize>,
        /// Delay between windows in milliseconds (defaults to batch.inter_window_delay_ms)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Simulated latency per stage in milliseconds
        #[arg(long, default_value = "50")]
        latency_ms: u64,
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Connect to a running hub and print events
    Watch {
        /// Hub WebSocket URL
        #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
        /// Channels to subscribe to (defaults to every launch channel)
        #[arg(short, long)]
        channel: Vec<String>,
        /// Bind the connection to a user to receive direct events
        #[arg(long)]
        user: Option<String>,
    },
}

/// Launch configuration flags shared by `estimate` and `simulate`
#[derive(clap::Args, Debug, Clone)]
pub struct LaunchArgs {
    /// common, rare, epic or legendary
    #[arg(short, long, default_value = "common")]
    pub rarity: String,
    #[arg(short, long, default_value = "100")]
    pub supply: u32,
    /// Price per edition
    #[arg(long, default_value = "0.01")]
    pub price: Decimal,
    #[arg(long, default_value = "500")]
    pub royalty_bps: u16,
    #[arg(long, default_value = "7")]
    pub duration_days: u32,
    /// Amount bridged to fund the launch
    #[arg(short, long, default_value = "0.5")]
    pub investment: Decimal,
}

impl LaunchArgs {
    pub fn to_config(&self) -> Result<LaunchConfig> {
        Ok(LaunchConfig {
            rarity: self.rarity.parse::<Rarity>()?,
            supply: self.supply,
            price: self.price,
            royalty_bps: self.royalty_bps,
            duration_days: self.duration_days,
            investment_amount: self.investment,
        })
    }
}

#[derive(Debug, Tabled)]
struct CostRow {
    item: &'static str,
    amount: String,
}

fn cost_rows(estimate: &CostEstimate) -> Vec<CostRow> {
    [
        ("base", estimate.base),
        ("bridge fee", estimate.bridge_fee),
        ("gas", estimate.gas_fee),
        ("platform fee", estimate.platform_fee),
        ("total", estimate.total),
    ]
    .into_iter()
    .map(|(item, amount)| CostRow {
        item,
        amount: amount.to_string(),
    })
    .collect()
}

/// `launchhub estimate`
pub fn print_estimate(config: &AppConfig, launch: &LaunchArgs, json: bool) -> Result<()> {
    let launch_config = launch.to_config()?;
    let estimate = config.cost.estimate(&launch_config);

    if json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
        return Ok(());
    }

    println!(
        "{} x{} ({}x complexity)",
        launch_config.rarity.as_str(),
        launch_config.supply,
        launch_config.rarity.multiplier()
    );
    println!("{}", Table::new(cost_rows(&estimate)));
    println!(
        "Required balance: {} (investment {} + costs {})",
        launch_config.investment_amount + estimate.total,
        launch_config.investment_amount,
        estimate.total
    );
    Ok(())
}

#[derive(Debug, Tabled)]
struct OutcomeRow {
    request: String,
    success: bool,
    detail: String,
}

impl From<&BatchOutcome> for OutcomeRow {
    fn from(outcome: &BatchOutcome) -> Self {
        let detail = match (&outcome.result, &outcome.error) {
            (Some(result), _) => result.collection_url.clone(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        };
        Self {
            request: outcome.request_id.clone(),
            success: outcome.success,
            detail,
        }
    }
}

/// Observe every launch channel through the hub, logging each envelope.
///
/// The task ends once the returned connection is unregistered and its
/// outbox has drained.
fn spawn_event_logger(hub: &Hub) -> (ConnectionId, tokio::task::JoinHandle<()>) {
    let (outbox, mut inbox) = mpsc::channel::<Envelope>(1024);
    let id = hub.register(outbox);
    for channel in [MINT_PROGRESS, MINT_COMPLETE, MINT_ERROR, MINT_CANCELLED] {
        hub.subscribe(id, channel);
    }

    let task = tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            info!(kind = %envelope.kind, data = %envelope.data, "event");
        }
    });
    (id, task)
}

/// `launchhub simulate`
pub async fn run_simulation(
    config: &AppConfig,
    count: usize,
    window: Option<usize>,
    delay_ms: Option<u64>,
    latency_ms: u64,
    launch: &LaunchArgs,
) -> Result<Vec<BatchOutcome>> {
    let launch_config = launch.to_config()?;
    let hub = Arc::new(Hub::new());
    let (logger_id, logger) = spawn_event_logger(&hub);

    let chain = SimulatedChain::new(
        Duration::from_millis(latency_ms),
        config.executors.simulated_balance,
        config.executors.simulated_liquidity,
    )
    .with_bridge_fee(config.cost.bridge_fee_pct);
    let orchestrator = Arc::new(Orchestrator::new(
        chain.into_executors(),
        hub.clone(),
        config.cost.clone(),
        config.pipeline.clone(),
    ));

    let requests: Vec<LaunchRequest> = (1..=count)
        .map(|n| {
            LaunchRequest::with_id(
                format!("sim-{n}"),
                MomentRef {
                    id: format!("moment-{n}"),
                    title: format!("Simulated moment #{n}"),
                    creator: "simulator".to_string(),
                    media_uri: None,
                },
                Requester {
                    wallet: format!("0xsim{n:04}"),
                    user_id: "simulator".to_string(),
                },
                launch_config.clone(),
            )
        })
        .collect();

    let job = BatchJob::new(
        requests,
        window.unwrap_or(config.batch.window_size),
        Duration::from_millis(delay_ms.unwrap_or(config.batch.inter_window_delay_ms)),
    );
    let outcomes = BatchScheduler::new(orchestrator).run(job).await;

    hub.unregister(logger_id);
    if let Err(e) = logger.await {
        warn!("event logger stopped abnormally: {}", e);
    }

    let rows: Vec<OutcomeRow> = outcomes.iter().map(OutcomeRow::from).collect();
    println!("{}", Table::new(rows));
    Ok(outcomes)
}

/// `launchhub watch`
pub async fn watch(url: &str, channels: &[String], user: Option<&str>) -> Result<()> {
    let (ws_stream, _) = tokio::time::timeout(Duration::from_secs(10), connect_async(url))
        .await
        .map_err(|_| LaunchError::Internal(format!("Connection to {url} timed out")))??;
    info!("Connected to {}", url);

    let (mut write, mut read) = ws_stream.split();

    let channels: Vec<String> = if channels.is_empty() {
        [MINT_PROGRESS, MINT_COMPLETE, MINT_ERROR, MINT_CANCELLED]
            .iter()
            .map(|c| c.to_string())
            .collect()
    } else {
        channels.to_vec()
    };

    let mut frames: Vec<ClientMessage> = channels
        .into_iter()
        .map(|channel| ClientMessage::Subscribe { channel })
        .collect();
    if let Some(user_id) = user {
        frames.push(ClientMessage::Authenticate {
            user_id: user_id.to_string(),
        });
    }
    for frame in frames {
        let text = serde_json::to_string(&frame.to_envelope())?;
        write.send(Message::Text(text)).await?;
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => print_envelope(&text),
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Hub closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }
    Ok(())
}

fn print_envelope(text: &str) {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => {
            let stage = envelope.data.get("stage").and_then(|s| s.as_str()).unwrap_or("-");
            let progress = envelope
                .data
                .get("progress")
                .map(|p| format!("{p}%"))
                .unwrap_or_default();
            println!(
                "{} {:<15} {:<11} {:>4} {}",
                envelope.timestamp, envelope.kind, stage, progress, envelope.data
            );
        }
        Err(_) => println!("{text}"),
    }
}
