pub mod dry_run;
pub mod http;

pub use dry_run::SimulatedChain;
pub use http::HttpExecutors;

use tracing::info;

use crate::config::{ExecutorMode, ExecutorsConfig};
use crate::error::Result;
use crate::pipeline::StageExecutors;

/// Build the stage executors selected by `executors.mode`
pub fn build_executors(config: &ExecutorsConfig) -> Result<StageExecutors> {
    match config.mode {
        ExecutorMode::DryRun => {
            info!(
                latency_ms = config.simulated_latency_ms,
                balance = %config.simulated_balance,
                liquidity = %config.simulated_liquidity,
                "using dry-run executors"
            );
            Ok(SimulatedChain::from_config(config).into_executors())
        }
        ExecutorMode::Http => {
            let gateway = HttpExecutors::from_config(config)?;
            info!(base_url = config.base_url.as_deref().unwrap_or("-"), "using http executors");
            Ok(gateway.into_executors())
        }
    }
}
