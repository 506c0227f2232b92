use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

use crate::domain::CostModel;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub cost: CostModel,
    #[serde(default)]
    pub executors: ExecutorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-connection outbox size; a consumer this far behind is evicted
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_outbox_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on a single stage executor call, in milliseconds
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    #[serde(default = "default_max_supply")]
    pub max_supply: u32,
    #[serde(default = "default_max_royalty_bps")]
    pub max_royalty_bps: u16,
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u32,
    /// Prefix of the canonical collection URL; the contract address is appended
    #[serde(default = "default_collection_url_base")]
    pub collection_url_base: String,
}

fn default_stage_timeout_ms() -> u64 {
    120_000
}

fn default_max_supply() -> u32 {
    10_000
}

fn default_max_royalty_bps() -> u16 {
    1_000
}

fn default_max_duration_days() -> u32 {
    365
}

fn default_collection_url_base() -> String {
    "https://zora.co/collect/base:".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: default_stage_timeout_ms(),
            max_supply: default_max_supply(),
            max_royalty_bps: default_max_royalty_bps(),
            max_duration_days: default_max_duration_days(),
            collection_url_base: default_collection_url_base(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Launches run concurrently per window
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Delay between windows in milliseconds
    #[serde(default = "default_inter_window_delay_ms")]
    pub inter_window_delay_ms: u64,
}

fn default_window_size() -> usize {
    3
}

fn default_inter_window_delay_ms() -> u64 {
    1_000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            inter_window_delay_ms: default_inter_window_delay_ms(),
        }
    }
}

/// Which stage executors back the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorMode {
    /// Deterministic in-process simulation (no external calls)
    #[default]
    DryRun,
    /// REST gateway under `executors.base_url`
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorsConfig {
    #[serde(default)]
    pub mode: ExecutorMode,
    /// Base URL of the executor gateway (http mode)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Simulated latency per stage (dry-run mode)
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
    /// Balance reported for every wallet (dry-run mode)
    #[serde(default = "default_simulated_balance")]
    pub simulated_balance: Decimal,
    /// Largest amount the simulated bridge accepts (dry-run mode)
    #[serde(default = "default_simulated_liquidity")]
    pub simulated_liquidity: Decimal,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_simulated_latency_ms() -> u64 {
    250
}

fn default_simulated_balance() -> Decimal {
    Decimal::from(100)
}

fn default_simulated_liquidity() -> Decimal {
    Decimal::from(50)
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::default(),
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            simulated_latency_ms: default_simulated_latency_ms(),
            simulated_balance: default_simulated_balance(),
            simulated_liquidity: default_simulated_liquidity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LAUNCHHUB_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (LAUNCHHUB__SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("LAUNCHHUB")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.outbox_capacity == 0 {
            errors.push("server.outbox_capacity must be positive".to_string());
        }

        if self.pipeline.stage_timeout_ms == 0 {
            errors.push("pipeline.stage_timeout_ms must be positive".to_string());
        }

        if self.pipeline.max_supply == 0 {
            errors.push("pipeline.max_supply must be positive".to_string());
        }

        if url::Url::parse(&self.pipeline.collection_url_base).is_err() {
            errors.push(format!(
                "pipeline.collection_url_base is not a valid URL: {}",
                self.pipeline.collection_url_base
            ));
        }

        if self.batch.window_size == 0 {
            errors.push("batch.window_size must be at least 1".to_string());
        }

        if self.cost.unit_cost <= Decimal::ZERO {
            errors.push("cost.unit_cost must be positive".to_string());
        }

        for (name, pct) in [
            ("cost.bridge_fee_pct", self.cost.bridge_fee_pct),
            ("cost.platform_fee_pct", self.cost.platform_fee_pct),
        ] {
            if pct < Decimal::ZERO || pct >= Decimal::ONE {
                errors.push(format!("{name} must be between 0 and 1"));
            }
        }

        if self.cost.gas_estimate < Decimal::ZERO {
            errors.push("cost.gas_estimate must not be negative".to_string());
        }

        if self.executors.mode == ExecutorMode::Http {
            match self.executors.base_url.as_deref() {
                Some(base) if url::Url::parse(base).is_ok() => {}
                Some(base) => errors.push(format!("executors.base_url is not a valid URL: {base}")),
                None => errors.push("executors.base_url is required in http mode".to_string()),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executors.mode, ExecutorMode::DryRun);
        assert_eq!(config.batch.window_size, 3);
    }

    #[test]
    fn test_http_mode_requires_base_url() {
        let mut config = AppConfig::default();
        config.executors.mode = ExecutorMode::Http;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("executors.base_url")));

        config.executors.base_url = Some("http://gateway.internal:9000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fee_fractions_bounded() {
        let mut config = AppConfig::default();
        config.cost.platform_fee_pct = dec!(1.5);
        config.batch.window_size = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/launchhub-config").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.stage_timeout_ms, 120_000);
    }
}
