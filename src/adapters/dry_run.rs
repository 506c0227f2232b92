//! Dry-run stage executors
//!
//! A deterministic in-process stand-in for the bridge, generator, storage
//! and chain. References are derived from the inputs with SHA-256, so the
//! same launch always yields the same addresses and hashes.

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ExecutorsConfig;
use crate::domain::{LaunchConfig, MomentRef};
use crate::error::{BridgeError, GenerationError, MintError, Result, UploadError};
use crate::pipeline::{
    AssetAttribute, AssetDescriptor, BalanceProvider, BridgeReceipt, BridgeService, ChainMinter,
    MetadataGenerator, MintReceipt, StageExecutors, Uploader,
};

/// Simulated chain and services
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    latency: Duration,
    balance: Decimal,
    liquidity: Decimal,
    bridge_fee_pct: Decimal,
}

impl SimulatedChain {
    pub fn new(latency: Duration, balance: Decimal, liquidity: Decimal) -> Self {
        Self {
            latency,
            balance,
            liquidity,
            bridge_fee_pct: dec!(0.005),
        }
    }

    pub fn from_config(config: &ExecutorsConfig) -> Self {
        Self::new(
            Duration::from_millis(config.simulated_latency_ms),
            config.simulated_balance,
            config.simulated_liquidity,
        )
    }

    pub fn with_bridge_fee(mut self, pct: Decimal) -> Self {
        self.bridge_fee_pct = pct;
        self
    }

    /// Wire this simulation into every executor slot
    pub fn into_executors(self) -> StageExecutors {
        let chain = Arc::new(self);
        StageExecutors {
            balance: chain.clone(),
            bridge: chain.clone(),
            generator: chain.clone(),
            uploader: chain.clone(),
            minter: chain,
        }
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl BalanceProvider for SimulatedChain {
    async fn balance(&self, _wallet: &str) -> Result<Decimal> {
        Ok(self.balance)
    }
}

#[async_trait]
impl BridgeService for SimulatedChain {
    async fn bridge(
        &self,
        source_amount: Decimal,
        source_address: &str,
    ) -> std::result::Result<BridgeReceipt, BridgeError> {
        self.pause().await;
        if source_amount > self.liquidity {
            return Err(BridgeError::InsufficientLiquidity {
                requested: source_amount,
                available: self.liquidity,
            });
        }

        let fee = (source_amount * self.bridge_fee_pct)
            .round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero);
        let amount = source_amount.to_string();
        let reference = format!("bridge-{}", &digest(&[source_address, &amount])[..16]);
        debug!(%source_amount, %fee, %reference, "simulated bridge");

        Ok(BridgeReceipt {
            dest_amount: source_amount - fee,
            fee,
            reference,
        })
    }
}

#[async_trait]
impl MetadataGenerator for SimulatedChain {
    async fn build(&self, subject: &MomentRef) -> std::result::Result<AssetDescriptor, GenerationError> {
        self.pause().await;
        if subject.title.trim().is_empty() {
            return Err(GenerationError::new("moment has no title"));
        }

        let image_uri = subject
            .media_uri
            .clone()
            .unwrap_or_else(|| format!("ipfs://{}", &digest(&[&subject.id, "image"])[..46]));

        Ok(AssetDescriptor {
            name: subject.title.clone(),
            description: format!("{} by {}", subject.title, subject.creator),
            image_uri,
            animation_uri: None,
            attributes: vec![
                AssetAttribute {
                    trait_type: "creator".to_string(),
                    value: subject.creator.clone(),
                },
                AssetAttribute {
                    trait_type: "moment".to_string(),
                    value: subject.id.clone(),
                },
            ],
        })
    }
}

#[async_trait]
impl Uploader for SimulatedChain {
    async fn upload(&self, asset: &AssetDescriptor) -> std::result::Result<String, UploadError> {
        self.pause().await;
        let body = serde_json::to_string(asset).map_err(|e| UploadError::new(e.to_string()))?;
        Ok(format!("ipfs://{}", &digest(&[&body])[..46]))
    }
}

#[async_trait]
impl ChainMinter for SimulatedChain {
    async fn mint(
        &self,
        content_uri: &str,
        config: &LaunchConfig,
        funding_amount: Decimal,
    ) -> std::result::Result<MintReceipt, MintError> {
        self.pause().await;
        if funding_amount <= Decimal::ZERO {
            return Err(MintError::new("mint requires positive funding"));
        }

        let supply = config.supply.to_string();
        let funding = funding_amount.to_string();
        Ok(MintReceipt {
            contract_address: format!("0x{}", &digest(&[content_uri, "contract"])[..40]),
            token_id: "1".to_string(),
            tx_hash: format!("0x{}", digest(&[content_uri, &supply, &funding])),
        })
    }
}
