//! Stage executor contracts
//!
//! The orchestrator only sees these traits. Bridging mechanics, storage
//! specifics and contract ABIs live behind them in `crate::adapters`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::domain::{LaunchConfig, MomentRef};
use crate::error::{BridgeError, GenerationError, MintError, Result, UploadError};

/// Outcome of a cross-chain bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeReceipt {
    /// Amount credited on the destination chain
    pub dest_amount: Decimal,
    pub fee: Decimal,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAttribute {
    pub trait_type: String,
    pub value: String,
}

/// Generated token metadata, ready for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    pub name: String,
    pub description: String,
    pub image_uri: String,
    #[serde(default)]
    pub animation_uri: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AssetAttribute>,
}

/// Outcome of an on-chain mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintReceipt {
    pub contract_address: String,
    pub token_id: String,
    pub tx_hash: String,
}

/// Source-chain balance lookup used during validation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn balance(&self, wallet: &str) -> Result<Decimal>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BridgeService: Send + Sync {
    async fn bridge(
        &self,
        source_amount: Decimal,
        source_address: &str,
    ) -> std::result::Result<BridgeReceipt, BridgeError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn build(&self, subject: &MomentRef) -> std::result::Result<AssetDescriptor, GenerationError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store the asset and return its content URI
    async fn upload(&self, asset: &AssetDescriptor) -> std::result::Result<String, UploadError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainMinter: Send + Sync {
    async fn mint(
        &self,
        content_uri: &str,
        config: &LaunchConfig,
        funding_amount: Decimal,
    ) -> std::result::Result<MintReceipt, MintError>;
}

/// The full set of executors a pipeline runs against
#[derive(Clone)]
pub struct StageExecutors {
    pub balance: Arc<dyn BalanceProvider>,
    pub bridge: Arc<dyn BridgeService>,
    pub generator: Arc<dyn MetadataGenerator>,
    pub uploader: Arc<dyn Uploader>,
    pub minter: Arc<dyn ChainMinter>,
}

impl fmt::Debug for StageExecutors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageExecutors").finish_non_exhaustive()
    }
}
