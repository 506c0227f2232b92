//! Asynchronous launch pipeline
//!
//! `Orchestrator` runs one launch through its stages against the executor
//! ports; `BatchScheduler` runs many of them under bounded concurrency.

pub mod batch;
pub mod orchestrator;
pub mod ports;

pub use batch::{BatchJob, BatchOutcome, BatchScheduler};
pub use orchestrator::{CancelHandle, CancelSignal, Orchestrator};
pub use ports::{
    AssetAttribute, AssetDescriptor, BalanceProvider, BridgeReceipt, BridgeService, ChainMinter,
    MetadataGenerator, MintReceipt, StageExecutors, Uploader,
};
