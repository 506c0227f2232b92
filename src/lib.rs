pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod pipeline;

pub use config::AppConfig;
pub use domain::{
    CostEstimate, CostModel, LaunchConfig, LaunchRequest, LaunchResult, MomentRef, Rarity,
    Requester, Stage,
};
pub use error::{BridgeError, LaunchError, Result};
pub use hub::{EventSink, Hub};
pub use pipeline::{BatchJob, BatchOutcome, BatchScheduler, Orchestrator, StageExecutors};
