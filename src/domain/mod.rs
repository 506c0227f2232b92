pub mod cost;
pub mod launch;
pub mod stage;

pub use cost::{estimate, CostEstimate, CostModel};
pub use launch::{
    LaunchConfig, LaunchRequest, LaunchResult, MomentRef, Rarity, Requester, StageFailure,
    Terminal,
};
pub use stage::Stage;
