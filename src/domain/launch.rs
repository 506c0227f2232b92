use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::stage::Stage;
use crate::error::{LaunchError, Result};

/// Rarity / complexity tier of a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Complexity multiplier applied to the base cost
    pub fn multiplier(&self) -> Decimal {
        match self {
            Rarity::Common => Decimal::ONE,
            Rarity::Rare => Decimal::new(15, 1),
            Rarity::Epic => Decimal::new(2, 0),
            Rarity::Legendary => Decimal::new(3, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl std::str::FromStr for Rarity {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "common" => Ok(Rarity::Common),
            "rare" => Ok(Rarity::Rare),
            "epic" => Ok(Rarity::Epic),
            "legendary" => Ok(Rarity::Legendary),
            other => Err(LaunchError::Validation(format!("unknown rarity: {other}"))),
        }
    }
}

/// Launch configuration chosen by the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub rarity: Rarity,
    /// Number of editions to mint
    pub supply: u32,
    /// Price per edition
    pub price: Decimal,
    /// Creator royalty in basis points
    pub royalty_bps: u16,
    /// Sale duration in days
    pub duration_days: u32,
    /// Source-chain amount bridged to fund the launch
    pub investment_amount: Decimal,
}

/// The asset ("moment") being launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentRef {
    pub id: String,
    pub title: String,
    pub creator: String,
    #[serde(default)]
    pub media_uri: Option<String>,
}

/// Who asked for the launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Source-chain wallet that funds the bridge
    pub wallet: String,
    /// Hub identity receiving direct progress events
    pub user_id: String,
}

/// Terminal payload of a successful launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResult {
    pub contract_address: String,
    pub token_id: String,
    pub collection_url: String,
    pub tx_hash: String,
    pub bridge_reference: String,
    pub bridged_amount: Decimal,
}

/// Terminal payload of a failed launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// How a launch ended. Exactly one is set once the request is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Complete(LaunchResult),
    Failed(StageFailure),
    Cancelled { stage: Stage },
}

/// A single launch moving through the pipeline
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub id: String,
    pub subject: MomentRef,
    pub requester: Requester,
    pub config: LaunchConfig,
    pub submitted_at: DateTime<Utc>,
    stage: Stage,
    progress: u8,
    terminal: Option<Terminal>,
}

impl LaunchRequest {
    /// Create a request with a caller-chosen id
    pub fn with_id(
        id: impl Into<String>,
        subject: MomentRef,
        requester: Requester,
        config: LaunchConfig,
    ) -> Self {
        Self {
            id: id.into(),
            subject,
            requester,
            config,
            submitted_at: Utc::now(),
            stage: Stage::Queued,
            progress: 0,
            terminal: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to the next non-terminal stage (or `Complete` via [`Self::complete`]).
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if next.is_terminal() {
            return Err(self.invalid(next));
        }
        self.transition(next)
    }

    /// Enter `Complete` with its result
    pub fn complete(&mut self, result: LaunchResult) -> Result<()> {
        self.transition(Stage::Complete)?;
        self.terminal = Some(Terminal::Complete(result));
        Ok(())
    }

    /// Enter `Error`, recording the stage that failed.
    ///
    /// `stage` is the last stage completed, so the failure belongs to the
    /// one after it.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<StageFailure> {
        let failed = self.stage.next().unwrap_or(self.stage);
        self.transition(Stage::Error)?;
        let failure = StageFailure {
            stage: failed,
            message: message.into(),
        };
        self.terminal = Some(Terminal::Failed(failure.clone()));
        Ok(failure)
    }

    /// Enter `Cancelled`, recording the stage boundary where it was observed
    pub fn cancel(&mut self) -> Result<Stage> {
        let at = self.stage;
        self.transition(Stage::Cancelled)?;
        self.terminal = Some(Terminal::Cancelled { stage: at });
        Ok(at)
    }

    fn transition(&mut self, next: Stage) -> Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(self.invalid(next));
        }
        if let Some(progress) = next.progress() {
            if progress < self.progress {
                return Err(self.invalid(next));
            }
            self.progress = progress;
        }
        self.stage = next;
        Ok(())
    }

    fn invalid(&self, to: Stage) -> LaunchError {
        LaunchError::InvalidStateTransition {
            from: self.stage,
            to,
        }
    }
}
