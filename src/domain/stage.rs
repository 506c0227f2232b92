use serde::{Deserialize, Serialize};
use std::fmt;

/// Launch pipeline stages
///
/// A stage is entered once its work has succeeded.
/// Non-terminal stages run in one fixed order:
/// `Queued → Validating → Bridging → Generating → Uploading → Minting → Complete`.
/// `Error` and `Cancelled` are reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Submitted, not yet validated. Never published.
    Queued,
    /// Request accepted, balance checked and cost locked in
    Validating,
    /// Funds bridged to the destination chain
    Bridging,
    /// Metadata and media generated
    Generating,
    /// Content pinned to storage
    Uploading,
    /// Token minted on-chain
    Minting,
    /// Terminal success
    Complete,
    /// Terminal failure
    Error,
    /// Terminal, cancelled at a stage boundary
    Cancelled,
}

impl Stage {
    /// Stages that publish a progress event on entry, in order.
    pub const PUBLISHED: [Stage; 6] = [
        Stage::Validating,
        Stage::Bridging,
        Stage::Generating,
        Stage::Uploading,
        Stage::Minting,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Validating => "validating",
            Stage::Bridging => "bridging",
            Stage::Generating => "generating",
            Stage::Uploading => "uploading",
            Stage::Minting => "minting",
            Stage::Complete => "complete",
            Stage::Error => "error",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Checkpoint progress for entering this stage.
    ///
    /// `Error` and `Cancelled` have no checkpoint; a failed request keeps the
    /// progress of the last stage it entered.
    pub fn progress(&self) -> Option<u8> {
        match self {
            Stage::Queued => Some(0),
            Stage::Validating => Some(10),
            Stage::Bridging => Some(30),
            Stage::Generating => Some(50),
            Stage::Uploading => Some(70),
            Stage::Minting => Some(90),
            Stage::Complete => Some(100),
            Stage::Error | Stage::Cancelled => None,
        }
    }

    /// Next stage along the happy path
    pub fn next(&self) -> Option<Stage> {
        use Stage::*;

        match self {
            Queued => Some(Validating),
            Validating => Some(Bridging),
            Bridging => Some(Generating),
            Generating => Some(Uploading),
            Uploading => Some(Minting),
            Minting => Some(Complete),
            Complete | Error | Cancelled => None,
        }
    }

    /// Check if this stage can transition to another stage
    pub fn can_transition_to(&self, target: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            Stage::Error | Stage::Cancelled => true,
            _ => self.next() == Some(target),
        }
    }

    /// Is this a terminal stage?
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error | Stage::Cancelled)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
