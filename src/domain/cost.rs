//! Launch cost estimation
//!
//! Pure functions only: the same configuration always yields the same
//! breakdown, so callers may preview costs before, during or independent of
//! a launch.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::launch::LaunchConfig;

/// Decimal places kept on every fee component
const COST_SCALE: u32 = 8;

/// Fee/cost breakdown for a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub base: Decimal,
    pub bridge_fee: Decimal,
    pub gas_fee: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
}

/// Pricing parameters for the estimator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    /// Base cost per minted edition before the rarity multiplier
    #[serde(default = "default_unit_cost")]
    pub unit_cost: Decimal,
    /// Bridge fee as a fraction of base (0.005 = 0.5%)
    #[serde(default = "default_bridge_fee_pct")]
    pub bridge_fee_pct: Decimal,
    /// Platform fee as a fraction of base (0.025 = 2.5%)
    #[serde(default = "default_platform_fee_pct")]
    pub platform_fee_pct: Decimal,
    /// Flat gas estimate for the mint transaction
    #[serde(default = "default_gas_estimate")]
    pub gas_estimate: Decimal,
}

fn default_unit_cost() -> Decimal {
    dec!(0.001)
}

fn default_bridge_fee_pct() -> Decimal {
    dec!(0.005)
}

fn default_platform_fee_pct() -> Decimal {
    dec!(0.025)
}

fn default_gas_estimate() -> Decimal {
    dec!(0.002)
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            unit_cost: default_unit_cost(),
            bridge_fee_pct: default_bridge_fee_pct(),
            platform_fee_pct: default_platform_fee_pct(),
            gas_estimate: default_gas_estimate(),
        }
    }
}

impl CostModel {
    /// Compute the fee breakdown for a launch configuration.
    ///
    /// `base = unit_cost × rarity multiplier × supply`; bridge and platform
    /// fees are fixed fractions of base; gas is flat.
    pub fn estimate(&self, config: &LaunchConfig) -> CostEstimate {
        let base = round(self.unit_cost * config.rarity.multiplier() * Decimal::from(config.supply));
        let bridge_fee = round(base * self.bridge_fee_pct);
        let platform_fee = round(base * self.platform_fee_pct);
        let gas_fee = round(self.gas_estimate);

        CostEstimate {
            base,
            bridge_fee,
            gas_fee,
            platform_fee,
            total: base + bridge_fee + gas_fee + platform_fee,
        }
    }
}

/// Estimate with the default pricing model
pub fn estimate(config: &LaunchConfig) -> CostEstimate {
    CostModel::default().estimate(config)
}

fn round(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}
