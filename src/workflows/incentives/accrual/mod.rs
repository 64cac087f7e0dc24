mod period;
mod rules;

pub use period::{AccrualPeriod, PeriodError, PeriodSpec, PeriodType};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::RateRuleset;

/// Stateless calculator applying one program's rate ruleset to qualifying
/// purchase volume. Deterministic with no side effects, so batch re-runs
/// over the same inputs produce identical rows.
pub struct AccrualEngine {
    ruleset: RateRuleset,
}

impl AccrualEngine {
    pub fn new(ruleset: RateRuleset) -> Self {
        Self { ruleset }
    }

    pub fn evaluate(&self, volume: Decimal) -> AccrualBreakdown {
        let resolution = rules::resolve_rate(&self.ruleset.rules, volume);
        let accrued = (volume * resolution.rate).round_dp(2);
        let final_amount = match self.ruleset.max_payout_per_dealer {
            Some(cap) if accrued > cap => cap,
            _ => accrued,
        };

        AccrualBreakdown {
            rate: resolution.rate,
            tier_achieved: resolution.tier.map(|tier| tier.name.clone()),
            tier_progress: resolution.progress,
            accrued_amount: accrued,
            final_amount,
        }
    }
}

/// Output of one accrual computation. `final_amount` is the accrued amount
/// capped by the per-dealer maximum and never exceeds `accrued_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualBreakdown {
    pub rate: Decimal,
    pub tier_achieved: Option<String>,
    pub tier_progress: u8,
    pub accrued_amount: Decimal,
    pub final_amount: Decimal,
}
