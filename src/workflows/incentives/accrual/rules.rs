use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::super::domain::{RateRules, Tier};

/// Rate resolved for a volume plus the tier that produced it.
pub(crate) struct TierResolution<'a> {
    pub rate: Decimal,
    pub tier: Option<&'a Tier>,
    pub progress: u8,
}

/// Tiers form a step function: the tier with the highest `min_volume` not
/// exceeding the volume wins. Below every threshold the rate is zero.
pub(crate) fn resolve_rate(rules: &RateRules, volume: Decimal) -> TierResolution<'_> {
    match rules {
        RateRules::Flat(rate) => TierResolution {
            rate: *rate,
            tier: None,
            progress: 100,
        },
        RateRules::Tiered(tiers) => {
            let achieved = tiers
                .iter()
                .filter(|tier| tier.min_volume <= volume)
                .max_by(|a, b| a.min_volume.cmp(&b.min_volume));
            let rate = achieved.map(|tier| tier.rate).unwrap_or(Decimal::ZERO);
            let progress = tier_progress(tiers, achieved, volume);

            TierResolution {
                rate,
                tier: achieved,
                progress,
            }
        }
    }
}

/// Percentage of the way from the achieved threshold to the next-higher one.
/// 100 at or above the top tier, 0 when tiers exist but none is achieved.
fn tier_progress(tiers: &[Tier], achieved: Option<&Tier>, volume: Decimal) -> u8 {
    let Some(current) = achieved else {
        return 0;
    };

    let next = tiers
        .iter()
        .filter(|tier| tier.min_volume > current.min_volume)
        .min_by(|a, b| a.min_volume.cmp(&b.min_volume));
    let Some(next) = next else {
        return 100;
    };

    let span = next.min_volume - current.min_volume;
    if span <= Decimal::ZERO {
        return 100;
    }

    let covered = (volume - current.min_volume).max(Decimal::ZERO);
    let percent = (covered / span * Decimal::ONE_HUNDRED).round();
    percent.to_u8().map(|value| value.min(100)).unwrap_or(100)
}
