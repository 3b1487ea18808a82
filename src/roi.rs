//! Expected-value model for grading an ungraded card.
//!
//! A raw purchase is valued as a probability-weighted sale across grading
//! outcomes. Each PSA grade in the ladder is priced from real snapshot data
//! where available; an isolated gap is backfilled from the nearest anchored
//! grade; only when nothing is anchored does the model fall back to raw-price
//! multipliers — conservative ones, since optimistic multipliers under total
//! data absence systematically overstate ROI.

use tracing::debug;

use crate::config::{
    MultiplierPolicy, EMERGENCY_CONFIDENCE, GRADE_OUTCOME_PROBS, GRADING_COST,
    MARKETPLACE_FEE_RATE, NO_DATA_CONFIDENCE,
};
use crate::config::grade_ratios;
use crate::fairvalue::FairValueSource;
use crate::types::{FairValue, RawRoi};

/// Estimated sale values for grades 7/8/9/10, index = grade - 7.
type GradeLadder = [f64; 4];

/// Estimate ROI for buying `raw_price` worth of ungraded card and grading it.
/// Never fails: lookup errors degrade to the emergency multiplier path.
pub async fn estimate_roi<S: FairValueSource>(
    source: &S,
    policy: &MultiplierPolicy,
    raw_price: f64,
    card_id: i64,
) -> RawRoi {
    let resolved = tokio::try_join!(
        source.resolve(card_id, "PSA", "PSA 7"),
        source.resolve(card_id, "PSA", "PSA 8"),
        source.resolve(card_id, "PSA", "PSA 9"),
        source.resolve(card_id, "PSA", "PSA 10"),
    );

    let (g7, g8, g9, g10) = match resolved {
        Ok(values) => values,
        Err(e) => {
            debug!("Fair-value lookups failed for card {card_id}: {e}");
            let ladder = multiplier_ladder(raw_price, &policy.conservative);
            return compute(raw_price, ladder, EMERGENCY_CONFIDENCE, false);
        }
    };

    let any_real = [&g7, &g8, &g9, &g10].iter().any(|g| g.is_reliable());
    if !any_real {
        let ladder = multiplier_ladder(raw_price, &policy.conservative);
        return compute(raw_price, ladder, NO_DATA_CONFIDENCE, false);
    }

    let ladder = anchored_ladder(raw_price, &policy.optimistic, &g7, &g8, &g9, &g10);

    // Accuracy of the middle grades dominates: confidence is weighted by the
    // same outcome distribution as expected value.
    let confidence = weighted_over_ladder([
        g7.confidence,
        g8.confidence,
        g9.confidence,
        g10.confidence,
    ]);

    compute(raw_price, ladder, confidence, true)
}

/// Price every grade from real data, an adjacent anchored grade, or the
/// optimistic raw-price multiplier, in that order of preference.
fn anchored_ladder(
    raw_price: f64,
    optimistic: &[f64; 4],
    g7: &FairValue,
    g8: &FairValue,
    g9: &FairValue,
    g10: &FairValue,
) -> GradeLadder {
    let v7 = if g7.is_reliable() {
        g7.average
    } else if g8.is_reliable() {
        g8.average * grade_ratios::SEVEN_FROM_EIGHT
    } else {
        raw_price * optimistic[0]
    };

    let v8 = if g8.is_reliable() {
        g8.average
    } else if g9.is_reliable() {
        g9.average * grade_ratios::EIGHT_FROM_NINE
    } else {
        raw_price * optimistic[1]
    };

    let v9 = if g9.is_reliable() {
        g9.average
    } else if g10.is_reliable() {
        g10.average * grade_ratios::NINE_FROM_TEN
    } else {
        raw_price * optimistic[2]
    };

    let v10 = if g10.is_reliable() {
        g10.average
    } else if g9.is_reliable() {
        g9.average * grade_ratios::TEN_FROM_NINE
    } else {
        raw_price * optimistic[3]
    };

    [v7, v8, v9, v10]
}

fn multiplier_ladder(raw_price: f64, multipliers: &[f64; 4]) -> GradeLadder {
    [
        raw_price * multipliers[0],
        raw_price * multipliers[1],
        raw_price * multipliers[2],
        raw_price * multipliers[3],
    ]
}

/// Probability-weighted sum over the grade ladder (index = grade - 7).
fn weighted_over_ladder(ladder: GradeLadder) -> f64 {
    GRADE_OUTCOME_PROBS
        .iter()
        .map(|(grade, prob)| prob * ladder[(*grade - 7) as usize])
        .sum()
}

fn compute(raw_price: f64, ladder: GradeLadder, confidence: f64, uses_real_data: bool) -> RawRoi {
    let expected_gross = weighted_over_ladder(ladder);
    let net_expected = expected_gross * (1.0 - MARKETPLACE_FEE_RATE);
    let total_cost = raw_price + GRADING_COST;
    let profit = net_expected - total_cost;

    RawRoi {
        roi_percentage: profit / total_cost * 100.0,
        expected_value: net_expected,
        grading_cost: GRADING_COST,
        potential_profit: profit,
        confidence_score: confidence,
        uses_real_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fairvalue::testutil::StubFairValues;

    fn full_ladder_source() -> StubFairValues {
        StubFairValues::default()
            .with(1, "PSA", "PSA 7", StubFairValues::reliable(100.0, 80.0))
            .with(1, "PSA", "PSA 8", StubFairValues::reliable(175.0, 90.0))
            .with(1, "PSA", "PSA 9", StubFairValues::reliable(300.0, 85.0))
            .with(1, "PSA", "PSA 10", StubFairValues::reliable(600.0, 75.0))
    }

    #[tokio::test]
    async fn reproduces_reference_arithmetic_exactly() {
        // $50 raw against a fully anchored {100, 175, 300, 600} ladder:
        //   gross = .05*600 + .30*300 + .50*175 + .15*100 = 222.5
        //   net   = 222.5 * 0.87 = 193.575
        //   cost  = 50 + 35 = 85
        //   profit = 108.575, ROI% = 127.735...
        let source = full_ladder_source();
        let roi = estimate_roi(&source, &MultiplierPolicy::default(), 50.0, 1).await;

        assert!(roi.uses_real_data);
        assert!((roi.expected_value - 193.575).abs() < 1e-9, "net={}", roi.expected_value);
        assert!((roi.potential_profit - 108.575).abs() < 1e-9);
        assert!((roi.roi_percentage - 108.575 / 85.0 * 100.0).abs() < 1e-9);
        assert!((roi.roi_percentage - 127.735).abs() < 1e-2);

        // Confidence weighted 15/50/30/5 across grades 7/8/9/10.
        let expected_conf = 0.15 * 80.0 + 0.50 * 90.0 + 0.30 * 85.0 + 0.05 * 75.0;
        assert!((roi.confidence_score - expected_conf).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_grade_backfills_from_adjacent_anchor() {
        // PSA 7 absent: expect 0.6 * PSA 8 rather than a raw-price multiple.
        let source = StubFairValues::default()
            .with(1, "PSA", "PSA 8", StubFairValues::reliable(200.0, 90.0))
            .with(1, "PSA", "PSA 9", StubFairValues::reliable(350.0, 85.0))
            .with(1, "PSA", "PSA 10", StubFairValues::reliable(900.0, 70.0));
        let roi = estimate_roi(&source, &MultiplierPolicy::default(), 50.0, 1).await;

        let gross = 0.05 * 900.0 + 0.30 * 350.0 + 0.50 * 200.0 + 0.15 * (200.0 * 0.6);
        let net = gross * (1.0 - MARKETPLACE_FEE_RATE);
        assert!((roi.expected_value - net).abs() < 1e-9);
        assert!(roi.uses_real_data);
    }

    #[tokio::test]
    async fn missing_ten_scales_from_nine() {
        let source = StubFairValues::default()
            .with(1, "PSA", "PSA 9", StubFairValues::reliable(300.0, 85.0));
        let roi = estimate_roi(&source, &MultiplierPolicy::default(), 40.0, 1).await;

        // 10 anchors on 9 (2.5x) and 8 anchors on 9 (0.7x). Grade 7 only
        // anchors on a *real* 8, which this ladder lacks, so it falls to the
        // optimistic multiplier.
        let v10 = 300.0 * 2.5;
        let v8 = 300.0 * 0.7;
        let v7 = 40.0 * 2.0;
        let gross = 0.05 * v10 + 0.30 * 300.0 + 0.50 * v8 + 0.15 * v7;
        let net = gross * (1.0 - MARKETPLACE_FEE_RATE);
        assert!((roi.expected_value - net).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_data_uses_conservative_multipliers() {
        let source = StubFairValues::default();
        let policy = MultiplierPolicy::default();
        let roi = estimate_roi(&source, &policy, 50.0, 1).await;

        assert!(!roi.uses_real_data);
        assert!((roi.confidence_score - NO_DATA_CONFIDENCE).abs() < 1e-9);

        let gross = 0.05 * (50.0 * 8.0)
            + 0.30 * (50.0 * 4.0)
            + 0.50 * (50.0 * 2.5)
            + 0.15 * (50.0 * 1.5);
        let net = gross * (1.0 - MARKETPLACE_FEE_RATE);
        assert!((roi.expected_value - net).abs() < 1e-9);
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_emergency_confidence() {
        let source = StubFairValues::failing();
        let roi = estimate_roi(&source, &MultiplierPolicy::default(), 50.0, 1).await;

        assert!(!roi.uses_real_data);
        assert!((roi.confidence_score - EMERGENCY_CONFIDENCE).abs() < 1e-9);
        // Same conservative ladder as the no-data path.
        let no_data = {
            let source = StubFairValues::default();
            estimate_roi(&source, &MultiplierPolicy::default(), 50.0, 1).await
        };
        assert!((roi.expected_value - no_data.expected_value).abs() < 1e-9);
    }

    #[tokio::test]
    async fn low_confidence_data_counts_as_no_data() {
        // Snapshots exist but none clears the reliability bar.
        let source = StubFairValues::default().with(
            1,
            "PSA",
            "PSA 9",
            FairValue {
                average: 300.0,
                confidence: 30.0,
                volume: 2,
                has_data: true,
            },
        );
        let roi = estimate_roi(&source, &MultiplierPolicy::default(), 50.0, 1).await;
        assert!(!roi.uses_real_data);
        assert!((roi.confidence_score - NO_DATA_CONFIDENCE).abs() < 1e-9);
    }
}
