//! Outlier-resistant summary statistics for completed-sale price samples.

/// Summary of an IQR-filtered price sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub stddev: f64,
    /// Sample size after outlier removal.
    pub kept_count: usize,
}

/// Compute mean/median/quartiles/stddev over `prices` after dropping
/// IQR outliers (outside [p25 - 1.5*IQR, p75 + 1.5*IQR]).
///
/// Percentiles are taken at index `floor(n * q)` of the ascending sort, so
/// the result is order-independent. If filtering would empty the sample, the
/// unfiltered median stands in as a single-value sample — a non-empty input
/// never yields an empty result.
pub fn iqr_filtered_stats(prices: &[f64]) -> SampleStats {
    if prices.is_empty() {
        return SampleStats {
            mean: 0.0,
            median: 0.0,
            p25: 0.0,
            p75: 0.0,
            stddev: 0.0,
            kept_count: 0,
        };
    }

    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();

    let p25 = sorted[(n as f64 * 0.25) as usize];
    let median = sorted[(n as f64 * 0.5) as usize];
    let p75 = sorted[(n as f64 * 0.75) as usize];

    let iqr = p75 - p25;
    let lower = p25 - 1.5 * iqr;
    let upper = p75 + 1.5 * iqr;

    let kept: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|p| *p >= lower && *p <= upper)
        .collect();

    if kept.is_empty() {
        // Every point was an outlier relative to its own quartiles; anchor
        // on the median rather than produce undefined statistics.
        return iqr_filtered_stats(&[median]);
    }

    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    let variance = kept.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / kept.len() as f64;

    SampleStats {
        mean,
        median,
        p25,
        p75,
        stddev: variance.sqrt(),
        kept_count: kept.len(),
    }
}

/// Confidence (0-100) in a cohort's statistics: up to 70 points from
/// transaction volume (7 per sale), up to 30 from recency (minus one per day
/// since the newest sale).
pub fn confidence_score(volume: usize, days_since_newest: i64) -> f64 {
    let volume_score = (volume as f64 * 7.0).min(70.0);
    let recency_score = (30.0 - days_since_newest as f64).max(0.0);
    (volume_score + recency_score).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_all_zero() {
        let stats = iqr_filtered_stats(&[]);
        assert_eq!(stats.kept_count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn single_price_passes_through() {
        let stats = iqr_filtered_stats(&[42.0]);
        assert_eq!(stats.kept_count, 1);
        assert!((stats.mean - 42.0).abs() < 1e-9);
        assert!((stats.median - 42.0).abs() < 1e-9);
        assert!(stats.stddev.abs() < 1e-9);
    }

    #[test]
    fn outlier_is_dropped() {
        // Tight cluster plus one wild point.
        let prices = [100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 5000.0];
        let stats = iqr_filtered_stats(&prices);
        assert_eq!(stats.kept_count, 6);
        assert!(stats.mean < 110.0, "outlier leaked into mean: {}", stats.mean);
    }

    #[test]
    fn non_empty_input_never_empties() {
        // Adversarial shapes: constant, two-point, strongly skewed.
        let samples: [&[f64]; 4] = [
            &[10.0],
            &[10.0, 10.0, 10.0],
            &[1.0, 1000.0],
            &[1.0, 2.0, 3.0, 4.0, 100000.0],
        ];
        for prices in samples {
            let stats = iqr_filtered_stats(prices);
            assert!(stats.kept_count >= 1, "emptied on {prices:?}");
        }
    }

    #[test]
    fn stats_stay_within_input_range() {
        let prices = [55.0, 80.0, 61.0, 90.0, 70.0, 75.0, 63.0];
        let min = 55.0;
        let max = 90.0;
        let stats = iqr_filtered_stats(&prices);
        for v in [stats.mean, stats.median, stats.p25, stats.p75] {
            assert!((min..=max).contains(&v), "{v} outside [{min}, {max}]");
        }
    }

    #[test]
    fn result_is_order_independent() {
        let a = iqr_filtered_stats(&[30.0, 10.0, 20.0, 40.0, 25.0]);
        let b = iqr_filtered_stats(&[40.0, 25.0, 10.0, 30.0, 20.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_monotone_in_volume() {
        let mut prev = -1.0;
        for volume in 0..=15 {
            let c = confidence_score(volume, 10);
            assert!(c >= prev, "volume {volume}: {c} < {prev}");
            prev = c;
        }
    }

    #[test]
    fn confidence_monotone_in_recency() {
        let mut prev = 101.0;
        for days in 0..=40 {
            let c = confidence_score(5, days);
            assert!(c <= prev, "days {days}: {c} > {prev}");
            prev = c;
        }
    }

    #[test]
    fn confidence_clamped_to_100() {
        assert_eq!(confidence_score(50, 0), 100.0);
        assert_eq!(confidence_score(0, 100), 0.0);
        // 10 sales, same-day data: 70 + 30 caps exactly at 100.
        assert_eq!(confidence_score(10, 0), 100.0);
        // 4 sales, 12 days old: 28 + 18.
        assert!((confidence_score(4, 12) - 46.0).abs() < 1e-9);
    }
}
