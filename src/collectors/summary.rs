use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Percentile breakdown of statement durations, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationSummary {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl DurationSummary {
    /// Builds the summary from durations given in seconds.
    /// Values are clamped to ≥ 1 μs; negative or NaN inputs are skipped.
    pub fn from_seconds(durations: impl IntoIterator<Item = f64>) -> Self {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        else {
            return Self::empty();
        };

        for secs in durations {
            if !(secs >= 0.0) {
                continue;
            }
            let us = ((secs * 1_000_000.0).round() as u64).clamp(HIST_LOW, HIST_HIGH);
            if let Err(e) = hist.record(us) {
                tracing::debug!(value_us = us, error = ?e, "duration not recorded in summary");
            }
        }

        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            count: hist.len(),
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_percentile(50.0),
            p95_us: hist.value_at_percentile(95.0),
            p99_us: hist.value_at_percentile(99.0),
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            min_us: 0,
            max_us: 0,
            mean_us: 0.0,
            p50_us: 0,
            p95_us: 0,
            p99_us: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(DurationSummary::from_seconds([]), DurationSummary::empty());
        assert_eq!(DurationSummary::from_seconds([f64::NAN, -1.0]).count, 0);
    }

    #[test]
    fn percentiles_follow_input() {
        let durations = (1..=100).map(|ms| ms as f64 / 1_000.0);
        let summary = DurationSummary::from_seconds(durations);
        assert_eq!(summary.count, 100);
        assert_eq!(summary.min_us, 1_000);
        assert!(summary.max_us >= 100_000 && summary.max_us <= 100_100);
        assert!(summary.p50_us >= 49_900 && summary.p50_us <= 50_100);
        assert!(summary.p99_us >= summary.p95_us);
    }
}
