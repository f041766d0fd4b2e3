use std::time::Duration;

/// Outcome of loading one batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Zero-based position of the batch in the file
    pub index: usize,
    pub rows: u64,
    /// Values that were present but could not be read as timestamps
    pub coerced_nulls: u64,
    pub duration: Duration,
}

/// Statistics aggregated from batch reports
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub batches: usize,
    pub rows_loaded: u64,
    pub coerced_nulls: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.rows_loaded += report.rows;
        self.coerced_nulls += report.coerced_nulls;
        self.batch_durations_ms
            .push(report.duration.as_millis() as u64);
    }

    /// Nearest-rank load time, in milliseconds, of the batch at percentile `p`
    ///
    /// `p` is clamped to 0..=100, so p0 is the fastest batch and p100 the
    /// slowest. `None` until a batch has been recorded.
    pub fn percentile(&self, p: f64) -> Option<u64> {
        let len = self.batch_durations_ms.len();
        if len == 0 {
            return None;
        }

        let rank = (p.clamp(0.0, 100.0) / 100.0 * len as f64).ceil() as usize;
        let mut durations = self.batch_durations_ms.clone();
        let (_, nth, _) = durations.select_nth_unstable(rank.clamp(1, len) - 1);
        Some(*nth)
    }

    /// Batch load time at p50, p90 and p99
    pub fn latency_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
