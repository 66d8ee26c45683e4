use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Latency values are recorded in microseconds at 3 significant figures
/// (relative error <= 0.1%, inside the 1% accuracy contract for p95/p99).
const HISTOGRAM_SIGFIG: u8 = 3;
const MICROS_PER_MILLI: f64 = 1_000.0;

/// Running state for one tag: success/failure counters plus a latency
/// histogram. Counters are exact; percentiles carry the histogram's
/// documented approximation. Mutated only through the aggregator's record
/// methods.
#[derive(Debug)]
pub(super) struct TagSeries {
    total: u64,
    failures: u64,
    latency_sum_us: u128,
    max_us: u64,
    hist: Option<Histogram<u64>>,
}

impl TagSeries {
    pub(super) fn new() -> Self {
        Self {
            total: 0,
            failures: 0,
            latency_sum_us: 0,
            max_us: 0,
            // Creation only fails for out-of-range sigfig values; if it ever
            // does, counters still run and percentiles read as absent.
            hist: Histogram::new(HISTOGRAM_SIGFIG).ok(),
        }
    }

    pub(super) fn observe(&mut self, success: bool, latency: Duration) {
        self.observe_n(success, latency, 1);
    }

    /// Records `count` identical observations in one histogram write. Used
    /// for capacity drops, where a single tick can owe thousands of samples.
    pub(super) fn observe_n(&mut self, success: bool, latency: Duration, count: u64) {
        if count == 0 {
            return;
        }
        self.total = self.total.saturating_add(count);
        if !success {
            self.failures = self.failures.saturating_add(count);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_sum_us = self
            .latency_sum_us
            .saturating_add(u128::from(micros).saturating_mul(u128::from(count)));
        self.max_us = self.max_us.max(micros);
        if let Some(hist) = self.hist.as_mut()
            && hist.record_n(micros.max(1), count).is_err()
        {
            self.hist = None;
        }
    }

    pub(super) const fn total(&self) -> u64 {
        self.total
    }

    pub(super) const fn failures(&self) -> u64 {
        self.failures
    }

    /// Exact boolean failure rate, `failures / total`.
    pub(super) fn failure_rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.failures as f64 / self.total as f64)
    }

    pub(super) fn avg_ms(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let avg_us = self
            .latency_sum_us
            .checked_div(u128::from(self.total))
            .unwrap_or(0);
        Some(u64::try_from(avg_us).unwrap_or(u64::MAX) as f64 / MICROS_PER_MILLI)
    }

    pub(super) fn max_ms(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.max_us as f64 / MICROS_PER_MILLI)
    }

    /// `percent` in (0, 100]. Approximate per the histogram contract above.
    pub(super) fn percentile_ms(&self, percent: f64) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let hist = self.hist.as_ref()?;
        let quantile = (percent / 100.0).clamp(0.0, 1.0);
        Some(hist.value_at_quantile(quantile) as f64 / MICROS_PER_MILLI)
    }

    pub(super) fn snapshot(&self) -> TagSnapshot {
        TagSnapshot {
            count: self.total,
            failures: self.failures,
            failure_rate: self.failure_rate().unwrap_or(0.0),
            avg_ms: self.avg_ms().unwrap_or(0.0),
            max_ms: self.max_ms().unwrap_or(0.0),
            p50_ms: self.percentile_ms(50.0).unwrap_or(0.0),
            p90_ms: self.percentile_ms(90.0).unwrap_or(0.0),
            p95_ms: self.percentile_ms(95.0).unwrap_or(0.0),
            p99_ms: self.percentile_ms(99.0).unwrap_or(0.0),
        }
    }
}

/// Immutable per-tag aggregate, the unit the summary exporter renders.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TagSnapshot {
    pub count: u64,
    pub failures: u64,
    pub failure_rate: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}
