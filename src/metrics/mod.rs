mod series;


use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

pub use series::TagSnapshot;
use series::TagSeries;

/// Reserved tag for iterations refused by a saturated worker pool.
pub const TAG_DROPPED: &str = "_dropped_no_capacity";
/// Reserved tag for iterations whose callback panicked.
pub const TAG_ITERATION_ERROR: &str = "_iteration_error";
/// Reserved tag for iterations cancelled at the graceful-stop deadline.
pub const TAG_TIMEOUT: &str = "_timeout";

/// One sub-operation result emitted by an iteration. An iteration may emit
/// several, one per tagged operation.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub tag: String,
    pub success: bool,
    pub latency: Duration,
    pub at: Instant,
}

impl Outcome {
    #[must_use]
    pub fn new(tag: impl Into<String>, success: bool, latency: Duration) -> Self {
        Self {
            tag: tag.into(),
            success,
            latency,
            at: Instant::now(),
        }
    }

    /// Zero-latency failure, used for the reserved engine tags.
    #[must_use]
    pub fn failure(tag: impl Into<String>) -> Self {
        Self::new(tag, false, Duration::ZERO)
    }
}

/// Streaming per-tag aggregator, the single shared point of contention in the
/// engine. The tag map sits behind an `RwLock` taken only for lookup (write
/// access only when a tag is first observed); each series has its own mutex,
/// so concurrent workers recording different tags never serialize on one
/// global lock.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    series: RwLock<HashMap<String, Arc<Mutex<TagSeries>>>>,
}

impl MetricsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe under concurrent calls from many iterations. Series are created
    /// lazily on first observation; no tag cardinality limit is enforced
    /// here — callers bound tag sets by construction.
    pub fn record(&self, outcome: &Outcome) {
        let series = self.series_for(&outcome.tag);
        let mut guard = series.lock().unwrap_or_else(PoisonError::into_inner);
        guard.observe(outcome.success, outcome.latency);
    }

    /// Records `count` copies of `outcome` in one pass. The scheduler uses
    /// this for dropped iterations so an overloaded tick stays O(1) here.
    pub fn record_repeated(&self, outcome: &Outcome, count: u64) {
        let series = self.series_for(&outcome.tag);
        let mut guard = series.lock().unwrap_or_else(PoisonError::into_inner);
        guard.observe_n(outcome.success, outcome.latency, count);
    }

    fn series_for(&self, tag: &str) -> Arc<Mutex<TagSeries>> {
        if let Ok(map) = self.series.read()
            && let Some(series) = map.get(tag)
        {
            return Arc::clone(series);
        }
        let mut map = self
            .series
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(tag.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(TagSeries::new()))),
        )
    }

    fn with_series<T>(&self, tag: &str, read: impl FnOnce(&TagSeries) -> T) -> Option<T> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let series = map.get(tag)?;
        let guard = series.lock().unwrap_or_else(PoisonError::into_inner);
        Some(read(&guard))
    }

    #[must_use]
    pub fn count(&self, tag: &str) -> u64 {
        self.with_series(tag, TagSeries::total).unwrap_or(0)
    }

    #[must_use]
    pub fn failures(&self, tag: &str) -> u64 {
        self.with_series(tag, TagSeries::failures).unwrap_or(0)
    }

    /// Exact failure rate `failures / total`; `None` before the first sample.
    #[must_use]
    pub fn failure_rate(&self, tag: &str) -> Option<f64> {
        self.with_series(tag, TagSeries::failure_rate).flatten()
    }

    #[must_use]
    pub fn avg_ms(&self, tag: &str) -> Option<f64> {
        self.with_series(tag, TagSeries::avg_ms).flatten()
    }

    #[must_use]
    pub fn max_ms(&self, tag: &str) -> Option<f64> {
        self.with_series(tag, TagSeries::max_ms).flatten()
    }

    /// Latency percentile in milliseconds for `percent` in (0, 100].
    #[must_use]
    pub fn percentile_ms(&self, tag: &str, percent: f64) -> Option<f64> {
        self.with_series(tag, |series| series.percentile_ms(percent))
            .flatten()
    }

    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut tags: Vec<String> = map.keys().cloned().collect();
        tags.sort_unstable();
        tags
    }

    /// Point-in-time aggregate of every series, ordered by tag. The summary
    /// exporter renders exactly one of these, taken after the run stops.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, TagSnapshot> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.iter()
            .map(|(tag, series)| {
                let guard = series.lock().unwrap_or_else(PoisonError::into_inner);
                (tag.clone(), guard.snapshot())
            })
            .collect()
    }
}
