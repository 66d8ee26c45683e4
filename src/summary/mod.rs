
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::metrics::TagSnapshot;
use crate::threshold::ThresholdStatus;

/// Why the run ended. Surfaced in both report renderings; a run never exits
/// without stating its terminal reason.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Aborted { threshold: String },
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted { ref threshold } => write!(f, "aborted: {}", threshold),
        }
    }
}

/// The final aggregated state of one run. Built exactly once after the
/// scheduler stops; the JSON and text renderings below are two views of this
/// same immutable value, never independently computed.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub started_at: String,
    pub duration_ms: u64,
    pub end: EndReason,
    pub operations: BTreeMap<String, TagSnapshot>,
    pub thresholds: Vec<ThresholdStatus>,
}

impl Report {
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        duration: Duration,
        end: EndReason,
        operations: BTreeMap<String, TagSnapshot>,
        thresholds: Vec<ThresholdStatus>,
    ) -> Self {
        Self {
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            end,
            operations,
            thresholds,
        }
    }

    /// `true` when the run completed and every threshold held.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.end == EndReason::Completed && self.thresholds.iter().all(|status| status.passed)
    }

    /// Machine-parseable rendering.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| EngineError::metrics(format!("Failed to serialize report: {}", err)))
    }

    /// Human-readable rendering of the same aggregate.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = self.lines().join("\n");
        out.push('\n');
        out
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(format!(
            "Run {} after {:.1}s (started {})",
            self.end,
            self.duration_ms as f64 / 1_000.0,
            self.started_at
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<28} {:>9} {:>8} {:>7} {:>9} {:>9} {:>9} {:>9}",
            "TAG", "COUNT", "FAIL", "RATE", "P50(ms)", "P90(ms)", "P95(ms)", "P99(ms)"
        ));
        for (tag, series) in &self.operations {
            lines.push(format!(
                "{:<28} {:>9} {:>8} {:>7.4} {:>9.1} {:>9.1} {:>9.1} {:>9.1}",
                tag,
                series.count,
                series.failures,
                series.failure_rate,
                series.p50_ms,
                series.p90_ms,
                series.p95_ms,
                series.p99_ms
            ));
        }
        if !self.thresholds.is_empty() {
            lines.push(String::new());
            lines.push("Thresholds:".to_owned());
            for status in &self.thresholds {
                let verdict = if status.passed { "PASS" } else { "FAIL" };
                lines.push(format!(
                    "  {} {} {{{}}}",
                    verdict, status.expression, status.tag
                ));
            }
        }
        lines
    }
}
