
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::metrics::MetricsAggregator;

/// Statistic selected by a threshold expression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stat {
    /// Boolean failure rate, `failures / total`.
    FailureRate,
    Avg,
    Max,
    Count,
    /// Latency percentile, `p(N)` with `N` in (0, 100].
    Percentile(f64),
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FailureRate => write!(f, "rate"),
            Self::Avg => write!(f, "avg"),
            Self::Max => write!(f, "max"),
            Self::Count => write!(f, "count"),
            Self::Percentile(percent) => write!(f, "p({})", percent),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    #[must_use]
    pub fn holds(self, value: f64, bound: f64) -> bool {
        match self {
            Self::Lt => value < bound,
            Self::Le => value <= bound,
            Self::Gt => value > bound,
            Self::Ge => value >= bound,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match *self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{}", symbol)
    }
}

/// One SLO expression over a tagged metric series, optionally empowered to
/// abort the run after a continuous `delay_window` of violation.
#[derive(Clone, Debug)]
pub struct Threshold {
    pub tag: String,
    pub stat: Stat,
    pub comparator: Comparator,
    pub bound: f64,
    pub abort_on_fail: bool,
    pub delay_window: Duration,
}

impl Threshold {
    /// Parses the expression forms scenario tables use: `rate<0.001`,
    /// `p(95)<100`, `p(99)<150`, `avg<=200`, `max<1000`, `count>=10`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThresholdExpr` for malformed expressions
    /// and `ConfigError::InvalidPercentile` for `p(N)` outside (0, 100].
    pub fn parse(
        tag: impl Into<String>,
        expr: &str,
        abort_on_fail: bool,
        delay_window: Duration,
    ) -> Result<Self, ConfigError> {
        let trimmed = expr.trim();
        let (stat_part, comparator, bound_part) = split_expression(trimmed)?;
        let stat = parse_stat(stat_part, trimmed)?;
        let Ok(bound) = bound_part.trim().parse::<f64>() else {
            return Err(ConfigError::InvalidThresholdExpr {
                expr: trimmed.to_owned(),
                reason: "bound is not a number",
            });
        };
        if !bound.is_finite() {
            return Err(ConfigError::InvalidThresholdExpr {
                expr: trimmed.to_owned(),
                reason: "bound must be finite",
            });
        }
        Ok(Self {
            tag: tag.into(),
            stat,
            comparator,
            bound,
            abort_on_fail,
            delay_window,
        })
    }

    /// Canonical rendering of the parsed expression.
    #[must_use]
    pub fn expression(&self) -> String {
        format!("{}{}{}", self.stat, self.comparator, self.bound)
    }

    /// Identifier used in logs and in the report's terminal reason.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{{{}}}", self.expression(), self.tag)
    }

    fn current_value(&self, metrics: &MetricsAggregator) -> Option<f64> {
        match self.stat {
            Stat::FailureRate => metrics.failure_rate(&self.tag),
            Stat::Avg => metrics.avg_ms(&self.tag),
            Stat::Max => metrics.max_ms(&self.tag),
            Stat::Count => {
                let count = metrics.count(&self.tag);
                (count > 0).then(|| count as f64)
            }
            Stat::Percentile(percent) => metrics.percentile_ms(&self.tag, percent),
        }
    }
}

fn split_expression(expr: &str) -> Result<(&str, Comparator, &str), ConfigError> {
    // Two-character comparators first so "<=" never parses as "<" + "=bound".
    let table = [
        ("<=", Comparator::Le),
        (">=", Comparator::Ge),
        ("<", Comparator::Lt),
        (">", Comparator::Gt),
    ];
    for (symbol, comparator) in table {
        if let Some((left, right)) = expr.split_once(symbol) {
            return Ok((left, comparator, right));
        }
    }
    Err(ConfigError::InvalidThresholdExpr {
        expr: expr.to_owned(),
        reason: "expected one of <, <=, >, >=",
    })
}

fn parse_stat(token: &str, expr: &str) -> Result<Stat, ConfigError> {
    match token.trim() {
        "rate" => Ok(Stat::FailureRate),
        "avg" => Ok(Stat::Avg),
        "max" => Ok(Stat::Max),
        "count" => Ok(Stat::Count),
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| ConfigError::InvalidThresholdExpr {
                    expr: expr.to_owned(),
                    reason: "unknown statistic",
                })?;
            let Ok(percent) = inner.trim().parse::<f64>() else {
                return Err(ConfigError::InvalidThresholdExpr {
                    expr: expr.to_owned(),
                    reason: "percentile is not a number",
                });
            };
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(ConfigError::InvalidPercentile { value: percent });
            }
            Ok(Stat::Percentile(percent))
        }
    }
}

/// Pass/fail state of one threshold at evaluation time.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ThresholdStatus {
    pub tag: String,
    pub expression: String,
    pub passed: bool,
}

struct Entry {
    threshold: Threshold,
    breach_since: Option<Instant>,
    last_passed: bool,
}

/// Evaluates every configured threshold against the live aggregate on its own
/// cadence. A metric with no samples yet evaluates as not violated.
pub struct ThresholdEvaluator {
    entries: Vec<Entry>,
    run_start: Instant,
    fired: Option<String>,
}

impl ThresholdEvaluator {
    #[must_use]
    pub fn new(thresholds: Vec<Threshold>, run_start: Instant) -> Self {
        let entries = thresholds
            .into_iter()
            .map(|threshold| Entry {
                threshold,
                breach_since: None,
                last_passed: true,
            })
            .collect();
        Self {
            entries,
            run_start,
            fired: None,
        }
    }

    /// Re-evaluates every threshold. Returns the label of the threshold that
    /// triggered an abort, once, the first time a violation survives its full
    /// delay window; the decision is irreversible for the run.
    pub fn evaluate(&mut self, now: Instant, metrics: &MetricsAggregator) -> Option<String> {
        let mut trigger = None;
        for entry in &mut self.entries {
            let violated = entry
                .threshold
                .current_value(metrics)
                .is_some_and(|value| {
                    !entry.threshold.comparator.holds(value, entry.threshold.bound)
                });
            entry.last_passed = !violated;
            if !entry.threshold.abort_on_fail {
                continue;
            }
            if !violated {
                if entry.breach_since.is_some() {
                    debug!("Threshold {} recovered before its delay window", entry.threshold.label());
                }
                entry.breach_since = None;
                continue;
            }
            let since = *entry.breach_since.get_or_insert(now);
            let window = entry.threshold.delay_window;
            let breached_for = now.saturating_duration_since(since);
            let since_start = now.saturating_duration_since(self.run_start);
            if breached_for >= window && since_start >= window && self.fired.is_none() {
                let label = entry.threshold.label();
                warn!("Threshold {} violated for the full delay window; aborting run", label);
                self.fired = Some(label.clone());
                trigger = Some(label);
            }
        }
        trigger
    }

    /// Updates pass/fail state from the final aggregate without advancing
    /// the abort debounce. Used once after draining so the report reflects
    /// end-of-run data; completed runs are never retroactively aborted.
    pub fn refresh(&mut self, metrics: &MetricsAggregator) {
        for entry in &mut self.entries {
            let violated = entry
                .threshold
                .current_value(metrics)
                .is_some_and(|value| {
                    !entry.threshold.comparator.holds(value, entry.threshold.bound)
                });
            entry.last_passed = !violated;
        }
    }

    /// Final pass/fail per configured threshold, in configuration order.
    #[must_use]
    pub fn statuses(&self) -> Vec<ThresholdStatus> {
        self.entries
            .iter()
            .map(|entry| ThresholdStatus {
                tag: entry.threshold.tag.clone(),
                expression: entry.threshold.expression(),
                passed: entry.last_passed,
            })
            .collect()
    }

    /// Label of the threshold that aborted the run, if any.
    #[must_use]
    pub fn aborted_by(&self) -> Option<&str> {
        self.fired.as_deref()
    }
}
