
use std::time::Duration;

use crate::error::ConfigError;

/// A time-bounded segment of a load profile with a target arrival rate,
/// expressed canonically in events per second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stage {
    pub duration: Duration,
    pub target: f64,
}

impl Stage {
    #[must_use]
    pub const fn new(duration: Duration, target: f64) -> Self {
        Self { duration, target }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    /// Rate is held at each stage's target for the stage duration.
    Constant,
    /// Rate ramps linearly from the previous target to each stage's target.
    Ramping,
}

/// An ordered, non-empty sequence of stages. Stage `i + 1` starts the instant
/// stage `i` ends; zero-length stages are instantaneous rate jumps.
#[derive(Clone, Debug)]
pub struct RateProfile {
    shape: ShapeKind,
    start_rate: f64,
    stages: Vec<Stage>,
}

impl RateProfile {
    /// Single-stage profile holding `rate` for `duration`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRate` when `rate` is negative or not
    /// finite.
    pub fn constant(rate: f64, duration: Duration) -> Result<Self, ConfigError> {
        validate_rate(rate)?;
        Ok(Self {
            shape: ShapeKind::Constant,
            start_rate: rate,
            stages: vec![Stage::new(duration, rate)],
        })
    }

    /// Ramping profile: rate starts at `start_rate` and moves linearly to each
    /// stage's target over that stage's duration, in the given order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyStageList` for an empty stage list and
    /// `ConfigError::InvalidRate` when any rate is negative or not finite.
    pub fn ramping(start_rate: f64, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyStageList);
        }
        validate_rate(start_rate)?;
        for stage in &stages {
            validate_rate(stage.target)?;
        }
        Ok(Self {
            shape: ShapeKind::Ramping,
            start_rate,
            stages,
        })
    }

    #[must_use]
    pub const fn shape(&self) -> ShapeKind {
        self.shape
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, stage| {
                acc.checked_add(stage.duration).unwrap_or(Duration::MAX)
            })
    }

    /// Instantaneous target rate at `elapsed` since profile start. Returns 0.0
    /// once the profile has ended; by then the scheduler is draining.
    #[must_use]
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        let mut from = self.start_rate;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            if stage.duration.is_zero() {
                from = stage.target;
                continue;
            }
            let end = offset.checked_add(stage.duration).unwrap_or(Duration::MAX);
            if elapsed < end {
                return match self.shape {
                    ShapeKind::Constant => stage.target,
                    ShapeKind::Ramping => {
                        let into = elapsed.saturating_sub(offset).as_secs_f64();
                        let span = stage.duration.as_secs_f64();
                        let fraction = if span > 0.0 { into / span } else { 1.0 };
                        (from + (stage.target - from) * fraction).max(0.0)
                    }
                };
            }
            from = stage.target;
            offset = end;
        }
        0.0
    }

    /// Index of the stage active at `elapsed`, skipping instantaneous stages.
    /// `None` once the profile has ended.
    #[must_use]
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut offset = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.duration.is_zero() {
                continue;
            }
            let end = offset.checked_add(stage.duration).unwrap_or(Duration::MAX);
            if elapsed < end {
                return Some(index);
            }
            offset = end;
        }
        None
    }
}

/// Aggregate arrival rate produced by `population` independent emitters each
/// firing once per `interval`: `ceil(population / interval_secs)`. Rounds up
/// so declared per-entity intervals are never undershot in aggregate.
///
/// # Errors
///
/// Returns `ConfigError::ZeroInterval` when `interval` is zero.
pub fn rate_for_population(population: u64, interval: Duration) -> Result<f64, ConfigError> {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return Err(ConfigError::ZeroInterval);
    }
    Ok((population as f64 / secs).ceil())
}

/// Converts instantaneous rate and elapsed wall time into whole submissions,
/// carrying fractional remainders across ticks. A tick that overruns its
/// interval yields a proportionally larger batch on the next call instead of
/// losing the backlog.
#[derive(Debug, Default)]
pub struct RateCursor {
    carry: f64,
}

impl RateCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self { carry: 0.0 }
    }

    pub fn due(&mut self, rate: f64, elapsed: Duration) -> u64 {
        self.carry += rate.max(0.0) * elapsed.as_secs_f64();
        if !self.carry.is_finite() {
            self.carry = 0.0;
            return u64::MAX;
        }
        let whole = self.carry.floor();
        self.carry -= whole;
        whole as u64
    }

    #[must_use]
    pub const fn carry(&self) -> f64 {
        self.carry
    }
}

fn validate_rate(rate: f64) -> Result<(), ConfigError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(ConfigError::InvalidRate { value: rate });
    }
    Ok(())
}
