mod loader;
mod overrides;
mod parse;

#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::profile::{RateProfile, Stage};
use crate::threshold::Threshold;

pub use loader::{load_scenario, load_scenario_file};
pub use overrides::Overrides;
pub use parse::parse_duration;

const DEFAULT_MAX_WORKERS: usize = 100;
const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_EVAL_INTERVAL: Duration = Duration::from_secs(1);

/// Raw scenario tables as they appear in a TOML or JSON file. Everything is
/// optional here; `EngineConfig::from_file` validates and fills defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ScenarioFile {
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScenarioConfig {
    pub executor: Option<String>,
    pub rate: Option<f64>,
    pub start_rate: Option<f64>,
    pub duration: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    pub pre_allocated: Option<usize>,
    pub max_workers: Option<usize>,
    pub graceful_stop: Option<String>,
    pub tick_interval: Option<String>,
    pub eval_interval: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StageConfig {
    pub duration: String,
    pub target: f64,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdConfig {
    pub tag: String,
    pub expr: String,
    #[serde(default)]
    pub abort_on_fail: bool,
    pub delay_window: Option<String>,
}

/// Executor kinds as a tagged variant, each with its own validated parameter
/// set — never one loosely-typed bag with optional fields.
#[derive(Clone, Debug)]
pub enum ExecutorKind {
    ConstantArrival { rate: f64, duration: Duration },
    RampingArrival { start_rate: f64, stages: Vec<Stage> },
}

impl ExecutorKind {
    /// # Errors
    ///
    /// Propagates `RateProfile` validation failures.
    pub fn profile(&self) -> Result<RateProfile, ConfigError> {
        match *self {
            Self::ConstantArrival { rate, duration } => RateProfile::constant(rate, duration),
            Self::RampingArrival {
                start_rate,
                ref stages,
            } => RateProfile::ramping(start_rate, stages.clone()),
        }
    }
}

/// The immutable configuration a scheduler is constructed with. No
/// process-wide state survives across runs; every run owns its own copy.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub executor: ExecutorKind,
    pub pre_allocated: usize,
    pub max_workers: usize,
    pub graceful_stop: Duration,
    pub tick_interval: Duration,
    pub eval_interval: Duration,
    pub thresholds: Vec<Threshold>,
}

impl EngineConfig {
    /// Validates the raw scenario tables into an executable configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown executor, missing executor
    /// fields, malformed durations or threshold expressions, or inconsistent
    /// worker bounds.
    pub fn from_file(file: &ScenarioFile) -> Result<Self, ConfigError> {
        let scenario = &file.scenario;
        let executor_name = scenario
            .executor
            .as_deref()
            .unwrap_or("constant-arrival-rate");
        let executor = match executor_name {
            "constant-arrival-rate" => {
                let rate = scenario.rate.ok_or(ConfigError::MissingExecutorField {
                    executor: "constant-arrival-rate",
                    field: "rate",
                })?;
                let duration_text =
                    scenario
                        .duration
                        .as_deref()
                        .ok_or(ConfigError::MissingExecutorField {
                            executor: "constant-arrival-rate",
                            field: "duration",
                        })?;
                ExecutorKind::ConstantArrival {
                    rate,
                    duration: parse::parse_duration(duration_text)?,
                }
            }
            "ramping-arrival-rate" => {
                let mut stages = Vec::with_capacity(scenario.stages.len());
                for stage in &scenario.stages {
                    stages.push(Stage::new(
                        parse::parse_duration(&stage.duration)?,
                        stage.target,
                    ));
                }
                ExecutorKind::RampingArrival {
                    start_rate: scenario.start_rate.unwrap_or(0.0),
                    stages,
                }
            }
            other => {
                return Err(ConfigError::UnknownExecutor {
                    value: other.to_owned(),
                });
            }
        };

        let max_workers = scenario.max_workers.unwrap_or(DEFAULT_MAX_WORKERS);
        let pre_allocated = scenario.pre_allocated.unwrap_or(max_workers);
        let graceful_stop = scenario
            .graceful_stop
            .as_deref()
            .map(parse::parse_duration)
            .transpose()?
            .unwrap_or(DEFAULT_GRACEFUL_STOP);
        let tick_interval = scenario
            .tick_interval
            .as_deref()
            .map(parse::parse_duration)
            .transpose()?
            .unwrap_or(DEFAULT_TICK_INTERVAL);
        let eval_interval = scenario
            .eval_interval
            .as_deref()
            .map(parse::parse_duration)
            .transpose()?
            .unwrap_or(DEFAULT_EVAL_INTERVAL);

        let mut thresholds = Vec::with_capacity(file.thresholds.len());
        for entry in &file.thresholds {
            let delay_window = entry
                .delay_window
                .as_deref()
                .map(parse::parse_duration)
                .transpose()?
                .unwrap_or(Duration::ZERO);
            thresholds.push(Threshold::parse(
                entry.tag.clone(),
                &entry.expr,
                entry.abort_on_fail,
                delay_window,
            )?);
        }

        let config = Self {
            executor,
            pre_allocated,
            max_workers,
            graceful_stop,
            tick_interval,
            eval_interval,
            thresholds,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ZeroMaxWorkers`, `PreAllocatedExceedsMax`, or any rate
    /// profile validation error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroMaxWorkers);
        }
        if self.pre_allocated > self.max_workers {
            return Err(ConfigError::PreAllocatedExceedsMax {
                pre_allocated: self.pre_allocated,
                max_workers: self.max_workers,
            });
        }
        drop(self.executor.profile()?);
        Ok(())
    }
}
