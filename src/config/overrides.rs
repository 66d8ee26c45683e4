use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use super::{EngineConfig, ExecutorKind};

const ENV_PREFIX: &str = "STAMPEDE_";

/// String-keyed overrides for the scalar scenario parameters, the way the
/// surrounding scripts take `RATE=5000 DURATION_SECS=60 ...` from the
/// environment. A malformed value logs a warning and keeps the configured
/// default; it never fails the run.
///
/// Recognized keys: `RATE`, `DURATION_SECS`, `PRE_ALLOCATED`, `MAX_WORKERS`,
/// `GRACEFUL_STOP_SECS`.
#[derive(Debug, Default)]
pub struct Overrides {
    vars: HashMap<String, String>,
}

impl Overrides {
    #[must_use]
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Collects `STAMPEDE_*` process environment variables, prefix stripped.
    #[must_use]
    pub fn from_env() -> Self {
        let vars = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|stripped| (stripped.to_owned(), value))
            })
            .collect();
        Self { vars }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Applies the recognized overrides to `config`. Keys that do not apply
    /// to the configured executor (e.g. `RATE` against a ramping profile) are
    /// ignored with a warning.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(rate) = self.number::<f64>("RATE") {
            match &mut config.executor {
                ExecutorKind::ConstantArrival {
                    rate: configured, ..
                } => *configured = rate,
                ExecutorKind::RampingArrival { .. } => {
                    warn!("Override RATE ignored: executor is ramping-arrival-rate");
                }
            }
        }
        if let Some(secs) = self.number::<u64>("DURATION_SECS") {
            match &mut config.executor {
                ExecutorKind::ConstantArrival { duration, .. } => {
                    *duration = Duration::from_secs(secs);
                }
                ExecutorKind::RampingArrival { .. } => {
                    warn!("Override DURATION_SECS ignored: executor is ramping-arrival-rate");
                }
            }
        }
        if let Some(pre_allocated) = self.number::<usize>("PRE_ALLOCATED") {
            config.pre_allocated = pre_allocated;
        }
        if let Some(max_workers) = self.number::<usize>("MAX_WORKERS") {
            config.max_workers = max_workers;
        }
        if let Some(secs) = self.number::<u64>("GRACEFUL_STOP_SECS") {
            config.graceful_stop = Duration::from_secs(secs);
        }
    }

    fn number<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.vars.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Override {}='{}' is not a number ({}); keeping default", key, raw, err);
                None
            }
        }
    }
}
