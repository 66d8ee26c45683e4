use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. A run that trips any of these never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read scenario '{path}': {source}")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML scenario '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON scenario '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported scenario extension '{ext}'. Use .toml or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Scenario file must have a .toml or .json extension.")]
    MissingExtension,
    #[error("Unknown executor '{value}'. Use 'constant-arrival-rate' or 'ramping-arrival-rate'.")]
    UnknownExecutor { value: String },
    #[error("Rate profile must define at least one stage.")]
    EmptyStageList,
    #[error("Rate must be finite and >= 0, got {value}.")]
    InvalidRate { value: f64 },
    #[error("Executor '{executor}' requires '{field}'.")]
    MissingExecutorField {
        executor: &'static str,
        field: &'static str,
    },
    #[error("Population interval must be > 0.")]
    ZeroInterval,
    #[error("Resource pool must contain at least one item.")]
    EmptyPool,
    #[error("max_workers must be >= 1.")]
    ZeroMaxWorkers,
    #[error("pre_allocated ({pre_allocated}) cannot exceed max_workers ({max_workers}).")]
    PreAllocatedExceedsMax {
        pre_allocated: usize,
        max_workers: usize,
    },
    #[error("Invalid threshold expression '{expr}': {reason}")]
    InvalidThresholdExpr { expr: String, reason: &'static str },
    #[error("Threshold percentile must be in (0, 100], got {value}.")]
    InvalidPercentile { value: f64 },
    #[error("Duration must not be empty.")]
    DurationEmpty,
    #[error("Invalid duration '{value}'.")]
    InvalidDurationFormat { value: String },
    #[error("Invalid duration '{value}': {source}")]
    InvalidDurationNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration overflow.")]
    DurationOverflow,
    #[error("Invalid duration unit '{unit}'.")]
    InvalidDurationUnit { unit: String },
}
