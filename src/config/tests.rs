use std::collections::HashMap;
use std::io::Write as _;

use super::*;
use crate::error::{EngineError, EngineResult};

const SCENARIO_TOML: &str = r#"
[scenario]
executor = "constant-arrival-rate"
rate = 30.0
duration = "20m"
pre_allocated = 50
max_workers = 600
graceful_stop = "30s"

[[thresholds]]
tag = "telemetry_post"
expr = "p(95)<100"
abort_on_fail = true
delay_window = "10s"

[[thresholds]]
tag = "telemetry_post"
expr = "rate<0.001"
"#;

fn write_scenario(ext: &str, content: &str) -> EngineResult<(tempfile::TempDir, std::path::PathBuf)> {
    let dir = tempfile::tempdir()
        .map_err(|err| EngineError::scheduler(format!("tempdir failed: {}", err)))?;
    let path = dir.path().join(format!("scenario.{}", ext));
    let mut file = std::fs::File::create(&path)
        .map_err(|err| EngineError::scheduler(format!("create failed: {}", err)))?;
    file.write_all(content.as_bytes())
        .map_err(|err| EngineError::scheduler(format!("write failed: {}", err)))?;
    Ok((dir, path))
}

#[test]
fn loads_toml_scenario_with_thresholds() -> EngineResult<()> {
    let (_dir, path) = write_scenario("toml", SCENARIO_TOML)?;
    let config = load_scenario(&path)?;
    match config.executor {
        ExecutorKind::ConstantArrival { rate, duration } => {
            if (rate - 30.0).abs() > f64::EPSILON || duration != Duration::from_secs(1_200) {
                return Err(EngineError::scheduler("Executor fields mismatch"));
            }
        }
        ExecutorKind::RampingArrival { .. } => {
            return Err(EngineError::scheduler("Expected a constant executor"));
        }
    }
    if config.pre_allocated != 50 || config.max_workers != 600 {
        return Err(EngineError::scheduler("Worker bounds mismatch"));
    }
    if config.thresholds.len() != 2 {
        return Err(EngineError::scheduler("Expected two thresholds"));
    }
    let abort = config
        .thresholds
        .first()
        .ok_or_else(|| EngineError::scheduler("Missing first threshold"))?;
    if !abort.abort_on_fail || abort.delay_window != Duration::from_secs(10) {
        return Err(EngineError::scheduler("Abort threshold fields mismatch"));
    }
    Ok(())
}

#[test]
fn loads_json_ramping_scenario() -> EngineResult<()> {
    let json = r#"{
        "scenario": {
            "executor": "ramping-arrival-rate",
            "start_rate": 0.0,
            "stages": [
                {"duration": "2m", "target": 30.0},
                {"duration": "10m", "target": 30.0},
                {"duration": "30s", "target": 0.0}
            ],
            "max_workers": 200
        }
    }"#;
    let (_dir, path) = write_scenario("json", json)?;
    let config = load_scenario(&path)?;
    let profile = config.executor.profile()?;
    if profile.total_duration() != Duration::from_secs(750) {
        return Err(EngineError::scheduler(format!(
            "Expected 750s profile, got {:?}",
            profile.total_duration()
        )));
    }
    // Defaults fill in when the table is silent.
    if config.graceful_stop != Duration::from_secs(30)
        || config.tick_interval != Duration::from_millis(100)
        || config.pre_allocated != 200
    {
        return Err(EngineError::scheduler("Defaults not applied"));
    }
    Ok(())
}

#[test]
fn rejects_invalid_scenarios() -> EngineResult<()> {
    let missing_rate = r#"
[scenario]
executor = "constant-arrival-rate"
duration = "10s"
"#;
    let (_dir, path) = write_scenario("toml", missing_rate)?;
    if load_scenario(&path).is_ok() {
        return Err(EngineError::scheduler("Expected missing-rate rejection"));
    }

    let unknown = r#"
[scenario]
executor = "per-vu-iterations"
"#;
    let (_dir2, path2) = write_scenario("toml", unknown)?;
    match load_scenario(&path2) {
        Err(crate::error::ConfigError::UnknownExecutor { value }) => {
            if value != "per-vu-iterations" {
                return Err(EngineError::scheduler("Wrong executor in error"));
            }
        }
        Err(other) => {
            return Err(EngineError::scheduler(format!(
                "Expected UnknownExecutor, got {}",
                other
            )));
        }
        Ok(_) => return Err(EngineError::scheduler("Expected unknown-executor rejection")),
    }

    let (_dir3, path3) = write_scenario("yaml", "scenario: {}")?;
    if load_scenario(&path3).is_ok() {
        return Err(EngineError::scheduler("Expected extension rejection"));
    }
    Ok(())
}

#[test]
fn rejects_inconsistent_worker_bounds() -> EngineResult<()> {
    let toml = r#"
[scenario]
executor = "constant-arrival-rate"
rate = 1.0
duration = "1s"
pre_allocated = 20
max_workers = 10
"#;
    let (_dir, path) = write_scenario("toml", toml)?;
    match load_scenario(&path) {
        Err(crate::error::ConfigError::PreAllocatedExceedsMax { .. }) => Ok(()),
        Err(other) => Err(EngineError::scheduler(format!(
            "Expected PreAllocatedExceedsMax, got {}",
            other
        ))),
        Ok(_) => Err(EngineError::scheduler("Expected worker-bound rejection")),
    }
}

#[test]
fn duration_strings_parse_with_units() -> EngineResult<()> {
    let cases = [
        ("250ms", Duration::from_millis(250)),
        ("30s", Duration::from_secs(30)),
        ("45", Duration::from_secs(45)),
        ("20m", Duration::from_secs(1_200)),
        ("1h", Duration::from_secs(3_600)),
    ];
    for (text, expected) in cases {
        let parsed = parse_duration(text)?;
        if parsed != expected {
            return Err(EngineError::scheduler(format!(
                "'{}' parsed to {:?}",
                text, parsed
            )));
        }
    }
    for bad in ["", "s", "10x", "ms", "-5s"] {
        if parse_duration(bad).is_ok() {
            return Err(EngineError::scheduler(format!(
                "Expected rejection for '{}'",
                bad
            )));
        }
    }
    Ok(())
}

#[test]
fn overrides_replace_scalars_and_tolerate_garbage() -> EngineResult<()> {
    let (_dir, path) = write_scenario("toml", SCENARIO_TOML)?;
    let mut config = load_scenario(&path)?;

    let mut vars = HashMap::new();
    vars.insert("RATE".to_owned(), "120.5".to_owned());
    vars.insert("MAX_WORKERS".to_owned(), "800".to_owned());
    vars.insert("PRE_ALLOCATED".to_owned(), "not-a-number".to_owned());
    vars.insert("GRACEFUL_STOP_SECS".to_owned(), "5".to_owned());
    Overrides::from_map(vars).apply(&mut config);

    match config.executor {
        ExecutorKind::ConstantArrival { rate, .. } => {
            if (rate - 120.5).abs() > f64::EPSILON {
                return Err(EngineError::scheduler("RATE override not applied"));
            }
        }
        ExecutorKind::RampingArrival { .. } => {
            return Err(EngineError::scheduler("Executor kind must not change"));
        }
    }
    if config.max_workers != 800 || config.graceful_stop != Duration::from_secs(5) {
        return Err(EngineError::scheduler("Numeric overrides not applied"));
    }
    // Malformed values keep the configured default.
    if config.pre_allocated != 50 {
        return Err(EngineError::scheduler("Malformed override must fall back"));
    }
    Ok(())
}

#[test]
fn rate_override_is_ignored_for_ramping_executors() -> EngineResult<()> {
    let mut config = EngineConfig {
        executor: ExecutorKind::RampingArrival {
            start_rate: 0.0,
            stages: vec![crate::profile::Stage::new(Duration::from_secs(10), 5.0)],
        },
        pre_allocated: 1,
        max_workers: 10,
        graceful_stop: Duration::from_secs(30),
        tick_interval: Duration::from_millis(100),
        eval_interval: Duration::from_secs(1),
        thresholds: vec![],
    };
    let mut vars = HashMap::new();
    vars.insert("RATE".to_owned(), "9999".to_owned());
    Overrides::from_map(vars).apply(&mut config);
    match config.executor {
        ExecutorKind::RampingArrival { ref stages, .. } => {
            let target = stages
                .first()
                .map(|stage| stage.target)
                .ok_or_else(|| EngineError::scheduler("Missing stage"))?;
            if (target - 5.0).abs() > f64::EPSILON {
                return Err(EngineError::scheduler("Ramping stages must be untouched"));
            }
            Ok(())
        }
        ExecutorKind::ConstantArrival { .. } => {
            Err(EngineError::scheduler("Executor kind must not change"))
        }
    }
}
