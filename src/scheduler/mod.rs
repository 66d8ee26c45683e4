
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::metrics::{MetricsAggregator, Outcome, TAG_DROPPED};
use crate::pool::ResourcePool;
use crate::profile::RateCursor;
use crate::shutdown::ShutdownSender;
use crate::summary::{EndReason, Report};
use crate::threshold::ThresholdEvaluator;
use crate::worker::{WorkerPool, Workload};

const SHUTDOWN_CAPACITY: usize = 1;

/// Lifecycle of one run, logged on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Idle,
    Warming,
    Running(usize),
    Draining,
    Stopped,
}

/// Drives one run end to end: warms the pool, converts the rate profile into
/// per-tick submission batches, evaluates thresholds on their own cadence,
/// drains, and renders the final report. Owns every piece of run state; a new
/// run means a new scheduler.
pub struct Scheduler<R, W> {
    config: EngineConfig,
    pool: WorkerPool<R, W>,
    metrics: Arc<MetricsAggregator>,
    shutdown: ShutdownSender,
}

impl<R, W> Scheduler<R, W>
where
    R: Send + Sync + 'static,
    W: Workload<R>,
{
    /// # Errors
    ///
    /// Returns a `ConfigError` when `config` fails validation, so a broken
    /// scenario is rejected before any traffic is generated.
    pub fn new(
        config: EngineConfig,
        resources: ResourcePool<R>,
        workload: Arc<W>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let (shutdown, _) = broadcast::channel(SHUTDOWN_CAPACITY);
        let metrics = Arc::new(MetricsAggregator::new());
        let pool = WorkerPool::new(
            config.max_workers,
            resources,
            workload,
            Arc::clone(&metrics),
            shutdown.clone(),
        );
        Ok(Self {
            config,
            pool,
            metrics,
            shutdown,
        })
    }

    /// Live aggregate handle, for callers that stream progress while the run
    /// executes on another task.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    /// Executes the configured profile to completion or threshold abort.
    /// Either way the returned report states the terminal reason; the run
    /// never exits silently.
    ///
    /// # Errors
    ///
    /// Returns an `EngineError` when the profile fails to build.
    pub async fn run(mut self) -> EngineResult<Report> {
        let started_at = Utc::now();
        let profile = self.config.executor.profile()?;
        let total = profile.total_duration();

        let mut state = RunState::Idle;
        debug!("Run state: {:?}", state);
        state = RunState::Warming;
        debug!("Run state: {:?}", state);
        self.pool.preallocate(self.config.pre_allocated).await;

        let run_start = Instant::now();
        let mut last_tick = run_start;
        let mut cursor = RateCursor::new();
        let mut evaluator = ThresholdEvaluator::new(self.config.thresholds.clone(), run_start);
        let mut aborted: Option<String> = None;

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut eval_ticker = interval(self.config.eval_interval);
        eval_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                now = ticker.tick() => {
                    let elapsed = now.saturating_duration_since(run_start);
                    if elapsed >= total {
                        // Flush the partial interval between the last tick and
                        // the profile end so short profiles land on their
                        // declared totals instead of losing the final batch.
                        let last_elapsed = last_tick.saturating_duration_since(run_start);
                        let remaining = total.saturating_sub(last_elapsed);
                        let due = cursor.due(profile.rate_at(last_elapsed), remaining);
                        self.dispatch(due);
                        break;
                    }
                    let rate = profile.rate_at(elapsed);
                    let due = cursor.due(rate, now.saturating_duration_since(last_tick));
                    last_tick = now;
                    self.dispatch(due);
                    self.pool.reap();
                    if let Some(index) = profile.stage_index_at(elapsed)
                        && state != RunState::Running(index)
                    {
                        state = RunState::Running(index);
                        debug!("Run state: {:?} (target {:.1}/s)", state, rate);
                    }
                }
                now = eval_ticker.tick() => {
                    if let Some(label) = evaluator.evaluate(now, &self.metrics) {
                        aborted = Some(label);
                        break;
                    }
                }
            }
        }

        state = RunState::Draining;
        debug!("Run state: {:?} ({} in flight)", state, self.pool.in_flight());
        drop(self.shutdown.send(()));
        self.pool.drain(self.config.graceful_stop).await;
        state = RunState::Stopped;
        debug!("Run state: {:?}", state);

        evaluator.refresh(&self.metrics);
        let end = aborted.map_or(EndReason::Completed, |threshold| EndReason::Aborted {
            threshold,
        });
        info!("Run {} after {:?}", end, run_start.elapsed());
        Ok(Report::new(
            started_at,
            run_start.elapsed(),
            end,
            self.metrics.snapshot(),
            evaluator.statuses(),
        ))
    }

    /// Submits `due` iterations, recording whatever the saturated pool refuses
    /// as capacity drops. Stops at the first refusal: permits only free
    /// asynchronously, so the rest of the batch cannot land either.
    fn dispatch(&mut self, due: u64) {
        let mut submitted: u64 = 0;
        while submitted < due {
            if !self.pool.submit() {
                break;
            }
            submitted = submitted.saturating_add(1);
        }
        let dropped = due.saturating_sub(submitted);
        if dropped > 0 {
            self.metrics
                .record_repeated(&Outcome::failure(TAG_DROPPED), dropped);
            debug!(
                "Dropped {} iterations: all {} worker slots busy",
                dropped,
                self.pool.max_workers()
            );
        }
    }
}

/// Convenience wrapper `Scheduler::new` + `run` for callers that need no
/// mid-run access to the aggregate.
///
/// # Errors
///
/// Propagates construction and run failures unchanged.
pub async fn execute<R, W>(
    config: EngineConfig,
    resources: ResourcePool<R>,
    workload: Arc<W>,
) -> EngineResult<Report>
where
    R: Send + Sync + 'static,
    W: Workload<R>,
{
    Scheduler::new(config, resources, workload)?.run().await
}
