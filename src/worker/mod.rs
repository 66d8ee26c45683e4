#[cfg(test)]
mod tests;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt as _;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::{MetricsAggregator, Outcome, TAG_ITERATION_ERROR, TAG_TIMEOUT};
use crate::pool::ResourcePool;
use crate::shutdown::{ShutdownReceiver, ShutdownSender};

/// Ordinal identifier of a concurrency slot, `0..max_workers`. A slot owns no
/// resource permanently; it resolves one through the pool's stable modulo
/// mapping whenever an iteration runs on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerSlot(u32);

impl WorkerSlot {
    #[must_use]
    pub const fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    #[must_use]
    pub const fn ordinal(self) -> u32 {
        self.0
    }
}

/// The user-supplied iteration callback. One call is one iteration; it may
/// emit several outcomes, one per tagged sub-operation. `cancel` fires when
/// the run drains; long-running iterations should bail out when it does.
#[async_trait]
pub trait Workload<R: Sync>: Send + Sync + 'static {
    /// Per-slot preparation executed during warmup, once for each
    /// preallocated slot, before any traffic is scheduled.
    async fn setup(&self, slot: WorkerSlot, resource: &R) {
        let _ = (slot, resource);
    }

    async fn run(&self, slot: WorkerSlot, resource: &R, cancel: ShutdownReceiver) -> Vec<Outcome>;
}

/// Bounded pool of concurrently-executing iteration tasks. Arrival-rate
/// scheduling never queues: when every slot is busy, `submit` refuses and the
/// caller records the drop.
pub struct WorkerPool<R, W> {
    permits: Arc<Semaphore>,
    free_slots: Arc<Mutex<Vec<u32>>>,
    tasks: JoinSet<()>,
    resources: ResourcePool<R>,
    workload: Arc<W>,
    metrics: Arc<MetricsAggregator>,
    shutdown: ShutdownSender,
    max_workers: usize,
}

impl<R, W> WorkerPool<R, W>
where
    R: Send + Sync + 'static,
    W: Workload<R>,
{
    #[must_use]
    pub fn new(
        max_workers: usize,
        resources: ResourcePool<R>,
        workload: Arc<W>,
        metrics: Arc<MetricsAggregator>,
        shutdown: ShutdownSender,
    ) -> Self {
        // Popping from the back hands out low ordinals first, so runs with
        // fewer in-flight iterations than pool items stay on distinct items.
        let free_slots: Vec<u32> = (0..max_workers)
            .rev()
            .map(|ordinal| u32::try_from(ordinal).unwrap_or(u32::MAX))
            .collect();
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            free_slots: Arc::new(Mutex::new(free_slots)),
            tasks: JoinSet::new(),
            resources,
            workload,
            metrics,
            shutdown,
            max_workers,
        }
    }

    /// Runs the workload's `setup` hook for each of the first `pre_allocated`
    /// slots, eagerly, so the first measured interval carries no cold-start
    /// skew.
    pub async fn preallocate(&self, pre_allocated: usize) {
        for ordinal in 0..pre_allocated.min(self.max_workers) {
            let slot = WorkerSlot::new(u32::try_from(ordinal).unwrap_or(u32::MAX));
            let resource = self.resources.assign(slot);
            self.workload.setup(slot, resource).await;
        }
        debug!("Preallocated {} worker slots", pre_allocated.min(self.max_workers));
    }

    /// Starts one iteration on a free slot. Returns `false` without queuing
    /// when all `max_workers` slots are busy; the caller records the refused
    /// iteration as a capacity drop.
    pub fn submit(&mut self) -> bool {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            return false;
        };
        let ordinal = {
            let mut slots = self
                .free_slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slots.pop()
        };
        let Some(ordinal) = ordinal else {
            // Permit count and free-list length move together; a permit with
            // no slot means a poisoned invariant, treated as saturation.
            drop(permit);
            return false;
        };

        let slot = WorkerSlot::new(ordinal);
        let resources = self.resources.clone();
        let workload = Arc::clone(&self.workload);
        let metrics = Arc::clone(&self.metrics);
        let cancel = self.shutdown.subscribe();
        let free_slots = Arc::clone(&self.free_slots);
        self.tasks.spawn(async move {
            let _permit = permit;
            let mut guard = SlotGuard {
                free_slots,
                ordinal,
                metrics: Arc::clone(&metrics),
                completed: false,
            };
            let resource = resources.assign(slot);
            let result = AssertUnwindSafe(workload.run(slot, resource, cancel))
                .catch_unwind()
                .await;
            match result {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        metrics.record(outcome);
                    }
                }
                // A failing iteration never terminates the pool or its
                // neighbours; it becomes a failed outcome and the slot frees.
                Err(_) => metrics.record(&Outcome::failure(TAG_ITERATION_ERROR)),
            }
            guard.completed = true;
        });
        true
    }

    /// Iterations currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_workers
            .saturating_sub(self.permits.available_permits())
    }

    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Collects finished tasks without blocking. The iteration bodies catch
    /// their own panics, so join errors here are limited to task cancellation.
    pub fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(err) = joined
                && err.is_panic()
            {
                self.metrics.record(&Outcome::failure(TAG_ITERATION_ERROR));
            }
        }
    }

    /// Waits for in-flight iterations to finish, up to `grace`. Whatever is
    /// still running at the deadline is cancelled and recorded as a
    /// `"_timeout"` failure; nothing is silently dropped.
    pub async fn drain(&mut self, grace: Duration) {
        let deadline = Instant::now()
            .checked_add(grace)
            .unwrap_or_else(Instant::now);
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok(())) => {}
                        Some(Err(err)) => {
                            if err.is_panic() {
                                self.metrics.record(&Outcome::failure(TAG_ITERATION_ERROR));
                            }
                        }
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    let stragglers = self.tasks.len();
                    if stragglers > 0 {
                        debug!("Graceful stop elapsed with {} iterations in flight", stragglers);
                    }
                    self.tasks.abort_all();
                    while self.tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }
    }
}

/// Returns the slot to the free list when the iteration task ends for any
/// reason. A task dropped by cancellation never set `completed`, which is the
/// one path where the iteration's own outcome was lost — record it as a
/// graceful-stop timeout.
struct SlotGuard {
    free_slots: Arc<Mutex<Vec<u32>>>,
    ordinal: u32,
    metrics: Arc<MetricsAggregator>,
    completed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.metrics.record(&Outcome::failure(TAG_TIMEOUT));
        }
        let mut slots = self
            .free_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.push(self.ordinal);
    }
}
