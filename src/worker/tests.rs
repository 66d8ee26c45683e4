use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;

use super::*;
use crate::error::{EngineError, EngineResult};
use crate::test_support::run_async_test;

const SHUTDOWN_CAPACITY: usize = 1;

struct Hanging;

#[async_trait]
impl Workload<u32> for Hanging {
    async fn run(&self, _slot: WorkerSlot, _resource: &u32, mut cancel: ShutdownReceiver) -> Vec<Outcome> {
        drop(cancel.recv().await);
        vec![Outcome::new("hanging", true, Duration::from_millis(1))]
    }
}

struct Panicky;

#[async_trait]
impl Workload<u32> for Panicky {
    #[expect(clippy::panic, reason = "exercises the pool's panic boundary")]
    async fn run(&self, _slot: WorkerSlot, _resource: &u32, _cancel: ShutdownReceiver) -> Vec<Outcome> {
        panic!("iteration blew up");
    }
}

struct Sleepy;

#[async_trait]
impl Workload<u32> for Sleepy {
    async fn run(&self, _slot: WorkerSlot, _resource: &u32, _cancel: ShutdownReceiver) -> Vec<Outcome> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        vec![Outcome::new("sleepy", true, Duration::from_millis(1))]
    }
}

struct TagByResource;

#[async_trait]
impl Workload<&'static str> for TagByResource {
    async fn run(
        &self,
        _slot: WorkerSlot,
        resource: &&'static str,
        _cancel: ShutdownReceiver,
    ) -> Vec<Outcome> {
        vec![Outcome::new(format!("resource_{}", resource), true, Duration::from_millis(1))]
    }
}

struct CountingSetup {
    setups: AtomicUsize,
}

#[async_trait]
impl Workload<u32> for CountingSetup {
    async fn setup(&self, _slot: WorkerSlot, _resource: &u32) {
        self.setups.fetch_add(1, Ordering::SeqCst);
    }

    async fn run(&self, _slot: WorkerSlot, _resource: &u32, _cancel: ShutdownReceiver) -> Vec<Outcome> {
        vec![]
    }
}

fn pool_of<W: Workload<u32>>(
    max_workers: usize,
    workload: W,
) -> EngineResult<(WorkerPool<u32, W>, Arc<MetricsAggregator>, ShutdownSender)> {
    let resources = crate::pool::ResourcePool::new((0..8u32).collect())?;
    let metrics = Arc::new(MetricsAggregator::new());
    let (shutdown_tx, _) = broadcast::channel::<()>(SHUTDOWN_CAPACITY);
    let pool = WorkerPool::new(
        max_workers,
        resources,
        Arc::new(workload),
        Arc::clone(&metrics),
        shutdown_tx.clone(),
    );
    Ok((pool, metrics, shutdown_tx))
}

#[test]
fn refuses_submissions_beyond_max_workers() -> EngineResult<()> {
    run_async_test(async {
        let (mut pool, metrics, shutdown_tx) = pool_of(5, Hanging)?;
        let mut accepted = 0u32;
        let mut refused = 0u32;
        for _ in 0..10 {
            if pool.submit() {
                accepted = accepted.saturating_add(1);
            } else {
                refused = refused.saturating_add(1);
            }
        }
        if accepted != 5 || refused != 5 {
            return Err(EngineError::scheduler(format!(
                "Expected 5 accepted / 5 refused, got {} / {}",
                accepted, refused
            )));
        }
        if pool.in_flight() != 5 {
            return Err(EngineError::scheduler(format!(
                "Expected 5 in flight, got {}",
                pool.in_flight()
            )));
        }

        drop(shutdown_tx.send(()));
        pool.drain(Duration::from_secs(5)).await;
        if metrics.count("hanging") != 5 {
            return Err(EngineError::scheduler("All accepted iterations must complete"));
        }
        if metrics.count(TAG_TIMEOUT) != 0 {
            return Err(EngineError::scheduler("No iteration should have timed out"));
        }
        Ok(())
    })
}

#[test]
fn panicking_iteration_is_absorbed() -> EngineResult<()> {
    run_async_test(async {
        let (mut pool, metrics, _shutdown_tx) = pool_of(2, Panicky)?;
        if !pool.submit() {
            return Err(EngineError::scheduler("First submission must be accepted"));
        }
        pool.drain(Duration::from_secs(1)).await;
        if metrics.count(TAG_ITERATION_ERROR) != 1 || metrics.failures(TAG_ITERATION_ERROR) != 1 {
            return Err(EngineError::scheduler("Panic must surface as one failed outcome"));
        }
        // The pool survives: the slot freed and accepts new work.
        if !pool.submit() {
            return Err(EngineError::scheduler("Pool must keep accepting after a panic"));
        }
        pool.drain(Duration::from_secs(1)).await;
        if metrics.count(TAG_ITERATION_ERROR) != 2 {
            return Err(EngineError::scheduler("Second panic must also be recorded"));
        }
        Ok(())
    })
}

#[test]
fn stragglers_past_the_deadline_become_timeouts() -> EngineResult<()> {
    run_async_test(async {
        tokio::time::pause();
        let (mut pool, metrics, _shutdown_tx) = pool_of(3, Sleepy)?;
        if !pool.submit() || !pool.submit() {
            return Err(EngineError::scheduler("Submissions must be accepted"));
        }
        pool.drain(Duration::from_millis(100)).await;
        if metrics.count(TAG_TIMEOUT) != 2 {
            return Err(EngineError::scheduler(format!(
                "Expected 2 timeout outcomes, got {}",
                metrics.count(TAG_TIMEOUT)
            )));
        }
        if metrics.count("sleepy") != 0 {
            return Err(EngineError::scheduler("Cancelled iterations must not report success"));
        }
        Ok(())
    })
}

#[test]
fn recycled_slot_resolves_the_same_resource() -> EngineResult<()> {
    run_async_test(async {
        let resources = crate::pool::ResourcePool::new(vec!["alpha", "beta"])?;
        let metrics = Arc::new(MetricsAggregator::new());
        let (shutdown_tx, _) = broadcast::channel::<()>(SHUTDOWN_CAPACITY);
        let mut pool = WorkerPool::new(
            1,
            resources,
            Arc::new(TagByResource),
            Arc::clone(&metrics),
            shutdown_tx,
        );
        for _ in 0..3 {
            if !pool.submit() {
                return Err(EngineError::scheduler("Submission must be accepted"));
            }
            pool.drain(Duration::from_secs(1)).await;
        }
        if metrics.count("resource_alpha") != 3 || metrics.count("resource_beta") != 0 {
            return Err(EngineError::scheduler(
                "Slot 0 must always resolve the same pool item",
            ));
        }
        Ok(())
    })
}

#[test]
fn preallocation_runs_setup_per_slot() -> EngineResult<()> {
    run_async_test(async {
        let workload = Arc::new(CountingSetup {
            setups: AtomicUsize::new(0),
        });
        let resources = crate::pool::ResourcePool::new((0..8u32).collect())?;
        let metrics = Arc::new(MetricsAggregator::new());
        let (shutdown_tx, _) = broadcast::channel::<()>(SHUTDOWN_CAPACITY);
        let pool = WorkerPool::new(
            10,
            resources,
            Arc::clone(&workload),
            metrics,
            shutdown_tx,
        );
        pool.preallocate(4).await;
        if workload.setups.load(Ordering::SeqCst) != 4 {
            return Err(EngineError::scheduler(format!(
                "Expected 4 setup calls, got {}",
                workload.setups.load(Ordering::SeqCst)
            )));
        }
        Ok(())
    })
}
