//! Arrival-rate load-generation engine.
//!
//! This crate schedules iterations of a caller-supplied workload at a
//! configured arrival rate rather than a fixed concurrency: a rate profile
//! (constant or ramping through stages) says how many iterations must start
//! per second, a bounded worker pool executes them, and iterations that find
//! no free slot are dropped and counted instead of queued. Results stream
//! into per-tag aggregates that SLO thresholds gate on while the run is
//! still in flight; a breached abort threshold cuts the run short. Every run
//! ends with a report stating its terminal reason, completed or aborted.
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod profile;
pub mod scheduler;
pub mod shutdown;
pub mod summary;
pub mod system;
pub mod threshold;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;
