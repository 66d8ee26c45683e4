use std::sync::Arc;

use crate::error::ConfigError;
use crate::worker::WorkerSlot;

/// Immutable, finite pool of opaque resource items (simulated devices,
/// credentials, ...) loaded once before a run and shared read-only by every
/// worker. No worker ever mutates it.
#[derive(Debug)]
pub struct ResourcePool<R> {
    items: Arc<[R]>,
}

impl<R> Clone for ResourcePool<R> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<R> ResourcePool<R> {
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyPool` for an empty item list; an empty pool
    /// is a startup error, never a per-call one.
    pub fn new(items: Vec<R>) -> Result<Self, ConfigError> {
        if items.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        Ok(Self {
            items: items.into(),
        })
    }

    /// Deterministic, stable slot-to-item assignment:
    /// `items[ordinal % len]`. The same ordinal always resolves to the same
    /// item for the run's lifetime; distinct ordinals collide only when
    /// `max_workers > len`.
    #[must_use]
    #[expect(clippy::unwrap_used, reason = "index < len: the constructor rejects empty pools")]
    #[expect(clippy::missing_panics_doc, reason = "the unwrap above cannot fire")]
    pub fn assign(&self, slot: WorkerSlot) -> &R {
        let index = (slot.ordinal() as usize)
            .checked_rem(self.items.len())
            .unwrap_or(0);
        self.items.get(index).unwrap()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, EngineResult};

    #[test]
    fn assignment_is_pure_and_stable() -> EngineResult<()> {
        let pool = ResourcePool::new(vec!["a", "b", "c"])?;
        for ordinal in 0..12u32 {
            let slot = WorkerSlot::new(ordinal);
            let first = *pool.assign(slot);
            let second = *pool.assign(slot);
            if first != second {
                return Err(EngineError::scheduler(format!(
                    "Ordinal {} resolved to different items",
                    ordinal
                )));
            }
        }
        Ok(())
    }

    #[test]
    fn assignments_are_distinct_when_workers_fit_pool() -> EngineResult<()> {
        let pool = ResourcePool::new((0..8u32).collect::<Vec<_>>())?;
        let mut seen = Vec::new();
        for ordinal in 0..8u32 {
            let item = *pool.assign(WorkerSlot::new(ordinal));
            if seen.contains(&item) {
                return Err(EngineError::scheduler(format!(
                    "Item {} assigned twice with max_workers <= pool len",
                    item
                )));
            }
            seen.push(item);
        }
        Ok(())
    }

    #[test]
    fn ordinals_wrap_when_workers_exceed_pool() -> EngineResult<()> {
        let pool = ResourcePool::new(vec![10u32, 20, 30])?;
        if pool.assign(WorkerSlot::new(0)) != pool.assign(WorkerSlot::new(3)) {
            return Err(EngineError::scheduler("Ordinal 3 must wrap onto item 0"));
        }
        Ok(())
    }

    #[test]
    fn empty_pool_is_a_config_error() {
        let result = ResourcePool::<u8>::new(vec![]);
        assert!(matches!(result, Err(ConfigError::EmptyPool)));
    }
}
