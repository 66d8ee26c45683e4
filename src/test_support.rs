use std::future::Future;

use crate::error::{EngineError, EngineResult};

/// Runs an async test body on a current-thread runtime, surfacing setup
/// failures as errors instead of panics.
pub(crate) fn run_async_test<F>(future: F) -> EngineResult<()>
where
    F: Future<Output = EngineResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| EngineError::scheduler(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}
