use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::engine::ExecutionEngine;

/// Poll-loop consumer: drain the queue, then sleep `poll_interval` between
/// empty polls. Run one of these per configured worker; the claim step on
/// the store guarantees a task lands on at most one of them.
pub async fn run_worker(engine: Arc<ExecutionEngine>, poll_interval: Duration) {
    loop {
        match engine.run_once().await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(poll_interval).await,
            Err(e) => {
                warn!(error = %e, "engine iteration failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
