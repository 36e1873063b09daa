//! Tokio driver for [`ChecksumTask`].
//!
//! Each step runs on the blocking pool and the driver yields back to the
//! runtime between steps. Backoff after a stalled read is an async sleep.

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::task::{ChecksumTask, Step};

/// Steps `task` until it reports, or until `cancel` fires.
pub async fn drive(mut task: ChecksumTask, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            task.cancel();
            return;
        }

        let stepped = tokio::task::spawn_blocking(move || {
            let step = task.step();
            (task, step)
        })
        .await;
        let (returned, step) = match stepped {
            Ok(pair) => pair,
            Err(e) => {
                // The task was dropped with the panicking step and has
                // already reported.
                error!(error = %e, "checksum step aborted");
                return;
            }
        };
        task = returned;

        match step {
            Step::Continue => tokio::task::yield_now().await,
            Step::Backoff(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        task.cancel();
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Step::Finished => return,
        }
    }
}

/// Spawns [`drive`] on `runtime`.
pub fn spawn(runtime: &Handle, task: ChecksumTask, cancel: CancellationToken) -> JoinHandle<()> {
    runtime.spawn(drive(task, cancel))
}
