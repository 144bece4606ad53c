//! Background task plumbing shared by the oscillator and the agent pool.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Owns a spawned task and its stop signal. Dropping the handle stops the task.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the task to stop without waiting for it.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Signal the task and wait until it has exited.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                debug!(task = self.name, error = %e, "Task ended abnormally");
            }
        }
        info!(task = self.name, "Task stopped");
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `step` every `period`, first firing one period after the call. The task exits when
/// the handle is stopped or dropped, or when `step` returns `Break`.
///
/// Ticks missed while `step` was running are skipped rather than replayed.
pub fn spawn_periodic<F>(name: &'static str, period: Duration, mut step: F) -> TaskHandle
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let period = period.max(Duration::from_millis(1));

    let join = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = name, period_ms = period.as_millis() as u64, "Task started");

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    if step().is_break() {
                        debug!(task = name, "Task finished on its own");
                        break;
                    }
                }
            }
        }
    });

    TaskHandle { name, stop_tx: Some(stop_tx), join: Some(join) }
}
