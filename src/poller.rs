//! Readiness poller: a repeating per-asset check that fires exactly once.
//!
//! One tokio task per asset reference, each with its own fixed-interval
//! timer, so slow checks for one asset never delay another. A task settles
//! on the first "ready" result, emits a single event, and releases its
//! timer. Cancellation is a shared flag plus an abort: the flag is checked
//! immediately before the ready event is sent, so a stop racing a ready
//! tick never produces a fire-after-cancel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Terminal outcome of one poll task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollEvent {
    Ready { asset_ref: String },
    TimedOut { asset_ref: String },
}

/// The repeating check: given the asset reference, resolve whether the asset
/// exists yet. Transport failures are retried and never counted as attempts.
pub type ReadyCheck = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<bool, SessionError>> + Send>>
        + Send
        + Sync,
>;

struct PollTask {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

pub struct ReadinessPoller {
    interval: Duration,
    max_attempts: Option<u32>,
    events: mpsc::UnboundedSender<PollEvent>,
    tasks: HashMap<String, PollTask>,
}

impl ReadinessPoller {
    pub fn new(
        interval: Duration,
        max_attempts: Option<u32>,
    ) -> (Self, mpsc::UnboundedReceiver<PollEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                interval,
                max_attempts,
                events: tx,
                tasks: HashMap::new(),
            },
            rx,
        )
    }

    /// Begin polling `asset_ref`. At most one active task per reference:
    /// starting again for a live reference cancels the old task first.
    pub fn start(&mut self, asset_ref: &str, check: ReadyCheck) {
        self.stop(asset_ref);

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let tx = self.events.clone();
        let asset = asset_ref.to_string();
        let interval = self.interval;
        let max_attempts = self.max_attempts;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of tokio's interval completes immediately; skip
            // it so the first check lands one interval after start.
            ticker.tick().await;

            let mut attempts: u32 = 0;
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                match check(asset.clone()).await {
                    Ok(true) => {
                        if flag.load(Ordering::SeqCst) {
                            return;
                        }
                        debug!(target: "poller", %asset, attempts, "asset ready");
                        let _ = tx.send(PollEvent::Ready { asset_ref: asset });
                        return;
                    }
                    Ok(false) => {
                        attempts += 1;
                        if let Some(cap) = max_attempts {
                            if attempts >= cap {
                                if flag.load(Ordering::SeqCst) {
                                    return;
                                }
                                info!(target: "poller", %asset, attempts, "giving up on asset");
                                let _ = tx.send(PollEvent::TimedOut { asset_ref: asset });
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        // Not-yet-ready as far as we're concerned; keep going.
                        warn!(target: "poller", %asset, error = %e, "readiness check failed; will retry");
                    }
                }
            }
        });

        self.tasks
            .insert(asset_ref.to_string(), PollTask { handle, cancelled });
    }

    /// Cancel the poll task for `asset_ref`, if any. Idempotent: settled or
    /// unknown references are a no-op, including from a ready event handler.
    pub fn stop(&mut self, asset_ref: &str) {
        if let Some(task) = self.tasks.remove(asset_ref) {
            task.cancelled.store(true, Ordering::SeqCst);
            task.handle.abort();
        }
    }

    /// Cancel every outstanding poll task (batch teardown path).
    pub fn stop_all(&mut self) {
        for (asset, task) in self.tasks.drain() {
            task.cancelled.store(true, Ordering::SeqCst);
            task.handle.abort();
            debug!(target: "poller", %asset, "poll task cancelled");
        }
    }

    /// Number of tasks that have not yet settled or been cancelled.
    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| !t.handle.is_finished()).count()
    }
}

impl Drop for ReadinessPoller {
    fn drop(&mut self) {
        self.stop_all();
    }
}
